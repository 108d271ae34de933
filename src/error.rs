//! Error taxonomy for target expansion and script execution.
//!
//! Every failure is wrapped with the stage it happened in ("deploying",
//! "destroying", ...) and propagated to the host, which owns presentation
//! and exit-code mapping. Nothing here retries.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TargetError>;

/// Errors raised while expanding rules or running target scripts.
#[derive(Error, Debug)]
pub enum TargetError {
    /// A tool has neither an explicit value nor an ambient toolchain entry.
    /// Fatal at configuration time.
    #[error("{tool} toolchain is not configured")]
    ToolchainNotConfigured { tool: String },

    /// Malformed placeholder or missing context key. Aborts the current
    /// environment's materialization.
    #[error("interpolating {template:?}: {reason}")]
    Interpolation { template: String, reason: String },

    /// I/O failure while staging a file. Aborts the remaining copies for the
    /// environment; already-written environments are not rolled back.
    #[error("copying {} to {}: {source}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Non-zero exit from terraform/tflocal/tflint.
    #[error("{stage}: {tool} exited with code {code}")]
    ExternalProcess {
        stage: &'static str,
        tool: String,
        code: i32,
    },

    /// The executable could not be started at all.
    #[error("{stage}: failed to run {tool}: {source}")]
    Spawn {
        stage: &'static str,
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The unlock plan succeeded, meaning no lock is held.
    #[error("nothing to unlock, plan succeeded")]
    LockNotPresent,

    /// The failed plan output carried no recognizable lock ID.
    #[error("no lock ID found in plan output")]
    LockIdNotFound,

    /// A rule declaration failed eager validation.
    #[error("invalid rule {rule:?}: {reason}")]
    InvalidRule { rule: String, reason: String },

    /// A rule block could not be decoded into its typed config struct.
    #[error("decoding rule block: {0}")]
    Decode(#[from] serde_yaml_ng::Error),

    /// The host asked for a script the target does not carry.
    #[error("target {target:?} has no {script} script")]
    ScriptNotFound { target: String, script: &'static str },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
