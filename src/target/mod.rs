//! Target and script model, plus the rule-type registry.
//!
//! A target is one schedulable unit in the host build graph: named source
//! buckets, declared outputs, a resolved tool table, and a closed set of
//! scripts. The host invokes every script through [`Target::run_script`];
//! aliases (`apply`, `rm`, ...) are surfaced via [`ScriptKind::aliases`] so
//! the host can map its verbs onto script kinds.

use crate::error::{Result, TargetError};
use crate::host::{ConfigContext, Environment};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Run-time context handed to a script body by the host scheduler.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// Selected environment name; empty for the unnamed environment.
    pub environment: String,

    /// Plan instead of mutating anything.
    pub dry_run: bool,
}

impl RunContext {
    pub fn for_environment(environment: &str) -> Self {
        Self {
            environment: environment.to_string(),
            dry_run: false,
        }
    }
}

/// The closed set of scripts a target can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    Build,
    Deploy,
    Lint,
    Remove,
    Unlock,
}

impl ScriptKind {
    /// Canonical script name as the host's configuration refers to it.
    pub fn name(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Deploy => "deploy",
            Self::Lint => "lint",
            Self::Remove => "remove",
            Self::Unlock => "unlock",
        }
    }

    /// Alternate verbs the host accepts for this script.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::Deploy => &["apply"],
            Self::Remove => &["rm", "delete"],
            _ => &[],
        }
    }
}

/// Script body. Receives the target handle and the run context.
pub type ScriptFn = Box<dyn Fn(&Target, &RunContext) -> Result<()> + Send + Sync>;

/// Pre-hook run before the body; may rewrite the working directory.
pub type PreFn = fn(&mut Target, &RunContext) -> Result<()>;

/// One script bound to a target.
pub struct Script {
    /// Extra dependencies scheduled before this script runs.
    pub deps: Vec<String>,

    /// Optional hook run before the body.
    pub pre: Option<PreFn>,

    /// Optional rename applied by the host to declared output names.
    pub transform_out: Option<fn(&str) -> String>,

    /// The body.
    pub run: ScriptFn,
}

impl Script {
    /// A plain script: no deps, no hooks, just a body.
    pub fn new(run: ScriptFn) -> Self {
        Self {
            deps: Vec::new(),
            pre: None,
            transform_out: None,
            run,
        }
    }
}

// The body closure is opaque; everything else prints.
impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("deps", &self.deps)
            .field("pre", &self.pre.is_some())
            .field("transform_out", &self.transform_out.is_some())
            .finish_non_exhaustive()
    }
}

/// A concrete build target, ready for the host graph.
#[derive(Debug)]
pub struct Target {
    pub name: String,

    /// Sandbox working directory assigned by the host.
    pub cwd: PathBuf,

    /// Source buckets by purpose. Values are declared path-or-reference
    /// strings at configuration time; the host's source-fetch phase rewrites
    /// them to concrete sandbox-relative paths before `build` runs.
    pub srcs: IndexMap<String, Vec<String>>,

    /// Output glob patterns relative to `cwd`.
    pub outs: Vec<String>,

    /// Resolved tool table by logical name.
    pub tools: HashMap<String, String>,

    /// Static environment variables for tool invocations.
    pub env: HashMap<String, String>,

    /// OS environment variable names passed through to tool invocations.
    pub pass_env: Vec<String>,

    /// Declared deployment environments.
    pub environments: IndexMap<String, Environment>,

    /// Scripts by kind.
    pub scripts: IndexMap<ScriptKind, Script>,
}

impl Target {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cwd: PathBuf::new(),
            srcs: IndexMap::new(),
            outs: Vec::new(),
            tools: HashMap::new(),
            env: HashMap::new(),
            pass_env: Vec::new(),
            environments: IndexMap::new(),
            scripts: IndexMap::new(),
        }
    }

    /// Entries of a source bucket; absent buckets read as empty.
    pub fn bucket(&self, name: &str) -> &[String] {
        self.srcs.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Environment variables for a tool invocation: the static `env` map
    /// plus any `pass_env` names found in the OS environment.
    pub fn environment_variables(&self) -> Vec<(String, String)> {
        let mut vars: Vec<(String, String)> = self
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for name in &self.pass_env {
            if let Ok(value) = std::env::var(name) {
                vars.push((name.clone(), value));
            }
        }
        vars
    }

    /// Run one of the target's scripts: pre-hook first, then the body.
    pub fn run_script(&mut self, kind: ScriptKind, ctx: &RunContext) -> Result<()> {
        let script =
            self.scripts
                .shift_remove(&kind)
                .ok_or_else(|| TargetError::ScriptNotFound {
                    target: self.name.clone(),
                    script: kind.name(),
                })?;

        let result = match script.pre {
            Some(pre) => pre(self, ctx),
            None => Ok(()),
        }
        .and_then(|()| (script.run)(self, ctx));

        self.scripts.insert(kind, script);
        result
    }
}

/// Builder for one rule kind: raw declaration block + context in, targets out.
pub type TargetBuilder = fn(&serde_yaml_ng::Value, &ConfigContext) -> Result<Vec<Target>>;

/// Registry of rule-type names consumed by the host's configuration loader.
pub fn known_targets() -> IndexMap<&'static str, TargetBuilder> {
    IndexMap::from([
        ("terraform", crate::terraform::targets as TargetBuilder),
        (
            "terraform_module",
            crate::terraform::module::targets as TargetBuilder,
        ),
    ])
}
