//! Synchronous invocation of terraform/tflocal/tflint.
//!
//! Runs block until the tool exits. Stdout/stderr are inherited so the host
//! sees output as it is produced; the unlock path captures both instead,
//! since it has to pattern-match the plan output after the fact.

use crate::error::{Result, TargetError};
use crate::target::{RunContext, Target};
use std::process::Command;
use tracing::debug;

/// Executable for a run: `tflocal` for the literal `"local"` environment,
/// `terraform` otherwise.
pub fn tool_for(ctx: &RunContext) -> &'static str {
    if ctx.environment == "local" {
        "tflocal"
    } else {
        "terraform"
    }
}

fn command(target: &Target, tool: &str, stage: &'static str, args: &[&str]) -> Result<Command> {
    let exe = target
        .tools
        .get(tool)
        .ok_or_else(|| TargetError::ToolchainNotConfigured {
            tool: tool.to_string(),
        })?;
    debug!(stage, tool = %exe, ?args, cwd = %target.cwd.display(), "executing");

    let mut cmd = Command::new(exe);
    cmd.args(args).current_dir(&target.cwd);
    for (key, value) in target.environment_variables() {
        cmd.env(key, value);
    }
    cmd.env("TF_INPUT", "false");
    Ok(cmd)
}

/// Run a named tool from the target's tool table, streaming its output.
pub fn run_tool(
    target: &Target,
    tool: &str,
    stage: &'static str,
    args: &[&str],
) -> Result<()> {
    let status = command(target, tool, stage, args)?
        .status()
        .map_err(|e| TargetError::Spawn {
            stage,
            tool: tool.to_string(),
            source: e,
        })?;
    if status.success() {
        Ok(())
    } else {
        Err(TargetError::ExternalProcess {
            stage,
            tool: tool.to_string(),
            code: status.code().unwrap_or(-1),
        })
    }
}

/// Run terraform or tflocal (per the run environment), streaming output.
pub fn run(target: &Target, ctx: &RunContext, stage: &'static str, args: &[&str]) -> Result<()> {
    run_tool(target, tool_for(ctx), stage, args)
}

/// Run terraform or tflocal with stdout and stderr fully captured.
/// Returns the success flag and the combined output.
pub fn run_captured(
    target: &Target,
    ctx: &RunContext,
    stage: &'static str,
    args: &[&str],
) -> Result<(bool, String)> {
    let tool = tool_for(ctx);
    let output = command(target, tool, stage, args)?
        .output()
        .map_err(|e| TargetError::Spawn {
            stage,
            tool: tool.to_string(),
            source: e,
        })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok((output.status.success(), combined))
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    fn target_with_tool(dir: &Path, script: &str) -> Target {
        let mut target = Target::new("t");
        target.cwd = dir.to_path_buf();
        testtool::install(&mut target, dir, "terraform", script);
        target
    }

    #[test]
    fn test_tool_selection() {
        assert_eq!(tool_for(&RunContext::for_environment("local")), "tflocal");
        assert_eq!(tool_for(&RunContext::for_environment("staging")), "terraform");
        assert_eq!(tool_for(&RunContext::default()), "terraform");
    }

    #[test]
    fn test_run_success() {
        let dir = tempfile::tempdir().unwrap();
        let target = target_with_tool(dir.path(), testtool::DEFAULT);
        run(&target, &RunContext::default(), "deploying", &["init"]).unwrap();
        assert_eq!(testtool::log_lines(dir.path()), vec!["init"]);
    }

    #[test]
    fn test_run_failure_maps_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let target = target_with_tool(dir.path(), testtool::FAIL_ON_APPLY);
        let err = run(
            &target,
            &RunContext::default(),
            "deploying",
            &["apply", "-auto-approve"],
        )
        .unwrap_err();
        match err {
            TargetError::ExternalProcess { stage, code, .. } => {
                assert_eq!(stage, "deploying");
                assert_eq!(code, 1);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_run_missing_tool_entry() {
        let mut target = Target::new("t");
        target.cwd = PathBuf::from(".");
        let err = run(&target, &RunContext::default(), "deploying", &["init"]).unwrap_err();
        assert!(matches!(err, TargetError::ToolchainNotConfigured { .. }));
    }

    #[test]
    fn test_run_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut target = Target::new("t");
        target.cwd = dir.path().to_path_buf();
        target.tools.insert(
            "terraform".to_string(),
            dir.path().join("missing-exe").display().to_string(),
        );
        let err = run(&target, &RunContext::default(), "deploying", &["init"]).unwrap_err();
        assert!(matches!(err, TargetError::Spawn { .. }));
    }

    #[test]
    fn test_run_captured_combines_streams() {
        let dir = tempfile::tempdir().unwrap();
        let target = target_with_tool(dir.path(), testtool::LOCKED_PLAN);
        let (success, output) = run_captured(
            &target,
            &RunContext::default(),
            "unlocking",
            &["plan"],
        )
        .unwrap();
        assert!(!success);
        assert!(output.contains("ID:        abc-123"));
    }

    #[test]
    fn test_env_overlay_applied() {
        let dir = tempfile::tempdir().unwrap();
        let script = "#!/bin/sh\necho \"$MARKER $TF_INPUT\" >> \"$TOOL_LOG\"\n";
        let mut target = target_with_tool(dir.path(), script);
        target
            .env
            .insert("MARKER".to_string(), "hello".to_string());
        run(&target, &RunContext::default(), "deploying", &["init"]).unwrap();
        assert_eq!(testtool::log_lines(dir.path()), vec!["hello false"]);
    }
}
