//! Deployment scripts: deploy, remove, lint, unlock.
//!
//! Thin orchestration over the materialized directory. Each body shells out
//! to the real terraform/tflocal binary and wraps failures with its stage
//! name; the host decides presentation and exit codes.

use super::exec;
use crate::error::{Result, TargetError};
use crate::target::{RunContext, Target};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{info, warn};

/// Shared pre-hook: descend into the environment subdirectory when named
/// environments are declared. Mirrors the destination rule in
/// [`super::build::materialize`]; the two must not drift apart or deploys
/// operate on the wrong directory.
pub fn enter_environment_dir(target: &mut Target, ctx: &RunContext) -> Result<()> {
    if !target.environments.is_empty() {
        target.cwd = target.cwd.join(&ctx.environment);
    }
    Ok(())
}

/// `deploy`/`apply`: init, then plan (dry-run) or apply. Apply failures are
/// swallowed when the rule sets `allow_failure`; init and plan failures
/// never are.
pub fn deploy(target: &Target, ctx: &RunContext, allow_failure: bool) -> Result<()> {
    info!(target = %target.name, "initializing");
    exec::run(target, ctx, "deploying", &["init"])?;

    if ctx.dry_run {
        info!(target = %target.name, "planning");
        return exec::run(target, ctx, "deploying", &["plan"]);
    }

    info!(target = %target.name, "applying");
    match exec::run(target, ctx, "deploying", &["apply", "-auto-approve"]) {
        Err(e) if allow_failure => {
            warn!(target = %target.name, error = %e, "apply failed, allow_failure set");
            Ok(())
        }
        result => result,
    }
}

/// `remove`/`rm`/`delete`: init, then destroy plan (dry-run) or destroy.
/// Always fatal on failure.
pub fn remove(target: &Target, ctx: &RunContext) -> Result<()> {
    info!(target = %target.name, "initializing");
    exec::run(target, ctx, "destroying", &["init"])?;

    if ctx.dry_run {
        info!(target = %target.name, "planning destroy");
        exec::run(target, ctx, "destroying", &["plan", "-destroy"])
    } else {
        info!(target = %target.name, "destroying");
        exec::run(target, ctx, "destroying", &["apply", "-destroy", "-auto-approve"])
    }
}

/// `lint`: run tflint in the working directory.
pub fn lint(target: &Target, _ctx: &RunContext) -> Result<()> {
    if !target.tools.contains_key("tflint") {
        return Err(TargetError::ToolchainNotConfigured {
            tool: "tflint".to_string(),
        });
    }
    info!(target = %target.name, "linting");
    exec::run_tool(target, "tflint", "linting", &[])
}

static LOCK_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ID:\s+(\S+)").expect("static pattern"));

/// `unlock`: break an abandoned state lock. The plan is expected to fail
/// with lock info in its output; a successful plan means there is nothing
/// to unlock, which is itself reported as an error.
pub fn unlock(target: &Target, ctx: &RunContext) -> Result<()> {
    info!(target = %target.name, "initializing");
    exec::run(target, ctx, "unlocking", &["init"])?;

    info!(target = %target.name, "planning, expecting lock info");
    let (success, output) = exec::run_captured(target, ctx, "unlocking", &["plan"])?;
    if success {
        return Err(TargetError::LockNotPresent);
    }

    let id = LOCK_ID
        .captures(&output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or(TargetError::LockIdNotFound)?;

    info!(target = %target.name, id = %id, "breaking lock");
    exec::run(target, ctx, "unlocking", &["force-unlock", "-force", &id])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terraform::exec::testtool;
    use indexmap::IndexMap;
    use std::path::Path;

    fn target_with(dir: &Path, script: &str) -> Target {
        let mut target = Target::new("infra");
        target.cwd = dir.to_path_buf();
        testtool::install(&mut target, dir, "terraform", script);
        target
    }

    #[test]
    fn test_pre_hook_with_environments() {
        let mut target = Target::new("infra");
        target.cwd = Path::new("/sandbox").to_path_buf();
        target
            .environments
            .insert("staging".to_string(), Default::default());
        enter_environment_dir(&mut target, &RunContext::for_environment("staging")).unwrap();
        assert_eq!(target.cwd, Path::new("/sandbox/staging"));
    }

    #[test]
    fn test_pre_hook_without_environments() {
        let mut target = Target::new("infra");
        target.cwd = Path::new("/sandbox").to_path_buf();
        target.environments = IndexMap::new();
        enter_environment_dir(&mut target, &RunContext::for_environment("staging")).unwrap();
        assert_eq!(target.cwd, Path::new("/sandbox"));
    }

    #[test]
    fn test_deploy_dry_run_plans() {
        let dir = tempfile::tempdir().unwrap();
        let target = target_with(dir.path(), testtool::DEFAULT);
        let ctx = RunContext {
            environment: String::new(),
            dry_run: true,
        };
        deploy(&target, &ctx, false).unwrap();
        assert_eq!(testtool::log_lines(dir.path()), vec!["init", "plan"]);
    }

    #[test]
    fn test_deploy_applies() {
        let dir = tempfile::tempdir().unwrap();
        let target = target_with(dir.path(), testtool::DEFAULT);
        deploy(&target, &RunContext::default(), false).unwrap();
        assert_eq!(
            testtool::log_lines(dir.path()),
            vec!["init", "apply -auto-approve"]
        );
    }

    #[test]
    fn test_deploy_apply_failure_fatal_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let target = target_with(dir.path(), testtool::FAIL_ON_APPLY);
        let err = deploy(&target, &RunContext::default(), false).unwrap_err();
        assert!(err.to_string().starts_with("deploying:"));
    }

    #[test]
    fn test_deploy_allow_failure_swallows_apply() {
        let dir = tempfile::tempdir().unwrap();
        let target = target_with(dir.path(), testtool::FAIL_ON_APPLY);
        deploy(&target, &RunContext::default(), true).unwrap();
        assert_eq!(
            testtool::log_lines(dir.path()),
            vec!["init", "apply -auto-approve"]
        );
    }

    #[test]
    fn test_deploy_allow_failure_keeps_init_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let script = "#!/bin/sh\necho \"$@\" >> \"$TOOL_LOG\"\n[ \"$1\" = init ] && exit 1\nexit 0\n";
        let target = target_with(dir.path(), script);
        let err = deploy(&target, &RunContext::default(), true).unwrap_err();
        assert!(err.to_string().starts_with("deploying:"));
    }

    #[test]
    fn test_deploy_uses_tflocal_for_local() {
        let dir = tempfile::tempdir().unwrap();
        let mut target = target_with(dir.path(), testtool::FAIL_ON_APPLY);
        // tflocal succeeds where the terraform fake would fail on apply.
        testtool::install(&mut target, dir.path(), "tflocal", testtool::DEFAULT);
        deploy(&target, &RunContext::for_environment("local"), false).unwrap();
        assert_eq!(
            testtool::log_lines(dir.path()),
            vec!["init", "apply -auto-approve"]
        );
    }

    #[test]
    fn test_remove_dry_run() {
        let dir = tempfile::tempdir().unwrap();
        let target = target_with(dir.path(), testtool::DEFAULT);
        let ctx = RunContext {
            environment: String::new(),
            dry_run: true,
        };
        remove(&target, &ctx).unwrap();
        assert_eq!(
            testtool::log_lines(dir.path()),
            vec!["init", "plan -destroy"]
        );
    }

    #[test]
    fn test_remove_destroys() {
        let dir = tempfile::tempdir().unwrap();
        let target = target_with(dir.path(), testtool::DEFAULT);
        remove(&target, &RunContext::default()).unwrap();
        assert_eq!(
            testtool::log_lines(dir.path()),
            vec!["init", "apply -destroy -auto-approve"]
        );
    }

    #[test]
    fn test_remove_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let target = target_with(dir.path(), testtool::FAIL_ON_APPLY);
        let err = remove(&target, &RunContext::default()).unwrap_err();
        assert!(err.to_string().starts_with("destroying:"));
    }

    #[test]
    fn test_lint_requires_tflint() {
        let dir = tempfile::tempdir().unwrap();
        let target = target_with(dir.path(), testtool::DEFAULT);
        let err = lint(&target, &RunContext::default()).unwrap_err();
        assert_eq!(err.to_string(), "tflint toolchain is not configured");
    }

    #[test]
    fn test_lint_runs_tflint() {
        let dir = tempfile::tempdir().unwrap();
        let mut target = Target::new("infra");
        target.cwd = dir.path().to_path_buf();
        testtool::install(&mut target, dir.path(), "tflint", testtool::DEFAULT);
        lint(&target, &RunContext::default()).unwrap();
        // Invoked with no arguments.
        assert_eq!(testtool::log_lines(dir.path()), vec![""]);
    }

    #[test]
    fn test_unlock_breaks_lock() {
        let dir = tempfile::tempdir().unwrap();
        let target = target_with(dir.path(), testtool::LOCKED_PLAN);
        unlock(&target, &RunContext::default()).unwrap();
        assert_eq!(
            testtool::log_lines(dir.path()),
            vec!["init", "plan", "force-unlock -force abc-123"]
        );
    }

    #[test]
    fn test_unlock_nothing_to_unlock() {
        let dir = tempfile::tempdir().unwrap();
        let target = target_with(dir.path(), testtool::DEFAULT);
        let err = unlock(&target, &RunContext::default()).unwrap_err();
        assert!(matches!(err, TargetError::LockNotPresent));
        // No force-unlock issued.
        assert_eq!(testtool::log_lines(dir.path()), vec!["init", "plan"]);
    }

    #[test]
    fn test_unlock_no_id_in_output() {
        let dir = tempfile::tempdir().unwrap();
        let script = "#!/bin/sh\necho \"$@\" >> \"$TOOL_LOG\"\n[ \"$1\" = plan ] && exit 1\nexit 0\n";
        let target = target_with(dir.path(), script);
        let err = unlock(&target, &RunContext::default()).unwrap_err();
        assert!(matches!(err, TargetError::LockIdNotFound));
    }

    #[test]
    fn test_lock_id_pattern_first_match() {
        let output = "Error acquiring lock\n  ID:        abc-123\n  ID:        second\n";
        let id = LOCK_ID.captures(output).unwrap().get(1).unwrap().as_str();
        assert_eq!(id, "abc-123");
    }
}
