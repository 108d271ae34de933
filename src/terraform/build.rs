//! Build script: materialize the layout plan into working directories.
//!
//! One directory per environment (or the target root when no environments
//! are declared). Variable files are renamed into ordered `*.auto.tfvars`
//! fragments so Terraform's auto-loading applies them deterministically,
//! with later-numbered files overriding earlier ones. Environments are
//! materialized one at a time; a failure aborts the current environment and
//! leaves earlier ones on disk.

use super::{TerraformRule, BACKEND_BUCKET, DATA_BUCKET, MODULES_BUCKET, PROVIDERS_BUCKET, SRCS_BUCKET};
use crate::error::Result;
use crate::host::fsops;
use crate::host::interpolate::interpolate;
use crate::target::Target;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Materialize every environment's working directory under `target.cwd`.
pub fn materialize(rule: &TerraformRule, target: &Target) -> Result<()> {
    if target.environments.is_empty() {
        return materialize_environment(rule, target, "");
    }
    for name in target.environments.keys() {
        materialize_environment(rule, target, name)?;
    }
    Ok(())
}

fn materialize_environment(rule: &TerraformRule, target: &Target, env: &str) -> Result<()> {
    let (dest, backend_bucket, vars) = if env.is_empty() {
        (target.cwd.clone(), BACKEND_BUCKET.to_string(), HashMap::new())
    } else {
        (
            target.cwd.join(env),
            format!("{}_{}", BACKEND_BUCKET, env),
            HashMap::from([("ENV".to_string(), env.to_string())]),
        )
    };
    info!(target = %target.name, environment = %env, dest = %dest.display(), "materializing");

    // The filter list's index is the authoritative auto.tfvars ordering.
    let mut var_filter = Vec::with_capacity(rule.var_files.len());
    for template in &rule.var_files {
        var_filter.push(interpolate(template, &vars)?);
    }

    // Only provider configs cross the text-substitution boundary; raw
    // sources and data are staged byte-for-byte.
    for src in target.bucket(SRCS_BUCKET) {
        stage_source(src, &dest, &var_filter, None)?;
    }
    for src in target.bucket(PROVIDERS_BUCKET) {
        stage_source(src, &dest, &var_filter, Some(&vars))?;
    }

    // Data bypasses the variable-file filter entirely; a .tfvars declared
    // here lands under its own name, unrenamed.
    for src in target.bucket(DATA_BUCKET) {
        let to = dest.join(file_name(src));
        debug!(from = %src, to = %to.display(), "staging data");
        fsops::copy(Path::new(src), &to)?;
    }

    for src in target.bucket(&backend_bucket) {
        let to = dest.join(format!("_backend_{}", file_name(src)));
        debug!(from = %src, to = %to.display(), "staging backend");
        fsops::copy_with_interpolate(Path::new(src), &to, &vars)?;
    }

    // Modules keep their path structure under the destination.
    for src in target.bucket(MODULES_BUCKET) {
        let to = module_destination(src, &dest);
        debug!(from = %src, to = %to.display(), "staging module");
        fsops::copy(Path::new(src), &to)?;
    }

    Ok(())
}

/// Where a module tree lands: its path joined under `dest`. Root, prefix and
/// `..` components are stripped first so an absolute or traversing source
/// can never resolve outside the destination.
fn module_destination(src: &str, dest: &Path) -> PathBuf {
    let rel: PathBuf = Path::new(src)
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();
    dest.join(rel)
}

fn stage_source(
    src: &str,
    dest: &Path,
    var_filter: &[String],
    vars: Option<&HashMap<String, String>>,
) -> Result<()> {
    let Some(to) = destination_for(src, dest, var_filter) else {
        debug!(src = %src, "variable file matches no filter entry, dropping");
        return Ok(());
    };
    debug!(from = %src, to = %to.display(), "staging source");
    match vars {
        Some(vars) => fsops::copy_with_interpolate(Path::new(src), &to, vars),
        None => fsops::copy(Path::new(src), &to),
    }
}

/// Where a generic source lands, or `None` when it is a variable file that
/// matches no filter entry and must be dropped.
///
/// A variable file matching filter index `i` becomes
/// `<i>-<filter stem>.auto.tfvars[.json]`. Anything else lands under its
/// base name; two sources sharing a base name are last-write-wins.
fn destination_for(src: &str, dest: &Path, var_filter: &[String]) -> Option<PathBuf> {
    if !is_var_file(src) {
        return Some(dest.join(file_name(src)));
    }

    let i = var_filter.iter().position(|f| src.ends_with(f.as_str()))?;
    let name = file_name(&var_filter[i]);
    let renamed = if let Some(stem) = name.strip_suffix(".tfvars.json") {
        format!("{}-{}.auto.tfvars.json", i, stem)
    } else {
        let stem = name.strip_suffix(".tfvars").unwrap_or(name);
        format!("{}-{}.auto.tfvars", i, stem)
    };
    Some(dest.join(renamed))
}

fn is_var_file(src: &str) -> bool {
    src.ends_with(".tfvars") || src.ends_with(".tfvars.json")
}

fn file_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}
