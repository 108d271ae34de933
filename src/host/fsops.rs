//! File staging primitives: plain copy, copy-with-interpolation, symlink.
//!
//! Every operation creates missing parent directories and reports failures
//! as [`TargetError::Copy`] carrying both endpoints.

use crate::error::{Result, TargetError};
use crate::host::interpolate::interpolate;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

fn copy_error(from: &Path, to: &Path, source: std::io::Error) -> TargetError {
    TargetError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    }
}

fn ensure_parent(to: &Path) -> std::io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Copy `from` to `to` byte-for-byte. Directories are copied recursively.
pub fn copy(from: &Path, to: &Path) -> Result<()> {
    copy_inner(from, to).map_err(|e| copy_error(from, to, e))
}

fn copy_inner(from: &Path, to: &Path) -> std::io::Result<()> {
    if from.is_dir() {
        fs::create_dir_all(to)?;
        for entry in fs::read_dir(from)? {
            let entry = entry?;
            copy_inner(&entry.path(), &to.join(entry.file_name()))?;
        }
    } else {
        ensure_parent(to)?;
        fs::copy(from, to)?;
    }
    Ok(())
}

/// Copy a text file, substituting `${VAR}` placeholders from `vars`.
pub fn copy_with_interpolate(
    from: &Path,
    to: &Path,
    vars: &HashMap<String, String>,
) -> Result<()> {
    let content = fs::read_to_string(from).map_err(|e| copy_error(from, to, e))?;
    let rendered = interpolate(&content, vars)?;
    ensure_parent(to).map_err(|e| copy_error(from, to, e))?;
    fs::write(to, rendered).map_err(|e| copy_error(from, to, e))?;
    Ok(())
}

/// Create a symlink at `to` pointing at `from`.
#[cfg(unix)]
pub fn link(from: &Path, to: &Path) -> Result<()> {
    let run = || -> std::io::Result<()> {
        ensure_parent(to)?;
        std::os::unix::fs::symlink(from, to)
    };
    run().map_err(|e| copy_error(from, to, e))
}
