//! `${VAR}` substitution against a small key/value context.
//!
//! An unknown key or an unclosed placeholder is an error; templates with no
//! placeholders pass through untouched, so rules without environments can
//! still use literal file names.

use crate::error::{Result, TargetError};
use std::collections::HashMap;

/// Substitute every `${KEY}` in `template` with `vars[KEY]`.
pub fn interpolate(template: &str, vars: &HashMap<String, String>) -> Result<String> {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("${") {
        result.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let close = after.find('}').ok_or_else(|| TargetError::Interpolation {
            template: template.to_string(),
            reason: "unclosed placeholder".to_string(),
        })?;
        let key = after[..close].trim();
        let value = vars.get(key).ok_or_else(|| TargetError::Interpolation {
            template: template.to_string(),
            reason: format!("unknown variable {:?}", key),
        })?;
        result.push_str(value);
        rest = &after[close + 1..];
    }

    result.push_str(rest);
    Ok(result)
}
