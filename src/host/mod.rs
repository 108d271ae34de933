//! Host-build-framework surface consumed by the target builders.
//!
//! The host owns dependency resolution, caching, hashing, sandboxing and
//! scheduling. What the builders need from it is small: a configuration-time
//! context (toolchain table, global variables, ambient environments), a
//! classifier telling filesystem paths apart from build-graph references,
//! the interpolator, and the file staging primitives.

pub mod fsops;
pub mod interpolate;

use crate::error::{Result, TargetError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named deployment context with its own variable set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

/// Configuration-time context threaded explicitly through every target
/// builder. Replaces the ambient process-wide tables the host used to keep.
#[derive(Debug, Clone, Default)]
pub struct ConfigContext {
    /// Known toolchains by logical tool name. Values may be paths or
    /// build-graph references.
    pub known_toolchains: HashMap<String, String>,

    /// Global default variables.
    pub variables: HashMap<String, String>,

    /// Ambient per-environment configuration.
    pub environments: IndexMap<String, Environment>,
}

impl ConfigContext {
    /// Resolve a tool to a path or build reference.
    ///
    /// Priority: explicit rule value, then the rule's own tool table, then
    /// the known-toolchains table. No match is fatal at configuration time.
    pub fn resolve_toolchain(
        &self,
        explicit: Option<&str>,
        tool: &str,
        rule_tools: &HashMap<String, String>,
    ) -> Result<String> {
        if let Some(value) = explicit {
            return Ok(value.to_string());
        }
        if let Some(value) = rule_tools.get(tool) {
            return Ok(value.clone());
        }
        self.known_toolchains
            .get(tool)
            .cloned()
            .ok_or_else(|| TargetError::ToolchainNotConfigured {
                tool: tool.to_string(),
            })
    }
}

/// Whether a string names a build-graph target rather than a literal
/// filesystem path. Labels look like `//infra/modules:vpc` or `:backend`.
pub fn is_target_reference(s: &str) -> bool {
    s.starts_with("//") || s.starts_with(':')
}
