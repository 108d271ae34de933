//! The `terraform_module` rule kind: a thin filegroup wrapper.
//!
//! Publishes a set of module sources under their base names so `terraform`
//! rules can pull them in through their `modules` list. Remote retrieval
//! (git/HTTP) is the host's module-download machinery, not this rule.

use crate::error::{Result, TargetError};
use crate::host::{fsops, ConfigContext};
use crate::target::{RunContext, Script, ScriptKind, Target};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Declarative `terraform_module` rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TerraformModuleRule {
    /// Target name.
    pub name: String,

    /// Module source files.
    #[serde(default)]
    pub srcs: Vec<String>,

    /// Build dependencies.
    #[serde(default)]
    pub deps: Vec<String>,
}

/// Registry entry: decode a declaration block and expand it.
pub fn targets(block: &serde_yaml_ng::Value, ctx: &ConfigContext) -> Result<Vec<Target>> {
    let rule: TerraformModuleRule = serde_yaml_ng::from_value(block.clone())?;
    rule.targets(ctx)
}

impl TerraformModuleRule {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(TargetError::InvalidRule {
                rule: self.name.clone(),
                reason: "name must not be empty".to_string(),
            });
        }
        if self.srcs.is_empty() {
            return Err(TargetError::InvalidRule {
                rule: self.name.clone(),
                reason: "srcs must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn targets(&self, _ctx: &ConfigContext) -> Result<Vec<Target>> {
        self.validate()?;

        let mut target = Target::new(&self.name);
        target
            .srcs
            .insert("srcs".to_string(), self.srcs.clone());
        target.outs = self.srcs.iter().map(|s| base_name(s).to_string()).collect();

        target.scripts.insert(
            ScriptKind::Build,
            Script {
                deps: self.deps.clone(),
                pre: None,
                transform_out: None,
                run: Box::new(|t: &Target, _: &RunContext| {
                    for src in t.bucket("srcs") {
                        let to = t.cwd.join(base_name(src));
                        fsops::link(Path::new(src), &to)?;
                    }
                    Ok(())
                }),
            },
        );

        Ok(vec![target])
    }
}

fn base_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_validate_requires_srcs() {
        let rule = TerraformModuleRule {
            name: "vpc".to_string(),
            ..Default::default()
        };
        let err = rule.validate().unwrap_err();
        assert!(err.to_string().contains("srcs"));
    }

    #[test]
    fn test_outs_are_base_names() {
        let rule = TerraformModuleRule {
            name: "vpc".to_string(),
            srcs: vec!["modules/vpc/main.tf".to_string(), "modules/vpc/outputs.tf".to_string()],
            deps: Vec::new(),
        };
        let targets = rule.targets(&ConfigContext::default()).unwrap();
        assert_eq!(targets[0].outs, vec!["main.tf", "outputs.tf"]);
    }

    #[test]
    fn test_build_links_sources_flat() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("nested/main.tf");
        fs::create_dir_all(src.parent().unwrap()).unwrap();
        fs::write(&src, "module {}").unwrap();

        let rule = TerraformModuleRule {
            name: "vpc".to_string(),
            srcs: vec![src.display().to_string()],
            deps: Vec::new(),
        };
        let mut target = rule.targets(&ConfigContext::default()).unwrap().remove(0);
        target.cwd = dir.path().join("out");
        fs::create_dir_all(&target.cwd).unwrap();

        target
            .run_script(ScriptKind::Build, &RunContext::default())
            .unwrap();
        let staged = dir.path().join("out/main.tf");
        assert!(staged.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&staged).unwrap(), "module {}");
    }

    #[test]
    fn test_registry_builder() {
        let block: serde_yaml_ng::Value =
            serde_yaml_ng::from_str("name: vpc\nsrcs: [main.tf]\n").unwrap();
        let targets = targets(&block, &ConfigContext::default()).unwrap();
        assert_eq!(targets[0].name, "vpc");
    }
}
