//! The `terraform` rule kind: typed declaration and layout planning.
//!
//! The planner is a pure function of the rule declaration and the
//! configuration context. It classifies declared sources into purpose-keyed
//! buckets, resolves the tool table, computes the dependency set and the
//! output globs, and binds the five scripts. Backend precedence is decided
//! here, at configuration time; the build script only asks "what is in my
//! backend bucket" when it runs.

pub mod build;
pub mod deploy;
pub mod exec;
pub mod module;

use crate::error::{Result, TargetError};
use crate::host::{is_target_reference, ConfigContext, Environment};
use crate::target::{RunContext, Script, ScriptKind, Target};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Raw `.tf` and `.tfvars` sources.
pub const SRCS_BUCKET: &str = "_srcs";
/// Extra files staged verbatim, never interpolated.
pub const DATA_BUCKET: &str = "_data";
/// Provider configuration files (interpolated when staged).
pub const PROVIDERS_BUCKET: &str = "providers";
/// Reusable modules staged under their relative paths.
pub const MODULES_BUCKET: &str = "modules";
/// Backend bucket; suffixed `_<env>` when named environments exist.
pub const BACKEND_BUCKET: &str = "backend";

/// Variable consulted for per-environment and global backend defaults.
pub const BACKEND_VAR: &str = "TERRAFORM_BACKEND";

/// Declarative `terraform` rule as authored in the host's configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TerraformRule {
    /// Target name.
    pub name: String,

    /// Terraform source files (`.tf`, `.tfvars`).
    #[serde(default)]
    pub srcs: Vec<String>,

    /// Other files staged alongside the sources, never interpolated.
    #[serde(default)]
    pub data: Vec<String>,

    /// Build dependencies.
    #[serde(default)]
    pub deps: Vec<String>,

    /// Extra dependencies for the deploy script only.
    #[serde(default)]
    pub deploy_deps: Vec<String>,

    /// Variable-file name templates; `${ENV}` expands per environment.
    /// Order decides `*.auto.tfvars` numbering.
    #[serde(default)]
    pub var_files: Vec<String>,

    /// Backend file. Path or build reference.
    #[serde(default)]
    pub backend: Option<String>,

    /// Terraform executable. Path or build reference.
    #[serde(default)]
    pub terraform: Option<String>,

    /// Tflocal executable. Path or build reference.
    #[serde(default)]
    pub tflocal: Option<String>,

    /// Tflint executable. Path or build reference.
    #[serde(default)]
    pub tflint: Option<String>,

    /// Modules to stage as sources. Paths or build references.
    #[serde(default)]
    pub modules: Vec<String>,

    /// Provider configurations to stage as sources.
    #[serde(default)]
    pub provider_configs: Vec<String>,

    /// Swallow apply failures on the deploy path.
    #[serde(default)]
    pub allow_failure: bool,

    /// Static environment variables for tool invocations.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// OS environment variable names passed through to tool invocations.
    #[serde(default)]
    pub pass_env: Vec<String>,

    /// Deployment environments by name.
    #[serde(default)]
    pub environments: IndexMap<String, Environment>,

    /// Additional tools by logical name.
    #[serde(default)]
    pub tools: HashMap<String, String>,
}

/// Registry entry: decode a declaration block and expand it.
pub fn targets(block: &serde_yaml_ng::Value, ctx: &ConfigContext) -> Result<Vec<Target>> {
    let rule: TerraformRule = serde_yaml_ng::from_value(block.clone())?;
    rule.targets(ctx)
}

impl TerraformRule {
    fn invalid(&self, reason: impl Into<String>) -> TargetError {
        TargetError::InvalidRule {
            rule: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// Eager validation of the declaration.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(self.invalid("name must not be empty"));
        }
        for vf in &self.var_files {
            if !vf.ends_with(".tfvars") && !vf.ends_with(".tfvars.json") {
                return Err(self.invalid(format!(
                    "var_files entry {:?} must end in .tfvars or .tfvars.json",
                    vf
                )));
            }
        }
        Ok(())
    }

    /// Effective backend for a named environment: explicit rule backend,
    /// then the environment's variable (rule-level record first, ambient
    /// record second), then the global default.
    fn backend_for_environment(
        &self,
        ctx: &ConfigContext,
        name: &str,
        environment: &Environment,
    ) -> Option<String> {
        self.backend
            .clone()
            .or_else(|| environment.variables.get(BACKEND_VAR).cloned())
            .or_else(|| {
                ctx.environments
                    .get(name)
                    .and_then(|e| e.variables.get(BACKEND_VAR).cloned())
            })
            .or_else(|| ctx.variables.get(BACKEND_VAR).cloned())
    }

    /// Expand the rule into its build target.
    pub fn targets(&self, ctx: &ConfigContext) -> Result<Vec<Target>> {
        self.validate()?;

        let mut deps = self.deps.clone();

        let mut tools = self.tools.clone();
        for (tool, explicit) in [
            ("terraform", self.terraform.as_deref()),
            ("tflocal", self.tflocal.as_deref()),
            ("tflint", self.tflint.as_deref()),
        ] {
            let resolved = ctx.resolve_toolchain(explicit, tool, &self.tools)?;
            if is_target_reference(&resolved) {
                deps.push(resolved.clone());
            }
            tools.insert(tool.to_string(), resolved);
        }

        let mut srcs: IndexMap<String, Vec<String>> = IndexMap::new();
        srcs.insert(SRCS_BUCKET.to_string(), self.srcs.clone());
        srcs.insert(DATA_BUCKET.to_string(), self.data.clone());

        let mut providers = Vec::with_capacity(self.provider_configs.len());
        for pc in &self.provider_configs {
            providers.push(pc.clone());
            if is_target_reference(pc) {
                deps.push(pc.clone());
            }
        }
        srcs.insert(PROVIDERS_BUCKET.to_string(), providers);

        let mut modules = Vec::with_capacity(self.modules.len());
        for m in &self.modules {
            modules.push(m.clone());
            if is_target_reference(m) {
                deps.push(m.clone());
            }
        }
        srcs.insert(MODULES_BUCKET.to_string(), modules);

        let mut outs = Vec::new();
        if self.environments.is_empty() {
            outs.push("**".to_string());
            let backend = self
                .backend
                .clone()
                .or_else(|| ctx.variables.get(BACKEND_VAR).cloned());
            if let Some(backend) = backend {
                if is_target_reference(&backend) {
                    deps.push(backend.clone());
                }
                srcs.insert(BACKEND_BUCKET.to_string(), vec![backend]);
            }
        } else {
            for (name, environment) in &self.environments {
                if let Some(backend) = self.backend_for_environment(ctx, name, environment) {
                    if is_target_reference(&backend) {
                        deps.push(backend.clone());
                    }
                    srcs.insert(format!("{}_{}", BACKEND_BUCKET, name), vec![backend]);
                }
                outs.push(format!("{}/**/*", name));
            }
        }

        let mut target = Target::new(&self.name);
        target.srcs = srcs;
        target.outs = outs;
        target.tools = tools;
        target.env = self.env.clone();
        target.pass_env = self.pass_env.clone();
        target.environments = self.environments.clone();

        let build_rule = self.clone();
        target.scripts.insert(
            ScriptKind::Build,
            Script {
                deps,
                pre: None,
                transform_out: None,
                run: Box::new(move |t: &Target, _: &RunContext| build::materialize(&build_rule, t)),
            },
        );

        let allow_failure = self.allow_failure;
        target.scripts.insert(
            ScriptKind::Deploy,
            Script {
                deps: self.deploy_deps.clone(),
                pre: Some(deploy::enter_environment_dir),
                transform_out: None,
                run: Box::new(move |t: &Target, ctx: &RunContext| {
                    deploy::deploy(t, ctx, allow_failure)
                }),
            },
        );

        target
            .scripts
            .insert(ScriptKind::Lint, Script::new(Box::new(deploy::lint)));

        target.scripts.insert(
            ScriptKind::Remove,
            Script {
                deps: Vec::new(),
                pre: Some(deploy::enter_environment_dir),
                transform_out: None,
                run: Box::new(deploy::remove),
            },
        );

        target.scripts.insert(
            ScriptKind::Unlock,
            Script {
                deps: Vec::new(),
                pre: Some(deploy::enter_environment_dir),
                transform_out: None,
                run: Box::new(deploy::unlock),
            },
        );

        Ok(vec![target])
    }
}
