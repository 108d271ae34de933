//! Terraform target types for declarative build graphs.
//!
//! Expands `terraform` and `terraform_module` rule declarations into
//! concrete build targets: per-environment working-directory layout,
//! ordered `*.auto.tfvars` staging, backend selection, and the
//! deploy/lint/remove/unlock scripts that drive the real Terraform binary.

pub mod error;
pub mod host;
pub mod target;
pub mod terraform;

pub use error::{Result, TargetError};
