use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use beacon_stack_core::binding::ComputeBindingRequest;
use beacon_stack_core::contract::{Architecture, DeploymentTarget, DEFAULT_APPROVED_BUCKET_PREFIX};
use beacon_stack_core::policy::PermissionScope;
use beacon_stack_core::{BindingSpec, StackSpec, StatementRequest};
use serde::Deserialize;

/// The stack this repository deploys by default.
pub const DEFAULT_STACK_TOML: &str = include_str!("../../../infra/beacon_stack.toml");

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StackConfig {
    pub target: TargetConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
    #[serde(rename = "function", default)]
    pub functions: Vec<FunctionConfig>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TargetConfig {
    /// Supports ${ENV_VAR} substitution
    pub account: String,
    pub region: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PermissionsConfig {
    #[serde(default = "default_bucket_prefix")]
    pub approved_bucket_prefix: String,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            approved_bucket_prefix: default_bucket_prefix(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct FunctionConfig {
    pub name: String,
    pub image: String,
    pub timeout_seconds: i64,
    #[serde(default = "default_architecture")]
    pub architecture: Architecture,
    #[serde(default)]
    pub managed_policies: Vec<String>,
    #[serde(rename = "statement", default)]
    pub statements: Vec<StatementConfig>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StatementConfig {
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

fn default_bucket_prefix() -> String {
    DEFAULT_APPROVED_BUCKET_PREFIX.to_string()
}

fn default_architecture() -> Architecture {
    Architecture::Arm64
}

impl StackConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read stack config '{}'", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("invalid stack config '{}'", path.display()))
    }

    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::from_toml_str(DEFAULT_STACK_TOML).context("invalid built-in stack config"),
        }
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        // Expand environment variables like ${CDK_DEFAULT_ACCOUNT}
        let expanded = shellexpand::env(content)?;
        let config: StackConfig = toml::from_str(&expanded)?;
        Ok(config)
    }

    pub fn target(&self) -> DeploymentTarget {
        DeploymentTarget::new(self.target.account.trim(), self.target.region.trim())
    }

    /// Converts the file layout into assembly input. Semantic checks are left
    /// to assembly so that every violation is reported together.
    pub fn to_stack_spec(&self) -> anyhow::Result<StackSpec> {
        let scope = PermissionScope::new(self.permissions.approved_bucket_prefix.trim())?;

        let bindings = self
            .functions
            .iter()
            .map(|function| BindingSpec {
                binding: ComputeBindingRequest {
                    name: function.name.clone(),
                    image: function.image.clone(),
                    // Non-positive values become a zero timeout, which
                    // assembly reports as out of range.
                    timeout: Duration::from_secs(u64::try_from(function.timeout_seconds).unwrap_or(0)),
                    architecture: function.architecture,
                },
                managed_policies: function.managed_policies.clone(),
                statements: function
                    .statements
                    .iter()
                    .map(|statement| StatementRequest {
                        actions: statement.actions.clone(),
                        resources: statement.resources.clone(),
                    })
                    .collect(),
            })
            .collect();

        Ok(StackSpec {
            target: self.target(),
            scope,
            bindings,
        })
    }
}
