use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::{StackError, StackResult};

pub const DESCRIPTOR_SCHEMA_VERSION: &str = "v1";
pub const PLATFORM_MAX_TIMEOUT: Duration = Duration::from_secs(900);
pub const COMPUTE_SERVICE_PRINCIPAL: &str = "lambda.amazonaws.com";
pub const BASELINE_EXECUTION_POLICY: &str = "service-role/AWSLambdaBasicExecutionRole";
pub const DEFAULT_APPROVED_BUCKET_PREFIX: &str = "umccr-10";
pub const MAX_BINDING_NAME_LEN: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DeploymentTarget {
    pub account: String,
    pub region: String,
}

impl DeploymentTarget {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
        }
    }

    pub fn validate(&self) -> StackResult<()> {
        let account = self.account.trim();
        if account.len() != 12 || !account.bytes().all(|b| b.is_ascii_digit()) {
            return Err(StackError::InvalidDeploymentTarget(format!(
                "account '{}' must be a 12-digit account id",
                self.account
            )));
        }

        if !is_region_name(&self.region) {
            return Err(StackError::InvalidDeploymentTarget(format!(
                "region '{}' is not a valid region name",
                self.region
            )));
        }

        Ok(())
    }
}

impl fmt::Display for DeploymentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account, self.region)
    }
}

fn is_region_name(region: &str) -> bool {
    let parts: Vec<&str> = region.split('-').collect();
    let Some((number, words)) = parts.split_last() else {
        return false;
    };

    words.len() >= 2
        && words
            .iter()
            .all(|word| !word.is_empty() && word.bytes().all(|b| b.is_ascii_lowercase()))
        && !number.is_empty()
        && number.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Effect {
    Allow,
}

/// One allow statement of an inline identity policy.
///
/// Only [`crate::policy::build_permission_statement`] constructs these, so a
/// statement in hand has already passed the permission scope checks.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PermissionStatement {
    pub(crate) effect: Effect,
    pub(crate) actions: BTreeSet<String>,
    pub(crate) resource_patterns: BTreeSet<String>,
}

impl PermissionStatement {
    pub fn effect(&self) -> Effect {
        self.effect
    }

    pub fn actions(&self) -> &BTreeSet<String> {
        &self.actions
    }

    pub fn resource_patterns(&self) -> &BTreeSet<String> {
        &self.resource_patterns
    }
}

/// Reference to a platform-managed policy, e.g. `service-role/AWSLambdaBasicExecutionRole`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct PolicyRef(String);

impl PolicyRef {
    pub fn aws_managed(name: impl Into<String>) -> Self {
        Self(name.into().trim_matches('/').to_string())
    }

    pub fn baseline() -> Self {
        Self::aws_managed(BASELINE_EXECUTION_POLICY)
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn arn(&self) -> String {
        format!("arn:aws:iam::aws:policy/{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ExecutionIdentity {
    pub(crate) trusted_principal: String,
    pub(crate) managed_policies: Vec<PolicyRef>,
    pub(crate) inline_statements: BTreeSet<PermissionStatement>,
}

impl ExecutionIdentity {
    pub fn trusted_principal(&self) -> &str {
        &self.trusted_principal
    }

    pub fn managed_policies(&self) -> &[PolicyRef] {
        &self.managed_policies
    }

    pub fn inline_statements(&self) -> &BTreeSet<PermissionStatement> {
        &self.inline_statements
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String")]
pub enum Architecture {
    #[serde(rename = "arm64")]
    Arm64,
    #[serde(rename = "x86_64")]
    X86_64,
}

impl Architecture {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Arm64 => "arm64",
            Self::X86_64 => "x86_64",
        }
    }
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "arm64" | "aarch64" => Ok(Self::Arm64),
            "x86_64" | "x86-64" | "amd64" => Ok(Self::X86_64),
            _ => Err(format!(
                "Unsupported architecture '{value}' (expected arm64 or x86_64)"
            )),
        }
    }
}

impl TryFrom<String> for Architecture {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Where the handler image comes from. Resolved by the external packaging
/// step, never built here.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageLocator {
    BuildContext { path: String },
    Registry { uri: String },
}

impl ImageLocator {
    pub fn parse(raw: &str) -> StackResult<Self> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(StackError::InvalidImageLocator(
                "image locator cannot be empty".to_string(),
            ));
        }

        if let Some((repository, digest)) = value.split_once("@sha256:") {
            if repository.is_empty()
                || digest.len() != 64
                || !digest.bytes().all(|b| b.is_ascii_hexdigit())
            {
                return Err(StackError::InvalidImageLocator(format!(
                    "'{value}' is not a valid digest reference"
                )));
            }
            return Ok(Self::Registry {
                uri: value.to_string(),
            });
        }

        if looks_like_registry_reference(value) {
            return Ok(Self::Registry {
                uri: value.to_string(),
            });
        }

        Ok(Self::BuildContext {
            path: value.to_string(),
        })
    }
}

impl fmt::Display for ImageLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuildContext { path } => write!(f, "build context {path}"),
            Self::Registry { uri } => write!(f, "registry image {uri}"),
        }
    }
}

// `<host>/<repo>:<tag>` where the host carries a dot or port.
fn looks_like_registry_reference(value: &str) -> bool {
    let Some((host, rest)) = value.split_once('/') else {
        return false;
    };
    let host_like = host.contains('.') || host.contains(':') || host == "localhost";
    let tagged = rest
        .rsplit('/')
        .next()
        .is_some_and(|last| last.contains(':'));
    host_like && tagged && !value.starts_with('.')
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ComputeBinding {
    pub(crate) name: String,
    pub(crate) image: ImageLocator,
    #[serde(rename = "timeout_seconds", serialize_with = "serialize_whole_seconds")]
    pub(crate) timeout: Duration,
    pub(crate) architecture: Architecture,
    pub(crate) identity: ExecutionIdentity,
}

impl ComputeBinding {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &ImageLocator {
        &self.image
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Timeout as the platform expects it, rounded up to whole seconds.
    pub fn timeout_seconds(&self) -> u64 {
        whole_seconds(self.timeout)
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    pub fn identity(&self) -> &ExecutionIdentity {
        &self.identity
    }
}

fn whole_seconds(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

fn serialize_whole_seconds<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(whole_seconds(*duration))
}

/// The validated output of stack assembly.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StackDescriptor {
    pub(crate) schema_version: String,
    pub(crate) target: DeploymentTarget,
    pub(crate) bindings: Vec<ComputeBinding>,
}

impl StackDescriptor {
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    pub fn target(&self) -> &DeploymentTarget {
        &self.target
    }

    pub fn bindings(&self) -> &[ComputeBinding] {
        &self.bindings
    }

    pub fn binding(&self, name: &str) -> Option<&ComputeBinding> {
        self.bindings.iter().find(|binding| binding.name == name)
    }

    pub fn fingerprint(&self) -> String {
        contract_fingerprint(self)
    }
}

pub fn contract_fingerprint(value: impl Serialize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(stable_contract_json(value));
    format!("{:x}", hasher.finalize())
}

pub fn stable_contract_json(value: impl Serialize) -> String {
    serde_json::to_string(&value).expect("serialization of contract value should not fail")
}
