use std::time::Duration;

use thiserror::Error;

/// Validation failures raised while composing a deployment descriptor.
///
/// None of these are retryable: each one names a misconfigured input that has
/// to be corrected before the stack is assembled again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
    #[error("Invalid permission scope: {0}")]
    InvalidPermissionScope(String),
    #[error("Duplicate binding name '{name}' in target {target}")]
    DuplicateBindingName { name: String, target: String },
    #[error("Timeout {requested:?} for '{name}' is out of range (expected > 0s and <= {max:?})")]
    TimeoutOutOfRange {
        name: String,
        requested: Duration,
        max: Duration,
    },
    #[error("Invalid binding name: {0}")]
    InvalidBindingName(String),
    #[error("Invalid image locator: {0}")]
    InvalidImageLocator(String),
    #[error("Invalid deployment target: {0}")]
    InvalidDeploymentTarget(String),
    #[error("Invalid invocation: {0}")]
    InvalidInvocation(String),
    #[error("Stack declares no compute bindings")]
    NoBindings,
    #[error("Inconsistent assembly: {}", join_messages(.0))]
    InconsistentAssembly(Vec<StackError>),
}

impl StackError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPermissionScope(_) => "INVALID_PERMISSION_SCOPE",
            Self::DuplicateBindingName { .. } => "DUPLICATE_BINDING_NAME",
            Self::TimeoutOutOfRange { .. } => "TIMEOUT_OUT_OF_RANGE",
            Self::InvalidBindingName(_) => "INVALID_BINDING_NAME",
            Self::InvalidImageLocator(_) => "INVALID_IMAGE_LOCATOR",
            Self::InvalidDeploymentTarget(_) => "INVALID_DEPLOYMENT_TARGET",
            Self::InvalidInvocation(_) => "INVALID_INVOCATION",
            Self::NoBindings => "NO_BINDINGS",
            Self::InconsistentAssembly(_) => "INCONSISTENT_ASSEMBLY",
        }
    }

    /// Leaf violations, with nested assembly failures flattened.
    pub fn violations(&self) -> Vec<&StackError> {
        match self {
            Self::InconsistentAssembly(errors) => {
                errors.iter().flat_map(StackError::violations).collect()
            }
            other => vec![other],
        }
    }

    pub fn has_violation(&self, predicate: impl Fn(&StackError) -> bool) -> bool {
        self.violations().into_iter().any(predicate)
    }
}

fn join_messages(errors: &[StackError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type StackResult<T> = std::result::Result<T, StackError>;
