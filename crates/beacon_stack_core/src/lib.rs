//! Deployment descriptor primitives for the Beacon query function.
//!
//! This crate owns the permission boundary and compute binding contracts and
//! the deterministic assembly of a stack descriptor. It performs no I/O and
//! has no AWS SDK or provisioning concerns; those belong to
//! `beacon_stack_cli` and the external deployment framework.

pub mod assembly;
pub mod binding;
pub mod contract;
pub mod error;
pub mod identity;
pub mod invocation;
pub mod policy;
pub mod template;

pub use assembly::{assemble_stack, assemble_stack_with_registry, BindingSpec, StackSpec, StatementRequest};
pub use contract::{Architecture, DeploymentTarget, StackDescriptor};
pub use error::{StackError, StackResult};
