use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::binding::{check_compute_binding, BindingRegistry, ComputeBindingRequest};
use crate::contract::{
    DeploymentTarget, PermissionStatement, PolicyRef, StackDescriptor, DESCRIPTOR_SCHEMA_VERSION,
};
use crate::error::{StackError, StackResult};
use crate::identity::create_execution_identity;
use crate::policy::{check_permission_statement, PermissionScope};
use crate::template::logical_id;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementRequest {
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSpec {
    pub binding: ComputeBindingRequest,
    pub managed_policies: Vec<String>,
    pub statements: Vec<StatementRequest>,
}

/// Everything needed to assemble one stack instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSpec {
    pub target: DeploymentTarget,
    pub scope: PermissionScope,
    pub bindings: Vec<BindingSpec>,
}

pub fn assemble_stack(spec: &StackSpec) -> StackResult<StackDescriptor> {
    assemble_stack_with_registry(spec, BindingRegistry::new(spec.target.clone()))
}

/// Assembles `spec` against names already claimed in `registry`.
///
/// Either every binding validates and one descriptor comes back, or the
/// result is an [`StackError::InconsistentAssembly`] listing every violation.
pub fn assemble_stack_with_registry(
    spec: &StackSpec,
    mut registry: BindingRegistry,
) -> StackResult<StackDescriptor> {
    let mut errors = Vec::new();

    if let Err(error) = spec.target.validate() {
        errors.push(error);
    }
    if registry.target() != &spec.target {
        errors.push(StackError::InvalidDeploymentTarget(format!(
            "name registry belongs to {}, stack targets {}",
            registry.target(),
            spec.target
        )));
    }
    if spec.bindings.is_empty() {
        errors.push(StackError::NoBindings);
    }

    let mut bindings = Vec::with_capacity(spec.bindings.len());
    let mut logical_ids = BTreeMap::new();
    for binding_spec in &spec.bindings {
        let statements = build_statements(&spec.scope, &binding_spec.statements, &mut errors);
        let identity = create_execution_identity(
            binding_spec
                .managed_policies
                .iter()
                .map(|name| PolicyRef::aws_managed(name.as_str())),
            statements,
        );
        errors.extend(identity.violations(&spec.scope));

        match check_compute_binding(&mut registry, binding_spec.binding.clone(), identity) {
            Ok(binding) => bindings.push(binding),
            Err(binding_errors) => errors.extend(binding_errors),
        }

        // Template resources are keyed by logical id, so two names that
        // render to the same id would overwrite each other.
        let name = &binding_spec.binding.name;
        match logical_ids.entry(logical_id(name, "")) {
            Entry::Vacant(entry) => {
                entry.insert(name.clone());
            }
            Entry::Occupied(entry) if entry.get() != name => {
                errors.push(StackError::InvalidBindingName(format!(
                    "'{name}' renders to logical id '{}' already used by '{}'",
                    entry.key(),
                    entry.get()
                )));
            }
            Entry::Occupied(_) => {}
        }
    }

    if !errors.is_empty() {
        for error in &errors {
            warn!(
                component = "assembly",
                event = "violation",
                code = error.code(),
                deployment_target = %spec.target,
                "{error}"
            );
        }
        return Err(StackError::InconsistentAssembly(errors));
    }

    let descriptor = StackDescriptor {
        schema_version: DESCRIPTOR_SCHEMA_VERSION.to_string(),
        target: spec.target.clone(),
        bindings,
    };
    info!(
        component = "assembly",
        event = "stack_assembled",
        deployment_target = %descriptor.target,
        bindings = descriptor.bindings.len(),
        fingerprint = %descriptor.fingerprint(),
    );
    Ok(descriptor)
}

fn build_statements(
    scope: &PermissionScope,
    requests: &[StatementRequest],
    errors: &mut Vec<StackError>,
) -> Vec<PermissionStatement> {
    requests
        .iter()
        .filter_map(
            |request| match check_permission_statement(scope, &request.actions, &request.resources) {
                Ok(statement) => Some(statement),
                Err(violations) => {
                    errors.extend(violations);
                    None
                }
            },
        )
        .collect()
}
