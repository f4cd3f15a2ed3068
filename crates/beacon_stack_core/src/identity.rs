use std::collections::BTreeSet;

use crate::contract::{
    ExecutionIdentity, PermissionStatement, PolicyRef, BASELINE_EXECUTION_POLICY,
    COMPUTE_SERVICE_PRINCIPAL,
};
use crate::error::StackError;
use crate::policy::{statement_violations, PermissionScope};

impl ExecutionIdentity {
    /// Identity trusted by the compute service, carrying only the baseline
    /// logging policy.
    pub fn for_compute_service() -> Self {
        Self {
            trusted_principal: COMPUTE_SERVICE_PRINCIPAL.to_string(),
            managed_policies: vec![PolicyRef::baseline()],
            inline_statements: BTreeSet::new(),
        }
    }

    pub fn with_managed_policy(mut self, policy: PolicyRef) -> Self {
        if !self.managed_policies.contains(&policy) {
            self.managed_policies.push(policy);
        }
        self
    }

    pub fn with_statement(mut self, statement: PermissionStatement) -> Self {
        self.inline_statements.insert(statement);
        self
    }

    /// Every broken invariant of this identity under `scope`.
    pub fn violations(&self, scope: &PermissionScope) -> Vec<StackError> {
        let mut errors = Vec::new();

        if self.trusted_principal != COMPUTE_SERVICE_PRINCIPAL {
            errors.push(StackError::InvalidPermissionScope(format!(
                "identity trusts '{}', expected '{COMPUTE_SERVICE_PRINCIPAL}'",
                self.trusted_principal
            )));
        }

        if !self
            .managed_policies
            .iter()
            .any(|policy| policy.name() == BASELINE_EXECUTION_POLICY)
        {
            errors.push(StackError::InvalidPermissionScope(format!(
                "identity is missing the baseline policy '{BASELINE_EXECUTION_POLICY}'"
            )));
        }

        for statement in &self.inline_statements {
            errors.extend(statement_violations(scope, statement));
        }

        errors
    }
}

pub fn create_execution_identity(
    managed_policies: impl IntoIterator<Item = PolicyRef>,
    statements: impl IntoIterator<Item = PermissionStatement>,
) -> ExecutionIdentity {
    let identity = managed_policies
        .into_iter()
        .fold(ExecutionIdentity::for_compute_service(), |identity, policy| {
            identity.with_managed_policy(policy)
        });

    statements
        .into_iter()
        .fold(identity, ExecutionIdentity::with_statement)
}

#[cfg(test)]
mod tests {
    use crate::policy::build_permission_statement;

    use super::*;

    fn read_statement(resource: &str) -> PermissionStatement {
        build_permission_statement(&PermissionScope::default(), ["s3:List*", "s3:Get*"], [resource])
            .expect("statement should build")
    }

    #[test]
    fn baseline_identity_trusts_compute_service() {
        let identity = create_execution_identity([], []);

        assert_eq!(identity.trusted_principal(), COMPUTE_SERVICE_PRINCIPAL);
        assert_eq!(identity.managed_policies(), &[PolicyRef::baseline()]);
        assert!(identity.inline_statements().is_empty());
        assert!(identity.violations(&PermissionScope::default()).is_empty());
    }

    #[test]
    fn extra_policies_follow_baseline_without_duplicates() {
        let identity = create_execution_identity(
            [
                PolicyRef::aws_managed("AWSXRayDaemonWriteAccess"),
                PolicyRef::baseline(),
                PolicyRef::aws_managed("/AWSXRayDaemonWriteAccess/"),
            ],
            [],
        );

        let names: Vec<_> = identity.managed_policies().iter().map(PolicyRef::name).collect();
        assert_eq!(
            names,
            vec![BASELINE_EXECUTION_POLICY, "AWSXRayDaemonWriteAccess"]
        );
    }

    #[test]
    fn identical_statements_are_attached_once() {
        let identity = create_execution_identity(
            [],
            [
                read_statement("arn:aws:s3:::umccr-10*"),
                read_statement("arn:aws:s3:::umccr-10*"),
                read_statement("arn:aws:s3:::umccr-10g-data-dev/*"),
            ],
        );

        assert_eq!(identity.inline_statements().len(), 2);
    }

    #[test]
    fn narrower_scope_reports_statement_violations() {
        let identity = create_execution_identity([], [read_statement("arn:aws:s3:::umccr-10*")]);
        let narrow = PermissionScope::new("umccr-10g").expect("prefix should be accepted");

        let violations = identity.violations(&narrow);
        assert_eq!(violations.len(), 1);
        assert!(matches!(violations[0], StackError::InvalidPermissionScope(_)));
    }

    #[test]
    fn detects_foreign_principal_and_missing_baseline() {
        let identity = ExecutionIdentity {
            trusted_principal: "ec2.amazonaws.com".to_string(),
            managed_policies: Vec::new(),
            inline_statements: BTreeSet::new(),
        };

        assert_eq!(identity.violations(&PermissionScope::default()).len(), 2);
    }
}
