use std::collections::BTreeSet;

use serde::Serialize;

use crate::contract::{Effect, PermissionStatement, DEFAULT_APPROVED_BUCKET_PREFIX};
use crate::error::{StackError, StackResult};

pub const STORAGE_SERVICE: &str = "s3";
pub const READ_ONLY_VERBS: [&str; 2] = ["List", "Get"];
const BUCKET_ARN_PREFIX: &str = "arn:aws:s3:::";

/// The storage permissions an execution identity may be granted.
///
/// Read-only verbs are fixed; only the approved bucket prefix varies between
/// deployments.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PermissionScope {
    approved_bucket_prefix: String,
}

impl Default for PermissionScope {
    fn default() -> Self {
        Self {
            approved_bucket_prefix: DEFAULT_APPROVED_BUCKET_PREFIX.to_string(),
        }
    }
}

impl PermissionScope {
    pub fn new(approved_bucket_prefix: impl Into<String>) -> StackResult<Self> {
        let approved_bucket_prefix = approved_bucket_prefix.into();
        let valid = !approved_bucket_prefix.is_empty()
            && approved_bucket_prefix
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.');
        if !valid {
            return Err(StackError::InvalidPermissionScope(format!(
                "approved bucket prefix '{approved_bucket_prefix}' must be a non-empty literal bucket name prefix"
            )));
        }

        Ok(Self {
            approved_bucket_prefix,
        })
    }

    pub fn approved_bucket_prefix(&self) -> &str {
        &self.approved_bucket_prefix
    }

    pub fn check_action(&self, action: &str) -> StackResult<()> {
        let Some((service, operation)) = action.split_once(':') else {
            return Err(out_of_scope(format!(
                "action '{action}' must be written as '{STORAGE_SERVICE}:<Operation>'"
            )));
        };

        if service != STORAGE_SERVICE {
            return Err(out_of_scope(format!(
                "action '{action}' targets service '{service}', only '{STORAGE_SERVICE}' is allowed"
            )));
        }

        let Some(rest) = READ_ONLY_VERBS
            .iter()
            .find_map(|verb| operation.strip_prefix(verb))
        else {
            return Err(out_of_scope(format!(
                "action '{action}' is not a read-only (List/Get) operation"
            )));
        };

        // `*` may only close the pattern, otherwise `s3:Get*Put` style
        // patterns would reach past the read-only verbs.
        let literal = rest.strip_suffix('*').unwrap_or(rest);
        if rest.is_empty() || !literal.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(out_of_scope(format!(
                "action '{action}' is not a recognized read-only operation pattern"
            )));
        }

        Ok(())
    }

    pub fn check_resource(&self, pattern: &str) -> StackResult<()> {
        let Some(resource) = pattern.strip_prefix(BUCKET_ARN_PREFIX) else {
            return Err(out_of_scope(format!(
                "resource '{pattern}' is not a storage bucket ARN ({BUCKET_ARN_PREFIX}<bucket>)"
            )));
        };

        if !resource.starts_with(&self.approved_bucket_prefix) {
            return Err(out_of_scope(format!(
                "resource '{pattern}' is outside the approved bucket prefix '{}'",
                self.approved_bucket_prefix
            )));
        }

        Ok(())
    }
}

fn out_of_scope(message: String) -> StackError {
    StackError::InvalidPermissionScope(message)
}

/// Builds one allow statement, rejecting anything outside `scope`.
pub fn build_permission_statement<A, R>(
    scope: &PermissionScope,
    actions: A,
    resource_patterns: R,
) -> StackResult<PermissionStatement>
where
    A: IntoIterator,
    A::Item: AsRef<str>,
    R: IntoIterator,
    R::Item: AsRef<str>,
{
    let (actions, resource_patterns, violations) = normalize_statement(scope, actions, resource_patterns);
    if let Some(error) = violations.into_iter().next() {
        return Err(error);
    }

    Ok(allow_statement(actions, resource_patterns))
}

/// Same as [`build_permission_statement`], but reports every action and
/// resource that falls outside `scope` instead of the first one.
pub fn check_permission_statement<A, R>(
    scope: &PermissionScope,
    actions: A,
    resource_patterns: R,
) -> Result<PermissionStatement, Vec<StackError>>
where
    A: IntoIterator,
    A::Item: AsRef<str>,
    R: IntoIterator,
    R::Item: AsRef<str>,
{
    let (actions, resource_patterns, violations) = normalize_statement(scope, actions, resource_patterns);
    if !violations.is_empty() {
        return Err(violations);
    }

    Ok(allow_statement(actions, resource_patterns))
}

fn normalize_statement<A, R>(
    scope: &PermissionScope,
    actions: A,
    resource_patterns: R,
) -> (BTreeSet<String>, BTreeSet<String>, Vec<StackError>)
where
    A: IntoIterator,
    A::Item: AsRef<str>,
    R: IntoIterator,
    R::Item: AsRef<str>,
{
    let actions: BTreeSet<String> = actions
        .into_iter()
        .map(|action| action.as_ref().trim().to_string())
        .collect();
    let resource_patterns: BTreeSet<String> = resource_patterns
        .into_iter()
        .map(|pattern| pattern.as_ref().trim().to_string())
        .collect();

    let mut violations = Vec::new();
    if actions.is_empty() {
        violations.push(out_of_scope("statement must grant at least one action".to_string()));
    }
    if resource_patterns.is_empty() {
        violations.push(out_of_scope(
            "statement must name at least one resource pattern".to_string(),
        ));
    }
    violations.extend(actions.iter().filter_map(|action| scope.check_action(action).err()));
    violations.extend(
        resource_patterns
            .iter()
            .filter_map(|pattern| scope.check_resource(pattern).err()),
    );

    (actions, resource_patterns, violations)
}

fn allow_statement(actions: BTreeSet<String>, resource_patterns: BTreeSet<String>) -> PermissionStatement {
    PermissionStatement {
        effect: Effect::Allow,
        actions,
        resource_patterns,
    }
}

/// Re-checks a statement against `scope`, reporting every violation.
pub fn statement_violations(scope: &PermissionScope, statement: &PermissionStatement) -> Vec<StackError> {
    statement
        .actions
        .iter()
        .filter_map(|action| scope.check_action(action).err())
        .chain(
            statement
                .resource_patterns
                .iter()
                .filter_map(|pattern| scope.check_resource(pattern).err()),
        )
        .collect()
}

/// Glob match as used by identity policies: `*` spans any run of characters,
/// `?` exactly one.
pub fn pattern_matches(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let candidate: Vec<char> = candidate.chars().collect();

    let (mut p, mut c) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while c < candidate.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == candidate[c]) {
            p += 1;
            c += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, c));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            c = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&ch| ch == '*')
}

/// True when `statement` allows `action` on `resource_arn`.
pub fn statement_allows(statement: &PermissionStatement, action: &str, resource_arn: &str) -> bool {
    statement.effect == Effect::Allow
        && statement
            .actions
            .iter()
            .any(|pattern| pattern_matches(pattern, action))
        && statement
            .resource_patterns
            .iter()
            .any(|pattern| pattern_matches(pattern, resource_arn))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn reference_statement() -> PermissionStatement {
        build_permission_statement(
            &PermissionScope::default(),
            ["s3:List*", "s3:Get*"],
            ["arn:aws:s3:::umccr-10*"],
        )
        .expect("reference statement should build")
    }

    #[test]
    fn builds_reference_statement() {
        let statement = reference_statement();
        assert_eq!(statement.effect(), Effect::Allow);
        assert_eq!(
            statement.actions().iter().collect::<Vec<_>>(),
            vec!["s3:Get*", "s3:List*"]
        );
        assert_eq!(statement.resource_patterns().len(), 1);
    }

    #[test]
    fn duplicate_entries_collapse() {
        let statement = build_permission_statement(
            &PermissionScope::default(),
            ["s3:GetObject", "s3:GetObject", " s3:GetObject "],
            ["arn:aws:s3:::umccr-10g-data-dev/*"],
        )
        .expect("statement should build");
        assert_eq!(statement.actions().len(), 1);
    }

    #[test]
    fn rejects_empty_sets() {
        let scope = PermissionScope::default();
        let no_actions: [&str; 0] = [];
        assert!(matches!(
            build_permission_statement(&scope, no_actions, ["arn:aws:s3:::umccr-10*"]),
            Err(StackError::InvalidPermissionScope(_))
        ));
        let no_resources: [&str; 0] = [];
        assert!(matches!(
            build_permission_statement(&scope, ["s3:Get*"], no_resources),
            Err(StackError::InvalidPermissionScope(_))
        ));
    }

    #[test]
    fn checked_statement_reports_every_entry_out_of_scope() {
        let errors = check_permission_statement(
            &PermissionScope::default(),
            ["s3:PutObject", "s3:GetObject", "s3:DeleteObject"],
            ["arn:aws:s3:::public-bucket/*", "arn:aws:s3:::umccr-10*"],
        )
        .expect_err("statement should be rejected");

        assert_eq!(errors.len(), 3);
        assert!(errors[0].to_string().contains("s3:DeleteObject"));
        assert!(errors[1].to_string().contains("s3:PutObject"));
        assert!(errors[2].to_string().contains("public-bucket"));

        let first = build_permission_statement(
            &PermissionScope::default(),
            ["s3:PutObject", "s3:GetObject", "s3:DeleteObject"],
            ["arn:aws:s3:::public-bucket/*", "arn:aws:s3:::umccr-10*"],
        )
        .expect_err("statement should be rejected");
        assert_eq!(first, errors[0]);
    }

    #[test]
    fn rejects_wildcards_that_escape_read_only_verbs() {
        let scope = PermissionScope::default();
        for action in ["s3:*", "*", "s3:Get*Put", "s3:*Object", "s3:Get", "iam:GetRole", "s3GetObject"] {
            assert!(
                matches!(scope.check_action(action), Err(StackError::InvalidPermissionScope(_))),
                "action '{action}' should be rejected"
            );
        }
        for action in ["s3:Get*", "s3:List*", "s3:GetObject", "s3:ListBucket", "s3:GetObjectTagging*"] {
            assert!(scope.check_action(action).is_ok(), "action '{action}' should pass");
        }
    }

    #[test]
    fn rejects_resources_outside_prefix() {
        let scope = PermissionScope::default();
        for pattern in [
            "*",
            "arn:aws:s3:::*",
            "arn:aws:s3:::umccr-1*",
            "arn:aws:s3:::other-bucket/umccr-10",
            "arn:aws:dynamodb:::umccr-10",
        ] {
            assert!(scope.check_resource(pattern).is_err(), "pattern '{pattern}' should fail");
        }
        assert!(scope.check_resource("arn:aws:s3:::umccr-10g-data-dev/*").is_ok());
    }

    #[test]
    fn custom_prefix_must_be_literal() {
        assert!(PermissionScope::new("umccr-*").is_err());
        assert!(PermissionScope::new("").is_err());
        let scope = PermissionScope::new("elsa-data").expect("prefix should be accepted");
        assert!(scope.check_resource("arn:aws:s3:::elsa-data-tmp/*").is_ok());
        assert!(scope.check_resource("arn:aws:s3:::umccr-10*").is_err());
    }

    #[test]
    fn glob_matching_spans_key_separators() {
        assert!(pattern_matches(
            "arn:aws:s3:::umccr-10*",
            "arn:aws:s3:::umccr-10g-data-dev/HG00174/HG00174.hard-filtered.vcf.gz"
        ));
        assert!(pattern_matches("s3:Get*", "s3:GetObject"));
        assert!(pattern_matches("s3:Get?bject", "s3:GetObject"));
        assert!(!pattern_matches("s3:List*", "s3:GetObject"));
        assert!(!pattern_matches("arn:aws:s3:::umccr-10*", "arn:aws:s3:::umccr-11/x"));
        assert!(pattern_matches("*", ""));
    }

    #[test]
    fn statement_allows_reads_under_prefix() {
        let statement = reference_statement();
        assert!(statement_allows(
            &statement,
            "s3:GetObject",
            "arn:aws:s3:::umccr-10g-data-dev/HG00096/HG00096.hard-filtered.vcf.gz"
        ));
        assert!(!statement_allows(
            &statement,
            "s3:PutObject",
            "arn:aws:s3:::umccr-10g-data-dev/HG00096/HG00096.hard-filtered.vcf.gz"
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn non_read_verbs_are_rejected(verb in "[A-Z][A-Za-z]{1,16}\\*?") {
            prop_assume!(!verb.starts_with("List") && !verb.starts_with("Get"));
            let action = format!("s3:{verb}");
            let result = build_permission_statement(
                &PermissionScope::default(),
                [action.as_str()],
                ["arn:aws:s3:::umccr-10*"],
            );
            prop_assert!(matches!(result, Err(StackError::InvalidPermissionScope(_))));
        }

        #[test]
        fn buckets_outside_prefix_are_rejected(bucket in "[a-z0-9][a-z0-9.-]{2,40}") {
            prop_assume!(!bucket.starts_with(DEFAULT_APPROVED_BUCKET_PREFIX));
            let pattern = format!("arn:aws:s3:::{bucket}*");
            let result = build_permission_statement(
                &PermissionScope::default(),
                ["s3:Get*"],
                [pattern.as_str()],
            );
            prop_assert!(matches!(result, Err(StackError::InvalidPermissionScope(_))));
        }

        #[test]
        fn buckets_under_prefix_are_accepted(suffix in "[a-z0-9-]{0,20}") {
            let pattern = format!("arn:aws:s3:::umccr-10{suffix}/*");
            let result = build_permission_statement(
                &PermissionScope::default(),
                ["s3:List*", "s3:Get*"],
                [pattern.as_str()],
            );
            prop_assert!(result.is_ok());
        }
    }
}
