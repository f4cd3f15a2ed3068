use std::collections::BTreeSet;
use std::time::Duration;

use crate::contract::{
    Architecture, ComputeBinding, DeploymentTarget, ExecutionIdentity, ImageLocator,
    MAX_BINDING_NAME_LEN, PLATFORM_MAX_TIMEOUT,
};
use crate::error::{StackError, StackResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeBindingRequest {
    pub name: String,
    pub image: String,
    pub timeout: Duration,
    pub architecture: Architecture,
}

/// Function names already claimed within one deployment target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingRegistry {
    target: DeploymentTarget,
    names: BTreeSet<String>,
}

impl BindingRegistry {
    pub fn new(target: DeploymentTarget) -> Self {
        Self {
            target,
            names: BTreeSet::new(),
        }
    }

    /// Registry pre-seeded with names that already exist in the target, e.g.
    /// functions deployed outside this stack.
    pub fn with_existing(
        target: DeploymentTarget,
        names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            target,
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn target(&self) -> &DeploymentTarget {
        &self.target
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn reserve(&mut self, name: &str) -> StackResult<()> {
        if !self.names.insert(name.to_string()) {
            return Err(StackError::DuplicateBindingName {
                name: name.to_string(),
                target: self.target.to_string(),
            });
        }
        Ok(())
    }
}

pub fn validate_binding_name(name: &str) -> StackResult<()> {
    if name.is_empty() || name.len() > MAX_BINDING_NAME_LEN {
        return Err(StackError::InvalidBindingName(format!(
            "'{name}' must be 1-{MAX_BINDING_NAME_LEN} characters long"
        )));
    }

    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(StackError::InvalidBindingName(format!(
            "'{name}' may only contain letters, digits, '-' and '_'"
        )));
    }

    Ok(())
}

pub fn validate_timeout(name: &str, timeout: Duration) -> StackResult<()> {
    if timeout.is_zero() || timeout > PLATFORM_MAX_TIMEOUT {
        return Err(StackError::TimeoutOutOfRange {
            name: name.to_string(),
            requested: timeout,
            max: PLATFORM_MAX_TIMEOUT,
        });
    }
    Ok(())
}

/// Produces a binding and claims its name in `registry`.
///
/// The name is only reserved once every other check passed, so a rejected
/// request leaves the registry untouched.
pub fn create_compute_binding(
    registry: &mut BindingRegistry,
    request: ComputeBindingRequest,
    identity: ExecutionIdentity,
) -> StackResult<ComputeBinding> {
    validate_binding_name(&request.name)?;
    validate_timeout(&request.name, request.timeout)?;
    let image = ImageLocator::parse(&request.image)?;

    registry.reserve(&request.name)?;

    Ok(ComputeBinding {
        name: request.name,
        image,
        timeout: request.timeout,
        architecture: request.architecture,
        identity,
    })
}

/// Runs every check of [`create_compute_binding`] and reports all failures.
///
/// The name is claimed even when another check fails, so a later request for
/// the same name still reports the collision.
pub fn check_compute_binding(
    registry: &mut BindingRegistry,
    request: ComputeBindingRequest,
    identity: ExecutionIdentity,
) -> Result<ComputeBinding, Vec<StackError>> {
    let mut errors = Vec::new();

    if let Err(error) = validate_binding_name(&request.name) {
        errors.push(error);
    }
    if let Err(error) = validate_timeout(&request.name, request.timeout) {
        errors.push(error);
    }
    let image = match ImageLocator::parse(&request.image) {
        Ok(image) => Some(image),
        Err(error) => {
            errors.push(error);
            None
        }
    };
    if let Err(error) = registry.reserve(&request.name) {
        errors.push(error);
    }

    match image {
        Some(image) if errors.is_empty() => Ok(ComputeBinding {
            name: request.name,
            image,
            timeout: request.timeout,
            architecture: request.architecture,
            identity,
        }),
        _ => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn target() -> DeploymentTarget {
        DeploymentTarget::new("843407916570", "ap-southeast-2")
    }

    fn request(name: &str, timeout: Duration) -> ComputeBindingRequest {
        ComputeBindingRequest {
            name: name.to_string(),
            image: "../application/lambda/beacon".to_string(),
            timeout,
            architecture: Architecture::Arm64,
        }
    }

    #[test]
    fn creates_reference_binding() {
        let mut registry = BindingRegistry::new(target());
        let binding = create_compute_binding(
            &mut registry,
            request("elsa-data-beacon", Duration::from_secs(60)),
            ExecutionIdentity::for_compute_service(),
        )
        .expect("binding should be created");

        assert_eq!(binding.name(), "elsa-data-beacon");
        assert_eq!(binding.timeout_seconds(), 60);
        assert_eq!(binding.architecture(), Architecture::Arm64);
        assert!(registry.contains("elsa-data-beacon"));
    }

    #[test]
    fn second_binding_with_same_name_is_rejected() {
        let mut registry = BindingRegistry::new(target());
        create_compute_binding(
            &mut registry,
            request("elsa-data-beacon", Duration::from_secs(60)),
            ExecutionIdentity::for_compute_service(),
        )
        .expect("first binding should be created");

        let error = create_compute_binding(
            &mut registry,
            request("elsa-data-beacon", Duration::from_secs(30)),
            ExecutionIdentity::for_compute_service(),
        )
        .expect_err("second binding should fail");

        assert_eq!(
            error,
            StackError::DuplicateBindingName {
                name: "elsa-data-beacon".to_string(),
                target: "843407916570/ap-southeast-2".to_string(),
            }
        );
    }

    #[test]
    fn pre_existing_names_count_as_collisions() {
        let mut registry = BindingRegistry::with_existing(target(), ["elsa-data-beacon"]);
        let error = create_compute_binding(
            &mut registry,
            request("elsa-data-beacon", Duration::from_secs(60)),
            ExecutionIdentity::for_compute_service(),
        )
        .expect_err("existing name should collide");
        assert_eq!(error.code(), "DUPLICATE_BINDING_NAME");
    }

    #[test]
    fn separate_targets_do_not_share_names() {
        let mut sydney = BindingRegistry::new(target());
        let mut virginia = BindingRegistry::new(DeploymentTarget::new("843407916570", "us-east-1"));

        for registry in [&mut sydney, &mut virginia] {
            create_compute_binding(
                registry,
                request("elsa-data-beacon", Duration::from_secs(60)),
                ExecutionIdentity::for_compute_service(),
            )
            .expect("binding should be created in each target");
        }
    }

    #[test]
    fn rejected_request_does_not_reserve_name() {
        let mut registry = BindingRegistry::new(target());
        let error = create_compute_binding(
            &mut registry,
            request("elsa-data-beacon", Duration::from_secs(1000)),
            ExecutionIdentity::for_compute_service(),
        )
        .expect_err("timeout should be rejected");

        assert!(matches!(error, StackError::TimeoutOutOfRange { .. }));
        assert!(!registry.contains("elsa-data-beacon"));
    }

    #[test]
    fn rejects_invalid_names_and_images() {
        let mut registry = BindingRegistry::new(target());
        for name in ["", "elsa data beacon", "elsa/beacon", &"x".repeat(65)] {
            let error = create_compute_binding(
                &mut registry,
                request(name, Duration::from_secs(60)),
                ExecutionIdentity::for_compute_service(),
            )
            .expect_err("name should be rejected");
            assert!(matches!(error, StackError::InvalidBindingName(_)));
        }

        let mut missing_image = request("elsa-data-beacon", Duration::from_secs(60));
        missing_image.image = String::new();
        let error = create_compute_binding(
            &mut registry,
            missing_image,
            ExecutionIdentity::for_compute_service(),
        )
        .expect_err("image should be rejected");
        assert!(matches!(error, StackError::InvalidImageLocator(_)));
    }

    #[test]
    fn checked_binding_reports_every_failure_and_claims_name() {
        let mut registry = BindingRegistry::new(target());
        let mut bad = request("bad name", Duration::from_secs(1000));
        bad.image = String::new();

        let errors = check_compute_binding(&mut registry, bad, ExecutionIdentity::for_compute_service())
            .expect_err("request should be rejected");
        let codes: Vec<_> = errors.iter().map(StackError::code).collect();
        assert_eq!(
            codes,
            vec!["INVALID_BINDING_NAME", "TIMEOUT_OUT_OF_RANGE", "INVALID_IMAGE_LOCATOR"]
        );
        assert!(registry.contains("bad name"));

        let errors = check_compute_binding(
            &mut registry,
            request("bad name", Duration::from_secs(60)),
            ExecutionIdentity::for_compute_service(),
        )
        .expect_err("second request should collide");
        let codes: Vec<_> = errors.iter().map(StackError::code).collect();
        assert_eq!(codes, vec!["INVALID_BINDING_NAME", "DUPLICATE_BINDING_NAME"]);
    }

    #[test]
    fn checked_binding_matches_factory_on_valid_request() {
        let mut checked = BindingRegistry::new(target());
        let mut created = BindingRegistry::new(target());

        let first = check_compute_binding(
            &mut checked,
            request("elsa-data-beacon", Duration::from_secs(60)),
            ExecutionIdentity::for_compute_service(),
        )
        .expect("binding should be created");
        let second = create_compute_binding(
            &mut created,
            request("elsa-data-beacon", Duration::from_secs(60)),
            ExecutionIdentity::for_compute_service(),
        )
        .expect("binding should be created");

        assert_eq!(first, second);
    }

    #[test]
    fn accepts_platform_maximum_timeout() {
        assert!(validate_timeout("elsa-data-beacon", PLATFORM_MAX_TIMEOUT).is_ok());
        assert!(validate_timeout("elsa-data-beacon", Duration::ZERO).is_err());
    }

    proptest! {
        #[test]
        fn timeouts_past_platform_maximum_are_rejected(extra_millis in 1u64..10_000_000) {
            let timeout = PLATFORM_MAX_TIMEOUT + Duration::from_millis(extra_millis);
            let result = validate_timeout("elsa-data-beacon", timeout);
            let is_out_of_range = matches!(result, Err(StackError::TimeoutOutOfRange { .. }));
            prop_assert!(is_out_of_range);
        }

        #[test]
        fn timeouts_within_platform_maximum_are_accepted(millis in 1u64..=900_000) {
            prop_assert!(validate_timeout("elsa-data-beacon", Duration::from_millis(millis)).is_ok());
        }
    }
}
