use std::collections::BTreeSet;

use beacon_stack_core::binding::BindingRegistry;
use beacon_stack_core::contract::DeploymentTarget;
use tracing::info;

use crate::adapters::caller_account::CallerAccountResolver;
use crate::adapters::function_names::FunctionNameLister;

/// Fails unless the ambient credentials belong to the target account, since
/// function listings are scoped to the caller's account.
pub fn verify_caller_account(
    target: &DeploymentTarget,
    resolver: &dyn CallerAccountResolver,
) -> anyhow::Result<()> {
    let account = resolver
        .caller_account()
        .map_err(|error| anyhow::anyhow!("failed to resolve caller account: {error}"))?;

    if account != target.account {
        anyhow::bail!(
            "credentials belong to account {account}, stack targets {target}"
        );
    }

    info!(
        component = "preflight",
        event = "caller_account_verified",
        deployment_target = %target,
    );
    Ok(())
}

/// Builds a name registry for `target` from the functions that already exist
/// there.
///
/// Names in `owned` belong to a previous deployment of this same stack and are
/// left out, so redeploying does not collide with itself.
pub fn seed_registry(
    target: &DeploymentTarget,
    lister: &dyn FunctionNameLister,
    owned: &[String],
) -> anyhow::Result<BindingRegistry> {
    let existing = lister
        .list_function_names()
        .map_err(|error| anyhow::anyhow!("failed to list functions in {target}: {error}"))?;

    let owned: BTreeSet<&str> = owned.iter().map(String::as_str).collect();
    let foreign: Vec<String> = existing
        .into_iter()
        .filter(|name| !owned.contains(name.as_str()))
        .collect();

    info!(
        component = "preflight",
        event = "registry_seeded",
        deployment_target = %target,
        existing_functions = foreign.len(),
        owned_functions = owned.len(),
    );

    Ok(BindingRegistry::with_existing(target.clone(), foreign))
}
