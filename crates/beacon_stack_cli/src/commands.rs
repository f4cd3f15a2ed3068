use std::path::Path;

use anyhow::Context;
use beacon_stack_core::binding::BindingRegistry;
use beacon_stack_core::invocation::{check_invocation, SequenceQueryRequest, ValidatedQuery};
use beacon_stack_core::template::render_template;
use beacon_stack_core::{assemble_stack_with_registry, StackDescriptor};
use serde_json::json;
use tracing::info;

use crate::config::StackConfig;

/// Assembles the configured stack. Violations are logged by assembly itself.
pub fn assemble(config: &StackConfig, registry: Option<BindingRegistry>) -> anyhow::Result<StackDescriptor> {
    let spec = config.to_stack_spec()?;
    let registry = registry.unwrap_or_else(|| BindingRegistry::new(spec.target.clone()));

    Ok(assemble_stack_with_registry(&spec, registry)?)
}

pub fn validation_report(descriptor: &StackDescriptor) -> serde_json::Value {
    json!({
        "status": "valid",
        "schema_version": descriptor.schema_version(),
        "target": descriptor.target(),
        "fingerprint": descriptor.fingerprint(),
        "bindings": descriptor
            .bindings()
            .iter()
            .map(|binding| binding.name())
            .collect::<Vec<_>>(),
    })
}

pub fn synth_template(descriptor: &StackDescriptor) -> anyhow::Result<String> {
    let mut rendered = serde_json::to_string_pretty(&render_template(descriptor))
        .context("failed to serialize template")?;
    rendered.push('\n');
    Ok(rendered)
}

pub fn write_template(descriptor: &StackDescriptor, output: &Path) -> anyhow::Result<()> {
    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create '{}'", parent.display()))?;
    }
    std::fs::write(output, synth_template(descriptor)?)
        .with_context(|| format!("failed to write template '{}'", output.display()))?;

    info!(
        component = "cli",
        event = "template_written",
        path = %output.display(),
        fingerprint = %descriptor.fingerprint(),
    );
    Ok(())
}

pub fn check_request(
    descriptor: &StackDescriptor,
    function_name: &str,
    request_json: &str,
) -> anyhow::Result<ValidatedQuery> {
    let request: SequenceQueryRequest =
        serde_json::from_str(request_json).context("malformed sequence query request")?;
    let query = check_invocation(descriptor, function_name, &request)?;

    info!(
        component = "cli",
        event = "request_allowed",
        function = function_name,
        vcf_id = %query.vcf_id,
    );
    Ok(query)
}
