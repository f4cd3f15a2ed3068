use serde_json::{json, Map, Value};

use crate::contract::{ComputeBinding, ImageLocator, StackDescriptor};

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";
pub const POLICY_LANGUAGE_VERSION: &str = "2012-10-17";

/// `elsa-data-beacon` + `Role` -> `ElsaDataBeaconRole`.
pub fn logical_id(name: &str, suffix: &str) -> String {
    let mut id: String = name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();
    id.push_str(suffix);
    id
}

/// Renders the descriptor as a deployable template.
///
/// Output depends only on the descriptor: object keys are sorted and no
/// timestamps or generated names are embedded.
pub fn render_template(descriptor: &StackDescriptor) -> Value {
    let mut parameters = Map::new();
    let mut resources = Map::new();
    let mut outputs = Map::new();

    for binding in descriptor.bindings() {
        let role_id = logical_id(binding.name(), "Role");
        let function_id = logical_id(binding.name(), "Function");

        resources.insert(role_id.clone(), render_role(binding, &role_id));

        let image_uri = match binding.image() {
            ImageLocator::Registry { uri } => Value::from(uri.as_str()),
            ImageLocator::BuildContext { path } => {
                let parameter_id = logical_id(binding.name(), "ImageUri");
                parameters.insert(
                    parameter_id.clone(),
                    json!({
                        "Type": "String",
                        "Description": format!("Image URI built from {path}"),
                    }),
                );
                json!({ "Ref": parameter_id })
            }
        };

        resources.insert(
            function_id.clone(),
            render_function(binding, &role_id, image_uri),
        );
        outputs.insert(
            format!("{function_id}Name"),
            json!({ "Value": { "Ref": function_id } }),
        );
    }

    let mut template = json!({
        "AWSTemplateFormatVersion": TEMPLATE_FORMAT_VERSION,
        "Description": format!("Beacon query function stack for {}", descriptor.target()),
        "Metadata": {
            "beacon:schema-version": descriptor.schema_version(),
            "beacon:descriptor-fingerprint": descriptor.fingerprint(),
            "beacon:target": descriptor.target(),
        },
        "Resources": resources,
        "Outputs": outputs,
    });
    if !parameters.is_empty() {
        template["Parameters"] = Value::Object(parameters);
    }
    template
}

fn render_role(binding: &ComputeBinding, role_id: &str) -> Value {
    let identity = binding.identity();
    let mut properties = json!({
        "AssumeRolePolicyDocument": {
            "Version": POLICY_LANGUAGE_VERSION,
            "Statement": [{
                "Effect": "Allow",
                "Principal": { "Service": identity.trusted_principal() },
                "Action": "sts:AssumeRole",
            }],
        },
        "ManagedPolicyArns": identity
            .managed_policies()
            .iter()
            .map(|policy| policy.arn())
            .collect::<Vec<_>>(),
    });

    if !identity.inline_statements().is_empty() {
        let statements: Vec<Value> = identity
            .inline_statements()
            .iter()
            .map(|statement| {
                json!({
                    "Effect": statement.effect(),
                    "Action": statement.actions(),
                    "Resource": statement.resource_patterns(),
                })
            })
            .collect();
        properties["Policies"] = json!([{
            "PolicyName": format!("{role_id}DefaultPolicy"),
            "PolicyDocument": {
                "Version": POLICY_LANGUAGE_VERSION,
                "Statement": statements,
            },
        }]);
    }

    json!({
        "Type": "AWS::IAM::Role",
        "Properties": properties,
    })
}

fn render_function(binding: &ComputeBinding, role_id: &str, image_uri: Value) -> Value {
    let mut function = json!({
        "Type": "AWS::Lambda::Function",
        "DependsOn": [role_id],
        "Properties": {
            "FunctionName": binding.name(),
            "PackageType": "Image",
            "Code": { "ImageUri": image_uri },
            "Role": { "Fn::GetAtt": [role_id, "Arn"] },
            "Timeout": binding.timeout_seconds(),
            "Architectures": [binding.architecture().as_str()],
        },
    });
    if let ImageLocator::BuildContext { path } = binding.image() {
        function["Metadata"] = json!({ "beacon:asset-path": path });
    }
    function
}
