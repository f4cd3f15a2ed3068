//! Request/response shape of the external Beacon handler image.
//!
//! The handler itself (index lookup, block fetch, allele match) lives outside
//! this workspace. What is checked here is that a request is well formed and
//! that the deployed identity may actually read the objects it names.

use serde::{Deserialize, Serialize};

use crate::contract::{ComputeBinding, StackDescriptor};
use crate::error::{StackError, StackResult};
use crate::policy::statement_allows;

pub const VCF_SUFFIX: &str = ".vcf.gz";
pub const VCF_INDEX_SUFFIX: &str = ".vcf.gz.tbi";
pub const OBJECT_READ_ACTION: &str = "s3:GetObject";

/// A beacon sequence query, see http://docs.genomebeacons.org/variant-queries/
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SequenceQueryRequest {
    pub vcf_bucket: String,
    pub vcf_key: String,
    pub vcf_index_bucket: String,
    pub vcf_index_key: String,
    pub reference_name: String,
    /// 1-based.
    pub start: u32,
    pub reference_bases: String,
    pub alternate_bases: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SequenceQueryResponse {
    pub found: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ValidatedQuery {
    pub vcf_id: String,
    pub vcf_index_id: String,
    pub vcf_object_arn: String,
    pub vcf_index_object_arn: String,
}

/// Strips `suffix` from `key`, failing when the key does not carry it.
pub fn verify_key(key: &str, suffix: &str) -> StackResult<String> {
    key.strip_suffix(suffix)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| StackError::InvalidInvocation(format!("Invalid key: {key} (expected *{suffix})")))
}

pub fn object_arn(bucket: &str, key: &str) -> String {
    format!("arn:aws:s3:::{bucket}/{key}")
}

impl SequenceQueryRequest {
    pub fn validate(&self) -> StackResult<ValidatedQuery> {
        for (field, value) in [
            ("vcf_bucket", &self.vcf_bucket),
            ("vcf_index_bucket", &self.vcf_index_bucket),
            ("reference_name", &self.reference_name),
            ("reference_bases", &self.reference_bases),
            ("alternate_bases", &self.alternate_bases),
        ] {
            if value.trim().is_empty() {
                return Err(StackError::InvalidInvocation(format!("{field} cannot be empty")));
            }
        }

        if self.start == 0 {
            return Err(StackError::InvalidInvocation(
                "start is a 1-based coordinate and must be positive".to_string(),
            ));
        }

        let vcf_index_id = verify_key(&self.vcf_index_key, VCF_INDEX_SUFFIX)?;
        let vcf_id = verify_key(&self.vcf_key, VCF_SUFFIX)?;

        Ok(ValidatedQuery {
            vcf_id,
            vcf_index_id,
            vcf_object_arn: object_arn(&self.vcf_bucket, &self.vcf_key),
            vcf_index_object_arn: object_arn(&self.vcf_index_bucket, &self.vcf_index_key),
        })
    }
}

/// Checks that invoking `function_name` with `request` would be allowed to
/// read both the VCF and its index.
pub fn check_invocation(
    descriptor: &StackDescriptor,
    function_name: &str,
    request: &SequenceQueryRequest,
) -> StackResult<ValidatedQuery> {
    let binding = descriptor.binding(function_name).ok_or_else(|| {
        StackError::InvalidInvocation(format!(
            "no compute binding named '{function_name}' in {}",
            descriptor.target()
        ))
    })?;

    let query = request.validate()?;
    let denied: Vec<&str> = [
        query.vcf_object_arn.as_str(),
        query.vcf_index_object_arn.as_str(),
    ]
    .into_iter()
    .filter(|arn| !binding_can_read(binding, arn))
    .collect();

    if !denied.is_empty() {
        return Err(StackError::InvalidInvocation(format!(
            "'{function_name}' may not read {}",
            denied.join(", ")
        )));
    }

    Ok(query)
}

fn binding_can_read(binding: &ComputeBinding, arn: &str) -> bool {
    binding
        .identity()
        .inline_statements()
        .iter()
        .any(|statement| statement_allows(statement, OBJECT_READ_ACTION, arn))
}
