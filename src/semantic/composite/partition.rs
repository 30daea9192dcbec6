//! Partition composites: one physical relation whose available columns
//! depend on a discriminator value.
//!
//! Tag block form:
//!
//! ```toml
//! partition_field = "kind"
//!
//! [partitions.daily]
//! fields = ["day", "amount"]
//!
//! [partitions.hourly]
//! fields = ["day", "hour", "amount"]
//! ```

use thiserror::Error;
use tracing::debug;

use crate::model::{
    Expr, FieldUsage, FilterCondition, Partition, PartitionCompositeDesc, SourceDef,
};
use crate::semantic::error::CompositeIssue;

/// Why a partition tag block could not be turned into a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartitionSpecError {
    #[error("Source is already composite; cannot apply partition composite")]
    AlreadyComposite,

    #[error("Partition composite must specify `partition_field`")]
    MissingPartitionField,

    #[error("Partition composite must specify `partitions`")]
    MissingPartitions,

    #[error("Invalid partition specification for `{0}`; must be a tag with property `fields`")]
    InvalidPartition(String),

    #[error("Composite partition field `{0}` not present in source")]
    FieldNotPresent(String),
}

impl PartitionCompositeDesc {
    /// Read a descriptor from a partition tag block attached to `source`.
    pub fn from_tag(tag: &toml::Table, source: &SourceDef) -> Result<Self, PartitionSpecError> {
        if source.is_composite() {
            return Err(PartitionSpecError::AlreadyComposite);
        }
        let partition_field = tag
            .get("partition_field")
            .and_then(toml::Value::as_str)
            .ok_or(PartitionSpecError::MissingPartitionField)?
            .to_string();
        let partitions_tag = tag
            .get("partitions")
            .and_then(toml::Value::as_table)
            .ok_or(PartitionSpecError::MissingPartitions)?;

        let mut partitions = Vec::with_capacity(partitions_tag.len());
        let mut composite_fields: Vec<String> = Vec::new();
        for (id, spec) in partitions_tag {
            let fields = spec
                .as_table()
                .and_then(|t| t.get("fields"))
                .and_then(toml::Value::as_array)
                .ok_or_else(|| PartitionSpecError::InvalidPartition(id.clone()))?;
            let fields = fields
                .iter()
                .map(|f| f.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| PartitionSpecError::InvalidPartition(id.clone()))?;
            for field in &fields {
                if !composite_fields.contains(field) {
                    composite_fields.push(field.clone());
                }
            }
            partitions.push(Partition {
                id: id.clone(),
                fields,
            });
        }

        for field in std::iter::once(&partition_field).chain(composite_fields.iter()) {
            if source.field(field).is_none() {
                return Err(PartitionSpecError::FieldNotPresent(field.clone()));
            }
        }

        Ok(Self {
            partition_field,
            partitions,
            composite_fields,
        })
    }
}

/// Pick the first partition whose fields cover every partition-varying
/// field in `usage`.
///
/// On failure, returns one issue list per partition, in declaration order,
/// naming the usages that partition lacks.
pub fn select_partition<'a>(
    desc: &'a PartitionCompositeDesc,
    usage: &[FieldUsage],
) -> Result<&'a Partition, Vec<Vec<CompositeIssue>>> {
    let composite_used: Vec<&FieldUsage> = usage
        .iter()
        .filter(|u| match u.path.as_slice() {
            [name] => desc.composite_fields.contains(name),
            _ => false,
        })
        .collect();

    let mut issues = Vec::with_capacity(desc.partitions.len());
    for partition in &desc.partitions {
        let missing: Vec<CompositeIssue> = composite_used
            .iter()
            .filter(|u| !partition.fields.contains(&u.path[0]))
            .map(|u| CompositeIssue::MissingField {
                field: (*u).clone(),
            })
            .collect();
        if missing.is_empty() {
            debug!(partition = %partition.id, "selected partition");
            return Ok(partition);
        }
        issues.push(missing);
    }
    Err(issues)
}

/// `partition_field = '<id>'`
pub fn partition_filter(desc: &PartitionCompositeDesc, partition_id: &str) -> FilterCondition {
    FilterCondition::new(Expr::field(&desc.partition_field).eq(Expr::string(partition_id)))
        .with_code(format!("{} = '{}'", desc.partition_field, partition_id))
}
