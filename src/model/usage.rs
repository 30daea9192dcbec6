//! Field usage records and the grouping obligations that travel with them.

use serde::{Deserialize, Serialize};

use super::location::DocumentLocation;

/// Marks a usage as an aggregate that needs a unique row key to stay
/// correct across fan-out joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UniqueKeyRequirement {
    /// COUNT (as opposed to SUM/AVG and friends).
    pub is_count: bool,
}

impl UniqueKeyRequirement {
    /// Combine two requirements on the same path.
    pub fn merge(self, other: UniqueKeyRequirement) -> Self {
        Self {
            is_count: self.is_count || other.is_count,
        }
    }
}

/// A reference to one field, possibly through joins.
///
/// The last path segment names the field; earlier segments name joins.
/// An empty path only appears on the synthetic "needs a unique row"
/// usage a parent query inherits from a nested one.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldUsage {
    pub path: Vec<String>,
    #[serde(default)]
    pub at: Option<DocumentLocation>,
    #[serde(default)]
    pub unique_key_requirement: Option<UniqueKeyRequirement>,
    #[serde(default)]
    pub analytic_function_use: bool,
    /// The usage came from a join's ON condition rather than a query body.
    #[serde(default)]
    pub from_on_expression: bool,
}

impl FieldUsage {
    pub fn new<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Parse a dotted reference like `orders.customer.name`.
    pub fn dotted(path: &str) -> Self {
        Self::new(path.split('.'))
    }

    pub fn at(mut self, at: DocumentLocation) -> Self {
        self.at = Some(at);
        self
    }

    pub fn with_unique_key(mut self, is_count: bool) -> Self {
        self.unique_key_requirement = Some(UniqueKeyRequirement { is_count });
        self
    }

    pub fn from_on_expression(mut self) -> Self {
        self.from_on_expression = true;
        self
    }

    /// The join path leading to the field (everything but the last segment).
    pub fn join_path(&self) -> &[String] {
        match self.path.split_last() {
            Some((_, init)) => init,
            None => &[],
        }
    }

    /// The dotted form of the path.
    pub fn dotted_path(&self) -> String {
        self.path.join(".")
    }
}

/// A field that must be grouped by (or pinned by a single-value filter)
/// wherever the declaring field is aggregated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RequiredGroupBy {
    pub path: Vec<String>,
    #[serde(default)]
    pub at: Option<DocumentLocation>,
    /// The usage that brought this obligation in.
    #[serde(default)]
    pub field_usage: Option<FieldUsage>,
}

impl RequiredGroupBy {
    pub fn new<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn at(mut self, at: DocumentLocation) -> Self {
        self.at = Some(at);
        self
    }
}

/// Which fields an `all()`/`exclude()` application ungroups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UngroupedFields {
    /// `all()` with no arguments: every grouping is removed.
    All,
    Fields(Vec<Vec<String>>),
}

impl UngroupedFields {
    /// Whether this ungrouping removes the grouping on `path`.
    pub fn covers(&self, path: &[String]) -> bool {
        match self {
            UngroupedFields::All => true,
            UngroupedFields::Fields(fields) => fields.iter().any(|f| f.as_slice() == path),
        }
    }
}

/// One application of an ungrouping operator inside an aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateUngrouping {
    pub ungrouped_fields: UngroupedFields,
    /// Fields the ungrouped expression itself reads.
    #[serde(default)]
    pub field_usage: Vec<FieldUsage>,
    #[serde(default)]
    pub requires_group_by: Vec<RequiredGroupBy>,
    /// `exclude()` when true, `all()` when false.
    pub exclude: bool,
    /// Nest level the ungrouping belongs to.
    #[serde(default)]
    pub path: Vec<String>,
    #[serde(default)]
    pub at: Option<DocumentLocation>,
}

impl AggregateUngrouping {
    pub fn all() -> Self {
        Self {
            ungrouped_fields: UngroupedFields::All,
            field_usage: Vec::new(),
            requires_group_by: Vec::new(),
            exclude: false,
            path: Vec::new(),
            at: None,
        }
    }

    /// `exclude(f, ...)` over dotted field references.
    pub fn exclude(fields: &[&str]) -> Self {
        Self {
            ungrouped_fields: UngroupedFields::Fields(
                fields
                    .iter()
                    .map(|f| f.split('.').map(String::from).collect())
                    .collect(),
            ),
            exclude: true,
            ..Self::all()
        }
    }

    pub fn with_field_usage(mut self, usage: Vec<FieldUsage>) -> Self {
        self.field_usage = usage;
        self
    }

    pub fn with_required_group_by(mut self, required: Vec<RequiredGroupBy>) -> Self {
        self.requires_group_by = required;
        self
    }
}
