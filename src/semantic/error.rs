//! Error types for composite source resolution.
//!
//! Structural errors describe a malformed schema reference and stop the
//! search outright. `NoSuitableCompositeSourceInput` is the only error a
//! search can recover from: it is what a candidate search ends in when
//! every candidate failed, and it carries one `CompositeFailure` per
//! candidate so the diagnostic formatter can explain why.

use thiserror::Error;

use crate::model::{DocumentLocation, FieldUsage, RequiredGroupBy, SourceDef};

/// Result type for composite resolution.
pub type CompositeResult<T> = Result<T, CompositeError>;

fn join_label(path: &[String]) -> String {
    if path.is_empty() {
        "the root source".to_string()
    } else {
        format!("`{}`", path.join("."))
    }
}

fn dotted(usage: &FieldUsage) -> String {
    usage.dotted_path()
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompositeError {
    #[error("{} is not a composite source", join_label(.path))]
    NotACompositeSource { path: Vec<String> },

    #[error("could not find field `{}`", dotted(.field))]
    CouldNotFindField {
        field: FieldUsage,
        path: Vec<String>,
    },

    #[error("join {} is not defined", join_label(.path))]
    CompositeSourceNotDefined { path: Vec<String> },

    #[error("{} is not a join", join_label(.path))]
    CompositeSourceNotAJoin { path: Vec<String> },

    #[error("resolved source for join {} cannot be joined", join_label(.path))]
    CompositeSourceIsNotJoinable { path: Vec<String> },

    #[error(
        "no suitable composite source input for {} ({} failed attempts)",
        join_label(.path),
        .failures.len()
    )]
    NoSuitableCompositeSourceInput {
        /// One entry per candidate tried, in declaration order.
        failures: Vec<CompositeFailure>,
        /// The usage that had to be satisfied, for messages.
        usage: Vec<FieldUsage>,
        path: Vec<String>,
    },

    #[error("composite resolution at {} exceeded the maximum depth of {limit}", join_label(.path))]
    ResolutionTooDeep { path: Vec<String>, limit: usize },
}

impl CompositeError {
    /// Stable snake-case code.
    pub fn code(&self) -> &'static str {
        match self {
            CompositeError::NotACompositeSource { .. } => "not_a_composite_source",
            CompositeError::CouldNotFindField { .. } => "could_not_find_field",
            CompositeError::CompositeSourceNotDefined { .. } => "composite_source_not_defined",
            CompositeError::CompositeSourceNotAJoin { .. } => "composite_source_not_a_join",
            CompositeError::CompositeSourceIsNotJoinable { .. } => {
                "composite_source_is_not_joinable"
            }
            CompositeError::NoSuitableCompositeSourceInput { .. } => {
                "no_suitable_composite_source_input"
            }
            CompositeError::ResolutionTooDeep { .. } => "resolution_too_deep",
        }
    }

    /// Join path at which the problem occurred.
    pub fn path(&self) -> &[String] {
        match self {
            CompositeError::NotACompositeSource { path }
            | CompositeError::CouldNotFindField { path, .. }
            | CompositeError::CompositeSourceNotDefined { path }
            | CompositeError::CompositeSourceNotAJoin { path }
            | CompositeError::CompositeSourceIsNotJoinable { path }
            | CompositeError::NoSuitableCompositeSourceInput { path, .. }
            | CompositeError::ResolutionTooDeep { path, .. } => path,
        }
    }

    /// Whether trying another candidate could help.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CompositeError::NoSuitableCompositeSourceInput { .. })
    }
}

/// Why one candidate was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum CompositeIssue {
    MissingField {
        field: FieldUsage,
    },
    JoinFailed {
        failures: Vec<CompositeFailure>,
        path: Vec<String>,
        first_usage: Option<FieldUsage>,
    },
    MissingRequiredGroupBy {
        required_group_by: RequiredGroupBy,
    },
}

impl CompositeIssue {
    /// Where the offending reference was written.
    pub fn location(&self) -> Option<&DocumentLocation> {
        match self {
            CompositeIssue::MissingField { field } => field.at.as_ref(),
            CompositeIssue::JoinFailed { first_usage, .. } => {
                first_usage.as_ref().and_then(|u| u.at.as_ref())
            }
            CompositeIssue::MissingRequiredGroupBy { required_group_by } => {
                required_group_by.at.as_ref()
            }
        }
    }

    /// The usage to blame in a message, if the issue has one.
    pub fn field_usage(&self) -> Option<&FieldUsage> {
        match self {
            CompositeIssue::MissingField { field } => Some(field),
            CompositeIssue::JoinFailed { .. } => None,
            CompositeIssue::MissingRequiredGroupBy { required_group_by } => {
                required_group_by.field_usage.as_ref()
            }
        }
    }
}

/// A candidate that was tried and every issue found with it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeFailure {
    pub source: SourceDef,
    pub issues: Vec<CompositeIssue>,
}
