//! User-facing diagnostics for failed composite resolution.
//!
//! Only the first issue of each rejected candidate is reported; it is the
//! one that stopped the candidate. Issues are ordered by where the
//! offending reference was written, and the diagnostic is anchored at the
//! last of them.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::config::DiagnosticSettings;
use crate::model::{compare_locations, DocumentLocation, FieldUsage, RequiredGroupBy};
use crate::semantic::error::{CompositeError, CompositeIssue};

use super::path::{
    comma_and_list, dedup_paths, format_field_usages, format_paths, format_required_group_bys,
    joined_field_usage,
};

const GROUPING: &str = "required group by or single value filter";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
}

/// A message for the model author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub at: Option<DocumentLocation>,
    pub severity: Severity,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.at {
            Some(at) => write!(f, "{at}: {} [{}]", self.message, self.code),
            None => write!(f, "{} [{}]", self.message, self.code),
        }
    }
}

/// Where diagnostics go.
pub trait LogSink {
    fn log(&mut self, diagnostic: Diagnostic);
}

impl LogSink for Vec<Diagnostic> {
    fn log(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

/// Emits diagnostics as tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&mut self, diagnostic: Diagnostic) {
        let at = diagnostic.at.as_ref().map(ToString::to_string);
        match diagnostic.severity {
            Severity::Error => error!(code = %diagnostic.code, at = ?at, "{}", diagnostic.message),
        }
    }
}

/// Build the diagnostic for a resolution error.
pub fn composite_error_diagnostic(
    error: &CompositeError,
    settings: &DiagnosticSettings,
) -> Diagnostic {
    let (message, at) = match error {
        CompositeError::NoSuitableCompositeSourceInput {
            failures,
            usage,
            path,
        } => {
            let mut first_fails: Vec<&CompositeIssue> =
                failures.iter().filter_map(|f| f.issues.first()).collect();
            // stable: equal locations keep candidate order
            first_fails.sort_by(|a, b| compare_locations(a.location(), b.location()));
            let last = first_fails.last().copied();
            let message = describe_failures(&first_fails, usage, path);
            (message, last.and_then(CompositeIssue::location).cloned())
        }
        _ => ("Could not resolve composite source".to_string(), None),
    };
    Diagnostic {
        code: settings.error_code.clone(),
        message,
        at,
        severity: Severity::Error,
    }
}

/// Format `error` and hand it to `sink`.
pub fn log_composite_error(
    error: &CompositeError,
    settings: &DiagnosticSettings,
    sink: &mut dyn LogSink,
) {
    sink.log(composite_error_diagnostic(error, settings));
}

fn describe_failures(first_fails: &[&CompositeIssue], usage: &[FieldUsage], path: &[String]) -> String {
    let conflicting: Vec<FieldUsage> = first_fails
        .iter()
        .filter_map(|issue| match issue {
            CompositeIssue::MissingField { field } => Some(field.clone()),
            _ => None,
        })
        .collect();
    let missing_group_bys: Vec<RequiredGroupBy> = first_fails
        .iter()
        .filter_map(|issue| match issue {
            CompositeIssue::MissingRequiredGroupBy { required_group_by } => {
                Some(required_group_by.clone())
            }
            _ => None,
        })
        .collect();
    let failed_joins = dedup_paths(first_fails.iter().filter_map(|issue| match issue {
        CompositeIssue::JoinFailed { path, .. } => Some(path.as_slice()),
        _ => None,
    }));

    let f_conflicting = format_field_usages(&joined_field_usage(path, &conflicting));
    let f_group_bys = format_required_group_bys(&missing_group_bys);

    let mut clauses = Vec::new();
    if !conflicting.is_empty() && !missing_group_bys.is_empty() {
        clauses.push(format!(
            "there is no composite input source which defines {f_conflicting} without having an unsatisfied {GROUPING} on {f_group_bys}"
        ));
    } else {
        if !conflicting.is_empty() {
            clauses.push(format!(
                "there is no composite input source which defines all of {f_conflicting}"
            ));
        }
        if !missing_group_bys.is_empty() {
            clauses.push(format!("there is a missing {GROUPING} of {f_group_bys}"));
        }
    }
    if !failed_joins.is_empty() {
        let noun = if failed_joins.len() > 1 { "joins" } else { "join" };
        clauses.push(format!(
            "{noun} {} could not be resolved",
            format_paths(failed_joins, "and")
        ));
    }

    let subject = match first_fails.last().and_then(|issue| issue.field_usage()) {
        Some(last_usage) => format!(
            "uses field {}, resulting in",
            format_field_usages(&joined_field_usage(path, std::slice::from_ref(last_usage)))
        ),
        None => "results in".to_string(),
    };
    let required = format_field_usages(&joined_field_usage(path, usage));

    if clauses.is_empty() {
        format!(
            "This operation {subject} invalid usage of the composite source (fields required in source: {required})"
        )
    } else {
        format!(
            "This operation {subject} invalid usage of the composite source, as {} (fields required in source: {required})",
            comma_and_list(&clauses, "and")
        )
    }
}
