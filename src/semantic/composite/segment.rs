//! Annotating a resolved pipeline stage with its expanded usage.
//!
//! Runs after resolution: every reference must now resolve, so a missing
//! field here is a hard error rather than a reason to try another input.

use tracing::trace;

use crate::model::{AggregateUngrouping, PipeSegment, QueryField, SourceDef};
use crate::semantic::error::CompositeResult;

use super::expand::expand_field_usage;
use super::namespace::merge_fields;
use super::path::merge_field_usage;

/// Fill in `expanded_field_usage`, `active_joins` and
/// `expanded_ungroupings` on `segment` (and on the first stages of its
/// nested views) against `input`.
pub fn expand_segment(segment: &PipeSegment, input: &SourceDef) -> CompositeResult<PipeSegment> {
    if let PipeSegment::Raw { .. } = segment {
        return Ok(segment.clone());
    }

    let fields = merge_fields(&[&input.fields, segment.extend_source()]);
    let mut expanded = segment.clone();
    let mut ungroupings: Vec<AggregateUngrouping> = Vec::new();

    if let PipeSegment::Query(query) = &mut expanded {
        let scope = SourceDef {
            fields: fields.clone(),
            ..input.clone()
        };
        for field in &mut query.query_fields {
            match field {
                QueryField::Turtle(turtle) => {
                    let mut stage_input = scope.clone();
                    for stage in turtle.pipeline.iter_mut() {
                        let next_input = stage
                            .as_query()
                            .and_then(|q| q.output_struct.as_deref())
                            .cloned();
                        *stage = expand_segment(stage, &stage_input)?;
                        ungroupings.extend(nested_ungroupings(stage, &turtle.name));
                        match next_input {
                            Some(next) => stage_input = next,
                            // later stages have no known input shape; left unexpanded
                            None => break,
                        }
                    }
                }
                QueryField::Field(atomic) => {
                    ungroupings.extend(atomic.ungroupings.iter().cloned());
                }
                QueryField::FieldRef(_) => {}
            }
        }
    }

    let usage = merge_field_usage([input.filter_usage().as_slice(), segment.field_usage()]);
    let expansion = expand_field_usage(&usage, &fields);
    expansion.ensure_complete()?;
    trace!(
        usage = expansion.result.len(),
        joins = expansion.active_joins.len(),
        "expanded segment"
    );

    ungroupings.extend(expansion.ungroupings);
    match &mut expanded {
        PipeSegment::Query(query) => {
            query.expanded_field_usage = Some(expansion.result);
            query.active_joins = Some(expansion.active_joins);
            query.expanded_ungroupings = Some(ungroupings);
        }
        PipeSegment::Index(index) => {
            index.expanded_field_usage = Some(expansion.result);
            index.active_joins = Some(expansion.active_joins);
            index.expanded_ungroupings = Some(ungroupings);
        }
        PipeSegment::Raw { .. } => {}
    }
    Ok(expanded)
}

/// Ungroupings of a nested stage, re-rooted under the view's name.
fn nested_ungroupings(stage: &PipeSegment, view: &str) -> Vec<AggregateUngrouping> {
    let expanded = match stage {
        PipeSegment::Query(q) => q.expanded_ungroupings.as_deref(),
        PipeSegment::Index(i) => i.expanded_ungroupings.as_deref(),
        PipeSegment::Raw { .. } => None,
    };
    expanded
        .unwrap_or_default()
        .iter()
        .cloned()
        .map(|mut u| {
            u.path.insert(0, view.to_string());
            u
        })
        .collect()
}
