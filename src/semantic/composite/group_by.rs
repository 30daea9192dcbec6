//! Required-group-by checking.
//!
//! A computed field may declare that it is only meaningful when the query
//! groups by (or pins with a single-value filter) some other field. This
//! module walks a query's nest levels, expands every reference the same
//! way the usage expander does, and reports the obligations left
//! unsatisfied at each level.

use std::collections::HashSet;

use crate::model::{
    AggregateUngrouping, BinaryOp, DocumentLocation, Expr, FieldDef, FieldUsage, FilterExpr,
    Literal, PipeSegment, QueryField, RequiredGroupBy, SourceDef, UnaryOp, UniqueKeyRequirement,
};

use super::expand::join_field_usage;
use super::filter_literal::is_single_value_filter;
use super::namespace::{lookup, merge_fields};
use super::path::{joined_field_usage, joined_ungroupings};

/// Per-level bookkeeping for one query stage and its nested views.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NestLevels {
    /// `group_by:`/`aggregate:` references that name a field directly.
    pub fields_referenced_directly: Vec<FieldUsage>,
    pub fields_referenced: Vec<FieldUsage>,
    pub required_group_bys: Vec<RequiredGroupBy>,
    pub nested: Vec<NestLevels>,
    pub ungroupings: Vec<AggregateUngrouping>,
    /// Paths pinned to one value by a filter at this level.
    pub single_value_filters: Vec<Vec<String>>,
}

impl NestLevels {
    /// Attribute everything at and below this level to `at`.
    pub fn at(self, at: Option<&DocumentLocation>) -> Self {
        let Some(at) = at else {
            return self;
        };
        NestLevels {
            fields_referenced_directly: usage_at(self.fields_referenced_directly, Some(at)),
            fields_referenced: usage_at(self.fields_referenced, Some(at)),
            required_group_bys: required_group_bys_at(self.required_group_bys, Some(at)),
            nested: self.nested.into_iter().map(|n| n.at(Some(at))).collect(),
            ungroupings: ungroupings_at(self.ungroupings, Some(at)),
            single_value_filters: self.single_value_filters,
        }
    }
}

fn usage_at(usage: Vec<FieldUsage>, at: Option<&DocumentLocation>) -> Vec<FieldUsage> {
    match at {
        None => usage,
        Some(at) => usage
            .into_iter()
            .map(|u| FieldUsage {
                at: Some(at.clone()),
                ..u
            })
            .collect(),
    }
}

fn required_group_bys_at(
    required: Vec<RequiredGroupBy>,
    at: Option<&DocumentLocation>,
) -> Vec<RequiredGroupBy> {
    match at {
        None => required,
        Some(at) => required
            .into_iter()
            .map(|r| RequiredGroupBy {
                field_usage: r.field_usage.map(|u| FieldUsage {
                    at: Some(at.clone()),
                    ..u
                }),
                at: Some(at.clone()),
                ..r
            })
            .collect(),
    }
}

fn ungroupings_at(
    ungroupings: Vec<AggregateUngrouping>,
    at: Option<&DocumentLocation>,
) -> Vec<AggregateUngrouping> {
    match at {
        None => ungroupings,
        Some(at) => ungroupings
            .into_iter()
            .map(|u| AggregateUngrouping {
                field_usage: usage_at(u.field_usage, Some(at)),
                requires_group_by: required_group_bys_at(u.requires_group_by, Some(at)),
                at: Some(at.clone()),
                ..u
            })
            .collect(),
    }
}

/// Collect the nest levels of a pipeline stage.
///
/// Index and raw stages have no levels of their own and yield an empty
/// record.
pub fn extract_nest_levels(segment: &PipeSegment) -> NestLevels {
    let mut levels = NestLevels::default();
    let PipeSegment::Query(query) = segment else {
        return levels.at(segment.referenced_at());
    };

    for field in &query.query_fields {
        match field {
            QueryField::FieldRef(reference) => {
                let usage = reference.usage();
                levels.fields_referenced_directly.push(usage.clone());
                levels.fields_referenced.push(usage);
            }
            QueryField::Turtle(turtle) => {
                let Some(head) = turtle.pipeline.first() else {
                    continue;
                };
                let mut nested = extract_nest_levels(head);

                let needs_unique_key = nested
                    .fields_referenced
                    .iter()
                    .chain(head.field_usage())
                    .any(|u| u.unique_key_requirement.is_some());
                if needs_unique_key {
                    // the nested aggregate needs a unique row from this level
                    levels.fields_referenced.push(FieldUsage {
                        path: Vec::new(),
                        at: head.referenced_at().cloned(),
                        unique_key_requirement: Some(UniqueKeyRequirement { is_count: true }),
                        ..Default::default()
                    });
                }

                for u in &mut nested.ungroupings {
                    u.path.insert(0, turtle.name.clone());
                }
                levels.nested.push(nested.at(head.referenced_at()));
            }
            QueryField::Field(atomic) => {
                levels
                    .fields_referenced
                    .extend(atomic.field_usage.iter().cloned());
                levels.ungroupings.extend(atomic.ungroupings.iter().cloned());
                levels
                    .required_group_bys
                    .extend(atomic.requires_group_by.iter().cloned());
            }
        }
    }

    for filter in &query.filter_list {
        if !filter.expression_type.is_scalar() {
            continue;
        }
        levels
            .single_value_filters
            .extend(single_value_filter_fields(&filter.expr));
    }

    levels.at(query.referenced_at.as_ref())
}

/// Every field a filter pins to one value, looking through `and` and
/// parentheses.
pub fn single_value_filter_fields(filter: &Expr) -> Vec<Vec<String>> {
    match filter {
        Expr::BinaryOp {
            left,
            op: BinaryOp::And,
            right,
        } => {
            let mut paths = single_value_filter_fields(left);
            paths.extend(single_value_filter_fields(right));
            paths
        }
        Expr::Paren(inner) => single_value_filter_fields(inner),
        other => single_value_filter_path(other)
            .map(|p| vec![p.to_vec()])
            .unwrap_or_default(),
    }
}

fn single_value_filter_path(e: &Expr) -> Option<&[String]> {
    match e {
        Expr::BinaryOp {
            left,
            op: BinaryOp::Eq,
            right,
        } => match (left.as_ref(), right.as_ref()) {
            (
                Expr::Field { path, .. },
                Expr::Literal(
                    Literal::Bool(_)
                    | Literal::Int(_)
                    | Literal::Float(_)
                    | Literal::String(_)
                    | Literal::Date(_)
                    | Literal::Timestamp(_),
                ),
            ) => Some(path),
            _ => None,
        },
        Expr::UnaryOp {
            op: UnaryOp::IsNull,
            expr,
        } => match expr.as_ref() {
            Expr::Field { path, .. } => Some(path),
            _ => None,
        },
        Expr::FilterMatch {
            data_type,
            expr,
            filter: FilterExpr::Literal(src),
        } => match expr.as_ref() {
            Expr::Field { path, .. } if is_single_value_filter(*data_type, src) => Some(path),
            _ => None,
        },
        _ => None,
    }
}

/// Nest levels after every reference has been followed to its inputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpandedNestLevels {
    pub fields_referenced_directly: Vec<FieldUsage>,
    pub required_group_bys: Vec<RequiredGroupBy>,
    /// Obligations an ungrouping at this level makes impossible to meet.
    pub unsatisfiable_group_bys: Vec<RequiredGroupBy>,
    pub nested: Vec<ExpandedNestLevels>,
    pub single_value_filters: Vec<Vec<String>>,
    pub ungroupings: Vec<AggregateUngrouping>,
}

/// Follow every reference at each level, accumulating required group-bys.
///
/// Returns the expanded levels and any references that did not resolve.
pub fn expand_refs(
    nests: &NestLevels,
    fields: &[FieldDef],
) -> (ExpandedNestLevels, Vec<FieldUsage>) {
    let mut required_group_bys = nests.required_group_bys.clone();
    let mut all_ungroupings = nests.ungroupings.clone();
    let mut references = nests.fields_referenced.clone();
    let mut known: HashSet<Vec<String>> = references.iter().map(|u| u.path.clone()).collect();
    let mut join_paths_processed: HashSet<Vec<String>> = HashSet::new();
    let mut new_nests: Vec<NestLevels> = Vec::new();
    let mut missing_fields: Vec<FieldUsage> = Vec::new();

    let mut i = 0;
    while i < references.len() {
        let field = references[i].clone();
        i += 1;
        if field.path.is_empty() {
            continue;
        }
        let Some(def) = lookup(&field.path, fields) else {
            missing_fields.push(field);
            continue;
        };
        let join_path = field.join_path();
        let mut more: Vec<FieldUsage> = Vec::new();

        match def {
            FieldDef::Turtle(turtle) => {
                if let Some(head) = turtle.pipeline.first() {
                    let mut levels = extract_nest_levels(head);
                    for u in &mut levels.ungroupings {
                        u.path = field.path.clone();
                    }
                    new_nests.push(levels);
                }
            }
            FieldDef::Atomic(atomic) => {
                for required in &atomic.requires_group_by {
                    let path = [join_path, required.path.as_slice()].concat();
                    match lookup(&path, fields) {
                        None => {
                            missing_fields.push(field.clone());
                            continue;
                        }
                        Some(d) if d.is_composite_field() => continue,
                        Some(_) => {}
                    }
                    required_group_bys.push(RequiredGroupBy {
                        path,
                        at: field.at.clone(),
                        field_usage: Some(field.clone()),
                    });
                }
                all_ungroupings.extend(joined_ungroupings(
                    join_path,
                    &ungroupings_at(atomic.ungroupings.clone(), field.at.as_ref()),
                ));
                more.extend(usage_at(
                    joined_field_usage(join_path, &atomic.field_usage),
                    field.at.as_ref(),
                ));
            }
            FieldDef::Join(_) => {}
        }

        if field.path.len() > 1 && join_paths_processed.insert(join_path.to_vec()) {
            if let Some(FieldDef::Join(join)) = lookup(join_path, fields) {
                more.extend(usage_at(
                    join_field_usage(join, join_path),
                    field.at.as_ref(),
                ));
            }
        }

        for usage in more {
            if known.insert(usage.path.clone()) {
                references.push(usage);
            }
        }
    }

    let mut unsatisfiable_group_bys: Vec<RequiredGroupBy> = Vec::new();
    for ungrouping in &all_ungroupings {
        let inner = NestLevels {
            fields_referenced: ungrouping.field_usage.clone(),
            required_group_bys: ungrouping.requires_group_by.clone(),
            ..Default::default()
        };
        let (expanded, missing) = expand_refs(&inner, fields);
        missing_fields.extend(missing);
        unsatisfiable_group_bys.extend(
            expanded
                .required_group_bys
                .into_iter()
                .filter(|r| ungrouping.ungrouped_fields.covers(&r.path)),
        );
    }

    let mut nested = Vec::new();
    for level in nests.nested.iter().chain(new_nests.iter()) {
        let (expanded, missing) = expand_refs(level, fields);
        missing_fields.extend(missing);
        unsatisfiable_group_bys.extend(expanded.unsatisfiable_group_bys.iter().cloned());
        all_ungroupings.extend(expanded.ungroupings.iter().cloned());
        nested.push(expanded);
    }

    (
        ExpandedNestLevels {
            fields_referenced_directly: nests.fields_referenced_directly.clone(),
            required_group_bys,
            unsatisfiable_group_bys,
            nested,
            single_value_filters: nests.single_value_filters.clone(),
            ungroupings: all_ungroupings,
        },
        missing_fields,
    )
}

/// Obligations not met at `level` or any level below it.
///
/// A nested level's leftovers can still be met by the enclosing level.
pub fn unsatisfied_required_group_bys(level: &ExpandedNestLevels) -> Vec<RequiredGroupBy> {
    let satisfied: Vec<&[String]> = level
        .fields_referenced_directly
        .iter()
        .map(|u| u.path.as_slice())
        .chain(level.single_value_filters.iter().map(Vec::as_slice))
        .collect();

    let mut required = level.required_group_bys.clone();
    for nested in &level.nested {
        required.extend(unsatisfied_required_group_bys(nested));
    }
    required.retain(|r| !satisfied.contains(&r.path.as_slice()));
    required.extend(level.unsatisfiable_group_bys.iter().cloned());
    required
}

/// Expand `levels` against `fields` and report what is left unsatisfied,
/// without duplicates.
pub fn check_unsatisfied(levels: &NestLevels, fields: &[FieldDef]) -> Vec<RequiredGroupBy> {
    let (expanded, _) = expand_refs(levels, fields);
    let mut unsatisfied: Vec<RequiredGroupBy> = Vec::new();
    for required in unsatisfied_required_group_bys(&expanded) {
        if !unsatisfied.contains(&required) {
            unsatisfied.push(required);
        }
    }
    unsatisfied
}

/// Check a query stage against an already resolved source.
pub fn check_required_group_bys(
    resolved_source: &SourceDef,
    segment: &PipeSegment,
) -> Vec<RequiredGroupBy> {
    let nests = extract_nest_levels(segment);
    let fields = merge_fields(&[&resolved_source.fields, segment.extend_source()]);
    check_unsatisfied(&nests, &fields)
}
