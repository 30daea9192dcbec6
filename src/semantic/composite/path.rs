//! Helpers for comparing, re-rooting and formatting field paths and usage
//! lists.

use std::collections::HashSet;

use crate::model::{AggregateUngrouping, FieldUsage, RequiredGroupBy};

pub fn path_eq(a: &[String], b: &[String]) -> bool {
    a == b
}

/// Whether `path` starts with `prefix`.
pub fn path_begins(path: &[String], prefix: &[String]) -> bool {
    path.starts_with(prefix)
}

/// Prefix every usage's path with `join_path`.
pub fn joined_field_usage(join_path: &[String], usage: &[FieldUsage]) -> Vec<FieldUsage> {
    usage
        .iter()
        .map(|u| FieldUsage {
            path: [join_path, u.path.as_slice()].concat(),
            ..u.clone()
        })
        .collect()
}

pub fn joined_required_group_bys(
    join_path: &[String],
    required: &[RequiredGroupBy],
) -> Vec<RequiredGroupBy> {
    required
        .iter()
        .map(|r| RequiredGroupBy {
            path: [join_path, r.path.as_slice()].concat(),
            ..r.clone()
        })
        .collect()
}

/// Re-root ungroupings defined inside a join; they then belong to the
/// join's nest level.
pub fn joined_ungroupings(
    join_path: &[String],
    ungroupings: &[AggregateUngrouping],
) -> Vec<AggregateUngrouping> {
    ungroupings
        .iter()
        .map(|u| AggregateUngrouping {
            field_usage: joined_field_usage(join_path, &u.field_usage),
            requires_group_by: joined_required_group_bys(join_path, &u.requires_group_by),
            path: join_path.to_vec(),
            ..u.clone()
        })
        .collect()
}

/// Concatenate usage lists.
pub fn merge_field_usage<'a>(usages: impl IntoIterator<Item = &'a [FieldUsage]>) -> Vec<FieldUsage> {
    usages.into_iter().flatten().cloned().collect()
}

/// Usage in `a` whose path does not appear in `b`.
pub fn field_usage_difference(a: &[FieldUsage], b: &[FieldUsage]) -> Vec<FieldUsage> {
    let in_b: HashSet<&[String]> = b.iter().map(|u| u.path.as_slice()).collect();
    a.iter()
        .filter(|u| !in_b.contains(u.path.as_slice()))
        .cloned()
        .collect()
}

/// Distinct paths, first occurrence order.
pub fn dedup_paths<'a>(paths: impl IntoIterator<Item = &'a [String]>) -> Vec<&'a [String]> {
    let mut seen = HashSet::new();
    paths.into_iter().filter(|p| seen.insert(*p)).collect()
}

/// Distinct join paths (usage paths minus the field) that are non-empty.
pub fn field_usage_join_paths(usage: &[FieldUsage]) -> Vec<Vec<String>> {
    dedup_paths(usage.iter().map(|u| u.join_path()))
        .into_iter()
        .filter(|p| !p.is_empty())
        .map(<[String]>::to_vec)
        .collect()
}

fn count_field_usage(usage: &[FieldUsage]) -> usize {
    dedup_paths(usage.iter().map(|u| u.path.as_slice())).len()
}

pub fn is_empty_field_usage(usage: &[FieldUsage]) -> bool {
    count_field_usage(usage) == 0
}

pub fn field_usage_is_plural(usage: &[FieldUsage]) -> bool {
    count_field_usage(usage) > 1
}

/// `` `a.b` ``
pub fn format_path(path: &[String]) -> String {
    format!("`{}`", path.join("."))
}

/// Join already formatted items as `a`, `a and b` or `a, b, and c`.
pub fn comma_and_list(items: &[String], combinator: &str) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [a, b] => format!("{a} {combinator} {b}"),
        [init @ .., last] => format!("{}, {combinator} {last}", init.join(", ")),
    }
}

/// Format distinct paths as a list.
pub fn format_paths<'a>(paths: impl IntoIterator<Item = &'a [String]>, combinator: &str) -> String {
    let formatted: Vec<String> = dedup_paths(paths).into_iter().map(format_path).collect();
    comma_and_list(&formatted, combinator)
}

pub fn format_field_usages(usage: &[FieldUsage]) -> String {
    format_paths(usage.iter().map(|u| u.path.as_slice()), "and")
}

pub fn format_required_group_bys(required: &[RequiredGroupBy]) -> String {
    format_paths(required.iter().map(|r| r.path.as_slice()), "and/or")
}
