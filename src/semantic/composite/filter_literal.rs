//! Recognizes filter-expression literals that pin a field to one value.
//!
//! Only the literal forms matter here: `null`, `true`, `=false`, a single
//! number, a single exact string, a whole day for dates, and a full
//! timestamp. Ranges, lists, wildcards, relative moments (`today`,
//! `last 3 days`) and anything negated never pin a value.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::FilterDataType;

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^=?\s*-?\d+(\.\d+)?([eE][+-]?\d+)?$").unwrap());

static DAY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

/// Seconds are required; `2024-01-01 10:30` is a minute, not an instant.
static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}[ T]\d{2}:\d{2}:\d{2}(\.\d+)?$").unwrap()
});

/// Whether a filter of `data_type` written as `src` selects exactly one
/// value of the filtered field.
pub fn is_single_value_filter(data_type: FilterDataType, src: &str) -> bool {
    let src = src.trim();
    if src.eq_ignore_ascii_case("null") {
        return true;
    }
    match data_type {
        FilterDataType::Boolean => {
            let lower = src.to_ascii_lowercase();
            matches!(lower.as_str(), "true" | "=true" | "=false")
        }
        FilterDataType::Number => NUMBER.is_match(src),
        FilterDataType::String => is_exact_string(src),
        FilterDataType::Date => DAY.is_match(src),
        FilterDataType::Timestamp => TIMESTAMP.is_match(src),
    }
}

/// A single string value: no negation, no list, no wildcard, no keyword.
fn is_exact_string(src: &str) -> bool {
    if src.is_empty() || src.starts_with('-') {
        return false;
    }
    if src.eq_ignore_ascii_case("empty") {
        return false;
    }
    let mut escaped = false;
    for c in src.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            ',' | '%' | '_' => return false,
            _ => {}
        }
    }
    true
}
