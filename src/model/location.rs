//! Source locations attached to field references and diagnostics.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A zero-based line/character position in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        self.line
            .cmp(&other.line)
            .then(self.character.cmp(&other.character))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

/// Where in a model document something was written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentLocation {
    pub url: String,
    pub range: Range,
}

impl DocumentLocation {
    pub fn new(url: impl Into<String>, range: Range) -> Self {
        Self {
            url: url.into(),
            range,
        }
    }

    /// A location spanning a single point.
    pub fn at(url: impl Into<String>, line: u32, character: u32) -> Self {
        let pos = Position::new(line, character);
        Self::new(url, Range { start: pos, end: pos })
    }
}

impl fmt::Display for DocumentLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.url,
            self.range.start.line + 1,
            self.range.start.character + 1
        )
    }
}

/// Order two optional locations by their start position.
///
/// A missing location sorts before any present one; the document url is
/// not considered.
pub fn compare_locations(a: Option<&DocumentLocation>, b: Option<&DocumentLocation>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.range.start.cmp(&b.range.start),
    }
}
