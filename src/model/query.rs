//! Query pipeline segments, as handed over by the query builder.

use serde::{Deserialize, Serialize};

use super::field::{AtomicField, FieldDef, TurtleField};
use super::location::DocumentLocation;
use super::source::{FilterCondition, SourceDef};
use super::usage::{AggregateUngrouping, FieldUsage};

/// One stage of a query pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipeSegment {
    Query(QuerySegment),
    Index(IndexSegment),
    /// Raw SQL; carries no field usage.
    Raw { sql: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Reduce,
    Project,
    Partial,
}

/// A reduce/project/partial stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySegment {
    pub kind: QueryKind,
    #[serde(default)]
    pub query_fields: Vec<QueryField>,
    #[serde(default)]
    pub filter_list: Vec<FilterCondition>,
    /// Everything this stage (including nested views) references.
    #[serde(default)]
    pub field_usage: Vec<FieldUsage>,
    /// Fields declared by an `extend:` block inside the query.
    #[serde(default)]
    pub extend_source: Vec<FieldDef>,
    #[serde(default)]
    pub referenced_at: Option<DocumentLocation>,
    /// Output shape of this stage, when the builder computed it.
    #[serde(default)]
    pub output_struct: Option<Box<SourceDef>>,

    #[serde(default)]
    pub expanded_field_usage: Option<Vec<FieldUsage>>,
    #[serde(default)]
    pub active_joins: Option<Vec<ActiveJoin>>,
    #[serde(default)]
    pub expanded_ungroupings: Option<Vec<AggregateUngrouping>>,
}

/// An `index:` stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSegment {
    pub index_fields: Vec<FieldReference>,
    #[serde(default)]
    pub field_usage: Vec<FieldUsage>,
    #[serde(default)]
    pub referenced_at: Option<DocumentLocation>,

    #[serde(default)]
    pub expanded_field_usage: Option<Vec<FieldUsage>>,
    #[serde(default)]
    pub active_joins: Option<Vec<ActiveJoin>>,
    #[serde(default)]
    pub expanded_ungroupings: Option<Vec<AggregateUngrouping>>,
}

/// An entry in a query's field list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryField {
    /// `group_by: x` / `aggregate: m` naming an existing field.
    FieldRef(FieldReference),
    /// `nest:` of a view.
    Turtle(TurtleField),
    /// A field defined inline in the query.
    Field(AtomicField),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldReference {
    pub path: Vec<String>,
    #[serde(default)]
    pub at: Option<DocumentLocation>,
}

impl FieldReference {
    pub fn usage(&self) -> FieldUsage {
        FieldUsage {
            path: self.path.clone(),
            at: self.at.clone(),
            ..Default::default()
        }
    }
}

/// A join that has to be emitted, in dependency order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveJoin {
    pub path: Vec<String>,
    /// The join's ON condition reaches into one of its own joins.
    #[serde(default)]
    pub on_references_children: bool,
}

impl ActiveJoin {
    pub fn dotted_path(&self) -> String {
        self.path.join(".")
    }
}

impl PipeSegment {
    pub fn field_usage(&self) -> &[FieldUsage] {
        match self {
            PipeSegment::Query(q) => &q.field_usage,
            PipeSegment::Index(i) => &i.field_usage,
            PipeSegment::Raw { .. } => &[],
        }
    }

    pub fn as_query(&self) -> Option<&QuerySegment> {
        match self {
            PipeSegment::Query(q) => Some(q),
            _ => None,
        }
    }

    pub fn referenced_at(&self) -> Option<&DocumentLocation> {
        match self {
            PipeSegment::Query(q) => q.referenced_at.as_ref(),
            PipeSegment::Index(i) => i.referenced_at.as_ref(),
            PipeSegment::Raw { .. } => None,
        }
    }

    /// `extend:` fields of a query stage.
    pub fn extend_source(&self) -> &[FieldDef] {
        match self {
            PipeSegment::Query(q) => &q.extend_source,
            _ => &[],
        }
    }
}

impl QuerySegment {
    pub fn new(kind: QueryKind) -> Self {
        Self {
            kind,
            query_fields: Vec::new(),
            filter_list: Vec::new(),
            field_usage: Vec::new(),
            extend_source: Vec::new(),
            referenced_at: None,
            output_struct: None,
            expanded_field_usage: None,
            active_joins: None,
            expanded_ungroupings: None,
        }
    }

    pub fn reduce() -> Self {
        Self::new(QueryKind::Reduce)
    }

    pub fn project() -> Self {
        Self::new(QueryKind::Project)
    }

    /// Reference an existing field by dotted path (`group_by:`, `aggregate:`).
    pub fn field_ref(self, path: &str) -> Self {
        self.push_ref(path, None)
    }

    pub fn field_ref_at(self, path: &str, at: DocumentLocation) -> Self {
        self.push_ref(path, Some(at))
    }

    fn push_ref(mut self, path: &str, at: Option<DocumentLocation>) -> Self {
        let reference = FieldReference {
            path: path.split('.').map(String::from).collect(),
            at,
        };
        self.field_usage.push(reference.usage());
        self.query_fields.push(QueryField::FieldRef(reference));
        self
    }

    /// Define a field inline in the query.
    pub fn with_field(mut self, field: AtomicField) -> Self {
        self.field_usage.extend(field.field_usage.iter().cloned());
        self.query_fields.push(QueryField::Field(field));
        self
    }

    /// Nest a single-stage view; its usage is folded into this stage's.
    pub fn nest(mut self, name: impl Into<String>, nested: QuerySegment) -> Self {
        self.field_usage.extend(nested.field_usage.iter().cloned());
        self.query_fields.push(QueryField::Turtle(TurtleField {
            name: name.into(),
            as_name: None,
            access: Default::default(),
            pipeline: vec![PipeSegment::Query(nested)],
        }));
        self
    }

    pub fn with_filter(mut self, filter: FilterCondition) -> Self {
        self.field_usage.extend(filter.field_usage.iter().cloned());
        self.filter_list.push(filter);
        self
    }

    pub fn extend(mut self, field: FieldDef) -> Self {
        self.extend_source.push(field);
        self
    }

    pub fn at(mut self, at: DocumentLocation) -> Self {
        self.referenced_at = Some(at);
        self
    }

    pub fn into_segment(self) -> PipeSegment {
        PipeSegment::Query(self)
    }
}

impl IndexSegment {
    pub fn new(paths: &[&str]) -> Self {
        let index_fields: Vec<FieldReference> = paths
            .iter()
            .map(|p| FieldReference {
                path: p.split('.').map(String::from).collect(),
                at: None,
            })
            .collect();
        Self {
            field_usage: index_fields.iter().map(FieldReference::usage).collect(),
            index_fields,
            referenced_at: None,
            expanded_field_usage: None,
            active_joins: None,
            expanded_ungroupings: None,
        }
    }
}
