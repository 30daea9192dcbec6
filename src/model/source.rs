//! Source definitions: the queryable shapes a query runs against.

use serde::{Deserialize, Serialize};

use super::expr::Expr;
use super::field::{ExpressionType, FieldDef};
use super::usage::FieldUsage;

/// A queryable shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDef {
    pub name: String,
    #[serde(default)]
    pub connection: String,
    pub kind: SourceKind,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Source-level `where:` filters.
    #[serde(default)]
    pub filter_list: Vec<FilterCondition>,
    #[serde(default)]
    pub annotation: Option<Annotation>,
}

/// What a source node is: a concrete relation, a choice among candidate
/// sources, or a relation whose shape is selected by a static partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceKind {
    Plain(Relation),
    Composite(Vec<SourceDef>),
    PartitionComposite {
        relation: Relation,
        desc: PartitionCompositeDesc,
    },
}

/// The physical relation behind a non-composite source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Table { table_path: String },
    SqlSelect { select_sql: String },
    QuerySource { query_name: String },
    QueryResult,
    NestSource,
    Finalize,
}

impl Relation {
    /// Whether a source of this kind may appear on the right of a join.
    pub fn is_joinable(&self) -> bool {
        matches!(
            self,
            Relation::Table { .. } | Relation::SqlSelect { .. } | Relation::QuerySource { .. }
        )
    }
}

/// A source-level filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    /// Original filter text, for messages.
    #[serde(default)]
    pub code: String,
    pub expr: Expr,
    #[serde(default)]
    pub expression_type: ExpressionType,
    #[serde(default)]
    pub field_usage: Vec<FieldUsage>,
}

impl FilterCondition {
    /// A scalar filter; its usage is taken from the expression.
    pub fn new(expr: Expr) -> Self {
        Self {
            code: String::new(),
            field_usage: expr.field_usage(),
            expr,
            expression_type: ExpressionType::Scalar,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_expression_type(mut self, expression_type: ExpressionType) -> Self {
        self.expression_type = expression_type;
        self
    }
}

/// Descriptor of a partition composite: which partition to read is chosen
/// by the fields a query touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionCompositeDesc {
    /// Discriminator column that holds the partition id.
    pub partition_field: String,
    /// Partitions in declaration order; the first covering one wins.
    pub partitions: Vec<Partition>,
    /// Every field whose presence varies by partition.
    pub composite_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub id: String,
    pub fields: Vec<String>,
}

impl Partition {
    pub fn new(id: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            id: id.into(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// Documentation and tag notes attached to a source.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub block_notes: Vec<String>,
    #[serde(default)]
    pub inherits: Option<Box<Annotation>>,
}

impl Annotation {
    pub fn note(text: impl Into<String>) -> Self {
        Self {
            notes: vec![text.into()],
            ..Default::default()
        }
    }

    /// Layer `slice` on top of `base`; notes of `base` come first.
    pub fn compose(base: Option<&Annotation>, slice: Option<&Annotation>) -> Option<Annotation> {
        match (base, slice) {
            (None, slice) => slice.cloned(),
            (base, None) => base.cloned(),
            (Some(base), Some(slice)) => Some(Annotation {
                inherits: Annotation::compose(base.inherits.as_deref(), slice.inherits.as_deref())
                    .map(Box::new),
                notes: [base.notes.as_slice(), slice.notes.as_slice()].concat(),
                block_notes: [base.block_notes.as_slice(), slice.block_notes.as_slice()].concat(),
            }),
        }
    }
}

impl SourceDef {
    fn with_kind(name: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            name: name.into(),
            connection: String::new(),
            kind,
            fields: Vec::new(),
            filter_list: Vec::new(),
            annotation: None,
        }
    }

    pub fn table(name: impl Into<String>, table_path: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            SourceKind::Plain(Relation::Table {
                table_path: table_path.into(),
            }),
        )
    }

    pub fn relation(name: impl Into<String>, relation: Relation) -> Self {
        Self::with_kind(name, SourceKind::Plain(relation))
    }

    /// A composite over `sources`, tried in the given order.
    pub fn composite(name: impl Into<String>, sources: Vec<SourceDef>) -> Self {
        Self::with_kind(name, SourceKind::Composite(sources))
    }

    pub fn partitioned(
        name: impl Into<String>,
        table_path: impl Into<String>,
        desc: PartitionCompositeDesc,
    ) -> Self {
        Self::with_kind(
            name,
            SourceKind::PartitionComposite {
                relation: Relation::Table {
                    table_path: table_path.into(),
                },
                desc,
            },
        )
    }

    pub fn with_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = connection.into();
        self
    }

    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_fields(mut self, fields: impl IntoIterator<Item = FieldDef>) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn with_filter(mut self, filter: FilterCondition) -> Self {
        self.filter_list.push(filter);
        self
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotation = Some(annotation);
        self
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.kind, SourceKind::Composite(_))
    }

    pub fn is_partition_composite(&self) -> bool {
        matches!(self.kind, SourceKind::PartitionComposite { .. })
    }

    pub fn is_joinable(&self) -> bool {
        match &self.kind {
            SourceKind::Plain(relation) | SourceKind::PartitionComposite { relation, .. } => {
                relation.is_joinable()
            }
            SourceKind::Composite(_) => true,
        }
    }

    /// Look up a field by its reference name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Fields declared on this node itself rather than supplied by a
    /// composite input.
    pub fn non_composite_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| !f.is_composite_field())
    }

    /// Usage of every source-level filter, in filter order.
    pub fn filter_usage(&self) -> Vec<FieldUsage> {
        self.filter_list
            .iter()
            .flat_map(|f| f.field_usage.iter().cloned())
            .collect()
    }
}
