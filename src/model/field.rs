//! Field definitions: columns, computed fields, joins and named views.

use serde::{Deserialize, Serialize};

use super::expr::Expr;
use super::query::PipeSegment;
use super::source::SourceDef;
use super::usage::{AggregateUngrouping, FieldUsage, RequiredGroupBy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessModifier {
    #[default]
    Public,
    Internal,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtomicType {
    String,
    Number,
    Boolean,
    Date,
    Timestamp,
    Json,
}

/// How an expression behaves with respect to grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionType {
    #[default]
    Scalar,
    Aggregate,
    Analytic,
    UngroupedAggregate,
}

impl ExpressionType {
    pub fn is_scalar(self) -> bool {
        self == ExpressionType::Scalar
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinCardinality {
    One,
    Many,
    Cross,
}

/// A field in a source's schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldDef {
    Atomic(AtomicField),
    Join(JoinField),
    Turtle(TurtleField),
}

/// A column or computed (dimension/measure) field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicField {
    pub name: String,
    #[serde(default)]
    pub as_name: Option<String>,
    pub data_type: AtomicType,
    #[serde(default)]
    pub access: AccessModifier,
    #[serde(default)]
    pub expr: Option<Expr>,
    #[serde(default)]
    pub expression_type: ExpressionType,
    /// Placeholder on a composite source; the chosen input supplies the
    /// real definition.
    #[serde(default)]
    pub composite: bool,
    /// Fields the expression reads.
    #[serde(default)]
    pub field_usage: Vec<FieldUsage>,
    #[serde(default)]
    pub requires_group_by: Vec<RequiredGroupBy>,
    #[serde(default)]
    pub ungroupings: Vec<AggregateUngrouping>,
}

/// A join to another source, array or record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinField {
    pub name: String,
    #[serde(default)]
    pub as_name: Option<String>,
    #[serde(default)]
    pub access: AccessModifier,
    pub join: JoinCardinality,
    #[serde(default)]
    pub on_expression: Option<Expr>,
    /// Usage of the ON condition, rooted at the parent source.
    #[serde(default)]
    pub field_usage: Vec<FieldUsage>,
    pub target: JoinTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JoinTarget {
    Source(SourceDef),
    /// Repeated nested data; never composite.
    Array(Vec<FieldDef>),
    Record(Vec<FieldDef>),
}

/// A named query ("view") defined on a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurtleField {
    pub name: String,
    #[serde(default)]
    pub as_name: Option<String>,
    #[serde(default)]
    pub access: AccessModifier,
    pub pipeline: Vec<PipeSegment>,
}

impl FieldDef {
    /// A plain column.
    pub fn column(name: impl Into<String>, data_type: AtomicType) -> Self {
        FieldDef::Atomic(AtomicField::new(name, data_type))
    }

    /// A computed scalar field; its usage is taken from the expression.
    pub fn dimension(name: impl Into<String>, data_type: AtomicType, expr: Expr) -> Self {
        FieldDef::Atomic(AtomicField::computed(name, data_type, expr, ExpressionType::Scalar))
    }

    /// A computed aggregate field.
    pub fn measure(name: impl Into<String>, expr: Expr) -> Self {
        FieldDef::Atomic(AtomicField::computed(
            name,
            AtomicType::Number,
            expr,
            ExpressionType::Aggregate,
        ))
    }

    /// A placeholder field of a composite source.
    pub fn composite_field(name: impl Into<String>, data_type: AtomicType) -> Self {
        let mut field = AtomicField::new(name, data_type);
        field.composite = true;
        FieldDef::Atomic(field)
    }

    pub fn join_one(name: impl Into<String>, source: SourceDef, on: Option<Expr>) -> Self {
        FieldDef::Join(JoinField::new(name, JoinCardinality::One, source, on))
    }

    pub fn join_many(name: impl Into<String>, source: SourceDef, on: Option<Expr>) -> Self {
        FieldDef::Join(JoinField::new(name, JoinCardinality::Many, source, on))
    }

    pub fn view(name: impl Into<String>, pipeline: Vec<PipeSegment>) -> Self {
        FieldDef::Turtle(TurtleField {
            name: name.into(),
            as_name: None,
            access: AccessModifier::Public,
            pipeline,
        })
    }

    /// The name the field is referenced by (its alias when it has one).
    pub fn name(&self) -> &str {
        match self {
            FieldDef::Atomic(f) => f.as_name.as_deref().unwrap_or(&f.name),
            FieldDef::Join(f) => f.as_name.as_deref().unwrap_or(&f.name),
            FieldDef::Turtle(f) => f.as_name.as_deref().unwrap_or(&f.name),
        }
    }

    pub fn access(&self) -> AccessModifier {
        match self {
            FieldDef::Atomic(f) => f.access,
            FieldDef::Join(f) => f.access,
            FieldDef::Turtle(f) => f.access,
        }
    }

    pub fn is_private(&self) -> bool {
        self.access() == AccessModifier::Private
    }

    /// Placeholder fields and joins to composite sources.
    pub fn is_composite_field(&self) -> bool {
        match self {
            FieldDef::Atomic(f) => f.composite,
            FieldDef::Join(j) => j.source().is_some_and(SourceDef::is_composite),
            FieldDef::Turtle(_) => false,
        }
    }

    pub fn as_atomic(&self) -> Option<&AtomicField> {
        match self {
            FieldDef::Atomic(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_join(&self) -> Option<&JoinField> {
        match self {
            FieldDef::Join(j) => Some(j),
            _ => None,
        }
    }

    pub fn as_turtle(&self) -> Option<&TurtleField> {
        match self {
            FieldDef::Turtle(t) => Some(t),
            _ => None,
        }
    }

    /// Usage declared on the field: expression usage for atomic fields,
    /// ON-condition usage for joins.
    pub fn field_usage(&self) -> &[FieldUsage] {
        match self {
            FieldDef::Atomic(f) => &f.field_usage,
            FieldDef::Join(j) => &j.field_usage,
            FieldDef::Turtle(_) => &[],
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        let alias = Some(alias.into());
        match &mut self {
            FieldDef::Atomic(f) => f.as_name = alias,
            FieldDef::Join(f) => f.as_name = alias,
            FieldDef::Turtle(f) => f.as_name = alias,
        }
        self
    }

    pub fn private(mut self) -> Self {
        match &mut self {
            FieldDef::Atomic(f) => f.access = AccessModifier::Private,
            FieldDef::Join(f) => f.access = AccessModifier::Private,
            FieldDef::Turtle(f) => f.access = AccessModifier::Private,
        }
        self
    }

    /// Add `grouped_by` obligations (dotted paths) to an atomic field.
    pub fn requires_group_by(mut self, paths: &[&str]) -> Self {
        if let FieldDef::Atomic(f) = &mut self {
            f.requires_group_by
                .extend(paths.iter().map(|p| RequiredGroupBy::new(p.split('.'))));
        }
        self
    }

    pub fn with_ungrouping(mut self, ungrouping: AggregateUngrouping) -> Self {
        if let FieldDef::Atomic(f) = &mut self {
            f.ungroupings.push(ungrouping);
        }
        self
    }
}

impl AtomicField {
    pub fn new(name: impl Into<String>, data_type: AtomicType) -> Self {
        Self {
            name: name.into(),
            as_name: None,
            data_type,
            access: AccessModifier::Public,
            expr: None,
            expression_type: ExpressionType::Scalar,
            composite: false,
            field_usage: Vec::new(),
            requires_group_by: Vec::new(),
            ungroupings: Vec::new(),
        }
    }

    pub fn computed(
        name: impl Into<String>,
        data_type: AtomicType,
        expr: Expr,
        expression_type: ExpressionType,
    ) -> Self {
        let mut field = Self::new(name, data_type);
        field.field_usage = expr.field_usage();
        field.expr = Some(expr);
        field.expression_type = expression_type;
        field
    }

    pub fn name(&self) -> &str {
        self.as_name.as_deref().unwrap_or(&self.name)
    }
}

impl JoinField {
    /// Build a join; the ON condition's usage is recorded as coming from
    /// an ON expression.
    pub fn new(
        name: impl Into<String>,
        join: JoinCardinality,
        source: SourceDef,
        on: Option<Expr>,
    ) -> Self {
        let field_usage = on
            .as_ref()
            .map(|e| {
                e.field_usage()
                    .into_iter()
                    .map(FieldUsage::from_on_expression)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            name: name.into(),
            as_name: None,
            access: AccessModifier::Public,
            join,
            on_expression: on,
            field_usage,
            target: JoinTarget::Source(source),
        }
    }

    pub fn name(&self) -> &str {
        self.as_name.as_deref().unwrap_or(&self.name)
    }

    pub fn source(&self) -> Option<&SourceDef> {
        match &self.target {
            JoinTarget::Source(s) => Some(s),
            _ => None,
        }
    }

    pub fn fields(&self) -> &[FieldDef] {
        match &self.target {
            JoinTarget::Source(s) => &s.fields,
            JoinTarget::Array(fields) | JoinTarget::Record(fields) => fields,
        }
    }

    pub fn fields_mut(&mut self) -> &mut Vec<FieldDef> {
        match &mut self.target {
            JoinTarget::Source(s) => &mut s.fields,
            JoinTarget::Array(fields) | JoinTarget::Record(fields) => fields,
        }
    }
}
