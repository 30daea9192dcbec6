//! Expression tree for computed fields, join conditions and filters.
//!
//! Only the shapes the composite resolver inspects are modeled in detail:
//! field references, literals, comparisons, boolean connectives and filter
//! matches. Everything else is an opaque function call.

use serde::{Deserialize, Serialize};

use super::location::DocumentLocation;
use super::usage::FieldUsage;

// =============================================================================
// Core Expression Type
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Reference to a field, possibly through joins.
    Field {
        path: Vec<String>,
        #[serde(default)]
        at: Option<DocumentLocation>,
    },

    Literal(Literal),

    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    UnaryOp {
        op: UnaryOp,
        expr: Box<Expr>,
    },

    /// Parenthesized sub-expression.
    Paren(Box<Expr>),

    /// Function call (dialect expansion happens downstream).
    Function { name: String, args: Vec<Expr> },

    /// Aggregate call such as `sum(x)`.
    Aggregate { function: String, expr: Box<Expr> },

    /// `expr ~ f'...'`: match against a filter expression of the given type.
    FilterMatch {
        data_type: FilterDataType,
        expr: Box<Expr>,
        filter: FilterExpr,
    },
}

impl Expr {
    /// Field reference from a dotted path.
    pub fn field(path: &str) -> Self {
        Expr::Field {
            path: path.split('.').map(String::from).collect(),
            at: None,
        }
    }

    pub fn field_at(path: &str, at: DocumentLocation) -> Self {
        Expr::Field {
            path: path.split('.').map(String::from).collect(),
            at: Some(at),
        }
    }

    pub fn literal(lit: Literal) -> Self {
        Expr::Literal(lit)
    }

    pub fn int(value: i64) -> Self {
        Expr::Literal(Literal::Int(value))
    }

    pub fn float(value: f64) -> Self {
        Expr::Literal(Literal::Float(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::String(value.into()))
    }

    pub fn bool(value: bool) -> Self {
        Expr::Literal(Literal::Bool(value))
    }

    pub fn null() -> Self {
        Expr::Literal(Literal::Null)
    }

    pub fn date(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::Date(value.into()))
    }

    pub fn timestamp(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::Timestamp(value.into()))
    }

    pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.into(),
            args,
        }
    }

    pub fn aggregate(function: impl Into<String>, expr: Expr) -> Self {
        Expr::Aggregate {
            function: function.into(),
            expr: Box::new(expr),
        }
    }

    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, expr: Expr) -> Self {
        Expr::UnaryOp {
            op,
            expr: Box::new(expr),
        }
    }

    pub fn paren(self) -> Self {
        Expr::Paren(Box::new(self))
    }

    pub fn filter_match(self, data_type: FilterDataType, src: impl Into<String>) -> Self {
        Expr::FilterMatch {
            data_type,
            expr: Box::new(self),
            filter: FilterExpr::Literal(src.into()),
        }
    }

    // Comparison and logic shorthands

    pub fn eq(self, other: Expr) -> Self {
        Self::binary(self, BinaryOp::Eq, other)
    }

    pub fn ne(self, other: Expr) -> Self {
        Self::binary(self, BinaryOp::Ne, other)
    }

    pub fn lt(self, other: Expr) -> Self {
        Self::binary(self, BinaryOp::Lt, other)
    }

    pub fn gt(self, other: Expr) -> Self {
        Self::binary(self, BinaryOp::Gt, other)
    }

    pub fn lte(self, other: Expr) -> Self {
        Self::binary(self, BinaryOp::Lte, other)
    }

    pub fn gte(self, other: Expr) -> Self {
        Self::binary(self, BinaryOp::Gte, other)
    }

    pub fn and(self, other: Expr) -> Self {
        Self::binary(self, BinaryOp::And, other)
    }

    pub fn or(self, other: Expr) -> Self {
        Self::binary(self, BinaryOp::Or, other)
    }

    pub fn not(self) -> Self {
        Self::unary(UnaryOp::Not, self)
    }

    pub fn is_null(self) -> Self {
        Self::unary(UnaryOp::IsNull, self)
    }

    pub fn is_not_null(self) -> Self {
        Self::unary(UnaryOp::IsNotNull, self)
    }

    /// Date and timestamp literals.
    pub fn is_time_literal(&self) -> bool {
        matches!(
            self,
            Expr::Literal(Literal::Date(_)) | Expr::Literal(Literal::Timestamp(_))
        )
    }

    /// Visit this node and every descendant, parents before children.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Field { .. } | Expr::Literal(_) => {}
            Expr::BinaryOp { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::UnaryOp { expr, .. } | Expr::Paren(expr) | Expr::Aggregate { expr, .. } => {
                expr.walk(visit)
            }
            Expr::Function { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            Expr::FilterMatch { expr, .. } => expr.walk(visit),
        }
    }

    /// Every field this expression references, in walk order.
    pub fn field_usage(&self) -> Vec<FieldUsage> {
        let mut usage = Vec::new();
        self.walk(&mut |node| {
            if let Expr::Field { path, at } = node {
                usage.push(FieldUsage {
                    path: path.clone(),
                    at: at.clone(),
                    ..Default::default()
                });
            }
        });
        usage
    }
}

// =============================================================================
// Supporting types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Date: YYYY-MM-DD
    Date(String),
    /// Timestamp: YYYY-MM-DD HH:MM:SS
    Timestamp(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,

    // Comparison
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,

    // Logical
    And,
    Or,

    // Pattern matching
    Like,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    IsNull,
    IsNotNull,
}

/// The data type a filter expression is parsed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterDataType {
    String,
    Number,
    Boolean,
    Date,
    Timestamp,
}

/// Right-hand side of a filter match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterExpr {
    /// Filter expression source text, e.g. `2024-01-01` or `-null`.
    Literal(String),
    /// Filter supplied through a source parameter; not inspectable here.
    Parameter(String),
}
