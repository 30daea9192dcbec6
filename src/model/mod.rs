//! Schema and query model consumed by the composite resolver.
//!
//! These types are produced by the model builder upstream. The resolver
//! reads them and builds new `SourceDef` values; it never mutates its
//! inputs.

pub mod expr;
pub mod field;
pub mod location;
pub mod query;
pub mod source;
pub mod usage;

pub use expr::{BinaryOp, Expr, FilterDataType, FilterExpr, Literal, UnaryOp};
pub use field::{
    AccessModifier, AtomicField, AtomicType, ExpressionType, FieldDef, JoinCardinality, JoinField,
    JoinTarget, TurtleField,
};
pub use location::{compare_locations, DocumentLocation, Position, Range};
pub use query::{
    ActiveJoin, FieldReference, IndexSegment, PipeSegment, QueryField, QueryKind, QuerySegment,
};
pub use source::{
    Annotation, FilterCondition, Partition, PartitionCompositeDesc, Relation, SourceDef,
    SourceKind,
};
pub use usage::{
    AggregateUngrouping, FieldUsage, RequiredGroupBy, UngroupedFields, UniqueKeyRequirement,
};
