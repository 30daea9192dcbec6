//! # Mantis Composite
//!
//! Composite source resolution for a semantic layer that compiles to SQL.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │            Query stage + source (model types)            │
//! │   (fields, joins, composites, partition composites)      │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [expand + nest levels]
//! ┌─────────────────────────────────────────────────────────┐
//! │       Expanded usage, join graph, group-by obligations   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [resolve]
//! ┌─────────────────────────────────────────────────────────┐
//! │     Narrowed source  ──or──  per-candidate failures      │
//! └─────────────────────────────────────────────────────────┘
//!                │                          │
//!                ▼ [segment]                ▼ [diagnostic]
//! ┌───────────────────────────┐  ┌──────────────────────────┐
//! │ Stage with active joins   │  │ One user-facing message  │
//! └───────────────────────────┘  └──────────────────────────┘
//! ```

pub mod config;
pub mod model;
pub mod semantic;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::config::{DiagnosticSettings, ResolverSettings, Settings};
    pub use crate::model::{
        AggregateUngrouping, AtomicType, DocumentLocation, Expr, FieldDef, FieldUsage,
        FilterCondition, IndexSegment, PipeSegment, QuerySegment, SourceDef, SourceKind,
    };
    pub use crate::semantic::composite::{
        check_required_group_bys, composite_error_diagnostic, expand_segment, log_composite_error,
        resolve_composite_sources, Diagnostic, LogSink, Resolver, TracingSink,
    };
    pub use crate::semantic::{CompositeError, CompositeResult};
}

pub use semantic::composite::{expand_segment, resolve_composite_sources, Resolver};
pub use semantic::{CompositeError, CompositeResult};
