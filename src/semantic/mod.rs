//! Semantic layer - composite source resolution.
//!
//! Sits between the query builder and SQL generation. A query stage is
//! resolved against its source in three phases:
//!
//! 1. **Resolve** - pick a concrete input for every composite the stage
//!    reaches ([`composite::resolve`])
//! 2. **Report** - when no input fits, explain why
//!    ([`composite::diagnostic`])
//! 3. **Annotate** - record expanded usage and join order on the stage
//!    ([`composite::segment`])

pub mod composite;
pub mod error;

pub use composite::{
    expand_segment, log_composite_error, resolve_composite_sources, Diagnostic, LogSink, Resolver,
    TracingSink,
};

pub use error::{CompositeError, CompositeFailure, CompositeIssue, CompositeResult};
