//! Composite source resolution.
//!
//! A composite source is a choice among candidate sources that each supply
//! a subset of its fields; a partition composite is a single relation whose
//! available columns depend on a discriminator. Given the fields a query
//! stage uses, this module picks the concrete input for every composite it
//! reaches, and explains why when none fits.
//!
//! The pieces, in the order a query passes through them:
//!
//! - [`expand`] closes a usage list over computed fields, join filters and
//!   ON conditions, and orders the joins it crosses ([`join_graph`]).
//! - [`group_by`] collects each nest level's `grouped_by` obligations and
//!   reports which ones a candidate leaves unsatisfied.
//! - [`partition`] picks a partition of a partition composite.
//! - [`resolve`] runs the backtracking search over candidates and joins.
//! - [`diagnostic`] turns a failed search into one user-facing message.
//! - [`segment`] annotates the stage with expanded usage against the
//!   resolved source.

pub mod diagnostic;
pub mod expand;
pub mod filter_literal;
pub mod group_by;
pub mod join_graph;
pub mod namespace;
pub mod partition;
pub mod path;
pub mod resolve;
pub mod segment;

pub use diagnostic::{
    composite_error_diagnostic, log_composite_error, Diagnostic, LogSink, Severity, TracingSink,
};
pub use expand::{
    categorize_field_usage, expand_field_usage, join_field_usage, CategorizedFieldUsage,
    FieldUsageExpansion,
};
pub use filter_literal::is_single_value_filter;
pub use group_by::{
    check_required_group_bys, extract_nest_levels, single_value_filter_fields, NestLevels,
};
pub use join_graph::JoinGraph;
pub use namespace::{gen_root_fields, get_join_fields, merge_fields};
pub use partition::{partition_filter, select_partition, PartitionSpecError};
pub use resolve::{
    has_composites_anywhere, only_composite_usage, resolve_composite_sources, ResolvedSource,
    Resolver,
};
pub use segment::expand_segment;
