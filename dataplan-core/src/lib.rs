//! Core data structures and analysis passes for lazy dataset pipelines
//!
//! A [`Pipeline`] is an arena of steps (reads, filters, maps, aggregations,
//! joins, limits) built without executing anything. Collecting a step runs
//! two passes over the graph: the [`FieldUsageCollector`] finds which fields
//! of each record type are read downstream, then the [`SchemaFieldsUpdater`]
//! prunes every step schema to those fields. An [`Engine`] finally translates
//! the pruned graph into its own datasets through a [`PipelineWalker`].

#![warn(missing_docs)]

pub mod aggregate;
pub mod engine;
pub mod error;
pub mod join;
pub mod pipeline;
pub mod plan;
pub mod schema;
pub mod step;
pub mod updater;
pub mod usage;
pub mod value;
pub mod walker;

// Re-export key types for convenience
pub use aggregate::{AggKind, AggregateSpec, Aggregation};
pub use engine::{CollectOptions, Engine, JoinInput, Records, StepContext};
pub use error::{Error, Result};
pub use join::{JoinDescriptor, JoinKind, JoinSource, JoinSpec};
pub use pipeline::{Pipeline, StepDescription};
pub use plan::CollectPlan;
pub use schema::{Column, DataType, Field, RecordType, Schema};
pub use step::{FieldUsage, Operation, Step, StepId, StepKind};
pub use updater::SchemaFieldsUpdater;
pub use usage::FieldUsageCollector;
pub use value::{Record, Value};
pub use walker::PipelineWalker;

/// User function types accepted by pipeline steps
pub mod functions {
    pub use crate::step::{AggregateFn, FlatMapFn, KeyFn, MapFn, PredicateFn};
}
