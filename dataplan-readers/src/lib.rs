//! Record readers for the file locators of dataset pipelines
//!
//! Each reader produces [`Record`]s shaped exactly like the schema it is
//! given, which is usually a schema already pruned to the columns a pipeline
//! uses.

mod error;

pub mod common;

#[cfg(feature = "csv")]
pub mod csv;

#[cfg(feature = "parquet")]
pub mod parquet;

pub use common::{resolve_path, Projection, RecordReader};
pub use error::{Error, Result};

// Re-export core types
pub use dataplan_core::{Record, Schema, Value};
