//! In-memory reference engine for dataset pipelines
//!
//! [`LocalEngine`] evaluates a pruned pipeline graph over vectors of
//! [`Record`](dataplan_core::Record)s. Reads go through the readers of
//! `dataplan-readers`, so CSV and Parquet sources only parse the columns the
//! pipeline uses. With the `parallel` feature, record functions over large
//! inputs run on a rayon worker pool.

#![warn(missing_docs)]

mod aggregate;
mod config;
mod engine;
mod join;

pub use config::LocalEngineConfig;
pub use engine::{LocalEngine, Rows};
