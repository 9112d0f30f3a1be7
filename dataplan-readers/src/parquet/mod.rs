//! Parquet record reader
//!
//! The file schema is projected onto the requested (possibly pruned) schema
//! before any row is decoded, so unused columns and unused fields of nested
//! groups are never read.

mod reader;
mod schema;

pub use reader::ParquetRecordReader;
pub use schema::project;
