//! Common utilities shared by the record readers

use std::path::PathBuf;

use dataplan_core::{Record, Schema};

use crate::error::{Error, Result};

/// Default number of records per batch
pub const DEFAULT_BATCH_SIZE: usize = 8192;

/// A source of records shaped by a schema
pub trait RecordReader {
    /// Schema of the records produced
    fn schema(&self) -> &Schema;

    /// Read up to `max_rows` records; `None` once the source is exhausted
    fn next_batch(&mut self, max_rows: usize) -> Result<Option<Vec<Record>>>;

    /// Read every remaining record
    fn read_all(&mut self) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(batch) = self.next_batch(DEFAULT_BATCH_SIZE)? {
            records.extend(batch);
        }
        Ok(records)
    }
}

/// Position of each schema column among the source columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    indices: Vec<Option<usize>>,
}

impl Projection {
    /// Match schema columns to source column names.
    ///
    /// A nullable column missing from the source reads as null; a missing
    /// required column is an error.
    pub fn from_names<S: AsRef<str>>(schema: &Schema, names: &[S]) -> Result<Self> {
        let indices = schema
            .columns()
            .iter()
            .map(|column| {
                let index = names.iter().position(|name| name.as_ref() == column.name);
                if index.is_none() && !column.nullable {
                    return Err(Error::Schema(format!(
                        "column `{}` of {} not found in source",
                        column.name,
                        schema.name()
                    )));
                }
                Ok(index)
            })
            .collect::<Result<_>>()?;
        Ok(Self { indices })
    }

    /// Source index of the `i`-th schema column
    pub fn source_index(&self, i: usize) -> Option<usize> {
        self.indices.get(i).copied().flatten()
    }

    /// Number of projected columns
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Check if no column is projected
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Turn an opaque file locator into a path
pub fn resolve_path(locator: &str) -> PathBuf {
    PathBuf::from(locator.strip_prefix("file://").unwrap_or(locator))
}
