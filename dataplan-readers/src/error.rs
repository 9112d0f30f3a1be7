//! Error types for record readers

use thiserror::Error;

/// Error type for record readers
#[derive(Error, Debug)]
pub enum Error {
    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] dataplan_core::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV format error
    #[cfg(feature = "csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Parquet format error
    #[cfg(feature = "parquet")]
    #[error("Parquet error: {0}")]
    Parquet(String),

    /// JSON cell that does not parse
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Source columns do not fit the requested schema
    #[error("Schema error: {0}")]
    Schema(String),

    /// A cell does not parse as its column type
    #[error("Format error: {0}")]
    Format(String),
}

#[cfg(feature = "parquet")]
impl From<parquet::errors::ParquetError> for Error {
    fn from(err: parquet::errors::ParquetError) -> Self {
        Error::Parquet(err.to_string())
    }
}

impl From<Error> for dataplan_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Core(err) => err,
            Error::Io(err) => dataplan_core::Error::Io(err),
            Error::Json(err) => dataplan_core::Error::Serialization(err),
            other => dataplan_core::Error::Execution(other.to_string()),
        }
    }
}

/// Result type for record readers
pub type Result<T> = std::result::Result<T, Error>;
