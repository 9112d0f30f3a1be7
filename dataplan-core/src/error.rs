//! Error types for dataset pipelines

use std::io;
use thiserror::Error;

use crate::step::StepId;

/// Result type for dataset pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for dataset pipeline operations
#[derive(Error, Debug)]
pub enum Error {
    /// A step seed is not a structured record type
    #[error("Invalid seed: expecting a structured record type, got {0}")]
    InvalidSeed(String),

    /// A record type cannot be turned into a schema
    #[error("Malformed record type: {0}")]
    MalformedRecordType(String),

    /// An aggregation does not have the expected shape
    #[error("Invalid aggregate specification: {0}")]
    InvalidAggregateSpec(String),

    /// An aggregated field does not match the result type's declared order
    #[error("Unexpected field `{actual}` at index {index}, expected `{expected}`")]
    FieldOrderMismatch {
        /// Position of the offending entry
        index: usize,
        /// Field name declared by the result type at that position
        expected: String,
        /// Field name produced by the aggregation builder
        actual: String,
    },

    /// The aggregation only carries grouping keys
    #[error("No aggregations were specified")]
    EmptyAggregation,

    /// A join descriptor does not have the expected shape
    #[error("Invalid join spec: {0}")]
    InvalidJoinSpec(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A step id that is not part of the graph was referenced
    #[error("Unknown dataset step: {0}")]
    UnknownStep(StepId),

    /// The engine does not implement an operation
    #[error("`{operation}` not implemented for {engine}")]
    NotImplementedForEngine {
        /// Name of the engine
        engine: String,
        /// Name of the missing operation
        operation: String,
    },

    /// IO error while reading a source
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend execution error
    #[error("Execution error: {0}")]
    Execution(String),
}

impl Error {
    /// Build the error reported by engine operations left unimplemented
    pub fn not_implemented(engine: &str, operation: &str) -> Self {
        Error::NotImplementedForEngine {
            engine: engine.to_string(),
            operation: operation.to_string(),
        }
    }
}
