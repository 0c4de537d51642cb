//! Error types for the analytics pipeline.
//!
//! Structural parse failures carry enough context (row index, field
//! name, raw value) to diagnose the offending record. Precondition
//! failures (`InsufficientData`, `SchemaMismatch`) are raised before
//! any model fitting happens; they are never worked around silently.

use polars::error::PolarsError;
use thiserror::Error;

/// Errors that can occur while ingesting, aggregating, encoding or
/// modeling the source tables.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A monetary value could not be normalized into a decimal.
    #[error("malformed value at row {row}, field {field}: {value:?}")]
    MalformedValue {
        /// Zero-based row index within the source table.
        row: usize,
        /// Name of the offending field.
        field: String,
        /// The raw value as read from the source.
        value: String,
    },

    /// A date string did not match the `DD/MM/YYYY` convention.
    #[error("malformed date at row {row}, field {field}: {value:?}")]
    MalformedDate {
        /// Zero-based row index within the source table.
        row: usize,
        /// Name of the offending field.
        field: String,
        /// The raw value as read from the source.
        value: String,
    },

    /// A requested field is absent from the row schema.
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// An encoded matrix disagrees with the reference column schema.
    #[error("schema mismatch: expected {expected} columns, got {actual}")]
    SchemaMismatch {
        /// Column count of the reference schema.
        expected: usize,
        /// Column count actually produced.
        actual: usize,
    },

    /// Not enough observations to fit the requested model.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Underlying I/O failure while reading a source table.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the dataframe engine.
    #[error("dataframe error: {0}")]
    Frame(#[from] PolarsError),

    /// Error from a feature matrix of unexpected dimensions.
    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// Error raised by a model during fitting.
    #[error("model error: {0}")]
    Model(String),
}

/// Result type alias using [`PipelineError`].
pub type Result<T> = std::result::Result<T, PipelineError>;
