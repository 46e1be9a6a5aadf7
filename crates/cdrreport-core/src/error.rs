//! Error types for CdrReport

use chrono::NaiveDate;
use thiserror::Error;

/// Result type alias using CdrReport's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for CdrReport operations
#[derive(Error, Debug)]
pub enum Error {
    /// Input file is not in a format the reader can decode
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Date column value could not be coerced into a calendar date
    #[error("Date column could not be parsed at row {row}: {value:?}")]
    DateParse { row: usize, value: String },

    /// No records fall inside the requested date range
    #[error("No data found in the selected date range {from} to {to}")]
    EmptyRange { from: NaiveDate, to: NaiveDate },

    /// Report requested over an empty record batch
    #[error("No records to report on")]
    NoRecords,

    /// Catalog or argument validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Report generation was cancelled before completion
    #[error("Report generation cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// CSV decode/encode error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an unsupported format error
    pub fn unsupported_format(msg: impl Into<String>) -> Self {
        Self::UnsupportedFormat(msg.into())
    }
}
