//! Error types for pinsight-core

use thiserror::Error;

/// Main error type for the pinsight-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Event not found
    #[error("event not found: {0}")]
    EventNotFound(String),

    /// The event store could not be opened. Never carries the store location.
    #[error("event store unavailable: {0}")]
    StoreUnavailable(String),

    /// The summary could not be assembled. Carries the underlying cause.
    #[error("aggregation failed: {0}")]
    AggregationFailed(String),
}

impl Error {
    /// Collapse any error into the single failure kind reported by "get summary".
    pub fn into_aggregation_failure(self) -> Self {
        match self {
            Error::AggregationFailed(_) => self,
            other => Error::AggregationFailed(other.to_string()),
        }
    }
}

/// Result type alias for pinsight-core
pub type Result<T> = std::result::Result<T, Error>;
