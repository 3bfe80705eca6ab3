use thiserror::Error;

use crate::{AggregateId, Version};

/// Errors that can occur when interacting with the event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The expected version supplied with an append did not match the
    /// current length of the stream. Nothing was written.
    #[error(
        "Concurrency conflict on stream {category}-{aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        category: String,
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// The backend could not be reached or timed out.
    #[error("Event store unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),

    /// Any other database failure.
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The batch handed to `append` was malformed.
    #[error("Invalid append: {0}")]
    InvalidAppend(String),

    /// A textual stream name could not be parsed.
    #[error("Invalid stream name: {0}")]
    InvalidStreamName(String),
}

impl EventStoreError {
    /// Returns true for optimistic concurrency failures.
    ///
    /// These are the only failures where reloading the aggregate and
    /// re-running the business operation makes sense.
    pub fn is_conflict(&self) -> bool {
        matches!(self, EventStoreError::ConcurrencyConflict { .. })
    }

    /// Returns true when the backend could not be reached.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, EventStoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for EventStoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => EventStoreError::Unavailable(err),
            other => EventStoreError::Database(other),
        }
    }
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;
