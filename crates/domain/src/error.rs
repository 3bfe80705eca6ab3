//! Domain error types.

use common::AggregateId;
use event_store::EventStoreError;
use thiserror::Error;

use crate::order::OrderError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// A persisted event has no handler on the aggregate reading it.
    ///
    /// Indicates version skew between the code that wrote the stream and
    /// the code replaying it.
    #[error("Unsupported event type {event_type} in category {category}")]
    UnsupportedEvent {
        event_type: String,
        category: String,
    },

    /// An event or snapshot was handed to the wrong aggregate instance.
    #[error("Event for aggregate {actual} applied to aggregate {expected}")]
    AggregateMismatch {
        expected: AggregateId,
        actual: AggregateId,
    },

    /// An event key whose rendering does not parse back to itself.
    #[error("Invalid event key: {0}")]
    InvalidEventKey(String),

    /// An error occurred in the order aggregate.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Returns true if the failure was an optimistic concurrency conflict.
    ///
    /// Only these are worth answering with reload-and-retry.
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, DomainError::EventStore(e) if e.is_conflict())
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
