//! Append-only event store for event-sourced aggregates.
//!
//! Events live in streams keyed by `(category, aggregate_id)`. Appends are
//! checked against an expected stream version (optimistic concurrency),
//! sequence numbers are contiguous from 1, and at most one snapshot is kept
//! per stream. [`InMemoryEventStore`] and [`PostgresEventStore`] implement
//! the same [`EventStore`] contract.

pub mod config;
pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod snapshot;
pub mod store;
pub mod stream;

pub use common::AggregateId;
pub use config::StoreConfig;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, EventKey, ParseEventKeyError, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use query::EventQuery;
pub use snapshot::Snapshot;
pub use store::{AppendOptions, EventStore, EventStoreExt, EventStream};
pub use stream::StreamName;
