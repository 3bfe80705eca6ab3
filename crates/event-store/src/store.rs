use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::stream::is_valid_category;
use crate::{
    AggregateId, EventEnvelope, EventQuery, EventStoreError, Result, Snapshot, StreamName, Version,
};

/// Options for appending events to the store.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Expected length of the stream for optimistic concurrency control.
    /// If None, no version check is performed (last writer wins).
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    /// Creates options with no version check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options expecting the stream to be at a specific version.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Creates options expecting the stream to not exist yet.
    pub fn expect_new() -> Self {
        Self {
            expected_version: Some(Version::initial()),
        }
    }
}

/// A stream of events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Append-only event log keyed by `(category, aggregate_id)`.
///
/// This is the whole surface a backing store has to provide. Every method
/// is a suspension point; dropping the returned future cancels the call,
/// but an append the store has already acknowledged stays durable.
///
/// Stores never retry internally. Connectivity failures surface as
/// [`EventStoreError::Unavailable`], distinct from
/// [`EventStoreError::ConcurrencyConflict`].
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends events to one stream.
    ///
    /// The batch is atomic: either every event is written or none is.
    /// Sequence numbers are assigned by the store, continuing the stream
    /// without gaps; versions carried by the envelopes are ignored.
    /// If `options.expected_version` is set and differs from the current
    /// stream length the call fails with `ConcurrencyConflict`.
    ///
    /// Returns the stream version after the append.
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version>;

    /// Loads every event of a stream in sequence order.
    ///
    /// A stream that was never written is empty, not an error.
    async fn load_events(
        &self,
        category: &str,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>>;

    /// Loads the events of a stream with a sequence number strictly greater
    /// than `after`. Used to replay the tail behind a snapshot.
    async fn load_events_after(
        &self,
        category: &str,
        aggregate_id: AggregateId,
        after: Version,
    ) -> Result<Vec<EventEnvelope>>;

    /// Counts the events of a stream (0 if it does not exist).
    async fn count_events(&self, category: &str, aggregate_id: AggregateId) -> Result<u64>;

    /// Returns the current version of a stream. Always equal to
    /// [`count_events`](Self::count_events), but may be cheaper.
    async fn get_version(&self, category: &str, aggregate_id: AggregateId) -> Result<Version>;

    /// Retrieves events matching a query, across streams.
    async fn search_events(&self, query: EventQuery) -> Result<Vec<EventEnvelope>>;

    /// Streams all events in the store in insertion order.
    async fn stream_all_events(&self) -> Result<EventStream>;

    /// Saves a snapshot, replacing an older one for the same stream.
    ///
    /// A snapshot older than the one already stored is ignored.
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()>;

    /// Loads the latest snapshot of a stream, or None if there is none.
    async fn load_snapshot(
        &self,
        category: &str,
        aggregate_id: AggregateId,
    ) -> Result<Option<Snapshot>>;
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Appends a single event to its stream.
    async fn append_event(&self, event: EventEnvelope, options: AppendOptions) -> Result<Version> {
        self.append(vec![event], options).await
    }

    /// Checks if a stream has any events.
    async fn stream_exists(&self, category: &str, aggregate_id: AggregateId) -> Result<bool> {
        Ok(self.get_version(category, aggregate_id).await? > Version::initial())
    }

    /// Retrieves every event of the named stream.
    async fn search_stream(&self, stream: &StreamName) -> Result<Vec<EventEnvelope>> {
        self.search_events(EventQuery::for_stream(stream)).await
    }

    /// Retrieves every event of one type, across all categories.
    async fn search_by_type(&self, event_type: &str) -> Result<Vec<EventEnvelope>> {
        self.search_events(EventQuery::for_event_type(event_type))
            .await
    }

    /// Retrieves every event of one type within one category.
    async fn search_by_type_in_category(
        &self,
        event_type: &str,
        category: &str,
    ) -> Result<Vec<EventEnvelope>> {
        self.search_events(EventQuery::for_event_type(event_type).category(category))
            .await
    }

    /// Loads a stream's latest snapshot and the events recorded after it.
    ///
    /// Without a snapshot, returns None and the full stream.
    async fn load_stream(
        &self,
        category: &str,
        aggregate_id: AggregateId,
    ) -> Result<(Option<Snapshot>, Vec<EventEnvelope>)> {
        if let Some(snapshot) = self.load_snapshot(category, aggregate_id).await? {
            let events = self
                .load_events_after(category, aggregate_id, snapshot.version)
                .await?;
            Ok((Some(snapshot), events))
        } else {
            let events = self.load_events(category, aggregate_id).await?;
            Ok((None, events))
        }
    }
}

// Blanket implementation for all EventStore implementations
impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Validates a batch before appending.
///
/// A batch must be non-empty and target exactly one stream.
pub fn validate_events_for_append(events: &[EventEnvelope]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidAppend(
            "Cannot append empty event list".to_string(),
        ));
    };

    if !is_valid_category(&first.category) {
        return Err(EventStoreError::InvalidAppend(format!(
            "Invalid category {:?}",
            first.category
        )));
    }

    if events
        .iter()
        .skip(1)
        .any(|e| !e.belongs_to(&first.category, first.aggregate_id))
    {
        return Err(EventStoreError::InvalidAppend(
            "All events must belong to the same stream".to_string(),
        ));
    }

    Ok(())
}

/// Assigns consecutive sequence numbers after `current`.
///
/// Returns the stream version once the batch is written.
pub(crate) fn assign_versions(events: &mut [EventEnvelope], current: Version) -> Version {
    let mut version = current;
    for event in events.iter_mut() {
        version = version.next();
        event.version = version;
    }
    version
}
