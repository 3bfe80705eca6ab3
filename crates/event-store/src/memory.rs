use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventQuery, EventStoreError, Result, Snapshot, Version,
    store::{AppendOptions, EventStore, EventStream, assign_versions, validate_events_for_append},
};

type StreamKey = (String, AggregateId);

fn stream_key(category: &str, aggregate_id: AggregateId) -> StreamKey {
    (category.to_string(), aggregate_id)
}

#[derive(Default)]
struct Log {
    /// Every event in insertion order.
    events: Vec<EventEnvelope>,
    /// Current length of each stream.
    versions: HashMap<StreamKey, Version>,
}

impl Log {
    fn stream(&self, category: &str, aggregate_id: AggregateId) -> impl Iterator<Item = &EventEnvelope> {
        self.events
            .iter()
            .filter(move |e| e.belongs_to(category, aggregate_id))
    }
}

/// In-memory event store implementation for testing.
///
/// This implementation stores all events in memory and provides
/// the same interface as the PostgreSQL implementation. The version check
/// and the write happen under one lock, so concurrent appends to the same
/// stream are serialized.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    log: Arc<RwLock<Log>>,
    snapshots: Arc<RwLock<HashMap<StreamKey, Snapshot>>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.log.read().await.events.len()
    }

    /// Clears all events and snapshots.
    pub async fn clear(&self) {
        let mut log = self.log.write().await;
        log.events.clear();
        log.versions.clear();
        self.snapshots.write().await.clear();
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(
        &self,
        mut events: Vec<EventEnvelope>,
        options: AppendOptions,
    ) -> Result<Version> {
        validate_events_for_append(&events)?;

        let key = stream_key(&events[0].category, events[0].aggregate_id);
        let mut log = self.log.write().await;

        let current = log.versions.get(&key).copied().unwrap_or_default();

        if let Some(expected) = options.expected_version
            && current != expected
        {
            metrics::counter!("event_store_concurrency_conflicts_total").increment(1);
            tracing::warn!(
                category = %key.0,
                aggregate_id = %key.1,
                %expected,
                actual = %current,
                "append rejected: concurrency conflict"
            );
            return Err(EventStoreError::ConcurrencyConflict {
                category: key.0,
                aggregate_id: key.1,
                expected,
                actual: current,
            });
        }

        let count = events.len();
        let new_version = assign_versions(&mut events, current);
        log.events.extend(events);
        log.versions.insert(key, new_version);

        metrics::counter!("event_store_events_appended_total").increment(count as u64);
        tracing::debug!(count, version = %new_version, "events appended");

        Ok(new_version)
    }

    async fn load_events(
        &self,
        category: &str,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;
        Ok(log.stream(category, aggregate_id).cloned().collect())
    }

    async fn load_events_after(
        &self,
        category: &str,
        aggregate_id: AggregateId,
        after: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;
        Ok(log
            .stream(category, aggregate_id)
            .filter(|e| e.version > after)
            .cloned()
            .collect())
    }

    async fn count_events(&self, category: &str, aggregate_id: AggregateId) -> Result<u64> {
        let log = self.log.read().await;
        Ok(log.stream(category, aggregate_id).count() as u64)
    }

    async fn get_version(&self, category: &str, aggregate_id: AggregateId) -> Result<Version> {
        let log = self.log.read().await;
        Ok(log
            .versions
            .get(&stream_key(category, aggregate_id))
            .copied()
            .unwrap_or_default())
    }

    async fn search_events(&self, query: EventQuery) -> Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;
        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);

        Ok(log
            .events
            .iter()
            .filter(|e| query.matches(e))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::stream;

        let events = self.log.read().await.events.clone();
        let stream = stream::iter(events.into_iter().map(Ok));
        Ok(Box::pin(stream))
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        let mut snapshots = self.snapshots.write().await;
        let key = stream_key(&snapshot.category, snapshot.aggregate_id);

        let replace = snapshots
            .get(&key)
            .is_none_or(|existing| snapshot.supersedes(existing));
        if replace {
            snapshots.insert(key, snapshot);
            metrics::counter!("event_store_snapshots_saved_total").increment(1);
        }
        Ok(())
    }

    async fn load_snapshot(
        &self,
        category: &str,
        aggregate_id: AggregateId,
    ) -> Result<Option<Snapshot>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots.get(&stream_key(category, aggregate_id)).cloned())
    }
}
