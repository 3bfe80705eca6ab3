//! Loading and saving aggregates through an event store.

use std::marker::PhantomData;

use common::AggregateId;
use event_store::{
    AppendOptions, EventEnvelope, EventKey, EventQuery, EventStore, EventStoreError, Snapshot,
    Version,
};

use crate::aggregate::Aggregate;
use crate::error::{DomainError, Result};
use crate::event::DomainEvent;
use crate::options::EventSourcingOptions;
use crate::registry::EventRegistry;

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after the new events were applied and persisted.
    pub aggregate: A,

    /// The events that were raised and persisted.
    pub events: Vec<DomainEvent<A::Event>>,

    /// The stream version after the command.
    pub new_version: Version,
}

/// Reads and writes one aggregate type against an [`EventStore`].
///
/// The repository:
/// 1. Loads an aggregate from its snapshot and the events after it
/// 2. Rejects stored events the aggregate has no handler for
/// 3. Flushes pending events with the version the aggregate was loaded at
/// 4. Takes a snapshot when a flush crosses the configured frequency
pub struct Repository<S, A> {
    store: S,
    registry: EventRegistry,
    options: EventSourcingOptions,
    _phantom: PhantomData<fn() -> A>,
}

impl<S, A> Repository<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    /// Creates a repository with options read from the environment.
    pub fn new(store: S) -> Result<Self> {
        Self::with_options(store, EventSourcingOptions::from_env())
    }

    /// Creates a repository with the given options.
    ///
    /// Fails if the aggregate's category is not a valid stream family name
    /// or any key of its event type cannot be registered.
    pub fn with_options(store: S, options: EventSourcingOptions) -> Result<Self> {
        if !A::has_valid_category() {
            return Err(EventStoreError::InvalidStreamName(A::CATEGORY.to_string()).into());
        }
        Ok(Self {
            store,
            registry: EventRegistry::of::<A::Event>()?,
            options,
            _phantom: PhantomData,
        })
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    pub fn options(&self) -> &EventSourcingOptions {
        &self.options
    }

    /// Loads an aggregate from its latest snapshot plus the events after it.
    ///
    /// An aggregate without history comes back empty at version 0.
    #[tracing::instrument(skip(self), fields(category = A::CATEGORY))]
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A> {
        let mut aggregate = match self.store.load_snapshot(A::CATEGORY, aggregate_id).await? {
            Some(snapshot) => self.restore(aggregate_id, snapshot)?,
            None => A::with_id(aggregate_id),
        };

        let events = self
            .store
            .load_events_after(A::CATEGORY, aggregate_id, aggregate.version())
            .await?;
        self.replay_onto(&mut aggregate, events)?;

        Ok(aggregate)
    }

    /// Loads an aggregate by replaying its whole stream, ignoring snapshots.
    #[tracing::instrument(skip(self), fields(category = A::CATEGORY))]
    pub async fn load_full(&self, aggregate_id: AggregateId) -> Result<A> {
        let events = self.store.load_events(A::CATEGORY, aggregate_id).await?;
        let mut aggregate = A::with_id(aggregate_id);
        self.replay_onto(&mut aggregate, events)?;
        Ok(aggregate)
    }

    /// Loads an aggregate, returning None if its stream is empty.
    pub async fn load_existing(&self, aggregate_id: AggregateId) -> Result<Option<A>> {
        let aggregate = self.load(aggregate_id).await?;
        if aggregate.version() == Version::initial() {
            Ok(None)
        } else {
            Ok(Some(aggregate))
        }
    }

    /// Persists the aggregate's pending events.
    ///
    /// The append expects the stream to still be at the version the
    /// aggregate had before its pending events were raised. Pending events
    /// are only cleared once the store has accepted them, so on a
    /// concurrency conflict the aggregate is left untouched.
    ///
    /// Once the append is acknowledged the save has succeeded. A failed
    /// automatic snapshot is logged and counted but not returned.
    #[tracing::instrument(
        skip(self, aggregate),
        fields(category = A::CATEGORY, aggregate_id = %aggregate.id())
    )]
    pub async fn save(&self, aggregate: &mut A) -> Result<Version> {
        let pending = aggregate.pending_events();
        if pending.is_empty() {
            return Ok(aggregate.version());
        }

        let expected = Version::new(aggregate.version().as_i64() - pending.len() as i64);
        let envelopes = pending
            .iter()
            .map(|event| event.to_envelope(A::CATEGORY))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let new_version = self
            .store
            .append(envelopes, AppendOptions::expect_version(expected))
            .await?;
        let flushed = aggregate.get_and_clear_events();
        tracing::debug!(count = flushed.len(), version = %new_version, "aggregate saved");

        if self.options.should_snapshot(expected, new_version) {
            if let Err(e) = self.save_snapshot(aggregate).await {
                metrics::counter!("aggregate_snapshot_failures_total").increment(1);
                tracing::warn!(error = %e, version = %new_version, "automatic snapshot failed");
            }
        }

        Ok(new_version)
    }

    /// Loads an aggregate, runs `command` against it and saves the result.
    ///
    /// The command validates and raises events through the aggregate's own
    /// operations; if it fails nothing is persisted.
    #[tracing::instrument(skip(self, command), fields(category = A::CATEGORY))]
    pub async fn execute<F>(&self, aggregate_id: AggregateId, command: F) -> Result<CommandResult<A>>
    where
        F: FnOnce(&mut A) -> Result<()>,
    {
        let mut aggregate = self.load(aggregate_id).await?;
        command(&mut aggregate)?;

        let events = aggregate.pending_events().to_vec();
        let new_version = self.save(&mut aggregate).await?;

        Ok(CommandResult {
            aggregate,
            events,
            new_version,
        })
    }

    /// Like [`execute`](Self::execute), reloading and running the command
    /// again when the save loses a concurrency race.
    ///
    /// Gives up after `attempts` tries. Other failures are returned at once.
    pub async fn execute_with_retry<F>(
        &self,
        aggregate_id: AggregateId,
        attempts: usize,
        mut command: F,
    ) -> Result<CommandResult<A>>
    where
        F: FnMut(&mut A) -> Result<()>,
    {
        let mut attempt = 1;
        loop {
            match self.execute(aggregate_id, &mut command).await {
                Err(e) if e.is_concurrency_conflict() && attempt < attempts => {
                    tracing::debug!(%aggregate_id, attempt, "retrying after concurrency conflict");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Stores the aggregate's current state as the stream's snapshot.
    ///
    /// Pending events are not part of the snapshot; the recorded version is
    /// the aggregate's own.
    pub async fn save_snapshot(&self, aggregate: &A) -> Result<()> {
        let snapshot =
            Snapshot::capture(A::CATEGORY, aggregate.id(), aggregate.version(), aggregate)?;
        self.store.save_snapshot(snapshot).await?;
        tracing::debug!(aggregate_id = %aggregate.id(), version = %aggregate.version(), "snapshot saved");
        Ok(())
    }

    /// Returns the aggregate as of its latest snapshot, if there is one.
    pub async fn load_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<A>> {
        self.store
            .load_snapshot(A::CATEGORY, aggregate_id)
            .await?
            .map(|snapshot| self.restore(aggregate_id, snapshot))
            .transpose()
    }

    /// Every stored event with this key, across all categories, in store order.
    pub async fn search(&self, key: &EventKey) -> Result<Vec<DomainEvent<A::Event>>> {
        self.search_events(key, EventQuery::for_event_type(key.to_string()))
            .await
    }

    /// Every stored event with this key in one category, in store order.
    pub async fn search_in_category(
        &self,
        key: &EventKey,
        category: &str,
    ) -> Result<Vec<DomainEvent<A::Event>>> {
        self.search_events(
            key,
            EventQuery::for_event_type(key.to_string()).category(category),
        )
        .await
    }

    /// Decodes a stored event after checking its type is registered.
    ///
    /// The decoded payload must carry the same key as the stored
    /// `event_type`.
    pub fn decode(&self, envelope: EventEnvelope) -> Result<DomainEvent<A::Event>> {
        self.registry
            .resolve(&envelope.event_type, &envelope.category)?;
        let event_type = envelope.event_type.clone();
        let category = envelope.category.clone();

        let event = DomainEvent::<A::Event>::from_envelope(envelope)?;
        if event.event_type() != event_type {
            tracing::warn!(%event_type, payload_type = %event.event_type(), "stored type does not match payload");
            return Err(DomainError::UnsupportedEvent {
                event_type,
                category,
            });
        }
        Ok(event)
    }

    async fn search_events(
        &self,
        key: &EventKey,
        query: EventQuery,
    ) -> Result<Vec<DomainEvent<A::Event>>> {
        if !self.registry.contains(key) {
            return Err(DomainError::UnsupportedEvent {
                event_type: key.to_string(),
                category: A::CATEGORY.to_string(),
            });
        }

        self.store
            .search_events(query)
            .await?
            .into_iter()
            .map(|envelope| self.decode(envelope))
            .collect()
    }

    fn replay_onto(&self, aggregate: &mut A, events: Vec<EventEnvelope>) -> Result<()> {
        let count = events.len();
        for envelope in events {
            let event = self.decode(envelope)?;
            aggregate.replay(&event)?;
        }
        metrics::histogram!("aggregate_events_replayed").record(count as f64);
        Ok(())
    }

    fn restore(&self, aggregate_id: AggregateId, snapshot: Snapshot) -> Result<A> {
        if snapshot.aggregate_id != aggregate_id {
            return Err(DomainError::AggregateMismatch {
                expected: aggregate_id,
                actual: snapshot.aggregate_id,
            });
        }
        let aggregate: A = snapshot.restore()?;
        Ok(aggregate)
    }
}
