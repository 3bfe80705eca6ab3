//! Core aggregate trait and the state every aggregate embeds.

use common::AggregateId;
use event_store::Version;
use event_store::stream::is_valid_category;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::audit::Audit;
use crate::error::{DomainError, Result};
use crate::event::{DomainEvent, EventData};

/// Identity, version, audit and the pending-event buffer of an aggregate.
///
/// Only the replay path in [`Aggregate`] moves the version or touches the
/// buffer. The buffer is never part of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct AggregateRoot<E> {
    id: AggregateId,
    version: Version,
    audit: Audit,
    #[serde(skip)]
    pending: Vec<DomainEvent<E>>,
}

impl<E> AggregateRoot<E> {
    /// Fresh state for `id`: version 0, inactive, nothing pending.
    pub fn new(id: AggregateId) -> Self {
        Self {
            id,
            version: Version::initial(),
            audit: Audit::default(),
            pending: Vec::new(),
        }
    }

    pub fn id(&self) -> AggregateId {
        self.id
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn audit(&self) -> &Audit {
        &self.audit
    }

    /// Events raised since the last flush, in raise order.
    pub fn pending(&self) -> &[DomainEvent<E>] {
        &self.pending
    }
}

/// Trait for aggregates in an event-sourced system.
///
/// An aggregate is a consistency boundary rebuilt by replaying its stream.
/// Business operations validate against current state and then raise
/// events with [`add_event`](Aggregate::add_event); `apply` is the only
/// place state changes, and it must be deterministic and infallible since
/// events record facts that already happened.
///
/// Implementations supply identity access and `apply`; everything else is
/// provided.
pub trait Aggregate: Serialize + DeserializeOwned + Send + Sync + Sized {
    /// The closed set of events this aggregate raises and replays.
    type Event: EventData;

    /// Stream family name. Non-empty, no `-`, no whitespace.
    const CATEGORY: &'static str;

    /// An empty aggregate at version 0.
    fn with_id(id: AggregateId) -> Self;

    fn root(&self) -> &AggregateRoot<Self::Event>;

    fn root_mut(&mut self) -> &mut AggregateRoot<Self::Event>;

    /// Folds one event into state.
    fn apply(&mut self, event: &DomainEvent<Self::Event>);

    fn id(&self) -> AggregateId {
        self.root().id()
    }

    fn version(&self) -> Version {
        self.root().version()
    }

    fn audit(&self) -> &Audit {
        self.root().audit()
    }

    fn pending_events(&self) -> &[DomainEvent<Self::Event>] {
        self.root().pending()
    }

    /// Applies a new event and buffers it for persistence.
    ///
    /// Fails without side effects if the event targets another aggregate.
    fn add_event(&mut self, event: DomainEvent<Self::Event>) -> Result<()> {
        self.replay(&event)?;
        self.root_mut().pending.push(event);
        Ok(())
    }

    /// Applies a historical event without buffering it.
    fn replay(&mut self, event: &DomainEvent<Self::Event>) -> Result<()> {
        let id = self.id();
        if event.aggregate_id() != id {
            return Err(DomainError::AggregateMismatch {
                expected: id,
                actual: event.aggregate_id(),
            });
        }

        self.apply(event);
        let root = self.root_mut();
        root.audit
            .record(event.data().audit_change(), event.occurred_at());
        root.version = root.version.next();
        Ok(())
    }

    /// Returns the buffered events and empties the buffer.
    fn get_and_clear_events(&mut self) -> Vec<DomainEvent<Self::Event>> {
        std::mem::take(&mut self.root_mut().pending)
    }

    /// Rebuilds an aggregate from its full history.
    fn rehydrate<I>(id: AggregateId, events: I) -> Result<Self>
    where
        I: IntoIterator<Item = DomainEvent<Self::Event>>,
    {
        let mut aggregate = Self::with_id(id);
        for event in events {
            aggregate.replay(&event)?;
        }
        Ok(aggregate)
    }

    /// Whether `CATEGORY` can be used as a stream family name.
    fn has_valid_category() -> bool {
        is_valid_category(Self::CATEGORY)
    }
}
