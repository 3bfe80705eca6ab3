//! Domain events.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use common::AggregateId;
use event_store::{EventEnvelope, EventId, EventKey};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::audit::AuditChange;

/// The payload side of a domain event: one closed enum per aggregate.
///
/// Every variant declares a stable [`EventKey`]. `KEYS` is the explicit
/// registration table for the type and must list every key `key` can
/// return. The serialized form must carry the rendered key as its `type`
/// tag, e.g. with `#[serde(tag = "type", content = "data")]` and a
/// `#[serde(rename = "order.v1.created")]` per variant.
pub trait EventData:
    Serialize + DeserializeOwned + Clone + PartialEq + fmt::Debug + Send + Sync + 'static
{
    /// Every key this type can carry.
    const KEYS: &'static [EventKey];

    /// The key of this particular event.
    fn key(&self) -> EventKey;

    /// How this event changes the aggregate's audit trail.
    fn audit_change(&self) -> AuditChange {
        AuditChange::Untracked
    }
}

/// An immutable fact about one aggregate instance.
///
/// `event_id` and `occurred_at` are generated at construction and can be
/// overridden while the event is being built, as can the metadata map.
/// Once handed to an aggregate an event is never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent<D> {
    event_id: EventId,
    aggregate_id: AggregateId,
    occurred_at: DateTime<Utc>,
    metadata: HashMap<String, serde_json::Value>,
    data: D,
}

impl<D: EventData> DomainEvent<D> {
    /// Creates an event for `aggregate_id` with a fresh id and the current time.
    pub fn new(aggregate_id: AggregateId, data: D) -> Self {
        Self {
            event_id: EventId::new(),
            aggregate_id,
            // Stores keep microseconds; truncating here keeps replays exact.
            occurred_at: Utc::now().trunc_subsecs(6),
            metadata: HashMap::new(),
            data,
        }
    }

    /// Overrides the generated event id.
    pub fn with_event_id(mut self, event_id: EventId) -> Self {
        self.event_id = event_id;
        self
    }

    /// Overrides the occurrence time, truncated to microseconds like `new`.
    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at.trunc_subsecs(6);
        self
    }

    /// Adds a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn metadata(&self) -> &HashMap<String, serde_json::Value> {
        &self.metadata
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    /// The declared key of the payload.
    pub fn key(&self) -> EventKey {
        self.data.key()
    }

    /// The rendered key, as stored (e.g. `order.v1.created`).
    pub fn event_type(&self) -> String {
        self.key().to_string()
    }

    /// Builds the persisted form of this event for a stream in `category`.
    ///
    /// The version is left for the store to assign.
    pub fn to_envelope(&self, category: &str) -> Result<EventEnvelope, serde_json::Error> {
        Ok(EventEnvelope {
            event_id: self.event_id,
            event_type: self.event_type(),
            category: category.to_string(),
            aggregate_id: self.aggregate_id,
            version: Default::default(),
            occurred_at: self.occurred_at,
            payload: serde_json::to_value(&self.data)?,
            metadata: self.metadata.clone(),
        })
    }

    /// Rebuilds an event from its persisted form, keeping the original id,
    /// time and metadata.
    pub fn from_envelope(envelope: EventEnvelope) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_id: envelope.event_id,
            aggregate_id: envelope.aggregate_id,
            occurred_at: envelope.occurred_at,
            metadata: envelope.metadata,
            data: serde_json::from_value(envelope.payload)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", content = "data")]
    enum TestEvent {
        #[serde(rename = "test.v1.created")]
        Created { name: String },
        #[serde(rename = "test.v2.renamed")]
        Renamed { name: String },
    }

    impl EventData for TestEvent {
        const KEYS: &'static [EventKey] = &[
            EventKey::new("test", 1, "created"),
            EventKey::new("test", 2, "renamed"),
        ];

        fn key(&self) -> EventKey {
            match self {
                TestEvent::Created { .. } => Self::KEYS[0].clone(),
                TestEvent::Renamed { .. } => Self::KEYS[1].clone(),
            }
        }
    }

    #[test]
    fn new_event_gets_fresh_identity_and_time() {
        let id = AggregateId::new();
        let before = Utc::now();
        let a = DomainEvent::new(id, TestEvent::Created { name: "a".into() });
        let b = DomainEvent::new(id, TestEvent::Created { name: "a".into() });

        assert_ne!(a.event_id(), b.event_id());
        assert_eq!(a.aggregate_id(), id);
        assert!(a.occurred_at() >= before.trunc_subsecs(6));
        assert!(a.metadata().is_empty());
    }

    #[test]
    fn event_type_is_derived_from_the_key() {
        let event = DomainEvent::new(AggregateId::new(), TestEvent::Renamed { name: "b".into() });
        assert_eq!(event.event_type(), "test.v2.renamed");
        assert_eq!(event.key().version(), 2);
    }

    #[test]
    fn overrides_are_kept() {
        let event_id = EventId::new();
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let event = DomainEvent::new(AggregateId::new(), TestEvent::Created { name: "a".into() })
            .with_event_id(event_id)
            .with_occurred_at(at)
            .with_metadata("trace_id", serde_json::json!("abc"));

        assert_eq!(event.event_id(), event_id);
        assert_eq!(event.occurred_at(), at);
        assert_eq!(event.metadata()["trace_id"], serde_json::json!("abc"));
    }

    #[test]
    fn envelope_carries_everything_back() {
        let event = DomainEvent::new(AggregateId::new(), TestEvent::Created { name: "a".into() })
            .with_metadata("correlation_id", serde_json::json!("c-1"));

        let envelope = event.to_envelope("test").unwrap();
        assert_eq!(envelope.event_type, "test.v1.created");
        assert_eq!(envelope.category, "test");
        assert_eq!(envelope.payload["type"], "test.v1.created");

        let restored = DomainEvent::<TestEvent>::from_envelope(envelope).unwrap();
        assert_eq!(restored, event);
    }

    #[test]
    fn overridden_time_is_truncated_to_micros() {
        let at = Utc
            .with_ymd_and_hms(2024, 1, 2, 3, 4, 5)
            .unwrap()
            .with_nanosecond(123_456_789)
            .unwrap();
        let event = DomainEvent::new(AggregateId::new(), TestEvent::Created { name: "a".into() })
            .with_occurred_at(at);

        assert_eq!(event.occurred_at().nanosecond(), 123_456_000);
    }
}
