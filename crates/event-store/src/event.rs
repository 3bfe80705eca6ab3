use std::borrow::Cow;
use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::AggregateId;

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<EventId> for Uuid {
    fn from(id: EventId) -> Self {
        id.0
    }
}

/// Stream position of an aggregate, used for optimistic concurrency control.
///
/// Version 0 means "no events". The n-th event of a stream carries sequence
/// number n, so a stream's version always equals its length.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial version (0) for a new aggregate.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the first version (1) for the first event.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// Stable wire identity of an event type: owning entity, schema version and
/// action.
///
/// Rendered as `{entity}.v{version}.{action}` (e.g. `order.v1.created`).
/// The rendering is what gets stored as the event type, so it must never
/// change for an event that has already been persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    entity: Cow<'static, str>,
    version: u32,
    action: Cow<'static, str>,
}

impl EventKey {
    /// Declares an event key. Usable in `const` registration tables.
    pub const fn new(entity: &'static str, version: u32, action: &'static str) -> Self {
        Self {
            entity: Cow::Borrowed(entity),
            version,
            action: Cow::Borrowed(action),
        }
    }

    /// The entity the event belongs to.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// The event schema version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// The action name.
    pub fn action(&self) -> &str {
        &self.action
    }
}

impl std::fmt::Display for EventKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.v{}.{}", self.entity, self.version, self.action)
    }
}

/// Error returned when a string is not a valid `{entity}.v{version}.{action}`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid event key `{0}`: expected `{{entity}}.v{{version}}.{{action}}`")]
pub struct ParseEventKeyError(pub String);

impl FromStr for EventKey {
    type Err = ParseEventKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseEventKeyError(s.to_string());

        let mut parts = s.split('.');
        let (Some(entity), Some(version), Some(action), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        if entity.is_empty() || action.is_empty() {
            return Err(invalid());
        }

        let version = version
            .strip_prefix('v')
            .and_then(|v| v.parse::<u32>().ok())
            .ok_or_else(invalid)?;

        Ok(Self {
            entity: Cow::Owned(entity.to_string()),
            version,
            action: Cow::Owned(action.to_string()),
        })
    }
}

/// The persisted form of one domain event.
///
/// This is what a backing store writes and returns. `version` is the
/// sequence number inside the `(category, aggregate_id)` stream; it is
/// assigned by the store when the event is appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique identifier for this event.
    pub event_id: EventId,

    /// The rendered event key (e.g. `order.v1.created`).
    pub event_type: String,

    /// The stream family (e.g. `order`).
    pub category: String,

    /// The aggregate this event belongs to.
    pub aggregate_id: AggregateId,

    /// Sequence number of this event within its stream.
    pub version: Version,

    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,

    /// The event payload as JSON.
    pub payload: serde_json::Value,

    /// Cross-cutting data travelling with the event (tracing, correlation).
    pub metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelope {
    /// Creates a new event envelope builder.
    pub fn builder() -> EventEnvelopeBuilder {
        EventEnvelopeBuilder::default()
    }

    /// Returns true if this event belongs to the given stream.
    pub fn belongs_to(&self, category: &str, aggregate_id: AggregateId) -> bool {
        self.aggregate_id == aggregate_id && self.category == category
    }
}

/// Builder for constructing event envelopes.
#[derive(Debug, Default)]
pub struct EventEnvelopeBuilder {
    event_id: Option<EventId>,
    event_type: Option<String>,
    category: Option<String>,
    aggregate_id: Option<AggregateId>,
    version: Option<Version>,
    occurred_at: Option<DateTime<Utc>>,
    payload: Option<serde_json::Value>,
    metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelopeBuilder {
    /// Sets the event ID. If not set, a new ID will be generated.
    pub fn event_id(mut self, id: EventId) -> Self {
        self.event_id = Some(id);
        self
    }

    /// Sets the event type.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Sets the event type from a key.
    pub fn event_key(self, key: &EventKey) -> Self {
        self.event_type(key.to_string())
    }

    /// Sets the category.
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Sets the aggregate ID.
    pub fn aggregate_id(mut self, id: AggregateId) -> Self {
        self.aggregate_id = Some(id);
        self
    }

    /// Sets the version. Stores overwrite it on append; if not set,
    /// the initial version is used.
    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Sets the occurrence time. If not set, the current time will be used.
    pub fn occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self, serde_json::Error> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Adds a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Builds the event envelope.
    ///
    /// # Panics
    ///
    /// Panics if required fields (event_type, category, aggregate_id, payload)
    /// are not set.
    pub fn build(self) -> EventEnvelope {
        EventEnvelope {
            event_id: self.event_id.unwrap_or_default(),
            event_type: self.event_type.expect("event_type is required"),
            category: self.category.expect("category is required"),
            aggregate_id: self.aggregate_id.expect("aggregate_id is required"),
            version: self.version.unwrap_or_default(),
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
            payload: self.payload.expect("payload is required"),
            metadata: self.metadata,
        }
    }

    /// Tries to build the event envelope, returning None if required fields are missing.
    pub fn try_build(self) -> Option<EventEnvelope> {
        Some(EventEnvelope {
            event_id: self.event_id.unwrap_or_default(),
            event_type: self.event_type?,
            category: self.category?,
            aggregate_id: self.aggregate_id?,
            version: self.version.unwrap_or_default(),
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
            payload: self.payload?,
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_new_creates_unique_ids() {
        let id1 = EventId::new();
        let id2 = EventId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn version_ordering() {
        let v1 = Version::new(1);
        let v2 = Version::new(2);
        assert!(v1 < v2);
        assert_eq!(v1.next(), v2);
    }

    #[test]
    fn version_initial_and_first() {
        assert_eq!(Version::initial().as_i64(), 0);
        assert_eq!(Version::first().as_i64(), 1);
        assert_eq!(Version::initial().next(), Version::first());
    }

    #[test]
    fn event_key_renders_entity_version_action() {
        let key = EventKey::new("order", 1, "created");
        assert_eq!(key.to_string(), "order.v1.created");
        assert_eq!(key.entity(), "order");
        assert_eq!(key.version(), 1);
        assert_eq!(key.action(), "created");
    }

    #[test]
    fn event_key_parses_its_rendering() {
        let key = EventKey::new("order", 12, "product_added");
        let parsed: EventKey = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn event_key_rejects_malformed_strings() {
        for bad in [
            "",
            "order",
            "order.created",
            "order.1.created",
            "order.vx.created",
            ".v1.created",
            "order.v1.",
            "order.v1.created.extra",
        ] {
            assert!(bad.parse::<EventKey>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn event_envelope_builder() {
        let aggregate_id = AggregateId::new();
        let payload = serde_json::json!({"item": "test"});

        let envelope = EventEnvelope::builder()
            .event_key(&EventKey::new("order", 1, "created"))
            .category("order")
            .aggregate_id(aggregate_id)
            .payload_raw(payload.clone())
            .metadata("correlation_id", serde_json::json!("123"))
            .build();

        assert_eq!(envelope.event_type, "order.v1.created");
        assert_eq!(envelope.aggregate_id, aggregate_id);
        assert_eq!(envelope.category, "order");
        assert_eq!(envelope.version, Version::initial());
        assert_eq!(envelope.payload, payload);
        assert_eq!(
            envelope.metadata.get("correlation_id"),
            Some(&serde_json::json!("123"))
        );
        assert!(envelope.belongs_to("order", aggregate_id));
        assert!(!envelope.belongs_to("invoice", aggregate_id));
    }

    #[test]
    fn event_envelope_try_build_returns_none_on_missing_fields() {
        let result = EventEnvelope::builder().try_build();
        assert!(result.is_none());
    }
}
