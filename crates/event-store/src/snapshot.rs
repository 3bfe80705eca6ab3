use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};

use crate::{AggregateId, Version};

/// Folded state of the first `version` events of one stream.
///
/// A store keeps at most one snapshot per `(category, aggregate_id)`, the
/// one with the highest version. Saving is governed by
/// [`supersedes`](Snapshot::supersedes): a snapshot replaces the stored one
/// only if it is for the same stream and at least as recent. A delayed
/// writer never moves a stream's snapshot backwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub category: String,
    pub aggregate_id: AggregateId,

    /// Number of events folded into `state`.
    pub version: Version,

    /// Wall-clock time of capture. Informational only; recency is `version`.
    pub taken_at: DateTime<Utc>,

    pub state: serde_json::Value,
}

impl Snapshot {
    /// A snapshot of the stream at `version` holding an already serialized state.
    pub fn at(
        category: impl Into<String>,
        aggregate_id: AggregateId,
        version: Version,
        state: serde_json::Value,
    ) -> Self {
        Self {
            category: category.into(),
            aggregate_id,
            version,
            taken_at: Utc::now(),
            state,
        }
    }

    /// Serializes `state` as the stream's snapshot at `version`.
    pub fn capture<T: Serialize>(
        category: impl Into<String>,
        aggregate_id: AggregateId,
        version: Version,
        state: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::at(category, aggregate_id, version, serde_json::to_value(state)?))
    }

    /// Deserializes the captured state.
    pub fn restore<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.state)
    }

    pub fn belongs_to(&self, category: &str, aggregate_id: AggregateId) -> bool {
        self.aggregate_id == aggregate_id && self.category == category
    }

    /// Whether saving `self` should replace `stored`.
    ///
    /// Equal versions replace: the newer capture of the same fold wins.
    pub fn supersedes(&self, stored: &Snapshot) -> bool {
        stored.belongs_to(&self.category, self.aggregate_id) && self.version >= stored.version
    }
}
