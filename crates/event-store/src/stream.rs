use std::str::FromStr;

use crate::{AggregateId, EventStoreError};

/// Textual key of one aggregate stream: `{category}-{aggregate_id}`.
///
/// The canonical key is always the `(category, aggregate_id)` pair; this is
/// the rendering used when a stream has to be addressed by a single string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamName {
    category: String,
    aggregate_id: AggregateId,
}

impl StreamName {
    /// Creates the stream name for an aggregate.
    pub fn new(category: impl Into<String>, aggregate_id: AggregateId) -> Self {
        Self {
            category: category.into(),
            aggregate_id,
        }
    }

    /// The stream family.
    pub fn category(&self) -> &str {
        &self.category
    }

    /// The aggregate the stream belongs to.
    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }
}

impl std::fmt::Display for StreamName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.category, self.aggregate_id)
    }
}

/// Returns true if `category` can be embedded in a stream name.
pub fn is_valid_category(category: &str) -> bool {
    !category.is_empty() && !category.contains(|c: char| c == '-' || c.is_whitespace())
}

impl FromStr for StreamName {
    type Err = EventStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EventStoreError::InvalidStreamName(s.to_string());

        // The category may not contain '-', so the first one separates it
        // from the hyphenated UUID.
        let (category, id) = s.split_once('-').ok_or_else(invalid)?;
        if !is_valid_category(category) {
            return Err(invalid());
        }
        let aggregate_id = id.parse::<AggregateId>().map_err(|_| invalid())?;

        Ok(Self::new(category, aggregate_id))
    }
}
