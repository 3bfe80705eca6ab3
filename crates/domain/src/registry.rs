//! Registration table from rendered event keys to known event types.

use std::collections::HashMap;

use event_store::EventKey;

use crate::error::{DomainError, Result};
use crate::event::EventData;

/// Maps stored `event_type` strings back to the keys an aggregate handles.
///
/// Built once from [`EventData::KEYS`]; a persisted event whose type is not
/// in the table is rejected before its payload is looked at.
#[derive(Debug, Clone, Default)]
pub struct EventRegistry {
    keys: HashMap<String, EventKey>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry holding every key of `E`.
    pub fn of<E: EventData>() -> Result<Self> {
        let mut registry = Self::new();
        registry.register::<E>()?;
        Ok(registry)
    }

    /// Registers every key of `E`.
    pub fn register<E: EventData>(&mut self) -> Result<&mut Self> {
        for key in E::KEYS {
            self.register_key(key.clone())?;
        }
        Ok(self)
    }

    /// Registers a single key.
    ///
    /// The rendering must parse back to the same key, otherwise two keys
    /// could share one stored name.
    pub fn register_key(&mut self, key: EventKey) -> Result<()> {
        let rendered = key.to_string();
        match rendered.parse::<EventKey>() {
            Ok(parsed) if parsed == key => {}
            _ => return Err(DomainError::InvalidEventKey(rendered)),
        }
        self.keys.insert(rendered, key);
        Ok(())
    }

    /// Looks up a stored event type.
    pub fn resolve(&self, event_type: &str, category: &str) -> Result<&EventKey> {
        self.keys
            .get(event_type)
            .ok_or_else(|| DomainError::UnsupportedEvent {
                event_type: event_type.to_string(),
                category: category.to_string(),
            })
    }

    pub fn contains(&self, key: &EventKey) -> bool {
        self.keys.contains_key(&key.to_string())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
