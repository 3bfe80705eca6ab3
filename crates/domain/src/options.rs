//! Event-sourcing behaviour configured from environment variables.

use event_store::Version;

const DEFAULT_SNAPSHOT_FREQUENCY: u64 = 20;

/// Options shared by repositories.
///
/// Reads from environment variables:
/// - `EVENT_SOURCING_SNAPSHOT_FREQUENCY`: events between automatic snapshots,
///   `0` disables them (default: `20`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSourcingOptions {
    pub snapshot_frequency: u64,
}

impl EventSourcingOptions {
    /// Loads options from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            snapshot_frequency: std::env::var("EVENT_SOURCING_SNAPSHOT_FREQUENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_SNAPSHOT_FREQUENCY),
        }
    }

    /// Never snapshot automatically.
    pub fn without_snapshots() -> Self {
        Self {
            snapshot_frequency: 0,
        }
    }

    pub fn with_snapshot_frequency(mut self, frequency: u64) -> Self {
        self.snapshot_frequency = frequency;
        self
    }

    /// Whether a flush moving the stream from `before` to `after` crossed a
    /// snapshot boundary.
    pub fn should_snapshot(&self, before: Version, after: Version) -> bool {
        if self.snapshot_frequency == 0 || after <= before {
            return false;
        }
        let frequency = self.snapshot_frequency as i64;
        after.as_i64() / frequency > before.as_i64() / frequency
    }
}

impl Default for EventSourcingOptions {
    fn default() -> Self {
        Self {
            snapshot_frequency: DEFAULT_SNAPSHOT_FREQUENCY,
        }
    }
}
