//! Timing configuration for the storage engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::StorageError;

/// Configuration for queue and maintenance behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    /// How long a fetched entry stays invisible before it can be reclaimed (milliseconds).
    pub invisibility_timeout_ms: u64,
    /// Sleep between claim attempts while dequeuing (milliseconds).
    pub queue_poll_interval_ms: u64,
    /// How often the signal listener checks for new signals (milliseconds).
    pub signal_poll_interval_ms: u64,
    /// How often expired records are removed (milliseconds).
    pub expiration_check_interval_ms: u64,
    /// How often raw counter records are folded into aggregates (milliseconds).
    pub counters_aggregate_interval_ms: u64,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            invisibility_timeout_ms: 30 * 60 * 1000,
            queue_poll_interval_ms: 15_000,
            signal_poll_interval_ms: 100,
            expiration_check_interval_ms: 60 * 60 * 1000,
            counters_aggregate_interval_ms: 5 * 60 * 1000,
        }
    }
}

impl StorageOptions {
    pub fn invisibility_timeout(&self) -> Duration {
        Duration::from_millis(self.invisibility_timeout_ms)
    }

    pub fn queue_poll_interval(&self) -> Duration {
        Duration::from_millis(self.queue_poll_interval_ms)
    }

    pub fn signal_poll_interval(&self) -> Duration {
        Duration::from_millis(self.signal_poll_interval_ms)
    }

    pub fn expiration_check_interval(&self) -> Duration {
        Duration::from_millis(self.expiration_check_interval_ms)
    }

    pub fn counters_aggregate_interval(&self) -> Duration {
        Duration::from_millis(self.counters_aggregate_interval_ms)
    }

    /// Set the invisibility timeout.
    pub fn with_invisibility_timeout(mut self, timeout: Duration) -> Self {
        self.invisibility_timeout_ms = as_millis(timeout);
        self
    }

    /// Set the dequeue poll interval.
    pub fn with_queue_poll_interval(mut self, interval: Duration) -> Self {
        self.queue_poll_interval_ms = as_millis(interval);
        self
    }

    /// Set the signal listener poll interval.
    pub fn with_signal_poll_interval(mut self, interval: Duration) -> Self {
        self.signal_poll_interval_ms = as_millis(interval);
        self
    }

    /// Set the expiration sweep interval.
    pub fn with_expiration_check_interval(mut self, interval: Duration) -> Self {
        self.expiration_check_interval_ms = as_millis(interval);
        self
    }

    /// Set the counter aggregation interval.
    pub fn with_counters_aggregate_interval(mut self, interval: Duration) -> Self {
        self.counters_aggregate_interval_ms = as_millis(interval);
        self
    }

    /// Reject zero durations; a zero poll interval would spin.
    pub fn validate(&self) -> Result<(), StorageError> {
        let checks = [
            (self.invisibility_timeout_ms, "invisibility_timeout"),
            (self.queue_poll_interval_ms, "queue_poll_interval"),
            (self.signal_poll_interval_ms, "signal_poll_interval"),
            (self.expiration_check_interval_ms, "expiration_check_interval"),
            (self.counters_aggregate_interval_ms, "counters_aggregate_interval"),
        ];
        for (value, name) in checks {
            if value == 0 {
                return Err(StorageError::argument(name, "must be greater than zero"));
            }
        }
        Ok(())
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
