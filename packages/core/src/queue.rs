//! Queue entry types: the records that make a job claimable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::JobId;

/// A job waiting in (or claimed from) a named queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Record id of the entry itself; ordering follows insertion.
    pub id: String,
    /// The job this entry refers to.
    pub job_id: JobId,
    /// Logical queue name.
    pub queue: String,
    /// When the entry was last claimed. `None` means claimable.
    #[serde(default)]
    pub fetched_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    /// Whether no dequeue currently holds this entry.
    pub fn is_claimable(&self) -> bool {
        self.fetched_at.is_none()
    }
}

/// Claimable vs claimed entry counts for a queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueCounts {
    /// Entries with no `fetched_at`.
    pub enqueued: u64,
    /// Entries currently claimed by some worker.
    pub fetched: u64,
}

impl QueueCounts {
    /// Total entries in the queue.
    pub fn total(&self) -> u64 {
        self.enqueued + self.fetched
    }
}
