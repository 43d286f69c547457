//! Job domain types: identity, state history and the state being recorded.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A state to be recorded against a job.
///
/// The store stamps the creation time when the state is appended, so this
/// only carries what the caller decides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    /// State name, e.g. `Enqueued`, `Processing`, `Succeeded`.
    pub name: String,
    /// Human-readable reason for the transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Opaque serialized state data.
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl JobState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: None,
            data: BTreeMap::new(),
        }
    }

    /// Set the reason for this transition.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attach one data entry.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// One appended entry of a job's state history. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    pub name: String,
    #[serde(default)]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

/// A persisted job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Serialized invocation, opaque to the storage core.
    pub invocation_data: String,
    /// Serialized arguments, opaque to the storage core.
    pub arguments: String,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// Name of the current state, mirrors the last state set as current.
    #[serde(default)]
    pub state_name: Option<String>,
    /// Append-only state history, oldest first.
    #[serde(default)]
    pub state_history: Vec<StateRecord>,
    /// Free-form job parameters.
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    /// When the job becomes eligible for removal.
    #[serde(default)]
    pub expire_at: Option<DateTime<Utc>>,
}

impl Job {
    /// The most recently appended state record, if any.
    pub fn last_state(&self) -> Option<&StateRecord> {
        self.state_history.last()
    }

    /// Look up a job parameter.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }
}
