//! Keyed collection records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Member of a scored set. `(key, value)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetEntry {
    pub key: String,
    pub value: String,
    pub score: f64,
    #[serde(default)]
    pub expire_at: Option<DateTime<Utc>>,
}

/// Deterministic record key for a pair-unique entry.
///
/// The JSON array encoding is unambiguous for any pair of strings, so two
/// distinct pairs can never map to the same record.
pub fn pair_key(first: &str, second: &str) -> String {
    serde_json::Value::Array(vec![
        serde_json::Value::String(first.to_string()),
        serde_json::Value::String(second.to_string()),
    ])
    .to_string()
}
