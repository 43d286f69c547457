//! Scored sets. Each `(key, value)` pair owns a deterministic record id, so
//! adding an existing member updates it in place instead of duplicating it.

use chrono::{DateTime, Utc};
use jobstore_core::{SetEntry, pair_key};
use serde::Deserialize;

use crate::{Database, DbError};

/// Repository for set entries.
pub struct SetRepository;

#[derive(Debug, Deserialize)]
struct SetRecord {
    key: String,
    value: String,
    score: f64,
    #[serde(default)]
    expire_at: Option<DateTime<Utc>>,
}

impl SetRepository {
    /// Insert the member or overwrite its score.
    pub async fn add(db: &Database, key: &str, value: &str, score: f64) -> Result<(), DbError> {
        db.query(
            "UPSERT type::thing('set_entry', $rid) SET key = $key, value = $value, score = $score RETURN NONE",
        )
        .bind(("rid", pair_key(key, value)))
        .bind(("key", key.to_string()))
        .bind(("value", value.to_string()))
        .bind(("score", score))
        .await?
        .check()?;

        Ok(())
    }

    /// Insert the member with score 0.0 if absent; an existing member keeps
    /// its score.
    pub async fn add_if_absent(db: &Database, key: &str, value: &str) -> Result<(), DbError> {
        db.query(
            "UPSERT type::thing('set_entry', $rid) SET key = $key, value = $value, score = score ?? 0.0 RETURN NONE",
        )
        .bind(("rid", pair_key(key, value)))
        .bind(("key", key.to_string()))
        .bind(("value", value.to_string()))
        .await?
        .check()?;

        Ok(())
    }

    /// Remove one member; no-op when absent.
    pub async fn remove(db: &Database, key: &str, value: &str) -> Result<(), DbError> {
        db.query("DELETE type::thing('set_entry', $rid)")
            .bind(("rid", pair_key(key, value)))
            .await?
            .check()?;

        Ok(())
    }

    /// All members of the set ordered by score, then value.
    pub async fn members(db: &Database, key: &str) -> Result<Vec<SetEntry>, DbError> {
        let mut result = db
            .query(
                "SELECT key, value, score, expire_at FROM set_entry WHERE key = $key ORDER BY score ASC, value ASC",
            )
            .bind(("key", key.to_string()))
            .await?;

        let records: Vec<SetRecord> = result.take(0)?;

        Ok(records
            .into_iter()
            .map(|r| SetEntry {
                key: r.key,
                value: r.value,
                score: r.score,
                expire_at: r.expire_at,
            })
            .collect())
    }
}
