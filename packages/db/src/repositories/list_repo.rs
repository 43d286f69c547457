//! Lists: insertion-ordered entries, duplicates allowed.

use std::ops::RangeInclusive;

use jobstore_core::next_ordered_id;
use serde::Deserialize;
use surrealdb::sql::Thing;

use super::record_key;
use crate::{Database, DbError};

/// Repository for list entries.
pub struct ListRepository;

#[derive(Debug, Deserialize)]
struct ListRecord {
    id: Thing,
    value: String,
}

/// Positions to keep when trimming a list of `len` entries to
/// `[start, end]`. `None` means nothing survives.
pub fn trim_window(len: usize, start: usize, end: usize) -> Option<RangeInclusive<usize>> {
    if len == 0 || start > end || start >= len {
        return None;
    }
    Some(start..=end.min(len - 1))
}

impl ListRepository {
    /// Append a value to the list.
    pub async fn insert(db: &Database, key: &str, value: &str) -> Result<(), DbError> {
        db.query(
            "CREATE type::thing('list_entry', $id) SET key = $key, value = $value, created_at = time::now() RETURN NONE",
        )
        .bind(("id", next_ordered_id().to_string()))
        .bind(("key", key.to_string()))
        .bind(("value", value.to_string()))
        .await?
        .check()?;

        Ok(())
    }

    /// Remove every occurrence of `value` from the list.
    pub async fn remove(db: &Database, key: &str, value: &str) -> Result<(), DbError> {
        db.query("DELETE list_entry WHERE key = $key AND value = $value")
            .bind(("key", key.to_string()))
            .bind(("value", value.to_string()))
            .await?
            .check()?;

        Ok(())
    }

    /// Keep only positions `[start, end]` of the list, deleting the rest.
    pub async fn trim(db: &Database, key: &str, start: usize, end: usize) -> Result<(), DbError> {
        let records = Self::records(db, key).await?;

        let keep = trim_window(records.len(), start, end);
        let doomed: Vec<String> = records
            .iter()
            .enumerate()
            .filter(|(position, _)| !keep.as_ref().is_some_and(|k| k.contains(position)))
            .map(|(_, r)| record_key(&r.id))
            .collect();

        if doomed.is_empty() {
            return Ok(());
        }

        tracing::debug!("Trimming {} entries from list {}", doomed.len(), key);

        db.query("DELETE list_entry WHERE key = $key AND record::id(id) INSIDE $ids")
            .bind(("key", key.to_string()))
            .bind(("ids", doomed))
            .await?
            .check()?;

        Ok(())
    }

    /// All values of the list in insertion order.
    pub async fn values(db: &Database, key: &str) -> Result<Vec<String>, DbError> {
        let records = Self::records(db, key).await?;
        Ok(records.into_iter().map(|r| r.value).collect())
    }

    async fn records(db: &Database, key: &str) -> Result<Vec<ListRecord>, DbError> {
        let mut result = db
            .query("SELECT id, value FROM list_entry WHERE key = $key ORDER BY id ASC")
            .bind(("key", key.to_string()))
            .await?;

        Ok(result.take(0)?)
    }
}
