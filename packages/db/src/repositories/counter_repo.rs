//! Counters: append-only records summed at read time, periodically folded
//! into one aggregate record per key.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jobstore_core::next_ordered_id;
use serde::Deserialize;
use surrealdb::sql::Thing;

use super::{millis, record_key};
use crate::{Database, DbError};

/// Repository for counter records.
pub struct CounterRepository;

#[derive(Debug, Deserialize)]
struct CounterRecord {
    id: Thing,
    key: String,
    value: i64,
    #[serde(default)]
    expire_at: Option<DateTime<Utc>>,
}

/// Raw records of one key, ready to be folded.
#[derive(Debug, Default)]
struct Fold {
    ids: Vec<String>,
    sum: i64,
    expire_at: Option<DateTime<Utc>>,
}

impl Fold {
    /// Take one raw record in. The sum saturates instead of overflowing.
    fn add(&mut self, id: String, value: i64, expire_at: Option<DateTime<Utc>>) {
        self.ids.push(id);
        self.sum = self.sum.saturating_add(value);
        self.expire_at = self.expire_at.max(expire_at);
    }
}

impl CounterRepository {
    /// Append a counter record of `delta`, optionally expiring after `ttl`.
    pub async fn append(
        db: &Database,
        key: &str,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<(), DbError> {
        let id = next_ordered_id().to_string();

        let query = match ttl {
            Some(_) => {
                "CREATE type::thing('counter', $id) SET key = $key, value = $value, expire_at = time::now() + duration::from::millis($ttl_ms) RETURN NONE"
            }
            None => "CREATE type::thing('counter', $id) SET key = $key, value = $value RETURN NONE",
        };

        let mut request = db
            .query(query)
            .bind(("id", id))
            .bind(("key", key.to_string()))
            .bind(("value", delta));
        if let Some(ttl) = ttl {
            request = request.bind(("ttl_ms", millis(ttl)));
        }
        request.await?.check()?;

        Ok(())
    }

    /// Current value of the counter: raw records plus the folded aggregate.
    pub async fn total(db: &Database, key: &str) -> Result<i64, DbError> {
        let mut result = db
            .query(
                r#"
                RETURN math::sum((SELECT VALUE value FROM counter WHERE key = $key))
                    + math::sum((SELECT VALUE value FROM aggregated_counter WHERE key = $key));
                "#,
            )
            .bind(("key", key.to_string()))
            .await?;

        let total: Option<i64> = result.take(0)?;
        Ok(total.unwrap_or(0))
    }

    /// Fold up to `batch` raw counter records into their keys' aggregates.
    /// Returns the number of raw records removed.
    pub async fn aggregate(db: &Database, batch: usize) -> Result<usize, DbError> {
        let mut result = db
            .query("SELECT id, key, value, expire_at FROM counter ORDER BY id ASC LIMIT $batch")
            .bind(("batch", batch as i64))
            .await?;

        let records: Vec<CounterRecord> = result.take(0)?;
        if records.is_empty() {
            return Ok(0);
        }

        let mut folds: BTreeMap<String, Fold> = BTreeMap::new();
        for record in records {
            let id = record_key(&record.id);
            folds
                .entry(record.key)
                .or_default()
                .add(id, record.value, record.expire_at);
        }

        let mut removed = 0;
        for (key, fold) in folds {
            removed += fold.ids.len();
            Self::fold_into_aggregate(db, &key, fold).await?;
        }

        tracing::debug!("Aggregated {} counter records", removed);
        Ok(removed)
    }

    /// Add the fold to the aggregate and delete exactly the folded records,
    /// both inside one transaction so the total never double counts.
    async fn fold_into_aggregate(db: &Database, key: &str, fold: Fold) -> Result<(), DbError> {
        let extend_expiry = match fold.expire_at {
            Some(_) => {
                ", expire_at = IF expire_at = NONE OR expire_at < time::from::millis($expire_at_ms) THEN time::from::millis($expire_at_ms) ELSE expire_at END"
            }
            None => "",
        };

        let query = format!(
            r#"
            BEGIN TRANSACTION;
            UPSERT type::thing('aggregated_counter', $key) SET key = $key, value = (value ?? 0) + $sum{extend_expiry} RETURN NONE;
            DELETE counter WHERE record::id(id) INSIDE $ids;
            COMMIT TRANSACTION;
            "#
        );

        let mut request = db
            .query(query)
            .bind(("key", key.to_string()))
            .bind(("sum", fold.sum))
            .bind(("ids", fold.ids));
        if let Some(expire_at) = fold.expire_at {
            request = request.bind(("expire_at_ms", expire_at.timestamp_millis()));
        }
        request.await?.check()?;

        Ok(())
    }
}
