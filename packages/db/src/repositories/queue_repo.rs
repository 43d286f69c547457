//! Queue entry repository: insert, atomic claim, release and the read-side
//! projections used for monitoring.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jobstore_core::{JobId, QueueCounts, QueueEntry, next_ordered_id};
use serde::Deserialize;
use surrealdb::sql::Thing;

use super::{millis, record_key};
use crate::{Database, DbError};

/// Repository for queue entry persistence operations.
pub struct QueueEntryRepository;

/// Internal record type for SurrealDB reads.
#[derive(Debug, Deserialize)]
struct QueueEntryRecord {
    id: Thing,
    job_id: String,
    queue: String,
    #[serde(default)]
    fetched_at: Option<DateTime<Utc>>,
}

impl QueueEntryRecord {
    fn into_entry(self) -> Result<QueueEntry, DbError> {
        let job_id = JobId::parse(&self.job_id).map_err(|e| {
            DbError::Serialization(format!("invalid job id {}: {}", self.job_id, e))
        })?;
        Ok(QueueEntry {
            id: record_key(&self.id),
            job_id,
            queue: self.queue,
            fetched_at: self.fetched_at,
        })
    }
}

/// Finds the oldest entry of the queue that is unclaimed or whose claim went
/// stale, and stamps it in the same statement. The `WHERE` on the `UPDATE`
/// re-checks the predicate against the record being written, so a concurrent
/// claim that got there first turns this one into a no-op.
const CLAIM_QUERY: &str = r#"
UPDATE (
    SELECT VALUE id FROM queue_entry
    WHERE queue = $queue
        AND (fetched_at = NONE OR fetched_at < time::now() - duration::from::millis($timeout_ms))
    ORDER BY id ASC
    LIMIT 1
)
SET fetched_at = time::now()
WHERE fetched_at = NONE OR fetched_at < time::now() - duration::from::millis($timeout_ms)
RETURN AFTER
"#;

impl QueueEntryRepository {
    /// Append a claimable entry for the job. Returns the entry id.
    pub async fn insert(db: &Database, queue: &str, job_id: JobId) -> Result<String, DbError> {
        let id = next_ordered_id().to_string();

        db.query(
            "CREATE type::thing('queue_entry', $id) SET job_id = $job_id, queue = $queue, created_at = time::now() RETURN NONE",
        )
        .bind(("id", id.clone()))
        .bind(("job_id", job_id.to_string()))
        .bind(("queue", queue.to_string()))
        .await?
        .check()?;

        Ok(id)
    }

    /// Atomically claim one entry of `queue`, reclaiming entries fetched
    /// longer than `invisibility_timeout` ago.
    pub async fn claim(
        db: &Database,
        queue: &str,
        invisibility_timeout: Duration,
    ) -> Result<Option<QueueEntry>, DbError> {
        let claimed: Result<Vec<QueueEntryRecord>, DbError> = async {
            let mut result = db
                .query(CLAIM_QUERY)
                .bind(("queue", queue.to_string()))
                .bind(("timeout_ms", millis(invisibility_timeout)))
                .await?;
            Ok(result.take(0)?)
        }
        .await;

        // Losing a race to another claim is the same as finding nothing
        let records = match claimed {
            Err(e) if e.is_conflict() => {
                tracing::debug!("Claim on {} lost to a concurrent claim", queue);
                return Ok(None);
            }
            other => other?,
        };

        records
            .into_iter()
            .next()
            .map(QueueEntryRecord::into_entry)
            .transpose()
    }

    /// Get an entry by id.
    pub async fn get(db: &Database, id: &str) -> Result<Option<QueueEntry>, DbError> {
        let mut result = db
            .query("SELECT * FROM type::thing('queue_entry', $id)")
            .bind(("id", id.to_string()))
            .await?;

        let records: Vec<QueueEntryRecord> = result.take(0)?;

        records
            .into_iter()
            .next()
            .map(QueueEntryRecord::into_entry)
            .transpose()
    }

    /// Remove the entry; the job will not be delivered again.
    pub async fn delete(db: &Database, id: &str) -> Result<(), DbError> {
        db.query("DELETE type::thing('queue_entry', $id)")
            .bind(("id", id.to_string()))
            .await?
            .check()?;

        Ok(())
    }

    /// Clear the claim so the entry is immediately claimable again.
    pub async fn release(db: &Database, id: &str) -> Result<(), DbError> {
        db.query("UPDATE type::thing('queue_entry', $id) SET fetched_at = NONE RETURN NONE")
            .bind(("id", id.to_string()))
            .await?
            .check()?;

        Ok(())
    }

    /// Distinct queue names that currently hold entries, sorted.
    pub async fn queue_names(db: &Database) -> Result<Vec<String>, DbError> {
        let mut result = db
            .query("SELECT queue FROM queue_entry GROUP BY queue")
            .await?;

        #[derive(Deserialize)]
        struct QueueName {
            queue: String,
        }

        let rows: Vec<QueueName> = result.take(0)?;
        let mut names: Vec<String> = rows.into_iter().map(|r| r.queue).collect();
        names.sort();
        names.dedup();

        Ok(names)
    }

    /// Job ids of the queue's entries in insertion order, either the
    /// claimable ones or the claimed ones.
    pub async fn job_ids(db: &Database, queue: &str, fetched: bool) -> Result<Vec<String>, DbError> {
        let query = if fetched {
            "SELECT id, job_id FROM queue_entry WHERE queue = $queue AND fetched_at != NONE ORDER BY id ASC"
        } else {
            "SELECT id, job_id FROM queue_entry WHERE queue = $queue AND fetched_at = NONE ORDER BY id ASC"
        };

        let mut result = db.query(query).bind(("queue", queue.to_string())).await?;

        #[derive(Deserialize)]
        struct EntryJob {
            job_id: String,
        }

        let rows: Vec<EntryJob> = result.take(0)?;
        Ok(rows.into_iter().map(|r| r.job_id).collect())
    }

    /// Count claimable and claimed entries of a queue.
    pub async fn counts(db: &Database, queue: &str) -> Result<QueueCounts, DbError> {
        let mut result = db
            .query(
                r#"
                SELECT count() FROM queue_entry WHERE queue = $queue AND fetched_at = NONE GROUP ALL;
                SELECT count() FROM queue_entry WHERE queue = $queue AND fetched_at != NONE GROUP ALL;
                "#,
            )
            .bind(("queue", queue.to_string()))
            .await?;

        #[derive(Deserialize)]
        struct CountResult {
            count: i64,
        }

        let enqueued: Vec<CountResult> = result.take(0)?;
        let fetched: Vec<CountResult> = result.take(1)?;

        Ok(QueueCounts {
            enqueued: enqueued.first().map_or(0, |c| c.count.max(0) as u64),
            fetched: fetched.first().map_or(0, |c| c.count.max(0) as u64),
        })
    }
}
