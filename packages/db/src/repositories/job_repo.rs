//! Job repository: creation, reads and the field-level mutations the write
//! batch issues.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jobstore_core::{Job, JobId, JobState, StateRecord};
use serde::Deserialize;
use surrealdb::sql::Thing;

use super::{IdRecord, millis, record_key};
use crate::{Database, DbError};

/// Repository for job persistence operations.
pub struct JobRepository;

/// Internal record type for SurrealDB reads.
#[derive(Debug, Deserialize)]
struct JobRecord {
    id: Thing,
    invocation_data: String,
    arguments: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    state_name: Option<String>,
    #[serde(default)]
    state_history: Vec<StateRecord>,
    #[serde(default)]
    parameters: HashMap<String, String>,
    #[serde(default)]
    expire_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    fn into_job(self) -> Result<Job, DbError> {
        let raw = record_key(&self.id);
        let id = JobId::parse(&raw)
            .map_err(|e| DbError::Serialization(format!("invalid job id {raw}: {e}")))?;
        Ok(Job {
            id,
            invocation_data: self.invocation_data,
            arguments: self.arguments,
            created_at: self.created_at,
            state_name: self.state_name,
            state_history: self.state_history,
            parameters: self.parameters,
            expire_at: self.expire_at,
        })
    }
}

/// Everything needed to create a job. Timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct JobCreate {
    pub invocation_data: String,
    pub arguments: String,
    pub parameters: HashMap<String, String>,
    /// Jobs are created expiring; a later state transition persists them.
    pub expire_in: Duration,
}

impl JobCreate {
    pub fn new(invocation_data: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            invocation_data: invocation_data.into(),
            arguments: arguments.into(),
            parameters: HashMap::new(),
            expire_in: Duration::from_secs(24 * 60 * 60),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_expire_in(mut self, expire_in: Duration) -> Self {
        self.expire_in = expire_in;
        self
    }
}

impl JobRepository {
    /// Create a new job with an empty state history.
    pub async fn create(db: &Database, job: JobCreate) -> Result<JobId, DbError> {
        let id = JobId::new();

        db.query(
            r#"
            CREATE type::thing('job', $id) SET
                invocation_data = $invocation_data,
                arguments = $arguments,
                parameters = $parameters,
                state_history = [],
                created_at = time::now(),
                expire_at = time::now() + duration::from::millis($expire_in_ms)
            RETURN NONE
            "#,
        )
        .bind(("id", id.to_string()))
        .bind(("invocation_data", job.invocation_data))
        .bind(("arguments", job.arguments))
        .bind(("parameters", job.parameters))
        .bind(("expire_in_ms", millis(job.expire_in)))
        .await?
        .check()?;

        tracing::debug!("Created job {}", id);
        Ok(id)
    }

    /// Get a job by ID.
    pub async fn get(db: &Database, id: JobId) -> Result<Job, DbError> {
        let mut result = db
            .query("SELECT * FROM type::thing('job', $id)")
            .bind(("id", id.to_string()))
            .await?;

        let records: Vec<JobRecord> = result.take(0)?;

        records
            .into_iter()
            .next()
            .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", id)))?
            .into_job()
    }

    /// Set (or overwrite) a single job parameter, leaving the others intact.
    pub async fn set_parameter(
        db: &Database,
        id: JobId,
        name: &str,
        value: &str,
    ) -> Result<(), DbError> {
        let mut parameters = HashMap::new();
        parameters.insert(name.to_string(), value.to_string());

        db.query("UPDATE type::thing('job', $id) MERGE { parameters: $parameters } RETURN NONE")
            .bind(("id", id.to_string()))
            .bind(("parameters", parameters))
            .await?
            .check()?;

        Ok(())
    }

    /// Read a single job parameter.
    pub async fn get_parameter(
        db: &Database,
        id: JobId,
        name: &str,
    ) -> Result<Option<String>, DbError> {
        let job = Self::get(db, id).await?;
        Ok(job.parameters.get(name).cloned())
    }

    /// Mark the job for removal after `ttl`.
    pub async fn expire(db: &Database, id: JobId, ttl: Duration) -> Result<(), DbError> {
        db.query(
            "UPDATE type::thing('job', $id) SET expire_at = time::now() + duration::from::millis($ttl_ms) RETURN NONE",
        )
        .bind(("id", id.to_string()))
        .bind(("ttl_ms", millis(ttl)))
        .await?
        .check()?;

        Ok(())
    }

    /// Clear the job's expiration.
    pub async fn persist(db: &Database, id: JobId) -> Result<(), DbError> {
        db.query("UPDATE type::thing('job', $id) SET expire_at = NONE RETURN NONE")
            .bind(("id", id.to_string()))
            .await?
            .check()?;

        Ok(())
    }

    /// Append a state record and make it the current state in one statement,
    /// so the history and the name can never be observed out of step.
    pub async fn set_state(db: &Database, id: JobId, state: &JobState) -> Result<(), DbError> {
        db.query(
            r#"
            UPDATE type::thing('job', $id) SET
                state_name = $name,
                state_history += { name: $name, reason: $reason, created_at: time::now(), data: $data }
            RETURN NONE
            "#,
        )
        .bind(("id", id.to_string()))
        .bind(("name", state.name.clone()))
        .bind(("reason", state.reason.clone()))
        .bind(("data", state.data.clone()))
        .await?
        .check()?;

        Ok(())
    }

    /// Append a state record without touching the current state name.
    pub async fn add_state(db: &Database, id: JobId, state: &JobState) -> Result<(), DbError> {
        db.query(
            r#"
            UPDATE type::thing('job', $id) SET
                state_history += { name: $name, reason: $reason, created_at: time::now(), data: $data }
            RETURN NONE
            "#,
        )
        .bind(("id", id.to_string()))
        .bind(("name", state.name.clone()))
        .bind(("reason", state.reason.clone()))
        .bind(("data", state.data.clone()))
        .await?
        .check()?;

        Ok(())
    }

    /// Of the given ids, those whose jobs exist and have at least one state
    /// record. Order of the input is not preserved.
    pub async fn ids_with_history(db: &Database, ids: Vec<String>) -> Result<Vec<String>, DbError> {
        let mut result = db
            .query(
                "SELECT id FROM job WHERE record::id(id) INSIDE $ids AND array::len(state_history) > 0",
            )
            .bind(("ids", ids))
            .await?;

        let records: Vec<IdRecord> = result.take(0)?;
        Ok(records.iter().map(|r| record_key(&r.id)).collect())
    }

    /// Of the given ids, those whose jobs still exist.
    pub async fn existing_ids(db: &Database, ids: Vec<String>) -> Result<Vec<String>, DbError> {
        let mut result = db
            .query("SELECT id FROM job WHERE record::id(id) INSIDE $ids")
            .bind(("ids", ids))
            .await?;

        let records: Vec<IdRecord> = result.take(0)?;
        Ok(records.iter().map(|r| record_key(&r.id)).collect())
    }
}
