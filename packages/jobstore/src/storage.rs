//! The storage entry point: wiring of database, queue backends and options.

use std::collections::HashMap;
use std::sync::Arc;

use db::repositories::{
    CounterRepository, HashRepository, JobCreate, JobRepository, ListRepository, SetRepository,
    trim_window,
};
use db::{Database, DbConfig};
use jobstore_core::{Job, JobId, SetEntry, StorageError, StorageOptions};
use tokio_util::sync::CancellationToken;

use crate::job_queue::{FetchedJob, SurrealJobQueue};
use crate::monitoring::MonitoringApi;
use crate::registry::QueueProviders;
use crate::transaction::WriteBatch;

/// Shared handle to the job store. Cheap to clone.
#[derive(Clone)]
pub struct JobStorage {
    db: Database,
    providers: Arc<QueueProviders>,
    options: StorageOptions,
}

impl JobStorage {
    pub fn builder() -> JobStorageBuilder {
        JobStorageBuilder::default()
    }

    /// Connect to the database and wire the default SurrealDB queue for all
    /// queue names.
    pub async fn connect(config: &DbConfig, options: StorageOptions) -> Result<Self, StorageError> {
        let db = db::init(config).await?;
        let queue = SurrealJobQueue::new(db.clone(), options.clone());

        Self::builder()
            .database(db)
            .queue_providers(QueueProviders::new(Arc::new(queue)))
            .options(options)
            .build()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn options(&self) -> &StorageOptions {
        &self.options
    }

    pub fn queue_providers(&self) -> &QueueProviders {
        &self.providers
    }

    /// Start a new write batch.
    pub fn write_batch(&self) -> WriteBatch {
        WriteBatch::new(self.clone())
    }

    pub fn monitoring(&self) -> MonitoringApi {
        MonitoringApi::new(self.db.clone())
    }

    /// Make a job available on a queue through its backend.
    pub async fn enqueue(&self, queue: &str, job_id: JobId) -> Result<(), StorageError> {
        self.providers.get(queue).enqueue(queue, job_id).await
    }

    /// Fetch the next job from `queues`; see [`SurrealJobQueue::dequeue`].
    pub async fn dequeue(
        &self,
        queues: &[String],
        cancellation: &CancellationToken,
    ) -> Result<FetchedJob, StorageError> {
        self.providers
            .resolve(queues)?
            .dequeue(queues, cancellation)
            .await
    }

    pub async fn create_job(&self, job: JobCreate) -> Result<JobId, StorageError> {
        Ok(JobRepository::create(&self.db, job).await?)
    }

    pub async fn get_job(&self, id: JobId) -> Result<Job, StorageError> {
        Ok(JobRepository::get(&self.db, id).await?)
    }

    pub async fn set_job_parameter(
        &self,
        id: JobId,
        name: &str,
        value: &str,
    ) -> Result<(), StorageError> {
        if name.is_empty() {
            return Err(StorageError::argument("name", "must not be empty"));
        }
        Ok(JobRepository::set_parameter(&self.db, id, name, value).await?)
    }

    pub async fn get_job_parameter(
        &self,
        id: JobId,
        name: &str,
    ) -> Result<Option<String>, StorageError> {
        Ok(JobRepository::get_parameter(&self.db, id, name).await?)
    }

    /// Current counter value, raw records and aggregate combined.
    pub async fn counter(&self, key: &str) -> Result<i64, StorageError> {
        Ok(CounterRepository::total(&self.db, key).await?)
    }

    /// Set members ordered by score.
    pub async fn set_members(&self, key: &str) -> Result<Vec<SetEntry>, StorageError> {
        Ok(SetRepository::members(&self.db, key).await?)
    }

    /// List values at positions `start..=end` in insertion order.
    pub async fn list_range(
        &self,
        key: &str,
        start: usize,
        end: usize,
    ) -> Result<Vec<String>, StorageError> {
        let values = ListRepository::values(&self.db, key).await?;
        Ok(match trim_window(values.len(), start, end) {
            Some(window) => values[window].to_vec(),
            None => Vec::new(),
        })
    }

    pub async fn hash_entries(&self, key: &str) -> Result<HashMap<String, String>, StorageError> {
        Ok(HashRepository::get_all(&self.db, key).await?)
    }
}

/// Builder for [`JobStorage`]. Every collaborator is required.
#[derive(Default)]
pub struct JobStorageBuilder {
    database: Option<Database>,
    queue_providers: Option<QueueProviders>,
    options: Option<StorageOptions>,
}

impl JobStorageBuilder {
    pub fn database(mut self, db: Database) -> Self {
        self.database = Some(db);
        self
    }

    pub fn queue_providers(mut self, providers: QueueProviders) -> Self {
        self.queue_providers = Some(providers);
        self
    }

    pub fn options(mut self, options: StorageOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn build(self) -> Result<JobStorage, StorageError> {
        let db = self
            .database
            .ok_or_else(|| StorageError::argument("database", "is required"))?;
        let providers = self
            .queue_providers
            .ok_or_else(|| StorageError::argument("queue_providers", "is required"))?;
        let options = self
            .options
            .ok_or_else(|| StorageError::argument("options", "is required"))?;
        options.validate()?;

        Ok(JobStorage {
            db,
            providers: Arc::new(providers),
            options,
        })
    }
}
