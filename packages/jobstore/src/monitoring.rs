//! Read-only queue statistics for dashboards.

use std::collections::HashSet;

use db::Database;
use db::repositories::{JobRepository, QueueEntryRepository};
use jobstore_core::{Job, JobId, QueueCounts, StorageError};

/// Read-only view over queues and their entries.
#[derive(Clone)]
pub struct MonitoringApi {
    db: Database,
}

impl MonitoringApi {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Distinct queue names that currently hold entries.
    pub async fn queues(&self) -> Result<Vec<String>, StorageError> {
        Ok(QueueEntryRepository::queue_names(&self.db).await?)
    }

    /// Claimable entries of `queue` in enqueue order, skipping jobs that have
    /// no recorded state yet. `from` and `per_page` apply after filtering.
    pub async fn enqueued_job_ids(
        &self,
        queue: &str,
        from: usize,
        per_page: usize,
    ) -> Result<Vec<JobId>, StorageError> {
        let ids = QueueEntryRepository::job_ids(&self.db, queue, false).await?;
        let with_history = JobRepository::ids_with_history(&self.db, ids.clone()).await?;
        Ok(page(ids, with_history, from, per_page))
    }

    /// Claimed entries of `queue` whose jobs still exist.
    pub async fn fetched_job_ids(
        &self,
        queue: &str,
        from: usize,
        per_page: usize,
    ) -> Result<Vec<JobId>, StorageError> {
        let ids = QueueEntryRepository::job_ids(&self.db, queue, true).await?;
        let existing = JobRepository::existing_ids(&self.db, ids.clone()).await?;
        Ok(page(ids, existing, from, per_page))
    }

    pub async fn enqueued_and_fetched_count(&self, queue: &str) -> Result<QueueCounts, StorageError> {
        Ok(QueueEntryRepository::counts(&self.db, queue).await?)
    }

    pub async fn job(&self, id: JobId) -> Result<Job, StorageError> {
        Ok(JobRepository::get(&self.db, id).await?)
    }
}

/// Keep the ids present in `allowed`, preserving the order of `ids`, then
/// take one page.
fn page(ids: Vec<String>, allowed: Vec<String>, from: usize, per_page: usize) -> Vec<JobId> {
    let allowed: HashSet<String> = allowed.into_iter().collect();

    ids.into_iter()
        .filter(|id| allowed.contains(id))
        .filter_map(|id| match JobId::parse(&id) {
            Ok(job_id) => Some(job_id),
            Err(e) => {
                tracing::warn!("Skipping queue entry with invalid job id {}: {}", id, e);
                None
            }
        })
        .skip(from)
        .take(per_page)
        .collect()
}
