#![allow(dead_code)]

use std::time::Duration;

use jobstore::{DbConfig, JobCreate, JobId, JobState, JobStorage, StorageError, StorageOptions};

/// Short intervals so waiting tests finish quickly.
pub fn fast_options() -> StorageOptions {
    StorageOptions::default()
        .with_queue_poll_interval(Duration::from_millis(50))
        .with_signal_poll_interval(Duration::from_millis(10))
}

/// Each call opens its own embedded in-memory datastore.
pub async fn setup_storage(options: StorageOptions) -> Result<JobStorage, StorageError> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    JobStorage::connect(&DbConfig::memory(), options).await
}

/// Create a job in the `Enqueued` state and put it on `queue`.
pub async fn enqueue_job(storage: &JobStorage, queue: &str) -> Result<JobId, StorageError> {
    let job_id = storage.create_job(JobCreate::new("Test.Run", "[]")).await?;

    let mut batch = storage.write_batch();
    batch.set_job_state(job_id, JobState::new("Enqueued"));
    batch.add_to_queue(queue, job_id);
    batch.commit().await?;

    Ok(job_id)
}

pub fn queues(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}
