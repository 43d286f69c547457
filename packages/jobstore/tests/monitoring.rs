#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::time::Duration;

use db::repositories::{ExpirationRepository, JobRepository, QueueEntryRepository};
use jobstore::{CancellationToken, JobCreate};

use common::{enqueue_job, fast_options, queues, setup_storage};

#[tokio::test]
async fn test_queue_listing_and_counts() -> Result<(), Box<dyn Error>> {
    let storage = setup_storage(fast_options()).await?;
    let monitoring = storage.monitoring();

    assert!(monitoring.queues().await?.is_empty());

    enqueue_job(&storage, "default").await?;
    enqueue_job(&storage, "default").await?;
    enqueue_job(&storage, "critical").await?;

    assert_eq!(
        monitoring.queues().await?,
        vec!["critical".to_string(), "default".to_string()]
    );

    let fetched = storage
        .dequeue(&queues(&["default"]), &CancellationToken::new())
        .await?;

    let counts = monitoring.enqueued_and_fetched_count("default").await?;
    assert_eq!(counts.enqueued, 1);
    assert_eq!(counts.fetched, 1);

    let counts = monitoring.enqueued_and_fetched_count("missing").await?;
    assert_eq!(counts.total(), 0);

    fetched.acknowledge().await?;

    Ok(())
}

#[tokio::test]
async fn test_enqueued_ids_skip_stateless_jobs_and_paginate() -> Result<(), Box<dyn Error>> {
    let storage = setup_storage(fast_options()).await?;
    let monitoring = storage.monitoring();

    let first = enqueue_job(&storage, "default").await?;

    // Queued directly, never given a state
    let stateless = storage.create_job(JobCreate::new("Test.Run", "[]")).await?;
    storage.enqueue("default", stateless).await?;

    let second = enqueue_job(&storage, "default").await?;
    let third = enqueue_job(&storage, "default").await?;

    assert_eq!(
        monitoring.enqueued_job_ids("default", 0, 10).await?,
        vec![first, second, third]
    );
    assert_eq!(monitoring.enqueued_job_ids("default", 1, 1).await?, vec![second]);
    assert!(monitoring.enqueued_job_ids("default", 3, 10).await?.is_empty());

    let job = monitoring.job(first).await?;
    assert_eq!(job.state_name.as_deref(), Some("Enqueued"));

    Ok(())
}

#[tokio::test]
async fn test_fetched_ids_skip_removed_jobs() -> Result<(), Box<dyn Error>> {
    let storage = setup_storage(fast_options()).await?;
    let monitoring = storage.monitoring();
    let token = CancellationToken::new();
    let names = queues(&["default"]);

    let kept = enqueue_job(&storage, "default").await?;
    let removed = enqueue_job(&storage, "default").await?;

    let first = storage.dequeue(&names, &token).await?;
    let second = storage.dequeue(&names, &token).await?;
    assert_eq!(
        monitoring.fetched_job_ids("default", 0, 10).await?,
        vec![kept, removed]
    );

    // Let the second job expire and be swept while its entry stays claimed
    JobRepository::expire(storage.database(), removed, Duration::from_millis(1)).await?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    ExpirationRepository::remove_expired(storage.database()).await?;

    assert_eq!(monitoring.fetched_job_ids("default", 0, 10).await?, vec![kept]);
    assert!(monitoring.enqueued_job_ids("default", 0, 10).await?.is_empty());

    // The entry itself is still there
    assert!(
        QueueEntryRepository::get(storage.database(), second.entry_id())
            .await?
            .is_some()
    );

    first.acknowledge().await?;
    second.acknowledge().await?;

    Ok(())
}
