#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jobstore::{
    BackendFuture, CancellationToken, Command, FetchedJob, JobCreate, JobId, JobState, JobStorage,
    QueueBackend, QueueProviders, Settlement, StorageError, SurrealJobQueue,
};

use common::{fast_options, queues, setup_storage};

#[derive(Default)]
struct Recorded {
    enqueued: Mutex<Vec<(String, JobId)>>,
    pending: Mutex<Vec<(String, JobId)>>,
    acknowledged: Mutex<Vec<JobId>>,
}

/// In-process backend that records enqueues and fails for the `broken` queue.
#[derive(Default)]
struct RecordingBackend {
    recorded: Arc<Recorded>,
}

impl RecordingBackend {
    fn enqueued(&self) -> Vec<(String, JobId)> {
        self.recorded.enqueued.lock().map(|v| v.clone()).unwrap_or_default()
    }

    fn pending(&self) -> Vec<(String, JobId)> {
        self.recorded.pending.lock().map(|v| v.clone()).unwrap_or_default()
    }

    fn acknowledged(&self) -> Vec<JobId> {
        self.recorded.acknowledged.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

struct RecordedClaim {
    recorded: Arc<Recorded>,
    queue: String,
    job_id: JobId,
}

impl Settlement for RecordedClaim {
    fn acknowledge(self: Box<Self>) -> BackendFuture<'static, ()> {
        Box::pin(async move {
            if let Ok(mut acknowledged) = self.recorded.acknowledged.lock() {
                acknowledged.push(self.job_id);
            }
            Ok(())
        })
    }

    fn requeue(self: Box<Self>) -> BackendFuture<'static, ()> {
        Box::pin(async move {
            if let Ok(mut pending) = self.recorded.pending.lock() {
                pending.push((self.queue.clone(), self.job_id));
            }
            Ok(())
        })
    }
}

impl QueueBackend for RecordingBackend {
    fn enqueue<'a>(&'a self, queue: &'a str, job_id: JobId) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            if queue == "broken" {
                return Err(StorageError::StoreUnavailable("broken queue".into()));
            }
            if let Ok(mut enqueued) = self.recorded.enqueued.lock() {
                enqueued.push((queue.to_string(), job_id));
            }
            if let Ok(mut pending) = self.recorded.pending.lock() {
                pending.push((queue.to_string(), job_id));
            }
            Ok(())
        })
    }

    fn dequeue<'a>(
        &'a self,
        queues: &'a [String],
        _cancellation: &'a CancellationToken,
    ) -> BackendFuture<'a, FetchedJob> {
        Box::pin(async move {
            let claimed = self.recorded.pending.lock().ok().and_then(|mut pending| {
                let index = pending.iter().position(|(queue, _)| queues.contains(queue))?;
                Some(pending.remove(index))
            });
            let Some((queue, job_id)) = claimed else {
                return Err(StorageError::NotFound("no recorded jobs".into()));
            };

            let claim = Box::new(RecordedClaim {
                recorded: self.recorded.clone(),
                queue: queue.clone(),
                job_id,
            });
            Ok(FetchedJob::new(format!("recorded:{job_id}"), job_id, queue, claim))
        })
    }
}

/// Whether each entry of `key` in `table` carries an expiration.
async fn expiry_flags(
    storage: &JobStorage,
    table: &str,
    key: &str,
) -> Result<Vec<bool>, Box<dyn Error>> {
    let mut result = storage
        .database()
        .query(format!("SELECT VALUE expire_at != NONE FROM {table} WHERE key = $key"))
        .bind(("key", key.to_string()))
        .await?;
    Ok(result.take(0)?)
}

/// Storage whose `external` and `broken` queues go to a recording backend.
async fn storage_with_recorder() -> Result<(JobStorage, Arc<RecordingBackend>), Box<dyn Error>> {
    let base = setup_storage(fast_options()).await?;
    let recorder = Arc::new(RecordingBackend::default());

    let default_queue = SurrealJobQueue::new(base.database().clone(), fast_options());
    let providers = QueueProviders::new(Arc::new(default_queue))
        .with_provider(["external", "broken"], recorder.clone());

    let storage = JobStorage::builder()
        .database(base.database().clone())
        .queue_providers(providers)
        .options(fast_options())
        .build()?;

    Ok((storage, recorder))
}

#[tokio::test]
async fn test_commit_applies_commands_in_order() -> Result<(), Box<dyn Error>> {
    let storage = setup_storage(fast_options()).await?;
    let job_id = storage.create_job(JobCreate::new("Test.Run", "[]")).await?;

    let mut batch = storage.write_batch();
    batch.set_job_state(job_id, JobState::new("Processing").with_data("Server", "s1"));
    batch.add_job_state(job_id, JobState::new("Heartbeat"));
    batch.set_job_state(job_id, JobState::new("Succeeded").with_reason("done"));
    batch.persist_job(job_id);
    batch.increment_counter("stats:succeeded");
    batch.increment_counter("stats:succeeded");
    batch.decrement_counter_with_ttl("stats:succeeded", Duration::from_secs(60));
    batch.add_to_set_with_score("schedule", "a", 5.0);
    batch.add_to_set("schedule", "b");
    batch.add_range_to_set("schedule", ["a", "c"]);
    for value in ["0", "1", "2", "3"] {
        batch.insert_to_list("recent", value);
    }
    batch.trim_list("recent", 1, 2);
    batch.set_range_in_hash("server:s1", [("Host", "localhost"), ("Workers", "4")])?;
    assert_eq!(batch.len(), 16);
    batch.commit().await?;

    let job = storage.get_job(job_id).await?;
    assert_eq!(job.state_name.as_deref(), Some("Succeeded"));
    let history: Vec<&str> = job.state_history.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(history, vec!["Processing", "Heartbeat", "Succeeded"]);
    assert_eq!(
        job.state_history[0].data.get("Server").map(String::as_str),
        Some("s1")
    );
    assert!(job.expire_at.is_none());

    assert_eq!(storage.counter("stats:succeeded").await?, 1);

    // Range adds keep existing scores
    let members = storage.set_members("schedule").await?;
    let scored: Vec<(&str, f64)> = members
        .iter()
        .map(|m| (m.value.as_str(), m.score))
        .collect();
    assert_eq!(scored, vec![("b", 0.0), ("c", 0.0), ("a", 5.0)]);

    assert_eq!(storage.list_range("recent", 0, 10).await?, vec!["1", "2"]);

    let hash = storage.hash_entries("server:s1").await?;
    assert_eq!(hash.get("Workers").map(String::as_str), Some("4"));

    Ok(())
}

#[tokio::test]
async fn test_empty_hash_key_fails_when_added() -> Result<(), Box<dyn Error>> {
    let storage = setup_storage(fast_options()).await?;
    let mut batch = storage.write_batch();

    let err = batch
        .set_range_in_hash("", [("field", "value")])
        .err()
        .ok_or("expected an error")?;
    assert_eq!(err.argument_name(), Some("key"));

    let err = batch.remove_hash("").err().ok_or("expected an error")?;
    assert_eq!(err.argument_name(), Some("key"));

    assert!(batch.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_add_to_queue_uses_the_queue_backend() -> Result<(), Box<dyn Error>> {
    let (storage, recorder) = storage_with_recorder().await?;
    let local = storage.create_job(JobCreate::new("Test.Run", "[]")).await?;
    let external = storage.create_job(JobCreate::new("Test.Run", "[]")).await?;

    let mut batch = storage.write_batch();
    batch.add_to_queue("default", local);
    batch.add_to_queue("external", external);
    assert!(matches!(
        batch.commands()[1],
        Command::AddToQueue { ref queue, .. } if queue == "external"
    ));
    batch.commit().await?;

    assert_eq!(recorder.enqueued(), vec![("external".to_string(), external)]);

    let monitoring = storage.monitoring();
    assert_eq!(monitoring.queues().await?, vec!["default".to_string()]);
    assert_eq!(monitoring.enqueued_and_fetched_count("default").await?.enqueued, 1);

    Ok(())
}

#[tokio::test]
async fn test_custom_backend_hands_out_jobs() -> Result<(), Box<dyn Error>> {
    let (storage, recorder) = storage_with_recorder().await?;
    let first = storage.create_job(JobCreate::new("Test.Run", "[]")).await?;
    let second = storage.create_job(JobCreate::new("Test.Run", "[]")).await?;

    let mut batch = storage.write_batch();
    batch.add_to_queue("external", first);
    batch.add_to_queue("external", second);
    batch.commit().await?;

    let token = CancellationToken::new();
    let fetched = storage.dequeue(&queues(&["external"]), &token).await?;
    assert_eq!(fetched.job_id(), first);
    assert_eq!(fetched.queue(), "external");
    assert_eq!(fetched.entry_id(), format!("recorded:{first}"));
    fetched.acknowledge().await?;
    assert_eq!(recorder.acknowledged(), vec![first]);

    // Dropping a job settles it through the backend too
    let dropped = storage.dequeue(&queues(&["external"]), &token).await?;
    assert_eq!(dropped.job_id(), second);
    assert!(recorder.pending().is_empty());
    drop(dropped);

    let mut pending = recorder.pending();
    for _ in 0..50 {
        if !pending.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        pending = recorder.pending();
    }
    assert_eq!(pending, vec![("external".to_string(), second)]);
    assert_eq!(recorder.acknowledged(), vec![first]);

    Ok(())
}

#[tokio::test]
async fn test_failed_command_stops_commit() -> Result<(), Box<dyn Error>> {
    let (storage, _recorder) = storage_with_recorder().await?;
    let job_id = storage.create_job(JobCreate::new("Test.Run", "[]")).await?;

    let mut batch = storage.write_batch();
    batch.increment_counter("before");
    batch.add_to_queue("broken", job_id);
    batch.increment_counter("after");

    let result = batch.commit().await;
    assert!(matches!(result, Err(StorageError::StoreUnavailable(_))));

    // Not atomic: the first command stays applied
    assert_eq!(storage.counter("before").await?, 1);
    assert_eq!(storage.counter("after").await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_expire_and_persist_keys() -> Result<(), Box<dyn Error>> {
    let storage = setup_storage(fast_options()).await?;
    let job_id = storage.create_job(JobCreate::new("Test.Run", "[]")).await?;

    let mut batch = storage.write_batch();
    batch.add_to_set("expiring", "x");
    batch.add_to_set("kept", "x");
    batch.insert_to_list("list", "x");
    batch.set_range_in_hash("hash", [("f", "v")])?;
    batch.expire_set("expiring", Duration::from_secs(60));
    batch.expire_set("kept", Duration::from_secs(60));
    batch.persist_set("kept");
    batch.expire_list("list", Duration::from_secs(60));
    batch.persist_list("list");
    batch.expire_hash("hash", Duration::from_secs(60));
    batch.persist_hash("hash");
    batch.expire_job(job_id, Duration::from_secs(60));
    batch.commit().await?;

    let expiring = storage.set_members("expiring").await?;
    assert!(expiring[0].expire_at.is_some());
    let kept = storage.set_members("kept").await?;
    assert!(kept[0].expire_at.is_none());
    assert!(storage.get_job(job_id).await?.expire_at.is_some());

    let mut batch = storage.write_batch();
    batch.remove_set("expiring");
    batch.remove_from_set("kept", "x");
    batch.remove_from_list("list", "x");
    batch.remove_hash("hash")?;
    batch.commit().await?;

    assert!(storage.set_members("expiring").await?.is_empty());
    assert!(storage.set_members("kept").await?.is_empty());
    assert!(storage.list_range("list", 0, 0).await?.is_empty());
    assert!(storage.hash_entries("hash").await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_list_and_hash_expiry_targets_one_key() -> Result<(), Box<dyn Error>> {
    let storage = setup_storage(fast_options()).await?;

    let mut batch = storage.write_batch();
    for key in ["list:a", "list:b"] {
        batch.insert_to_list(key, "x");
        batch.insert_to_list(key, "y");
    }
    batch.set_range_in_hash("hash:a", [("f", "1"), ("g", "2")])?;
    batch.set_range_in_hash("hash:b", [("f", "1")])?;
    batch.expire_list("list:a", Duration::from_secs(60));
    batch.expire_hash("hash:a", Duration::from_secs(60));
    batch.commit().await?;

    assert_eq!(expiry_flags(&storage, "list_entry", "list:a").await?, vec![true, true]);
    assert_eq!(expiry_flags(&storage, "list_entry", "list:b").await?, vec![false, false]);
    assert_eq!(expiry_flags(&storage, "hash_entry", "hash:a").await?, vec![true, true]);
    assert_eq!(expiry_flags(&storage, "hash_entry", "hash:b").await?, vec![false]);

    // Persist on the sibling is a no-op, on the target it clears the expiry
    let mut batch = storage.write_batch();
    batch.expire_list("list:b", Duration::from_secs(60));
    batch.persist_list("list:a");
    batch.persist_hash("hash:a");
    batch.persist_hash("hash:b");
    batch.commit().await?;

    assert_eq!(expiry_flags(&storage, "list_entry", "list:a").await?, vec![false, false]);
    assert_eq!(expiry_flags(&storage, "list_entry", "list:b").await?, vec![true, true]);
    assert_eq!(expiry_flags(&storage, "hash_entry", "hash:a").await?, vec![false, false]);
    assert_eq!(expiry_flags(&storage, "hash_entry", "hash:b").await?, vec![false]);

    Ok(())
}

#[tokio::test]
async fn test_trim_with_start_after_end_empties_list() -> Result<(), Box<dyn Error>> {
    let storage = setup_storage(fast_options()).await?;

    let mut batch = storage.write_batch();
    for value in ["a", "b", "c"] {
        batch.insert_to_list("recent", value);
        batch.insert_to_list("other", value);
    }
    batch.commit().await?;

    let mut batch = storage.write_batch();
    batch.trim_list("recent", 1, 0);
    batch.commit().await?;

    assert!(storage.list_range("recent", 0, 10).await?.is_empty());
    assert_eq!(storage.list_range("other", 0, 10).await?, vec!["a", "b", "c"]);

    Ok(())
}
