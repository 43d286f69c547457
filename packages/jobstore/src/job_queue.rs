//! Durable job queue over the `queue_entry` table.

use std::time::Duration;

use db::Database;
use db::repositories::{QueueEntryRepository, SignalRepository};
use jobstore_core::{JobId, QueueEntry, StorageError, StorageOptions};
use tokio_util::sync::CancellationToken;

use crate::registry::BackendFuture;
use crate::signal::SignalHub;

/// Signals outlive this many listener polls before the sweep may drop them.
const SIGNAL_TTL_POLLS: u32 = 10;

/// Queue backend that stores entries in SurrealDB.
///
/// Delivery is at least once: a claimed entry that is neither acknowledged
/// nor requeued becomes claimable again after the invisibility timeout.
#[derive(Clone)]
pub struct SurrealJobQueue {
    db: Database,
    options: StorageOptions,
    signals: SignalHub,
}

impl SurrealJobQueue {
    pub fn new(db: Database, options: StorageOptions) -> Self {
        let signals = SignalHub::new(db.clone(), options.signal_poll_interval());
        Self {
            db,
            options,
            signals,
        }
    }

    pub fn signals(&self) -> &SignalHub {
        &self.signals
    }

    fn signal_ttl(&self) -> Duration {
        self.options
            .signal_poll_interval()
            .saturating_mul(SIGNAL_TTL_POLLS)
    }

    /// Append a claimable entry for the job and signal waiting workers.
    pub async fn enqueue(&self, queue: &str, job_id: JobId) -> Result<(), StorageError> {
        if queue.is_empty() {
            return Err(StorageError::argument("queue", "must not be empty"));
        }

        let entry_id = QueueEntryRepository::insert(&self.db, queue, job_id).await?;
        tracing::debug!("Enqueued job {} to {} as entry {}", job_id, queue, entry_id);

        if let Err(e) = SignalRepository::post(&self.db, queue, self.signal_ttl()).await {
            tracing::warn!("Failed to signal queue {}: {}", queue, e);
        }

        Ok(())
    }

    /// Block until an entry of one of `queues` can be claimed.
    ///
    /// Queues are tried in the given order on every attempt, so earlier names
    /// take priority. Between attempts the call waits for a signal, the queue
    /// poll interval or cancellation, whichever comes first.
    pub async fn dequeue(
        &self,
        queues: &[String],
        cancellation: &CancellationToken,
    ) -> Result<FetchedJob, StorageError> {
        if queues.is_empty() {
            return Err(StorageError::argument("queues", "at least one queue is required"));
        }
        if cancellation.is_cancelled() {
            return Err(StorageError::Canceled);
        }

        let _subscription = self.signals.subscribe().await;
        let timeout = self.options.invisibility_timeout();
        let poll_interval = self.options.queue_poll_interval();

        loop {
            let notified = self.signals.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            for queue in queues {
                if let Some(entry) = QueueEntryRepository::claim(&self.db, queue, timeout).await? {
                    tracing::debug!("Claimed job {} from {}", entry.job_id, queue);
                    return Ok(SurrealSettlement::fetched(self.db.clone(), entry));
                }
            }

            tokio::select! {
                biased;
                _ = cancellation.cancelled() => return Err(StorageError::Canceled),
                _ = &mut notified => {}
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }
}

/// How a backend finishes a claimed entry.
///
/// Backends hand one out with every [`FetchedJob`]. Exactly one of the
/// methods is called, at most once.
pub trait Settlement: Send + 'static {
    /// Remove the entry for good.
    fn acknowledge(self: Box<Self>) -> BackendFuture<'static, ()>;

    /// Make the entry claimable again.
    fn requeue(self: Box<Self>) -> BackendFuture<'static, ()>;
}

/// A claimed queue entry.
///
/// Finish it with [`acknowledge`](FetchedJob::acknowledge) once the job is
/// done or [`requeue`](FetchedJob::requeue) to hand it back. Dropping it
/// without either requeues it in the background.
pub struct FetchedJob {
    entry_id: String,
    job_id: JobId,
    queue: String,
    settlement: Option<Box<dyn Settlement>>,
}

impl FetchedJob {
    /// Wrap an entry claimed by a backend. `entry_id` is the backend's own
    /// identifier for the claim.
    pub fn new(
        entry_id: impl Into<String>,
        job_id: JobId,
        queue: impl Into<String>,
        settlement: Box<dyn Settlement>,
    ) -> Self {
        Self {
            entry_id: entry_id.into(),
            job_id,
            queue: queue.into(),
            settlement: Some(settlement),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    /// Remove the entry for good.
    ///
    /// On error the entry stays claimed until the invisibility timeout.
    pub async fn acknowledge(mut self) -> Result<(), StorageError> {
        if let Some(settlement) = self.settlement.take() {
            settlement.acknowledge().await?;
        }
        tracing::debug!("Acknowledged job {} from {}", self.job_id, self.queue);
        Ok(())
    }

    /// Clear the claim so any worker can fetch the entry again.
    pub async fn requeue(mut self) -> Result<(), StorageError> {
        if let Some(settlement) = self.settlement.take() {
            settlement.requeue().await?;
        }
        tracing::debug!("Requeued job {} to {}", self.job_id, self.queue);
        Ok(())
    }
}

impl std::fmt::Debug for FetchedJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedJob")
            .field("entry_id", &self.entry_id)
            .field("job_id", &self.job_id)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl Drop for FetchedJob {
    fn drop(&mut self) {
        let Some(settlement) = self.settlement.take() else {
            return;
        };
        let job_id = self.job_id;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = settlement.requeue().await {
                        tracing::warn!("Failed to requeue dropped job {}: {}", job_id, e);
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    "Dropped job {} outside a runtime; it will be reclaimed after the invisibility timeout",
                    job_id
                );
            }
        }
    }
}

/// Settles entries of the `queue_entry` table.
struct SurrealSettlement {
    db: Database,
    entry_id: String,
}

impl SurrealSettlement {
    fn fetched(db: Database, entry: QueueEntry) -> FetchedJob {
        let settlement = Box::new(Self {
            db,
            entry_id: entry.id.clone(),
        });
        FetchedJob::new(entry.id, entry.job_id, entry.queue, settlement)
    }
}

impl Settlement for SurrealSettlement {
    fn acknowledge(self: Box<Self>) -> BackendFuture<'static, ()> {
        Box::pin(async move {
            QueueEntryRepository::delete(&self.db, &self.entry_id).await?;
            Ok(())
        })
    }

    fn requeue(self: Box<Self>) -> BackendFuture<'static, ()> {
        Box::pin(async move {
            QueueEntryRepository::release(&self.db, &self.entry_id).await?;
            Ok(())
        })
    }
}
