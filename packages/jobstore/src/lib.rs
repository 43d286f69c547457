//! Durable job storage over SurrealDB.
//!
//! # Architecture
//!
//! - `JobStorage` - Entry point wiring the database, queue backends and options
//! - `SurrealJobQueue` - Enqueue and blocking, timeout-reclaiming dequeue
//! - `SignalHub` - Wakes blocked dequeues when work arrives
//! - `WriteBatch` - Ordered, deferred mutations applied on commit
//! - `MonitoringApi` - Read-only queue statistics
//! - `Maintenance` - Expiration sweep and counter aggregation
//!
//! # Usage
//!
//! ```ignore
//! use jobstore::{CancellationToken, DbConfig, JobCreate, JobState, JobStorage, StorageOptions};
//!
//! let storage = JobStorage::connect(&DbConfig::memory(), StorageOptions::default()).await?;
//! let job_id = storage.create_job(JobCreate::new("Mailer.Send", "[]")).await?;
//!
//! let mut batch = storage.write_batch();
//! batch.set_job_state(job_id, JobState::new("Enqueued"));
//! batch.add_to_queue("default", job_id);
//! batch.commit().await?;
//!
//! let fetched = storage.dequeue(&["default".into()], &CancellationToken::new()).await?;
//! fetched.acknowledge().await?;
//! ```

mod job_queue;
mod maintenance;
mod monitoring;
pub mod registry;
mod signal;
mod storage;
mod transaction;

pub use job_queue::{FetchedJob, Settlement, SurrealJobQueue};
pub use maintenance::Maintenance;
pub use monitoring::MonitoringApi;
pub use registry::{BackendFuture, QueueBackend, QueueProviders};
pub use signal::{SignalHub, SignalListener, SignalMessage, SignalSubscription};
pub use storage::{JobStorage, JobStorageBuilder};
pub use transaction::{Command, WriteBatch};

/// Re-export the types callers need alongside the storage.
pub use db::repositories::{JobCreate, KeyedTable};
pub use db::{Database, DbConfig};
pub use jobstore_core::{
    Job, JobId, JobState, QueueCounts, SetEntry, StateRecord, StorageError, StorageOptions,
};
pub use tokio_util::sync::CancellationToken;
