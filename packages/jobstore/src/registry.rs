//! Queue backend trait and the registry resolving queue names to backends.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use jobstore_core::{JobId, StorageError};
use tokio_util::sync::CancellationToken;

use crate::job_queue::{FetchedJob, SurrealJobQueue};

/// Future type returned by queue backends.
pub type BackendFuture<'a, T> = BoxFuture<'a, Result<T, StorageError>>;

/// Trait for queue backends.
///
/// Implement this trait to route some queues somewhere other than the
/// default SurrealDB queue.
pub trait QueueBackend: Send + Sync + 'static {
    /// Make the job available on `queue`.
    fn enqueue<'a>(&'a self, queue: &'a str, job_id: JobId) -> BackendFuture<'a, ()>;

    /// Claim the next job from `queues`, in priority order.
    fn dequeue<'a>(
        &'a self,
        queues: &'a [String],
        cancellation: &'a CancellationToken,
    ) -> BackendFuture<'a, FetchedJob>;
}

impl QueueBackend for SurrealJobQueue {
    fn enqueue<'a>(&'a self, queue: &'a str, job_id: JobId) -> BackendFuture<'a, ()> {
        Box::pin(SurrealJobQueue::enqueue(self, queue, job_id))
    }

    fn dequeue<'a>(
        &'a self,
        queues: &'a [String],
        cancellation: &'a CancellationToken,
    ) -> BackendFuture<'a, FetchedJob> {
        Box::pin(SurrealJobQueue::dequeue(self, queues, cancellation))
    }
}

/// Registry for queue backends.
///
/// Maps queue names to their backends; names without an explicit
/// registration resolve to the default backend.
#[derive(Clone)]
pub struct QueueProviders {
    default: Arc<dyn QueueBackend>,
    providers: HashMap<String, Arc<dyn QueueBackend>>,
}

impl QueueProviders {
    /// Create a registry that sends every queue to `default`.
    pub fn new(default: Arc<dyn QueueBackend>) -> Self {
        Self {
            default,
            providers: HashMap::new(),
        }
    }

    /// Register a backend for the given queues.
    pub fn add<I, S>(&mut self, queues: I, backend: Arc<dyn QueueBackend>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for queue in queues {
            self.providers.insert(queue.into(), backend.clone());
        }
    }

    /// Builder form of [`add`](QueueProviders::add).
    pub fn with_provider<I, S>(mut self, queues: I, backend: Arc<dyn QueueBackend>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add(queues, backend);
        self
    }

    /// Get the backend responsible for a queue.
    pub fn get(&self, queue: &str) -> &Arc<dyn QueueBackend> {
        self.providers.get(queue).unwrap_or(&self.default)
    }

    pub fn default_backend(&self) -> &Arc<dyn QueueBackend> {
        &self.default
    }

    /// Resolve the single backend serving all of `queues`.
    ///
    /// A dequeue can only wait on one backend, so mixing queues of different
    /// backends is an argument error.
    pub fn resolve(&self, queues: &[String]) -> Result<&Arc<dyn QueueBackend>, StorageError> {
        let (first, rest) = queues
            .split_first()
            .ok_or_else(|| StorageError::argument("queues", "at least one queue is required"))?;

        let backend = self.get(first);
        for queue in rest {
            if !std::ptr::addr_eq(Arc::as_ptr(backend), Arc::as_ptr(self.get(queue))) {
                return Err(StorageError::argument(
                    "queues",
                    "all queues must be served by the same backend",
                ));
            }
        }

        Ok(backend)
    }

    /// List queue names with an explicit registration.
    pub fn registered_queues(&self) -> Vec<&str> {
        let mut queues: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        queues.sort_unstable();
        queues
    }
}
