//! Repository implementations for database operations.

use std::time::Duration;

use serde::Deserialize;
use surrealdb::sql::Thing;

mod counter_repo;
mod expiration;
mod hash_repo;
mod job_repo;
mod keyed;
mod list_repo;
mod queue_repo;
mod set_repo;
mod signal_repo;

pub use counter_repo::CounterRepository;
pub use expiration::ExpirationRepository;
pub use hash_repo::HashRepository;
pub use job_repo::{JobCreate, JobRepository};
pub use keyed::KeyedTable;
pub use list_repo::{ListRepository, trim_window};
pub use queue_repo::QueueEntryRepository;
pub use set_repo::SetRepository;
pub use signal_repo::SignalRepository;

/// Record reads that only need the id.
#[derive(Debug, Deserialize)]
pub(crate) struct IdRecord {
    pub id: Thing,
}

/// The key part of a record id, e.g. `01J..` for `job:01J..`.
pub(crate) fn record_key(thing: &Thing) -> String {
    thing.id.to_raw()
}

/// Durations are passed to SurrealQL as integer milliseconds and converted
/// with `duration::from::millis`.
pub(crate) fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
