//! Core domain types for the job storage system.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobState and StateRecord for jobs and their history
//! - QueueEntry and QueueCounts for queued work
//! - SetEntry and the pair keys of set and hash records
//! - StorageOptions and StorageError

mod config;
mod entries;
mod error;
mod ids;
mod job;
mod queue;

pub use config::StorageOptions;
pub use entries::{SetEntry, pair_key};
pub use error::StorageError;
pub use ids::next_ordered_id;
pub use job::{Job, JobId, JobState, StateRecord};
pub use queue::{QueueCounts, QueueEntry};
