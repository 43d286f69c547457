//! Write batches: deferred mutations applied in order on commit.
//!
//! A batch is not atomic across records. Commands run one after another and
//! the first failure stops the commit, leaving earlier commands applied.

use std::time::Duration;

use db::repositories::{
    CounterRepository, HashRepository, JobRepository, KeyedTable, ListRepository, SetRepository,
};
use jobstore_core::{JobId, JobState, StorageError};

use crate::storage::JobStorage;

/// A single deferred mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ExpireJob { job_id: JobId, ttl: Duration },
    PersistJob { job_id: JobId },
    /// Append to the history and make it the current state.
    SetJobState { job_id: JobId, state: JobState },
    /// Append to the history only.
    AddJobState { job_id: JobId, state: JobState },
    AddToQueue { queue: String, job_id: JobId },
    AdjustCounter {
        key: String,
        delta: i64,
        ttl: Option<Duration>,
    },
    AddToSet { key: String, value: String, score: f64 },
    RemoveFromSet { key: String, value: String },
    AddRangeToSet { key: String, values: Vec<String> },
    RemoveSet { key: String },
    InsertToList { key: String, value: String },
    RemoveFromList { key: String, value: String },
    TrimList { key: String, start: usize, end: usize },
    SetRangeInHash {
        key: String,
        pairs: Vec<(String, String)>,
    },
    RemoveHash { key: String },
    Expire {
        table: KeyedTable,
        key: String,
        ttl: Duration,
    },
    Persist { table: KeyedTable, key: String },
}

/// Collects commands and applies them on [`commit`](WriteBatch::commit).
pub struct WriteBatch {
    storage: JobStorage,
    commands: Vec<Command>,
}

impl WriteBatch {
    pub(crate) fn new(storage: JobStorage) -> Self {
        Self {
            storage,
            commands: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn expire_job(&mut self, job_id: JobId, ttl: Duration) {
        self.commands.push(Command::ExpireJob { job_id, ttl });
    }

    pub fn persist_job(&mut self, job_id: JobId) {
        self.commands.push(Command::PersistJob { job_id });
    }

    pub fn set_job_state(&mut self, job_id: JobId, state: JobState) {
        self.commands.push(Command::SetJobState { job_id, state });
    }

    pub fn add_job_state(&mut self, job_id: JobId, state: JobState) {
        self.commands.push(Command::AddJobState { job_id, state });
    }

    pub fn add_to_queue(&mut self, queue: impl Into<String>, job_id: JobId) {
        self.commands.push(Command::AddToQueue {
            queue: queue.into(),
            job_id,
        });
    }

    pub fn increment_counter(&mut self, key: impl Into<String>) {
        self.adjust_counter(key.into(), 1, None);
    }

    pub fn increment_counter_with_ttl(&mut self, key: impl Into<String>, ttl: Duration) {
        self.adjust_counter(key.into(), 1, Some(ttl));
    }

    pub fn decrement_counter(&mut self, key: impl Into<String>) {
        self.adjust_counter(key.into(), -1, None);
    }

    pub fn decrement_counter_with_ttl(&mut self, key: impl Into<String>, ttl: Duration) {
        self.adjust_counter(key.into(), -1, Some(ttl));
    }

    fn adjust_counter(&mut self, key: String, delta: i64, ttl: Option<Duration>) {
        self.commands.push(Command::AdjustCounter { key, delta, ttl });
    }

    pub fn add_to_set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.add_to_set_with_score(key, value, 0.0);
    }

    pub fn add_to_set_with_score(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        score: f64,
    ) {
        self.commands.push(Command::AddToSet {
            key: key.into(),
            value: value.into(),
            score,
        });
    }

    pub fn remove_from_set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.commands.push(Command::RemoveFromSet {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Add each value that is not already a member. Existing scores are kept.
    pub fn add_range_to_set<I, S>(&mut self, key: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands.push(Command::AddRangeToSet {
            key: key.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
    }

    pub fn remove_set(&mut self, key: impl Into<String>) {
        self.commands.push(Command::RemoveSet { key: key.into() });
    }

    pub fn expire_set(&mut self, key: impl Into<String>, ttl: Duration) {
        self.expire(KeyedTable::Set, key.into(), ttl);
    }

    pub fn persist_set(&mut self, key: impl Into<String>) {
        self.persist(KeyedTable::Set, key.into());
    }

    pub fn insert_to_list(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.commands.push(Command::InsertToList {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Remove every occurrence of `value`.
    pub fn remove_from_list(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.commands.push(Command::RemoveFromList {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Keep positions `start..=end` of the list and delete the rest.
    pub fn trim_list(&mut self, key: impl Into<String>, start: usize, end: usize) {
        self.commands.push(Command::TrimList {
            key: key.into(),
            start,
            end,
        });
    }

    pub fn expire_list(&mut self, key: impl Into<String>, ttl: Duration) {
        self.expire(KeyedTable::List, key.into(), ttl);
    }

    pub fn persist_list(&mut self, key: impl Into<String>) {
        self.persist(KeyedTable::List, key.into());
    }

    /// Upsert every field of the hash.
    pub fn set_range_in_hash<I, F, V>(
        &mut self,
        key: impl Into<String>,
        pairs: I,
    ) -> Result<(), StorageError>
    where
        I: IntoIterator<Item = (F, V)>,
        F: Into<String>,
        V: Into<String>,
    {
        let key = non_empty_key(key.into())?;
        self.commands.push(Command::SetRangeInHash {
            key,
            pairs: pairs
                .into_iter()
                .map(|(field, value)| (field.into(), value.into()))
                .collect(),
        });
        Ok(())
    }

    pub fn remove_hash(&mut self, key: impl Into<String>) -> Result<(), StorageError> {
        let key = non_empty_key(key.into())?;
        self.commands.push(Command::RemoveHash { key });
        Ok(())
    }

    pub fn expire_hash(&mut self, key: impl Into<String>, ttl: Duration) {
        self.expire(KeyedTable::Hash, key.into(), ttl);
    }

    pub fn persist_hash(&mut self, key: impl Into<String>) {
        self.persist(KeyedTable::Hash, key.into());
    }

    fn expire(&mut self, table: KeyedTable, key: String, ttl: Duration) {
        self.commands.push(Command::Expire { table, key, ttl });
    }

    fn persist(&mut self, table: KeyedTable, key: String) {
        self.commands.push(Command::Persist { table, key });
    }

    /// Apply the commands in the order they were added.
    pub async fn commit(self) -> Result<(), StorageError> {
        let total = self.commands.len();

        for (index, command) in self.commands.iter().enumerate() {
            if let Err(e) = self.apply(command).await {
                tracing::warn!(
                    "Write batch stopped at command {} of {}: {}",
                    index + 1,
                    total,
                    e
                );
                return Err(e);
            }
        }

        tracing::debug!("Committed write batch of {} commands", total);
        Ok(())
    }

    async fn apply(&self, command: &Command) -> Result<(), StorageError> {
        let db = self.storage.database();

        match command {
            Command::ExpireJob { job_id, ttl } => JobRepository::expire(db, *job_id, *ttl).await?,
            Command::PersistJob { job_id } => JobRepository::persist(db, *job_id).await?,
            Command::SetJobState { job_id, state } => {
                JobRepository::set_state(db, *job_id, state).await?
            }
            Command::AddJobState { job_id, state } => {
                JobRepository::add_state(db, *job_id, state).await?
            }
            Command::AddToQueue { queue, job_id } => {
                self.storage.enqueue(queue, *job_id).await?
            }
            Command::AdjustCounter { key, delta, ttl } => {
                CounterRepository::append(db, key, *delta, *ttl).await?
            }
            Command::AddToSet { key, value, score } => {
                SetRepository::add(db, key, value, *score).await?
            }
            Command::RemoveFromSet { key, value } => SetRepository::remove(db, key, value).await?,
            Command::AddRangeToSet { key, values } => {
                for value in values {
                    SetRepository::add_if_absent(db, key, value).await?;
                }
            }
            Command::RemoveSet { key } => KeyedTable::Set.remove_key(db, key).await?,
            Command::InsertToList { key, value } => ListRepository::insert(db, key, value).await?,
            Command::RemoveFromList { key, value } => {
                ListRepository::remove(db, key, value).await?
            }
            Command::TrimList { key, start, end } => {
                ListRepository::trim(db, key, *start, *end).await?
            }
            Command::SetRangeInHash { key, pairs } => {
                HashRepository::set_range(db, key, pairs).await?
            }
            Command::RemoveHash { key } => KeyedTable::Hash.remove_key(db, key).await?,
            Command::Expire { table, key, ttl } => table.expire(db, key, *ttl).await?,
            Command::Persist { table, key } => table.persist(db, key).await?,
        }

        Ok(())
    }
}

fn non_empty_key(key: String) -> Result<String, StorageError> {
    if key.is_empty() {
        return Err(StorageError::argument("key", "must not be empty"));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_is_rejected_without_a_store() {
        assert!(non_empty_key(String::new()).is_err());
        assert_eq!(non_empty_key("k".into()).ok().as_deref(), Some("k"));
    }
}
