//! Table and index definitions using SurrealQL.

use crate::{Database, DbError};

/// Table names used by the repositories.
pub mod tables {
    pub const JOB: &str = "job";
    pub const QUEUE_ENTRY: &str = "queue_entry";
    pub const SIGNAL: &str = "signal";
    pub const COUNTER: &str = "counter";
    pub const AGGREGATED_COUNTER: &str = "aggregated_counter";
    pub const SET_ENTRY: &str = "set_entry";
    pub const LIST_ENTRY: &str = "list_entry";
    pub const HASH_ENTRY: &str = "hash_entry";
}

/// Initialize tables and indexes. Safe to run repeatedly.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    tracing::info!("Initializing database schema...");

    db.query(JOB_SCHEMA).await?.check()?;
    db.query(QUEUE_SCHEMA).await?.check()?;
    db.query(KEYED_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

const JOB_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS job SCHEMALESS;
DEFINE INDEX IF NOT EXISTS job_state_name ON job FIELDS state_name;
DEFINE INDEX IF NOT EXISTS job_expire_at ON job FIELDS expire_at;
"#;

const QUEUE_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS queue_entry SCHEMALESS;
DEFINE INDEX IF NOT EXISTS queue_entry_claim ON queue_entry FIELDS queue, fetched_at;
DEFINE INDEX IF NOT EXISTS queue_entry_job ON queue_entry FIELDS job_id;

DEFINE TABLE IF NOT EXISTS signal SCHEMALESS;
DEFINE INDEX IF NOT EXISTS signal_name ON signal FIELDS name;
"#;

const KEYED_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS counter SCHEMALESS;
DEFINE INDEX IF NOT EXISTS counter_key ON counter FIELDS key;

DEFINE TABLE IF NOT EXISTS aggregated_counter SCHEMALESS;
DEFINE INDEX IF NOT EXISTS aggregated_counter_key ON aggregated_counter FIELDS key;

DEFINE TABLE IF NOT EXISTS set_entry SCHEMALESS;
DEFINE INDEX IF NOT EXISTS set_entry_key ON set_entry FIELDS key;

DEFINE TABLE IF NOT EXISTS list_entry SCHEMALESS;
DEFINE INDEX IF NOT EXISTS list_entry_key ON list_entry FIELDS key;

DEFINE TABLE IF NOT EXISTS hash_entry SCHEMALESS;
DEFINE INDEX IF NOT EXISTS hash_entry_key ON hash_entry FIELDS key;
"#;
