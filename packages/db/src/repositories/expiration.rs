//! Removal of records whose expiration has passed.

use crate::schema::tables;
use crate::{Database, DbError};

use super::IdRecord;

/// Tables that carry an `expire_at` field.
const EXPIRING_TABLES: [&str; 7] = [
    tables::JOB,
    tables::COUNTER,
    tables::AGGREGATED_COUNTER,
    tables::SET_ENTRY,
    tables::LIST_ENTRY,
    tables::HASH_ENTRY,
    tables::SIGNAL,
];

/// Repository for the expiration sweep.
pub struct ExpirationRepository;

impl ExpirationRepository {
    /// Delete expired records from every expiring table.
    /// Returns the number of records removed.
    pub async fn remove_expired(db: &Database) -> Result<usize, DbError> {
        let mut removed = 0;

        for table in EXPIRING_TABLES {
            let query = format!(
                "DELETE {table} WHERE expire_at != NONE AND expire_at < time::now() RETURN BEFORE"
            );

            let mut result = db.query(query).await?;
            let records: Vec<IdRecord> = result.take(0)?;

            if !records.is_empty() {
                tracing::debug!("Removed {} expired records from {}", records.len(), table);
            }
            removed += records.len();
        }

        Ok(removed)
    }
}
