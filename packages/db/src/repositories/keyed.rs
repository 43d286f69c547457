//! Expiration handling shared by the keyed collections.

use std::time::Duration;

use super::millis;
use crate::schema::tables;
use crate::{Database, DbError};

/// Collections whose records are grouped under a string key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyedTable {
    Set,
    List,
    Hash,
}

impl KeyedTable {
    pub fn table(self) -> &'static str {
        match self {
            KeyedTable::Set => tables::SET_ENTRY,
            KeyedTable::List => tables::LIST_ENTRY,
            KeyedTable::Hash => tables::HASH_ENTRY,
        }
    }

    /// Set `expire_at` on every record under `key`.
    pub async fn expire(self, db: &Database, key: &str, ttl: Duration) -> Result<(), DbError> {
        let query = format!(
            "UPDATE {} SET expire_at = time::now() + duration::from::millis($ttl_ms) WHERE key = $key RETURN NONE",
            self.table()
        );

        db.query(query)
            .bind(("key", key.to_string()))
            .bind(("ttl_ms", millis(ttl)))
            .await?
            .check()?;

        Ok(())
    }

    /// Clear `expire_at` on every record under `key`.
    pub async fn persist(self, db: &Database, key: &str) -> Result<(), DbError> {
        let query = format!(
            "UPDATE {} SET expire_at = NONE WHERE key = $key RETURN NONE",
            self.table()
        );

        db.query(query)
            .bind(("key", key.to_string()))
            .await?
            .check()?;

        Ok(())
    }

    /// Delete every record under `key`.
    pub async fn remove_key(self, db: &Database, key: &str) -> Result<(), DbError> {
        let query = format!("DELETE {} WHERE key = $key", self.table());

        db.query(query)
            .bind(("key", key.to_string()))
            .await?
            .check()?;

        Ok(())
    }
}
