//! Hashes: one record per `(key, field)`, upserted field by field.

use std::collections::HashMap;

use jobstore_core::pair_key;
use serde::Deserialize;

use crate::{Database, DbError};

/// Repository for hash entries.
pub struct HashRepository;

impl HashRepository {
    /// Upsert each field under `key`. Fields not mentioned are untouched.
    pub async fn set_range(
        db: &Database,
        key: &str,
        fields: &[(String, String)],
    ) -> Result<(), DbError> {
        for (field, value) in fields {
            db.query(
                "UPSERT type::thing('hash_entry', $rid) SET key = $key, field = $field, value = $value RETURN NONE",
            )
            .bind(("rid", pair_key(key, field)))
            .bind(("key", key.to_string()))
            .bind(("field", field.clone()))
            .bind(("value", value.clone()))
            .await?
            .check()?;
        }

        Ok(())
    }

    /// All fields of the hash.
    pub async fn get_all(db: &Database, key: &str) -> Result<HashMap<String, String>, DbError> {
        let mut result = db
            .query("SELECT field, value FROM hash_entry WHERE key = $key")
            .bind(("key", key.to_string()))
            .await?;

        #[derive(Deserialize)]
        struct FieldValue {
            field: String,
            value: String,
        }

        let rows: Vec<FieldValue> = result.take(0)?;
        Ok(rows.into_iter().map(|r| (r.field, r.value)).collect())
    }
}
