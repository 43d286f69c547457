//! Persisted wake-up signals.

use std::time::Duration;

use jobstore_core::next_ordered_id;
use serde::Deserialize;

use super::millis;
use crate::{Database, DbError};

/// Repository for the shared signal mailbox.
pub struct SignalRepository;

#[derive(Debug, Deserialize)]
struct SignalRecord {
    name: String,
}

impl SignalRepository {
    /// Append a signal; any listener in any process may consume it until
    /// `ttl` has passed. Expired signals are left to the expiration sweep.
    pub async fn post(db: &Database, name: &str, ttl: Duration) -> Result<(), DbError> {
        db.query(
            "CREATE type::thing('signal', $id) SET name = $name, created_at = time::now(), expire_at = time::now() + duration::from::millis($ttl_ms) RETURN NONE",
        )
        .bind(("id", next_ordered_id().to_string()))
        .bind(("name", name.to_string()))
        .bind(("ttl_ms", millis(ttl)))
        .await?
        .check()?;

        Ok(())
    }

    /// Claim and delete the oldest live signal in one statement.
    /// Returns its name, or `None` when the mailbox is empty.
    pub async fn take_one(db: &Database) -> Result<Option<String>, DbError> {
        let taken: Result<Vec<SignalRecord>, DbError> = async {
            let mut result = db
                .query("DELETE (SELECT VALUE id FROM signal WHERE expire_at > time::now() ORDER BY id ASC LIMIT 1) RETURN BEFORE")
                .await?;
            Ok(result.take(0)?)
        }
        .await;

        // Another listener consumed it first
        let records = match taken {
            Err(e) if e.is_conflict() => return Ok(None),
            other => other?,
        };
        Ok(records.into_iter().next().map(|r| r.name))
    }

    /// Number of stored signals, expired ones included.
    pub async fn pending(db: &Database) -> Result<u64, DbError> {
        let mut result = db.query("SELECT count() FROM signal GROUP ALL").await?;

        #[derive(Deserialize)]
        struct CountResult {
            count: i64,
        }

        let counts: Vec<CountResult> = result.take(0)?;
        Ok(counts.first().map_or(0, |c| c.count.max(0) as u64))
    }
}
