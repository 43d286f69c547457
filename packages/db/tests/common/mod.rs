use std::time::Duration;

use db::{Database, DbConfig, DbError};

/// Each call opens its own embedded in-memory datastore, so tests never see
/// each other's records.
pub async fn setup_db() -> Result<Database, DbError> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    db::init(&DbConfig::memory()).await
}

/// Move a claim into the past, as if its worker died `ago` earlier.
pub async fn backdate_claim(db: &Database, entry_id: &str, ago: Duration) -> Result<(), DbError> {
    db.query(
        "UPDATE type::thing('queue_entry', $id) SET fetched_at = time::now() - duration::from::millis($ago_ms) RETURN NONE",
    )
    .bind(("id", entry_id.to_string()))
    .bind(("ago_ms", ago.as_millis() as i64))
    .await?
    .check()?;

    Ok(())
}
