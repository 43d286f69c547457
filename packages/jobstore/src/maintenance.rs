//! Background housekeeping: expiration sweep and counter aggregation.

use db::Database;
use db::repositories::{CounterRepository, ExpirationRepository};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::storage::JobStorage;

/// Raw counter records folded per aggregation pass.
const AGGREGATE_BATCH: usize = 1000;

/// Periodic maintenance loop.
pub struct Maintenance;

impl Maintenance {
    /// Run the expiration manager and the counter aggregator on their
    /// configured intervals until `token` is cancelled.
    pub fn spawn(storage: &JobStorage, token: CancellationToken) -> JoinHandle<()> {
        let db = storage.database().clone();
        let expiration_every = storage.options().expiration_check_interval();
        let aggregate_every = storage.options().counters_aggregate_interval();

        tokio::spawn(async move {
            tracing::info!("Starting storage maintenance");

            let mut expiration = tokio::time::interval(expiration_every);
            expiration.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut aggregation = tokio::time::interval(aggregate_every);
            aggregation.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = expiration.tick() => Self::remove_expired(&db).await,
                    _ = aggregation.tick() => Self::aggregate_counters(&db).await,
                }
            }

            tracing::info!("Storage maintenance stopped");
        })
    }

    async fn remove_expired(db: &Database) {
        match ExpirationRepository::remove_expired(db).await {
            Ok(0) => {}
            Ok(removed) => tracing::info!("Removed {} expired records", removed),
            Err(e) => tracing::warn!("Expiration sweep failed: {}", e),
        }
    }

    /// Fold until a pass comes back short, so a backlog clears in one tick.
    async fn aggregate_counters(db: &Database) {
        loop {
            match CounterRepository::aggregate(db, AGGREGATE_BATCH).await {
                Ok(folded) if folded == AGGREGATE_BATCH => continue,
                Ok(_) => break,
                Err(e) => {
                    tracing::warn!("Counter aggregation failed: {}", e);
                    break;
                }
            }
        }
    }
}
