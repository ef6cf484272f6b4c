use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::engine::{now_ms, Engine};

/// Background task that periodically releases reservations whose check-in
/// deadline has passed.
pub async fn run_sweeper(engine: Arc<Engine>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let released = engine.release_expired(now_ms()).await;
        if released > 0 {
            info!("released {released} overdue reservations");
        }
    }
}

/// Background task that rewrites the WAL once enough appends have piled up
/// since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends >= threshold {
            match engine.compact_wal().await {
                Ok(()) => info!("compacted WAL after {appends} appends"),
                Err(e) => warn!("WAL compaction failed: {e}"),
            }
        }
    }
}
