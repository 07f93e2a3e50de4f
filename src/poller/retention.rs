//! Retention manager for cleaning up old history.

use crate::db::Store;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Manager for deleting samples and runs past the retention period.
pub struct RetentionManager {
    store: Arc<Store>,
    retention: Duration,
    stop: broadcast::Sender<()>,
}

impl RetentionManager {
    pub fn new(store: Arc<Store>, retention: Duration) -> Self {
        let (stop, _) = broadcast::channel(1);
        Self {
            store,
            retention,
            stop,
        }
    }

    /// Start the retention manager background task.
    pub fn start(&self) -> JoinHandle<()> {
        let store = self.store.clone();
        let retention = self.retention;
        // Subscribe before spawning so an early stop is not missed
        let mut rx = self.stop.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));

            loop {
                tokio::select! {
                    _ = rx.recv() => break,
                    _ = interval.tick() => {
                        process_retention(&store, retention, Utc::now());
                    }
                }
            }
        })
    }

    /// Stop the retention manager.
    pub fn stop(&self) {
        let _ = self.stop.send(());
    }
}

/// Delete everything older than `now - retention`.
pub fn process_retention(store: &Store, retention: Duration, now: DateTime<Utc>) {
    let keep = ChronoDuration::from_std(retention).unwrap_or_else(|_| ChronoDuration::days(7));
    let cutoff = now - keep;

    match store.delete_samples_before(cutoff) {
        Ok(0) => {}
        Ok(n) => tracing::info!("RetentionManager: Deleted {} stats samples", n),
        Err(e) => tracing::error!("RetentionManager: Failed to delete stats samples: {}", e),
    }

    if let Err(e) = store.delete_check_runs_before(cutoff) {
        tracing::error!("RetentionManager: Failed to delete check runs: {}", e);
    }
}
