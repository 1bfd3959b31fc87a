//! Snapshot Scheduler
//!
//! A background task that periodically writes the store to its snapshot file.
//!
//! Every `interval` the task wakes up and, if at least that much time has
//! passed since the last successful save (a `FLUSHALL` also counts as one),
//! writes a new snapshot on Tokio's blocking pool. Failures are logged and
//! retried on the next tick; the in-memory store is never affected.
//!
//! [`SnapshotScheduler::shutdown`] stops the task and writes one final
//! snapshot, so a graceful exit loses nothing.

use crate::storage::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

/// Configuration for the snapshot scheduler.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Minimum time between two snapshots (default: 30s)
    pub interval: Duration,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

/// A handle to the running snapshot scheduler.
///
/// Dropping the handle signals the task to stop but skips the final save.
#[derive(Debug)]
pub struct SnapshotScheduler {
    store: Arc<Store>,
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl SnapshotScheduler {
    /// Starts the scheduler as a background task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(store: Arc<Store>, config: SnapshotConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let interval_secs = config.interval.as_secs_f64();
        let handle = tokio::spawn(scheduler_loop(Arc::clone(&store), config, shutdown_rx));

        info!(interval_secs, "Snapshot scheduler started");

        Self {
            store,
            shutdown_tx,
            handle: Some(handle),
        }
    }

    /// Signals the scheduler to stop without waiting for it.
    pub fn stop(&self) {
        if !self.shutdown_tx.send_replace(true) {
            info!("Snapshot scheduler stopped");
        }
    }

    /// Stops the scheduler, waits for it, then writes a final snapshot.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Snapshot task ended abnormally");
            }
        }

        save_in_background(Arc::clone(&self.store)).await;
    }
}

impl Drop for SnapshotScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Saves on the blocking pool and logs the outcome.
async fn save_in_background(store: Arc<Store>) {
    match tokio::task::spawn_blocking(move || store.save_snapshot()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Error saving snapshot"),
        Err(e) => error!(error = %e, "Snapshot save task failed"),
    }
}

/// The main scheduler loop.
async fn scheduler_loop(
    store: Arc<Store>,
    config: SnapshotConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Snapshot scheduler received shutdown signal");
                    return;
                }
            }
        }

        let since_last = store.since_last_save();
        if since_last < config.interval {
            trace!(
                since_last_ms = since_last.as_millis() as u64,
                "Recent snapshot exists, skipping"
            );
            continue;
        }

        save_in_background(Arc::clone(&store)).await;
    }
}
