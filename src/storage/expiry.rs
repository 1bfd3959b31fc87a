//! Background Reaper
//!
//! This module implements a background task that periodically scans the
//! expiry table and removes every key whose TTL has elapsed. This is "eager
//! expiry", as opposed to the "lazy expiry" the store performs on access.
//!
//! ## Why Do We Need This?
//!
//! Lazy expiry only fires when a key is touched. A key that expires and is
//! never accessed again would otherwise stay in memory (and in every snapshot
//! attempt) forever.
//!
//! ## Design
//!
//! The reaper runs as a Tokio task and:
//! 1. Sleeps for a fixed interval (default: 1s)
//! 2. Wakes up and calls [`Store::evict_expired`]
//! 3. Logs how many keys were removed
//!
//! A sweep that panics is logged and the loop carries on with the next tick;
//! the store recovers its lock if the panic happened while it was held.
//! The task stops when [`Reaper::shutdown`] is awaited or the handle is dropped.

use crate::storage::Store;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

/// Configuration for the reaper.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Interval between sweeps (default: 1s)
    pub interval: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

/// A handle to the running reaper.
///
/// When this handle is dropped, the reaper task is signalled to stop.
#[derive(Debug)]
pub struct Reaper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
    /// The sweeping task
    handle: Option<JoinHandle<()>>,
}

impl Reaper {
    /// Starts the reaper as a background task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use durakv::storage::{Reaper, ReaperConfig, Store};
    /// use std::sync::Arc;
    ///
    /// let store = Arc::new(Store::new());
    /// let reaper = Reaper::start(Arc::clone(&store), ReaperConfig::default());
    ///
    /// // Reaper runs in the background...
    ///
    /// reaper.shutdown().await;
    /// ```
    pub fn start(store: Arc<Store>, config: ReaperConfig) -> Self {
        Self::spawn(config, move || store.evict_expired())
    }

    /// Runs `sweep` every interval until stopped.
    fn spawn<F>(config: ReaperConfig, sweep: F) -> Self
    where
        F: Fn() -> u64 + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let interval_ms = config.interval.as_millis() as u64;
        let handle = tokio::spawn(reaper_loop(sweep, config, shutdown_rx));

        info!(interval_ms, "Background reaper started");

        Self {
            shutdown_tx,
            handle: Some(handle),
        }
    }

    /// Signals the reaper to stop without waiting for it.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        if !self.shutdown_tx.send_replace(true) {
            info!("Background reaper stopped");
        }
    }

    /// Stops the reaper and waits for its task to finish.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Reaper task ended abnormally");
            }
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The main reaper loop.
async fn reaper_loop<F>(sweep: F, config: ReaperConfig, mut shutdown_rx: watch::Receiver<bool>)
where
    F: Fn() -> u64,
{
    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Reaper received shutdown signal");
                    return;
                }
            }
        }

        sweep_once(&sweep);
    }
}

/// Runs one sweep, containing a panic to this tick.
///
/// Returns the number of evicted keys, or `None` if the sweep panicked.
fn sweep_once(sweep: &dyn Fn() -> u64) -> Option<u64> {
    match panic::catch_unwind(AssertUnwindSafe(sweep)) {
        Ok(0) => {
            trace!("Reaper sweep found nothing to evict");
            Some(0)
        }
        Ok(expired) => {
            debug!(expired, "Expired keys reaped");
            Some(expired)
        }
        Err(_) => {
            error!("Reaper sweep panicked, continuing on next tick");
            None
        }
    }
}
