//! Background Expiry Sweeper
//!
//! Lazy expiry only reclaims keys that somebody reads again. A load run writes
//! far more keys than it rereads, so the `memory` backend also runs this task,
//! which wakes on an interval and purges expired entries.
//!
//! The interval adapts: it halves (down to `min_interval`) while sweeps keep
//! finding a large share of expired keys, and doubles (up to `max_interval`)
//! while they find nothing.

use crate::storage::MemoryStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, trace};

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Starting interval between sweeps (default: 100ms)
    pub base_interval: Duration,

    /// Lower bound for the interval (default: 10ms)
    pub min_interval: Duration,

    /// Upper bound for the interval (default: 1s)
    pub max_interval: Duration,

    /// Speed up when more than this fraction of keys expired in one sweep
    pub speedup_threshold: f64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(100),
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            speedup_threshold: 0.25,
        }
    }
}

/// Handle to a running sweeper task. Dropping it stops the task.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Spawns the sweeper on the current tokio runtime.
    pub fn start(store: Arc<MemoryStore>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(sweeper_loop(store, config, shutdown_rx));
        debug!("Expiry sweeper started");
        Self { shutdown_tx }
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(
    store: Arc<MemoryStore>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = config.base_interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper stopped");
                    return;
                }
            }
        }

        let keys_before = store.len();
        let purged = store.purge_expired();

        if keys_before == 0 {
            continue;
        }

        let rate = purged as f64 / keys_before as f64;
        if rate > config.speedup_threshold {
            interval = (interval / 2).max(config.min_interval);
        } else if purged == 0 {
            interval = (interval * 2).min(config.max_interval);
        }

        trace!(
            purged,
            keys_remaining = store.len(),
            interval_ms = interval.as_millis() as u64,
            "Expiry sweep"
        );
    }
}
