//! Single-document update loop.
//!
//! A one-off workload: insert one key, then overwrite it again and again with
//! `value-1`, `value-2`, ... pausing between writes. Useful for watching how a
//! backend (or anything replicating from it) reacts to a hot document.
//!
//! Unlike the pipeline, any failed call ends the loop and is returned.

use crate::backend::{BackendError, StorageBackend};
use crate::pipeline::KeyGenerator;
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, info};

/// Default number of writes (the first insert included)
pub const DEFAULT_UPDATES: u32 = 10;

/// Default pause between writes
pub const DEFAULT_UPDATE_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct UpdateLoop {
    /// Total writes, the initial insert included
    pub updates: u32,
    pub delay: Duration,
    /// Expiry sent with every write (0 = never)
    pub expiry: u32,
    pub keys: KeyGenerator,
}

impl Default for UpdateLoop {
    fn default() -> Self {
        Self {
            updates: DEFAULT_UPDATES,
            delay: DEFAULT_UPDATE_DELAY,
            expiry: 0,
            keys: KeyGenerator::new(),
        }
    }
}

impl UpdateLoop {
    /// Runs the loop against `engine` and returns the key it wrote.
    pub async fn run(&self, engine: &dyn StorageBackend) -> Result<String, BackendError> {
        let key = self.keys.single_key();

        for i in 0..self.updates {
            let value = Bytes::from(format!("value-{}", i));

            if i == 0 {
                info!(key = %key, backend = engine.name(), "Inserting key");
                engine.insert(&key, value, self.expiry).await?;
            } else {
                info!(key = %key, update = i, "Updating key");
                engine.update(&key, value, self.expiry).await?;
            }

            if i + 1 < self.updates && !self.delay.is_zero() {
                debug!(delay_ms = self.delay.as_millis() as u64, "Sleeping");
                tokio::time::sleep(self.delay).await;
            }
        }

        Ok(key)
    }
}
