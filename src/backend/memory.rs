//! In-process backend over a [`MemoryStore`].
//!
//! `insert` has add semantics: it fails with [`BackendError::KeyExists`] when the
//! key is already present, matching what a real server does for `SET ... NX`.

use crate::backend::{BackendError, StorageBackend};
use crate::storage::{ExpiryConfig, ExpirySweeper, MemoryStore};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub struct MemoryBackend {
    store: Arc<MemoryStore>,
    sweeper: Option<ExpirySweeper>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Creates a backend without a background sweeper. Expired keys are then
    /// only reclaimed when read.
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            sweeper: None,
        }
    }

    /// Creates a backend and starts an [`ExpirySweeper`] for it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_sweeper(config: ExpiryConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let sweeper = ExpirySweeper::start(Arc::clone(&store), config);
        Self {
            store,
            sweeper: Some(sweeper),
        }
    }

    pub fn has_sweeper(&self) -> bool {
        self.sweeper.is_some()
    }

    /// The underlying store, for inspecting what a run left behind.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }
}

fn ttl(expiry: u32) -> Option<Duration> {
    (expiry > 0).then(|| Duration::from_secs(u64::from(expiry)))
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, key: &str, value: Bytes, expiry: u32) -> Result<(), BackendError> {
        if self
            .store
            .insert(Bytes::copy_from_slice(key.as_bytes()), value, ttl(expiry))
        {
            Ok(())
        } else {
            Err(BackendError::KeyExists(key.to_string()))
        }
    }

    async fn get(&self, key: &str, out: &mut BytesMut) -> Result<(), BackendError> {
        match self.store.get(key.as_bytes()) {
            Some(value) => {
                out.clear();
                out.extend_from_slice(&value);
                Ok(())
            }
            None => Err(BackendError::NotFound(key.to_string())),
        }
    }

    async fn update(&self, key: &str, value: Bytes, expiry: u32) -> Result<(), BackendError> {
        self.store
            .put(Bytes::copy_from_slice(key.as_bytes()), value, ttl(expiry));
        Ok(())
    }
}
