//! Slow call reporting.
//!
//! [`SlowCallLogger`] decorates any backend and emits a `warn!` for every call
//! that takes longer than its threshold. The call's result is passed through
//! untouched.

use crate::backend::{BackendError, EngineHandle, StorageBackend};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::time::{Duration, Instant};
use tracing::warn;

pub struct SlowCallLogger {
    inner: EngineHandle,
    threshold: Duration,
}

impl SlowCallLogger {
    pub fn new(inner: EngineHandle, threshold: Duration) -> Self {
        Self { inner, threshold }
    }

    fn report(&self, operation: &'static str, key: &str, started: Instant) {
        let elapsed = started.elapsed();
        if elapsed > self.threshold {
            warn!(
                backend = self.inner.name(),
                operation,
                key,
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = self.threshold.as_millis() as u64,
                "Slow backend call"
            );
        }
    }
}

#[async_trait]
impl StorageBackend for SlowCallLogger {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn insert(&self, key: &str, value: Bytes, expiry: u32) -> Result<(), BackendError> {
        let started = Instant::now();
        let result = self.inner.insert(key, value, expiry).await;
        self.report("insert", key, started);
        result
    }

    async fn get(&self, key: &str, out: &mut BytesMut) -> Result<(), BackendError> {
        let started = Instant::now();
        let result = self.inner.get(key, out).await;
        self.report("get", key, started);
        result
    }

    async fn update(&self, key: &str, value: Bytes, expiry: u32) -> Result<(), BackendError> {
        let started = Instant::now();
        let result = self.inner.update(key, value, expiry).await;
        self.report("update", key, started);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, NoopBackend};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_results_pass_through() {
        let logger = SlowCallLogger::new(Arc::new(MemoryBackend::new()), Duration::ZERO);

        logger.insert("k", Bytes::from("v"), 0).await.unwrap();
        assert!(matches!(
            logger.insert("k", Bytes::from("v"), 0).await,
            Err(BackendError::KeyExists(_))
        ));

        let mut out = BytesMut::new();
        logger.get("k", &mut out).await.unwrap();
        assert_eq!(&out[..], b"v");
    }

    #[tokio::test]
    async fn test_reports_inner_name() {
        let logger = SlowCallLogger::new(Arc::new(NoopBackend), Duration::from_secs(1));
        assert_eq!(logger.name(), "noop");
        assert!(logger.update("k", Bytes::new(), 0).await.is_ok());
    }
}
