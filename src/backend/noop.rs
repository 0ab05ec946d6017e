//! A backend that accepts every call and stores nothing.
//!
//! Running against it measures the pipeline's own overhead.

use crate::backend::{BackendError, StorageBackend};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBackend;

#[async_trait]
impl StorageBackend for NoopBackend {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn insert(&self, _key: &str, _value: Bytes, _expiry: u32) -> Result<(), BackendError> {
        Ok(())
    }

    async fn get(&self, _key: &str, out: &mut BytesMut) -> Result<(), BackendError> {
        out.clear();
        Ok(())
    }

    async fn update(&self, _key: &str, _value: Bytes, _expiry: u32) -> Result<(), BackendError> {
        Ok(())
    }
}
