//! Storage Backends
//!
//! The pipeline never talks to a store directly. It drives anything that
//! implements [`StorageBackend`], a two-call capability contract:
//!
//! - `insert(key, value, expiry)` - create a key that must not exist yet
//! - `get(key, out)` - fetch a key into a caller-owned buffer
//!
//! ## Available Backends
//!
//! | Name     | Type             | Handles                                      |
//! |----------|------------------|----------------------------------------------|
//! | `noop`   | [`NoopBackend`]  | one handle shared by both sides              |
//! | `memory` | [`MemoryBackend`]| one handle shared by both sides              |
//! | `resp`   | [`RespBackend`]  | `connections` TCP connections per side       |
//!
//! Any handle can be wrapped in a [`SlowCallLogger`] to report calls that take
//! longer than a threshold.
//!
//! Every backend must be safe to call from many workers at once; the pipeline
//! adds no locking of its own around backend calls.

pub mod memory;
pub mod noop;
pub mod resp;
pub mod slow;

pub use memory::MemoryBackend;
pub use noop::NoopBackend;
pub use resp::RespBackend;
pub use slow::SlowCallLogger;

use crate::config::{BackendKind, PipelineConfig};
use crate::pipeline::pool::EnginePool;
use crate::pipeline::writer::NO_EXPIRY;
use crate::protocol::ParseError;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors a backend call can return.
///
/// Inside the pipeline these are logged and counted, never propagated.
#[derive(Debug, Error)]
pub enum BackendError {
    /// `insert` on a key that is already present
    #[error("key already exists: {0}")]
    KeyExists(String),

    /// `get` on a key that is not present
    #[error("key not found: {0}")]
    NotFound(String),

    /// The backend does not implement this operation
    #[error("{backend} backend does not support {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    /// Could not open a connection
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error on an open connection
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server sent bytes that are not valid RESP
    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// The server answered with an error reply
    #[error("server error: {0}")]
    Server(String),

    /// The server answered with a reply of the wrong type
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    /// The server closed the connection
    #[error("connection closed by server")]
    Disconnected,
}

/// The capability contract every load target implements.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Creates `key` with `value`. An `expiry` of 0 means the key never expires,
    /// otherwise it is a TTL in seconds.
    async fn insert(&self, key: &str, value: Bytes, expiry: u32) -> Result<(), BackendError>;

    /// Fetches `key`, replacing the contents of `out` with its value.
    async fn get(&self, key: &str, out: &mut BytesMut) -> Result<(), BackendError>;

    /// Overwrites `key` whether or not it exists.
    async fn update(&self, _key: &str, _value: Bytes, _expiry: u32) -> Result<(), BackendError> {
        Err(BackendError::Unsupported {
            backend: self.name(),
            operation: "update",
        })
    }
}

/// A shared, type-erased backend handle.
pub type EngineHandle = Arc<dyn StorageBackend>;

/// Opens a single handle for `config.backend`, wrapped in a slow call logger
/// when a threshold is configured.
///
/// `expiry` is the expiry the caller's writes will carry. The `memory` backend
/// only runs an expiry sweeper when it is non-zero.
pub async fn connect_one(
    config: &PipelineConfig,
    expiry: u32,
) -> Result<EngineHandle, BackendError> {
    let handle: EngineHandle = match config.backend {
        BackendKind::Noop => Arc::new(NoopBackend),
        BackendKind::Memory => Arc::new(memory_backend(expiry)),
        BackendKind::Resp => Arc::new(RespBackend::connect(&config.resp_addr).await?),
    };
    Ok(instrument(handle, config))
}

fn memory_backend(expiry: u32) -> MemoryBackend {
    if expiry > 0 {
        MemoryBackend::with_sweeper(Default::default())
    } else {
        MemoryBackend::new()
    }
}

fn instrument(handle: EngineHandle, config: &PipelineConfig) -> EngineHandle {
    if config.slow_call_threshold.is_zero() {
        handle
    } else {
        Arc::new(SlowCallLogger::new(handle, config.slow_call_threshold))
    }
}

/// Builds the write-side and read-side engine pools for `config`.
///
/// Backends that hold their data in-process (`noop`, `memory`) share a single
/// handle across both sides, so readers observe what writers stored. Networked
/// backends get `config.connections` independent connections per side.
pub async fn connect_pools(
    config: &PipelineConfig,
) -> Result<(EnginePool, EnginePool), BackendError> {
    match config.backend {
        BackendKind::Noop | BackendKind::Memory => {
            let shared = connect_one(config, NO_EXPIRY).await?;
            info!(backend = shared.name(), "Sharing one backend handle for writes and reads");
            Ok((
                EnginePool::new(vec![Arc::clone(&shared)], config.selection.policy()),
                EnginePool::new(vec![shared], config.selection.policy()),
            ))
        }
        BackendKind::Resp => {
            let mut write_side = Vec::with_capacity(config.connections);
            let mut read_side = Vec::with_capacity(config.connections);
            for _ in 0..config.connections {
                write_side.push(connect_one(config, NO_EXPIRY).await?);
                read_side.push(connect_one(config, NO_EXPIRY).await?);
            }
            info!(
                addr = %config.resp_addr,
                connections = config.connections,
                "Opened disjoint write and read connection pools"
            );
            Ok((
                EnginePool::new(write_side, config.selection.policy()),
                EnginePool::new(read_side, config.selection.policy()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_in_process_backends_share_one_handle() {
        let config = PipelineConfig {
            backend: BackendKind::Memory,
            connections: 4,
            ..Default::default()
        };

        let (writes, reads) = connect_pools(&config).await.unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(reads.len(), 1);

        writes
            .select(0)
            .insert("shared", Bytes::from("v"), 0)
            .await
            .unwrap();
        let mut out = BytesMut::new();
        reads.select(0).get("shared", &mut out).await.unwrap();
        assert_eq!(&out[..], b"v");
    }

    #[tokio::test]
    async fn test_sweeper_only_for_expiring_writes() {
        assert!(!memory_backend(0).has_sweeper());
        assert!(memory_backend(30).has_sweeper());
    }

    #[tokio::test]
    async fn test_slow_call_threshold_wraps_handle() {
        let config = PipelineConfig {
            slow_call_threshold: Duration::from_millis(5),
            ..Default::default()
        };
        let handle = connect_one(&config, 0).await.unwrap();
        assert_eq!(handle.name(), "noop");
        assert!(handle.insert("k", Bytes::new(), 0).await.is_ok());
    }

    #[tokio::test]
    async fn test_resp_connect_failure_is_reported() {
        let config = PipelineConfig {
            backend: BackendKind::Resp,
            // Port 1 on loopback is essentially never listening
            resp_addr: "127.0.0.1:1".to_string(),
            ..Default::default()
        };
        let err = connect_pools(&config).await.unwrap_err();
        assert!(matches!(err, BackendError::Connect { .. }));
    }

    #[tokio::test]
    async fn test_default_update_is_unsupported() {
        struct InsertOnly;

        #[async_trait]
        impl StorageBackend for InsertOnly {
            fn name(&self) -> &'static str {
                "insert-only"
            }
            async fn insert(&self, _: &str, _: Bytes, _: u32) -> Result<(), BackendError> {
                Ok(())
            }
            async fn get(&self, _: &str, _: &mut BytesMut) -> Result<(), BackendError> {
                Ok(())
            }
        }

        let err = InsertOnly.update("k", Bytes::new(), 0).await.unwrap_err();
        assert_eq!(err.to_string(), "insert-only backend does not support update");
    }
}
