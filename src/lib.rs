//! # FlashBench - A Concurrent Throughput Harness for Key-Value Backends
//!
//! FlashBench pushes a configurable number of synthetic documents through a
//! bounded, multi-stage pipeline: a feeder, a pool of writers issuing
//! `insert` calls and a pool of readers issuing `get` calls for the same keys.
//! It measures how fast a backend absorbs the load, not whether it stores
//! the data correctly.
//!
//! ## Features
//!
//! - **Bounded queues**: a slow backend throttles the feeder instead of
//!   letting documents pile up in memory
//! - **Two execution modes**: pipelined (reads overlap writes) and two-phase
//!   (all writes, then all reads)
//! - **Pluggable backends**: anything implementing [`StorageBackend`]; ships
//!   with `noop`, an in-process `memory` store and a `resp` client for
//!   Redis-compatible servers
//! - **Engine pools**: several handles per side with round-robin, per-worker
//!   or random selection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              FlashBench                                 │
//! │                                                                         │
//! │  ┌──────────┐   ┌─────────┐   ┌──────────┐   ┌─────────┐   ┌──────────┐ │
//! │  │  Feeder  │──>│  Write  │──>│ Writers  │──>│  Read   │──>│ Readers  │ │
//! │  │          │   │  Queue  │   │ (insert) │   │  Queue  │   │  (get)   │ │
//! │  └────┬─────┘   └─────────┘   └────┬─────┘   └─────────┘   └────┬─────┘ │
//! │       │                            │                            │       │
//! │       │                            ▼                            ▼       │
//! │       │                    ┌──────────────────────────────────────────┐ │
//! │       │                    │        StorageBackend (EnginePool)       │ │
//! │       │                    │   noop  |  memory (MemoryStore)  |  resp │ │
//! │       │                    └──────────────────────────────────────────┘ │
//! │       │                                                                 │
//! │       └──── join ────────── CompletionTracker <──── finished ───────────┘
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use flashbench::{Pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig {
//!         total_docs: 10_000,
//!         doc_size_bytes: 1024,
//!         ..Default::default()
//!     };
//!
//!     let report = Pipeline::connect(config).await?.run().await;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`pipeline`]: feeder, queues, worker pools, completion tracking
//! - [`backend`]: the [`StorageBackend`] contract and its implementations
//! - [`config`]: run configuration and validation
//! - [`updater`]: the single-document update loop
//! - [`protocol`]: RESP types and parser used by the `resp` backend
//! - [`storage`]: sharded in-memory store behind the `memory` backend
//!
//! ## Design Highlights
//!
//! ### Completion, Not Timeouts
//!
//! A run ends when the number of finished documents reaches the number the
//! feeder registered. Failed calls still finish their document, so a flaky
//! backend slows a run down but never hangs it.
//!
//! ### Misconfiguration Fails Early
//!
//! Two-phase mode parks every written key in the read queue until the write
//! phase ends, so the queue must hold the whole run. That and every other
//! configuration error is reported before a single worker is spawned.

pub mod backend;
pub mod config;
pub mod pipeline;
pub mod protocol;
pub mod storage;
pub mod updater;

// Re-export commonly used types for convenience
pub use backend::{BackendError, EngineHandle, StorageBackend};
pub use config::{BackendKind, ConfigError, ExecutionMode, PipelineConfig, ReadPolicy, SelectionKind};
pub use pipeline::{CompletionTracker, EnginePool, Pipeline, RunReport, StartupError};
pub use updater::UpdateLoop;

/// Version of FlashBench
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
