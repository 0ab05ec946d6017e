//! In-Memory Storage
//!
//! A sharded, TTL-aware key-value map used by the `memory` backend, plus the
//! background task that reclaims expired entries.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      MemoryStore                            │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │...64    │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!              ┌─────────────┴─────────────┐
//!              │      ExpirySweeper        │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```

pub mod engine;
pub mod expiry;

pub use engine::{Entry, MemoryStore, StoreStats};
pub use expiry::{ExpiryConfig, ExpirySweeper};
