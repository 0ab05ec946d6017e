//! Run Configuration
//!
//! [`PipelineConfig`] carries every knob the harness understands. It is checked
//! once, by [`PipelineConfig::validate`], before any backend connection is opened
//! or any worker is spawned; a bad configuration never produces a half-started run.
//!
//! String identifiers from the command line (`--backend`, `--mode`,
//! `--selection`, `--read-policy`) parse through `FromStr` into typed enums, so
//! an unknown name fails with a [`ConfigError`] instead of a panic.

use crate::pipeline::pool::{ByWorker, Random, RoundRobin, SelectionPolicy};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default address for the `resp` backend (a local Redis-compatible server)
pub const DEFAULT_RESP_ADDR: &str = "127.0.0.1:6379";

/// Errors detected while validating a configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown backend '{0}' (expected one of: noop, memory, resp)")]
    UnknownBackend(String),

    #[error("unknown execution mode '{0}' (expected pipelined or two-phase)")]
    UnknownMode(String),

    #[error("unknown selection policy '{0}' (expected round-robin, by-worker or random)")]
    UnknownSelection(String),

    #[error("unknown read policy '{0}' (expected always or skip-failed-writes)")]
    UnknownReadPolicy(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error(
        "two-phase mode needs queue capacity >= total docs, got capacity {capacity} for {total_docs} docs"
    )]
    QueueTooSmallForTwoPhase { capacity: usize, total_docs: u64 },

    #[error("{0} engine pool is empty")]
    EmptyPool(&'static str),
}

/// Whether readers run alongside writers or only after every write completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Writers and readers run at the same time.
    #[default]
    Pipelined,
    /// All writes complete before the first read starts.
    TwoPhase,
}

impl FromStr for ExecutionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pipelined" | "pipeline" => Ok(ExecutionMode::Pipelined),
            "two-phase" | "twophase" | "two_phase" => Ok(ExecutionMode::TwoPhase),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Pipelined => write!(f, "pipelined"),
            ExecutionMode::TwoPhase => write!(f, "two-phase"),
        }
    }
}

/// Which backend to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Noop,
    Memory,
    Resp,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "noop" | "mock" => Ok(BackendKind::Noop),
            "memory" | "mem" => Ok(BackendKind::Memory),
            "resp" | "redis" => Ok(BackendKind::Resp),
            _ => Err(ConfigError::UnknownBackend(s.to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Noop => write!(f, "noop"),
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::Resp => write!(f, "resp"),
        }
    }
}

/// How a worker picks a handle out of an engine pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionKind {
    #[default]
    RoundRobin,
    ByWorker,
    Random,
}

impl SelectionKind {
    /// Instantiates the policy. Each pool gets its own instance so
    /// round-robin cursors are independent per side.
    pub fn policy(&self) -> Arc<dyn SelectionPolicy> {
        match self {
            SelectionKind::RoundRobin => Arc::new(RoundRobin::default()),
            SelectionKind::ByWorker => Arc::new(ByWorker),
            SelectionKind::Random => Arc::new(Random),
        }
    }
}

impl FromStr for SelectionKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "round-robin" | "roundrobin" | "rr" => Ok(SelectionKind::RoundRobin),
            "by-worker" | "worker" => Ok(SelectionKind::ByWorker),
            "random" => Ok(SelectionKind::Random),
            _ => Err(ConfigError::UnknownSelection(s.to_string())),
        }
    }
}

/// What a writer does with a document whose insert failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPolicy {
    /// Forward it to the readers anyway.
    #[default]
    Always,
    /// Mark it finished without reading it back.
    SkipFailedWrites,
}

impl FromStr for ReadPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "always" => Ok(ReadPolicy::Always),
            "skip-failed-writes" | "skip-failed" => Ok(ReadPolicy::SkipFailedWrites),
            _ => Err(ConfigError::UnknownReadPolicy(s.to_string())),
        }
    }
}

/// Everything a run needs to know.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of documents to write and read back
    pub total_docs: u64,
    /// Payload size of every document
    pub doc_size_bytes: usize,
    /// Concurrent writer tasks
    pub writers: usize,
    /// Concurrent reader tasks
    pub readers: usize,
    /// Capacity of both the write queue and the read queue
    pub queue_capacity: usize,
    /// Backend handles opened per side (networked backends only)
    pub connections: usize,
    pub mode: ExecutionMode,
    pub backend: BackendKind,
    pub selection: SelectionKind,
    pub read_policy: ReadPolicy,
    /// Pause after a failed backend call (zero disables it)
    pub error_delay: Duration,
    /// How often the two-phase barrier checks the write count
    pub barrier_poll_interval: Duration,
    /// How often a progress line is logged during the run (zero disables it)
    pub progress_interval: Duration,
    /// Warn about backend calls slower than this (zero disables it)
    pub slow_call_threshold: Duration,
    /// Server address for the `resp` backend
    pub resp_addr: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            total_docs: 1000,
            doc_size_bytes: 100 * 1024,
            writers: 100,
            readers: 100,
            queue_capacity: 1000,
            connections: 1,
            mode: ExecutionMode::Pipelined,
            backend: BackendKind::Noop,
            selection: SelectionKind::RoundRobin,
            read_policy: ReadPolicy::Always,
            error_delay: Duration::ZERO,
            barrier_poll_interval: Duration::from_secs(1),
            progress_interval: Duration::from_secs(1),
            slow_call_threshold: Duration::ZERO,
            resp_addr: DEFAULT_RESP_ADDR.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Checks the configuration for anything that would make the run fail or hang.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.writers == 0 {
            return Err(ConfigError::Zero("writers"));
        }
        if self.readers == 0 {
            return Err(ConfigError::Zero("readers"));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Zero("queue capacity"));
        }
        if self.connections == 0 {
            return Err(ConfigError::Zero("connections"));
        }
        if self.barrier_poll_interval.is_zero() {
            return Err(ConfigError::Zero("barrier poll interval"));
        }

        // In two-phase mode nobody drains the read queue until every write is
        // counted, so it has to hold the whole run.
        if self.mode == ExecutionMode::TwoPhase && (self.queue_capacity as u64) < self.total_docs {
            return Err(ConfigError::QueueTooSmallForTwoPhase {
                capacity: self.queue_capacity,
                total_docs: self.total_docs,
            });
        }

        Ok(())
    }
}
