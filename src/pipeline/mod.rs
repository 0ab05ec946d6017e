//! The Document Pipeline
//!
//! This is the load generator itself. A run pushes `total_docs` synthetic
//! documents through two bounded queues and two worker pools:
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌─────────────┐   ┌────────────┐   ┌─────────────┐
//! │  Feeder  │──>│ Write Queue │──>│ WriterPool  │──>│ Read Queue │──>│ ReaderPool  │
//! │ (1 task) │   │  (bounded)  │   │ (N tasks)   │   │ (bounded)  │   │ (M tasks)   │
//! └────┬─────┘   └─────────────┘   └──────┬──────┘   └────────────┘   └──────┬──────┘
//!      │                                  │ insert                           │ get
//!      │                                  ▼                                  ▼
//!      │                         ┌─────────────────┐                ┌─────────────────┐
//!      │                         │ write EnginePool│                │ read EnginePool │
//!      │                         └─────────────────┘                └─────────────────┘
//!      │ join                                                                │
//!      └──────────────────────── CompletionTracker <─────────────────────────┘
//! ```
//!
//! ## Execution Modes
//!
//! - **Pipelined**: readers start with the writers and consume keys as soon as
//!   they are written.
//! - **Two-phase**: readers start only after the barrier sees every document
//!   written. Both queues must then be able to hold the entire run, which
//!   [`PipelineConfig::validate`] enforces up front.
//!
//! ## Failure Model
//!
//! Backend errors never fail a run. They are logged, counted in the
//! [`RunReport`], optionally followed by a fixed pause, and the document moves
//! on. A run ends exactly when `finished == total_docs`; there is no timeout.

pub mod document;
pub mod feeder;
pub mod pool;
pub mod queue;
pub mod reader;
pub mod tracker;
pub mod writer;

pub use document::{Document, KeyGenerator, ReadRecord};
pub use feeder::{DocumentFeeder, FeederHandle};
pub use pool::{ByWorker, EnginePool, Random, RoundRobin, SelectionPolicy};
pub use reader::ReaderPool;
pub use tracker::{CompletionTracker, Progress};
pub use writer::WriterPool;

use crate::backend::{connect_pools, BackendError};
use crate::config::{ConfigError, ExecutionMode, PipelineConfig, ReadPolicy};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::info;

/// Errors that stop a run before any worker starts.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("backend unavailable: {0}")]
    Backend(#[from] BackendError),
}

/// Per-worker behaviour shared by writers and readers.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerSettings {
    /// Pause after a failed backend call (zero disables it)
    pub error_delay: Duration,
    pub read_policy: ReadPolicy,
}

impl WorkerSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            error_delay: config.error_delay,
            read_policy: config.read_policy,
        }
    }

    pub(crate) async fn pause_after_error(&self) {
        if !self.error_delay.is_zero() {
            tokio::time::sleep(self.error_delay).await;
        }
    }
}

/// The outcome of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub run_id: String,
    pub mode: ExecutionMode,
    pub total_docs: u64,
    pub fed: u64,
    pub written: u64,
    pub finished: u64,
    pub write_failures: u64,
    pub read_failures: u64,
    /// Time until the last write completed, measured in two-phase mode only
    pub write_phase: Option<Duration>,
    pub elapsed: Duration,
}

impl RunReport {
    /// Documents finished per second over the whole run.
    pub fn docs_per_sec(&self) -> f64 {
        per_sec(self.finished, self.elapsed)
    }

    /// Inserts per second during the write phase (two-phase mode only).
    pub fn writes_per_sec(&self) -> Option<f64> {
        self.write_phase.map(|phase| per_sec(self.written, phase))
    }
}

fn per_sec(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "run {} ({})", self.run_id, self.mode)?;
        writeln!(
            f,
            "  documents: {} fed, {} written, {} finished of {}",
            self.fed, self.written, self.finished, self.total_docs
        )?;
        writeln!(
            f,
            "  failures:  {} inserts, {} gets",
            self.write_failures, self.read_failures
        )?;
        if let (Some(phase), Some(rate)) = (self.write_phase, self.writes_per_sec()) {
            writeln!(f, "  writes:    {:.3}s ({:.0} docs/s)", phase.as_secs_f64(), rate)?;
        }
        write!(
            f,
            "  elapsed:   {:.3}s ({:.0} docs/s)",
            self.elapsed.as_secs_f64(),
            self.docs_per_sec()
        )
    }
}

/// A configured, ready-to-run pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    write_engines: EnginePool,
    read_engines: EnginePool,
    tracker: Arc<CompletionTracker>,
    keys: KeyGenerator,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("write_engines", &self.write_engines)
            .field("read_engines", &self.read_engines)
            .field("run_id", &self.keys.run_id())
            .finish()
    }
}

impl Pipeline {
    /// Builds a pipeline over already-open engine pools.
    ///
    /// Validates `config` first; nothing is spawned if it is rejected.
    pub fn new(
        config: PipelineConfig,
        write_engines: EnginePool,
        read_engines: EnginePool,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if write_engines.is_empty() {
            return Err(ConfigError::EmptyPool("write"));
        }
        if read_engines.is_empty() {
            return Err(ConfigError::EmptyPool("read"));
        }

        Ok(Self {
            config,
            write_engines,
            read_engines,
            tracker: Arc::new(CompletionTracker::new()),
            keys: KeyGenerator::new(),
        })
    }

    /// Validates `config`, then opens the backend it names.
    pub async fn connect(config: PipelineConfig) -> Result<Self, StartupError> {
        config.validate()?;
        let (write_engines, read_engines) = connect_pools(&config).await?;
        Ok(Self::new(config, write_engines, read_engines)?)
    }

    /// Uses `tracker` instead of a private one, so callers can watch the run.
    ///
    /// The tracker may be reused or shared. Each run reports only its own
    /// counts, and runs on the same tracker execute one after another.
    pub fn with_tracker(mut self, tracker: Arc<CompletionTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Pins the key generator (and with it the run id).
    pub fn with_keys(mut self, keys: KeyGenerator) -> Self {
        self.keys = keys;
        self
    }

    pub fn tracker(&self) -> &Arc<CompletionTracker> {
        &self.tracker
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every document through the pipeline and waits for the last one.
    pub async fn run(self) -> RunReport {
        let Pipeline {
            config,
            write_engines,
            read_engines,
            tracker,
            keys,
        } = self;

        // One run at a time per tracker
        let _claim = tracker.claim().await;

        let started = Instant::now();
        let settings = WorkerSettings::from_config(&config);
        let (write_tx, write_rx) = queue::bounded::<Document>(config.queue_capacity);
        let (read_tx, read_rx) = queue::bounded::<ReadRecord>(config.queue_capacity);

        info!(
            mode = %config.mode,
            backend = %config.backend,
            total_docs = config.total_docs,
            doc_size_bytes = config.doc_size_bytes,
            writers = config.writers,
            readers = config.readers,
            queue_capacity = config.queue_capacity,
            "Starting run"
        );

        let progress = (!config.progress_interval.is_zero()).then(|| {
            tracker::spawn_progress_logger(Arc::clone(&tracker), config.progress_interval)
        });

        let feeder = DocumentFeeder::new(
            config.total_docs,
            config.doc_size_bytes,
            Arc::clone(&tracker),
        )
        .with_keys(keys)
        .start(write_tx);
        let run_id = feeder.run_id().to_string();
        let baseline = feeder.baseline();

        let writers = WriterPool::spawn(
            config.writers,
            write_rx,
            read_tx,
            write_engines,
            Arc::clone(&tracker),
            settings,
        );

        let mut write_phase = None;
        if config.mode == ExecutionMode::TwoPhase {
            tracker
                .wait_until_all_written(
                    baseline.written + config.total_docs,
                    config.barrier_poll_interval,
                )
                .await;
            write_phase = Some(started.elapsed());
            info!("Write phase complete, starting readers");
        }

        let readers = ReaderPool::spawn(
            config.readers,
            read_rx,
            read_engines,
            Arc::clone(&tracker),
            settings,
            config.doc_size_bytes,
        );

        feeder.join().await;
        writers.join().await;
        readers.join().await;
        if let Some(progress) = progress {
            progress.abort();
        }

        let counts = tracker.progress().since(&baseline);
        let report = RunReport {
            run_id,
            mode: config.mode,
            total_docs: config.total_docs,
            fed: counts.fed,
            written: counts.written,
            finished: counts.finished,
            write_failures: counts.write_failures,
            read_failures: counts.read_failures,
            write_phase,
            elapsed: started.elapsed(),
        };

        info!(
            written = report.written,
            finished = report.finished,
            write_failures = report.write_failures,
            read_failures = report.read_failures,
            elapsed_ms = report.elapsed.as_millis() as u64,
            docs_per_sec = report.docs_per_sec() as u64,
            "Run complete"
        );

        report
    }
}
