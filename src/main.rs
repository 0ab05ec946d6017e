//! FlashBench - A Concurrent Throughput Harness for Key-Value Backends
//!
//! This is the command-line entry point. `run` drives the document pipeline
//! against a backend and prints the run report; `update` hammers a single
//! document with repeated overwrites.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use flashbench::backend::connect_one;
use flashbench::config::DEFAULT_RESP_ADDR;
use flashbench::pipeline::KeyGenerator;
use flashbench::updater::{DEFAULT_UPDATES, DEFAULT_UPDATE_DELAY};
use flashbench::{
    BackendKind, ExecutionMode, Pipeline, PipelineConfig, ReadPolicy, SelectionKind, UpdateLoop,
};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flashbench")]
#[command(about = "Concurrent insert/get throughput harness for key-value backends", version)]
struct Cli {
    /// Log filter, overridden by RUST_LOG
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Push documents through the writer and reader pools
    Run(RunArgs),

    /// Insert one document, then overwrite it repeatedly
    Update(UpdateArgs),
}

/// Options shared by every subcommand that opens a backend.
#[derive(Args)]
struct BackendArgs {
    /// Backend to drive (noop, memory, resp)
    #[arg(short, long, default_value = "noop")]
    backend: BackendKind,

    /// Server address for the resp backend
    #[arg(long, default_value = DEFAULT_RESP_ADDR)]
    addr: String,

    /// Warn about backend calls slower than this many milliseconds (0 = off)
    #[arg(long, default_value = "0")]
    slow_call_ms: u64,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    backend: BackendArgs,

    /// Number of documents
    #[arg(short = 'n', long, default_value = "1000")]
    docs: u64,

    /// Payload size of every document in bytes
    #[arg(short = 's', long, default_value = "102400")]
    doc_size: usize,

    /// Concurrent writers
    #[arg(short, long, default_value = "100")]
    writers: usize,

    /// Concurrent readers
    #[arg(short, long, default_value = "100")]
    readers: usize,

    /// Capacity of the write and read queues
    #[arg(short = 'q', long, default_value = "1000")]
    queue_capacity: usize,

    /// Backend connections per side (resp only)
    #[arg(short, long, default_value = "1")]
    connections: usize,

    /// Execution mode (pipelined, two-phase)
    #[arg(short, long, default_value = "pipelined")]
    mode: ExecutionMode,

    /// Engine selection policy (round-robin, by-worker, random)
    #[arg(long, default_value = "round-robin")]
    selection: SelectionKind,

    /// What to do with documents whose insert failed (always, skip-failed-writes)
    #[arg(long, default_value = "always")]
    read_policy: ReadPolicy,

    /// Pause after a failed backend call, in milliseconds (0 = off)
    #[arg(long, default_value = "0")]
    error_delay_ms: u64,

    /// Two-phase barrier poll interval, in milliseconds
    #[arg(long, default_value = "1000")]
    barrier_poll_ms: u64,

    /// Progress log interval, in milliseconds (0 = off)
    #[arg(long, default_value = "1000")]
    progress_ms: u64,
}

impl RunArgs {
    fn into_config(self) -> PipelineConfig {
        PipelineConfig {
            total_docs: self.docs,
            doc_size_bytes: self.doc_size,
            writers: self.writers,
            readers: self.readers,
            queue_capacity: self.queue_capacity,
            connections: self.connections,
            mode: self.mode,
            backend: self.backend.backend,
            selection: self.selection,
            read_policy: self.read_policy,
            error_delay: Duration::from_millis(self.error_delay_ms),
            barrier_poll_interval: Duration::from_millis(self.barrier_poll_ms),
            progress_interval: Duration::from_millis(self.progress_ms),
            slow_call_threshold: Duration::from_millis(self.backend.slow_call_ms),
            resp_addr: self.backend.addr,
        }
    }
}

#[derive(Args)]
struct UpdateArgs {
    #[command(flatten)]
    backend: BackendArgs,

    /// Total writes, the initial insert included
    #[arg(short = 'u', long, default_value_t = DEFAULT_UPDATES)]
    updates: u32,

    /// Pause between writes, in seconds
    #[arg(short, long, default_value_t = DEFAULT_UPDATE_DELAY.as_secs())]
    delay_secs: u64,

    /// Expiry sent with every write, in seconds (0 = never)
    #[arg(short, long, default_value = "0")]
    expiry: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    info!(version = flashbench::VERSION, "FlashBench starting");

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Update(args) => update(args).await,
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = args.into_config();
    let pipeline = Pipeline::connect(config)
        .await
        .context("failed to start the pipeline")?;

    let report = pipeline.run().await;
    println!("{}", report);
    Ok(())
}

async fn update(args: UpdateArgs) -> anyhow::Result<()> {
    let config = PipelineConfig {
        backend: args.backend.backend,
        resp_addr: args.backend.addr,
        slow_call_threshold: Duration::from_millis(args.backend.slow_call_ms),
        ..Default::default()
    };
    let engine = connect_one(&config, args.expiry)
        .await
        .with_context(|| format!("failed to open {} backend", config.backend))?;

    let updater = UpdateLoop {
        updates: args.updates,
        delay: Duration::from_secs(args.delay_secs),
        expiry: args.expiry,
        keys: KeyGenerator::new(),
    };
    let key = updater
        .run(engine.as_ref())
        .await
        .context("update loop failed")?;

    println!("updated {} {} times", key, args.updates);
    Ok(())
}
