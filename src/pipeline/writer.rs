//! Writer pool.
//!
//! Each writer loops until the write queue is closed and drained:
//!
//! 1. pop a [`Document`]
//! 2. pick a handle from the write-side [`EnginePool`] and `insert(key, value, 0)`
//! 3. on failure, log it, count it and optionally pause
//! 4. push the key onto the read queue (suspending while it is full)
//! 5. bump `written`
//!
//! A failed insert does not stop the document: it still goes to the readers,
//! unless the run uses [`ReadPolicy::SkipFailedWrites`], in which case it is
//! marked finished right here.
//!
//! The read queue closes when the last writer drops its sender.

use crate::config::ReadPolicy;
use crate::pipeline::document::{Document, ReadRecord};
use crate::pipeline::pool::EnginePool;
use crate::pipeline::queue::{QueueClosed, QueueReceiver, QueueSender};
use crate::pipeline::tracker::CompletionTracker;
use crate::pipeline::WorkerSettings;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

/// Expiry passed with every insert: never expire.
pub(crate) const NO_EXPIRY: u32 = 0;

pub struct WriterPool {
    workers: Vec<JoinHandle<()>>,
}

impl WriterPool {
    /// Spawns `count` writers. The pool takes ownership of `output`; each
    /// worker holds a clone, so the read queue closes when the last one exits.
    pub fn spawn(
        count: usize,
        input: QueueReceiver<Document>,
        output: QueueSender<ReadRecord>,
        engines: EnginePool,
        tracker: Arc<CompletionTracker>,
        settings: WorkerSettings,
    ) -> Self {
        let workers = (0..count)
            .map(|worker| {
                tokio::spawn(write_loop(
                    worker,
                    input.clone(),
                    output.clone(),
                    engines.clone(),
                    Arc::clone(&tracker),
                    settings,
                ))
            })
            .collect();

        debug!(writers = count, "Writer pool started");
        Self { workers }
    }

    /// Waits for every writer to exit.
    pub async fn join(self) {
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Writer task failed");
            }
        }
    }
}

async fn write_loop(
    worker: usize,
    input: QueueReceiver<Document>,
    output: QueueSender<ReadRecord>,
    engines: EnginePool,
    tracker: Arc<CompletionTracker>,
    settings: WorkerSettings,
) {
    while let Some(Document { key, value }) = input.pop().await {
        let engine = engines.select(worker);
        trace!(worker, key = %key, "Writing document");

        let failed = match engine.insert(&key, value, NO_EXPIRY).await {
            Ok(()) => false,
            Err(e) => {
                tracker.record_write_failure();
                warn!(worker, key = %key, backend = engine.name(), error = %e, "Insert failed");
                settings.pause_after_error().await;
                true
            }
        };

        if failed && settings.read_policy == ReadPolicy::SkipFailedWrites {
            tracker.record_written();
            tracker.record_finished();
            continue;
        }

        if let Err(QueueClosed(record)) = output.push(ReadRecord::from(key)).await {
            // No reader will ever see it; count it so the run can still end.
            error!(worker, key = %record.key, "Read queue closed, document dropped");
            tracker.record_finished();
        }
        tracker.record_written();
    }

    debug!(worker, "Writer exiting");
}
