//! Reader pool.
//!
//! Each reader owns a scratch buffer and loops until the read queue is closed
//! and drained: pop a key, pick a handle from the read-side [`EnginePool`],
//! `get` into the buffer, then bump `finished`. Failures are logged, counted
//! and optionally followed by a pause; the document is finished either way.

use crate::pipeline::document::ReadRecord;
use crate::pipeline::pool::EnginePool;
use crate::pipeline::queue::QueueReceiver;
use crate::pipeline::tracker::CompletionTracker;
use crate::pipeline::WorkerSettings;
use bytes::BytesMut;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

pub struct ReaderPool {
    workers: Vec<JoinHandle<()>>,
}

impl ReaderPool {
    /// Spawns `count` readers. `scratch_capacity` presizes each reader's buffer,
    /// normally to the document size.
    pub fn spawn(
        count: usize,
        input: QueueReceiver<ReadRecord>,
        engines: EnginePool,
        tracker: Arc<CompletionTracker>,
        settings: WorkerSettings,
        scratch_capacity: usize,
    ) -> Self {
        let workers = (0..count)
            .map(|worker| {
                tokio::spawn(read_loop(
                    worker,
                    input.clone(),
                    engines.clone(),
                    Arc::clone(&tracker),
                    settings,
                    BytesMut::with_capacity(scratch_capacity),
                ))
            })
            .collect();

        debug!(readers = count, "Reader pool started");
        Self { workers }
    }

    /// Waits for every reader to exit.
    pub async fn join(self) {
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Reader task failed");
            }
        }
    }
}

async fn read_loop(
    worker: usize,
    input: QueueReceiver<ReadRecord>,
    engines: EnginePool,
    tracker: Arc<CompletionTracker>,
    settings: WorkerSettings,
    mut scratch: BytesMut,
) {
    while let Some(ReadRecord { key }) = input.pop().await {
        let engine = engines.select(worker);
        trace!(worker, key = %key, "Reading document");

        match engine.get(&key, &mut scratch).await {
            Ok(()) => trace!(worker, key = %key, bytes = scratch.len(), "Read document"),
            Err(e) => {
                tracker.record_read_failure();
                warn!(worker, key = %key, backend = engine.name(), error = %e, "Get failed");
                settings.pause_after_error().await;
            }
        }

        tracker.record_finished();
    }

    debug!(worker, "Reader exiting");
}
