//! The document feeder: the head of the pipeline.
//!
//! The feeder registers the run's size with the tracker, then pushes exactly
//! `total_docs` documents into the write queue. Every document shares one
//! payload buffer, so a run of large documents costs one allocation.
//!
//! When the last document is queued the feeder drops its sender, which is what
//! closes the write queue and lets writers exit once it drains.

use crate::pipeline::document::{synthetic_payload, Document, KeyGenerator};
use crate::pipeline::queue::{QueueClosed, QueueSender};
use crate::pipeline::tracker::{CompletionTracker, Progress};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

pub struct DocumentFeeder {
    total_docs: u64,
    doc_size_bytes: usize,
    keys: KeyGenerator,
    tracker: Arc<CompletionTracker>,
}

impl DocumentFeeder {
    pub fn new(total_docs: u64, doc_size_bytes: usize, tracker: Arc<CompletionTracker>) -> Self {
        Self {
            total_docs,
            doc_size_bytes,
            keys: KeyGenerator::new(),
            tracker,
        }
    }

    /// Replaces the key generator, e.g. to pin the run id.
    pub fn with_keys(mut self, keys: KeyGenerator) -> Self {
        self.keys = keys;
        self
    }

    pub fn run_id(&self) -> &str {
        self.keys.run_id()
    }

    /// Registers the run with the tracker and starts producing into `queue`.
    ///
    /// Registration happens before this returns, so a `join` on the returned
    /// handle can never observe a tracker that does not yet expect the run.
    pub fn start(self, queue: QueueSender<Document>) -> FeederHandle {
        let baseline = self.tracker.register(self.total_docs);

        let tracker = Arc::clone(&self.tracker);
        let run_id = self.keys.run_id().to_string();
        let task = tokio::spawn(self.feed(queue));

        FeederHandle {
            task,
            tracker,
            run_id,
            baseline,
        }
    }

    async fn feed(self, queue: QueueSender<Document>) {
        info!(
            total_docs = self.total_docs,
            doc_size_bytes = self.doc_size_bytes,
            run_id = %self.keys.run_id(),
            "Feeder started"
        );

        let payload = synthetic_payload(self.doc_size_bytes);

        for index in 0..self.total_docs {
            let doc = Document {
                key: self.keys.key(index),
                value: payload.clone(),
            };
            trace!(key = %doc.key, "Queueing document");

            if let Err(QueueClosed(doc)) = queue.push(doc).await {
                error!(key = %doc.key, "Write queue closed before the feeder finished");
                return;
            }
            self.tracker.record_fed();
        }

        debug!(fed = self.total_docs, "Feeder done, closing write queue");
    }
}

/// A running feeder.
pub struct FeederHandle {
    task: JoinHandle<()>,
    tracker: Arc<CompletionTracker>,
    run_id: String,
    baseline: Progress,
}

impl FeederHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Tracker counters from before this feeder registered its documents.
    pub fn baseline(&self) -> Progress {
        self.baseline
    }

    /// Waits until every document the feeder produced has finished.
    pub async fn join(self) {
        self.tracker.join().await;
        if let Err(e) = self.task.await {
            error!(error = %e, "Feeder task failed");
        }
        let finished = self.tracker.progress().since(&self.baseline).finished;
        info!(finished, "Feeder joined");
    }
}
