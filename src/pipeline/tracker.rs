//! Completion Tracking
//!
//! [`CompletionTracker`] is the only state shared by every stage besides the
//! queues. It is a handful of monotone counters, each bumped with a single
//! `fetch_add`, plus a [`Notify`] that wakes whoever is joining the run.
//!
//! ```text
//!   feeder ──register(n)──┐
//!   feeder ──record_fed──>│
//!   writer ─record_written│  CompletionTracker  ──join()──> returns when finished >= expected
//!   reader ─record_finished>
//! ```
//!
//! Two waits are built on it:
//!
//! - [`CompletionTracker::join`] returns once `finished` reaches the registered
//!   total. It is notification driven, so it wakes on the final increment.
//! - [`CompletionTracker::wait_until_all_written`] is the two-phase barrier. It
//!   polls `written` on a fixed interval and logs progress while it waits.
//!
//! The tracker is constructed by the caller and injected into a pipeline,
//! so several pipelines (or tests) can run side by side without sharing counts.
//!
//! A tracker may also be reused. Counters are never reset; instead
//! [`CompletionTracker::register`] returns a baseline snapshot and a run
//! measures everything relative to it. Runs sharing one tracker take turns
//! through [`CompletionTracker::claim`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A point-in-time copy of the tracker's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub expected: u64,
    pub fed: u64,
    pub written: u64,
    pub finished: u64,
    pub write_failures: u64,
    pub read_failures: u64,
}

impl Progress {
    /// The counts accumulated since `baseline` was taken.
    pub fn since(&self, baseline: &Progress) -> Progress {
        Progress {
            expected: self.expected.saturating_sub(baseline.expected),
            fed: self.fed.saturating_sub(baseline.fed),
            written: self.written.saturating_sub(baseline.written),
            finished: self.finished.saturating_sub(baseline.finished),
            write_failures: self.write_failures.saturating_sub(baseline.write_failures),
            read_failures: self.read_failures.saturating_sub(baseline.read_failures),
        }
    }
}

/// Shared run counters with a blocking join.
#[derive(Debug, Default)]
pub struct CompletionTracker {
    expected: AtomicU64,
    fed: AtomicU64,
    written: AtomicU64,
    finished: AtomicU64,
    write_failures: AtomicU64,
    read_failures: AtomicU64,
    finished_notify: Notify,
    run_slot: Mutex<()>,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other run is using this tracker, then holds it until
    /// the returned guard is dropped.
    pub async fn claim(&self) -> MutexGuard<'_, ()> {
        self.run_slot.lock().await
    }

    /// Adds `docs` to the number of documents the run must finish.
    ///
    /// Returns the counters as they stood before, so the caller can tell its
    /// own progress apart from earlier runs on the same tracker.
    pub fn register(&self, docs: u64) -> Progress {
        let baseline = self.progress();
        self.expected.fetch_add(docs, Ordering::SeqCst);
        // A zero-document run is complete as soon as it is registered.
        self.finished_notify.notify_waiters();
        baseline
    }

    /// The feeder handed one more document to the write queue.
    pub fn record_fed(&self) {
        self.fed.fetch_add(1, Ordering::Relaxed);
    }

    /// A writer is done with one document, whatever the insert returned.
    pub fn record_written(&self) {
        self.written.fetch_add(1, Ordering::SeqCst);
    }

    /// One document reached its terminal state.
    pub fn record_finished(&self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
        self.finished_notify.notify_waiters();
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_failure(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn expected(&self) -> u64 {
        self.expected.load(Ordering::SeqCst)
    }

    pub fn fed(&self) -> u64 {
        self.fed.load(Ordering::Relaxed)
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> u64 {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn is_complete(&self) -> bool {
        self.finished() >= self.expected()
    }

    pub fn progress(&self) -> Progress {
        Progress {
            expected: self.expected(),
            fed: self.fed(),
            written: self.written(),
            finished: self.finished(),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
        }
    }

    /// Waits until every registered document has finished.
    pub async fn join(&self) {
        loop {
            let notified = self.finished_notify.notified();
            tokio::pin!(notified);
            // Register interest before checking, so an increment that lands
            // between the check and the await still wakes us.
            notified.as_mut().enable();

            if self.is_complete() {
                debug!(finished = self.finished(), "All documents finished");
                return;
            }

            notified.await;
        }
    }

    /// Two-phase barrier: waits until `written >= total`, checking every
    /// `poll_interval`.
    pub async fn wait_until_all_written(&self, total: u64, poll_interval: Duration) {
        loop {
            let written = self.written();
            if written >= total {
                info!(written, total, "All documents written");
                return;
            }

            debug!(written, total, "Waiting for writes to complete");
            tokio::time::sleep(poll_interval).await;
        }
    }
}

/// Logs a progress line every `interval` until the tracker completes.
///
/// The returned task ends by itself; aborting it early is harmless.
pub fn spawn_progress_logger(tracker: Arc<CompletionTracker>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let progress = tracker.progress();
            if progress.finished >= progress.expected {
                return;
            }
            info!(
                fed = progress.fed,
                written = progress.written,
                finished = progress.finished,
                total = progress.expected,
                "Run in progress"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_join_on_empty_run_returns_immediately() {
        let tracker = CompletionTracker::new();
        tracker.register(0);
        tokio::time::timeout(Duration::from_secs(1), tracker.join())
            .await
            .expect("join should not wait for zero documents");
    }

    #[tokio::test]
    async fn test_join_waits_for_last_document() {
        let tracker = Arc::new(CompletionTracker::new());
        tracker.register(3);

        tracker.record_finished();
        tracker.record_finished();

        let joiner = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move { tracker.join().await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!joiner.is_finished());

        tracker.record_finished();
        tokio::time::timeout(Duration::from_secs(1), joiner)
            .await
            .expect("join should wake on the final increment")
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_no_lost_updates_under_contention() {
        let tracker = Arc::new(CompletionTracker::new());
        tracker.register(64 * 500);

        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                tokio::spawn(async move {
                    for _ in 0..500 {
                        tracker.record_written();
                        tracker.record_finished();
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        tracker.join().await;
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(tracker.written(), 32_000);
        assert_eq!(tracker.finished(), 32_000);
    }

    #[tokio::test]
    async fn test_barrier_waits_for_writes() {
        let tracker = Arc::new(CompletionTracker::new());

        let writer = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                for _ in 0..5 {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    tracker.record_written();
                }
            })
        };

        let started = Instant::now();
        tracker
            .wait_until_all_written(5, Duration::from_millis(2))
            .await;
        assert!(tracker.written() >= 5);
        assert!(started.elapsed() >= Duration::from_millis(20));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_progress_snapshot() {
        let tracker = CompletionTracker::new();
        tracker.register(10);
        tracker.record_fed();
        tracker.record_written();
        tracker.record_write_failure();
        tracker.record_read_failure();
        tracker.record_finished();

        assert_eq!(
            tracker.progress(),
            Progress {
                expected: 10,
                fed: 1,
                written: 1,
                finished: 1,
                write_failures: 1,
                read_failures: 1,
            }
        );
        assert!(!tracker.is_complete());
    }

    #[tokio::test]
    async fn test_register_returns_baseline() {
        let tracker = CompletionTracker::new();
        assert_eq!(tracker.register(2), Progress::default());
        tracker.record_fed();
        tracker.record_written();
        tracker.record_write_failure();
        tracker.record_finished();

        let baseline = tracker.register(3);
        assert_eq!(baseline.expected, 2);
        assert_eq!(baseline.written, 1);

        tracker.record_written();
        let delta = tracker.progress().since(&baseline);
        assert_eq!(
            delta,
            Progress {
                expected: 3,
                written: 1,
                ..Default::default()
            }
        );
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let tracker = CompletionTracker::new();
        let first = tracker.claim().await;

        let mut second = tokio_test::task::spawn(tracker.claim());
        tokio_test::assert_pending!(second.poll());

        drop(first);
        assert!(second.is_woken());
        let _second = tokio_test::assert_ready!(second.poll());
    }

    #[tokio::test]
    async fn test_progress_logger_exits_on_completion() {
        let tracker = Arc::new(CompletionTracker::new());
        tracker.register(1);
        let logger = spawn_progress_logger(Arc::clone(&tracker), Duration::from_millis(5));

        tracker.record_finished();
        tokio::time::timeout(Duration::from_secs(1), logger)
            .await
            .expect("logger should stop once the run is complete")
            .unwrap();
    }
}
