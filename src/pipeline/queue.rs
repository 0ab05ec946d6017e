//! Bounded Work Queues
//!
//! The write queue and the read queue are both bounded multi-producer,
//! multi-consumer FIFOs built on `tokio::sync::mpsc`:
//!
//! ```text
//!   QueueSender ──┐                          ┌── QueueReceiver (worker 0)
//!   QueueSender ──┼──> [ mpsc, capacity N ] ─┼── QueueReceiver (worker 1)
//!   QueueSender ──┘                          └── QueueReceiver (worker ...)
//! ```
//!
//! `push` suspends while the queue is full, which is the only flow control in
//! the whole harness: a slow backend fills the queues and the feeder stalls.
//!
//! An mpsc receiver has a single owner, so workers share it behind an async
//! mutex. The mutex is FIFO-fair, so idle workers take turns in the order they
//! started waiting. The queue closes once every sender is dropped; receivers
//! then drain whatever is left and get `None`.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Returned by [`QueueSender::push`] when every receiver is gone. Carries the
/// item back to the caller.
#[derive(Debug, PartialEq, Eq)]
pub struct QueueClosed<T>(pub T);

/// Creates a bounded queue holding at most `capacity` items.
///
/// # Panics
///
/// Panics if `capacity` is zero. [`PipelineConfig::validate`](crate::config::PipelineConfig::validate)
/// rejects that before a pipeline is built.
pub fn bounded<T>(capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        QueueSender { tx },
        QueueReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// The producing end of a queue. Clone it to add producers.
#[derive(Debug)]
pub struct QueueSender<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> QueueSender<T> {
    /// Appends `item`, waiting for a free slot if the queue is full.
    pub async fn push(&self, item: T) -> Result<(), QueueClosed<T>> {
        self.tx.send(item).await.map_err(|e| QueueClosed(e.0))
    }

    /// Items currently buffered.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// The consuming end of a queue. Clone it to add consumers.
#[derive(Debug)]
pub struct QueueReceiver<T> {
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for QueueReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
        }
    }
}

impl<T> QueueReceiver<T> {
    /// Takes the next item, waiting while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::task;
    use tokio_test::{assert_pending, assert_ready};

    #[tokio::test]
    async fn test_fifo_order() {
        let (tx, rx) = bounded(4);
        for i in 0..4 {
            tx.push(i).await.unwrap();
        }
        drop(tx);

        let mut seen = Vec::new();
        while let Some(i) = rx.pop().await {
            seen.push(i);
        }
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_push_blocks_when_full() {
        let (tx, rx) = bounded(1);
        tx.push(1).await.unwrap();
        assert_eq!(tx.len(), 1);

        let mut blocked = task::spawn(tx.push(2));
        assert_pending!(blocked.poll());

        assert_eq!(rx.pop().await, Some(1));
        assert!(blocked.is_woken());
        assert_ready!(blocked.poll()).unwrap();
        assert_eq!(rx.pop().await, Some(2));
    }

    #[tokio::test]
    async fn test_pop_after_close_drains_then_ends() {
        let (tx, rx) = bounded(2);
        tx.push("a").await.unwrap();
        drop(tx);

        assert_eq!(rx.pop().await, Some("a"));
        assert_eq!(rx.pop().await, None);
        assert_eq!(rx.clone().pop().await, None);
    }

    #[tokio::test]
    async fn test_push_after_receivers_dropped() {
        let (tx, rx) = bounded(2);
        drop(rx);
        assert_eq!(tx.push(7).await, Err(QueueClosed(7)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_consumers_see_each_item_once() {
        let (tx, rx) = bounded(8);

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let rx = rx.clone();
                tokio::spawn(async move {
                    let mut got = Vec::new();
                    while let Some(i) = rx.pop().await {
                        got.push(i);
                    }
                    got
                })
            })
            .collect();
        drop(rx);

        for i in 0..500u32 {
            tx.push(i).await.unwrap();
        }
        drop(tx);

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }
        all.sort_unstable();
        assert_eq!(all, (0..500).collect::<Vec<_>>());
    }
}
