//! Engine Pools and Selection Policies
//!
//! An [`EnginePool`] is an ordered set of interchangeable backend handles. A
//! worker asks the pool for a handle before every call, and the pool's
//! [`SelectionPolicy`] decides which one it gets:
//!
//! - [`RoundRobin`] - a shared cursor that advances on every call
//! - [`ByWorker`] - worker `i` always uses handle `i % n`
//! - [`Random`] - uniform pick per call
//!
//! `RoundRobin` and `ByWorker` are fully deterministic, which keeps tests
//! reproducible; `RoundRobin` is the default.

use crate::backend::EngineHandle;
use rand::Rng;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Chooses a handle index for one call.
pub trait SelectionPolicy: Send + Sync + fmt::Debug {
    /// Returns an index in `0..len`. `len` is never zero.
    fn select(&self, worker: usize, len: usize) -> usize;
}

/// Rotates through the handles, one step per call, across all workers.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl SelectionPolicy for RoundRobin {
    fn select(&self, _worker: usize, len: usize) -> usize {
        self.cursor.fetch_add(1, Ordering::Relaxed) % len
    }
}

/// Pins each worker to one handle.
#[derive(Debug, Default, Clone, Copy)]
pub struct ByWorker;

impl SelectionPolicy for ByWorker {
    fn select(&self, worker: usize, len: usize) -> usize {
        worker % len
    }
}

/// Picks a handle uniformly at random on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct Random;

impl SelectionPolicy for Random {
    fn select(&self, _worker: usize, len: usize) -> usize {
        rand::rng().random_range(0..len)
    }
}

/// A fixed set of backend handles plus the policy that picks among them.
///
/// Cloning is cheap; clones share the handles and the policy state.
#[derive(Clone)]
pub struct EnginePool {
    handles: Arc<[EngineHandle]>,
    policy: Arc<dyn SelectionPolicy>,
}

impl fmt::Debug for EnginePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnginePool")
            .field("handles", &self.handles.len())
            .field("policy", &self.policy)
            .finish()
    }
}

impl EnginePool {
    pub fn new(handles: Vec<EngineHandle>, policy: Arc<dyn SelectionPolicy>) -> Self {
        Self {
            handles: handles.into(),
            policy,
        }
    }

    /// A pool holding one handle.
    pub fn single(handle: EngineHandle) -> Self {
        Self::new(vec![handle], Arc::new(RoundRobin::default()))
    }

    /// Returns the handle `worker` should use for its next call.
    ///
    /// # Panics
    ///
    /// Panics if the pool is empty. `Pipeline::new` refuses empty pools.
    pub fn select(&self, worker: usize) -> &EngineHandle {
        let index = self.policy.select(worker, self.handles.len());
        &self.handles[index]
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
