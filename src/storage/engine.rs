//! Sharded In-Memory Store
//!
//! The store behind the `memory` backend. It gives the harness a real, lock-based
//! target to push against without any network in the way.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       MemoryStore                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Keys hash to one of `NUM_SHARDS` shards, so writers and readers working on
//! different keys rarely touch the same lock.
//!
//! Expired entries are removed lazily when read, and actively by the
//! [`ExpirySweeper`](crate::storage::ExpirySweeper).

use bytes::Bytes;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Number of shards. 64 keeps contention low for a few hundred workers.
const NUM_SHARDS: usize = 64;

/// A stored value with its optional deadline.
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: Bytes,
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates an entry. A `ttl` of `None` never expires.
    pub fn new(value: Bytes, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|exp| Instant::now() >= exp)
            .unwrap_or(false)
    }
}

#[derive(Debug, Default)]
struct Shard {
    data: RwLock<HashMap<Bytes, Entry>>,
}

impl Shard {
    // A panicking writer cannot leave a HashMap half-updated, so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Bytes, Entry>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Bytes, Entry>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Operation counters for a [`MemoryStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub keys: u64,
    pub inserts: u64,
    pub rejected_inserts: u64,
    pub gets: u64,
    pub misses: u64,
    pub expired: u64,
}

/// A thread-safe, sharded key-value map with TTL support.
///
/// Wrap it in an `Arc` and share it between every handle that should see the
/// same data.
///
/// # Example
///
/// ```
/// use flashbench::storage::MemoryStore;
/// use bytes::Bytes;
///
/// let store = MemoryStore::new();
/// assert!(store.insert(Bytes::from("k"), Bytes::from("v"), None));
/// assert!(!store.insert(Bytes::from("k"), Bytes::from("other"), None));
/// assert_eq!(store.get(b"k"), Some(Bytes::from("v")));
/// ```
pub struct MemoryStore {
    shards: Vec<Shard>,
    key_count: AtomicU64,
    insert_count: AtomicU64,
    rejected_count: AtomicU64,
    get_count: AtomicU64,
    miss_count: AtomicU64,
    expired_count: AtomicU64,
    /// Entries currently holding a deadline; sweeps are skipped while zero
    ttl_entries: AtomicU64,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("shards", &self.shards.len())
            .field("keys", &self.len())
            .finish()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| Shard::default()).collect(),
            key_count: AtomicU64::new(0),
            insert_count: AtomicU64::new(0),
            rejected_count: AtomicU64::new(0),
            get_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
            ttl_entries: AtomicU64::new(0),
        }
    }

    #[inline]
    fn shard(&self, key: &[u8]) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    /// Stores `value` under `key` only if the key is absent (or expired).
    ///
    /// Returns `false` and leaves the existing value untouched otherwise.
    pub fn insert(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) -> bool {
        let mut data = self.shard(&key).write();

        match data.get(&key) {
            Some(existing) if !existing.is_expired() => {
                self.rejected_count.fetch_add(1, Ordering::Relaxed);
                false
            }
            Some(_) => {
                // Replacing an expired entry keeps the key count unchanged.
                let entry = Entry::new(value, ttl);
                self.track_ttl(data.insert(key, entry.clone()).as_ref(), Some(&entry));
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                self.insert_count.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => {
                let entry = Entry::new(value, ttl);
                self.track_ttl(None, Some(&entry));
                data.insert(key, entry);
                self.key_count.fetch_add(1, Ordering::Relaxed);
                self.insert_count.fetch_add(1, Ordering::Relaxed);
                true
            }
        }
    }

    /// Stores `value` under `key`, overwriting any previous value.
    ///
    /// Returns `true` if the key was newly created.
    pub fn put(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) -> bool {
        self.insert_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self.shard(&key).write();
        let entry = Entry::new(value, ttl);
        let previous = data.insert(key, entry.clone());
        self.track_ttl(previous.as_ref(), Some(&entry));
        let is_new = previous.is_none();
        if is_new {
            self.key_count.fetch_add(1, Ordering::Relaxed);
        }
        is_new
    }

    /// Returns the value for `key`, removing it first if it has expired.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.get_count.fetch_add(1, Ordering::Relaxed);
        let shard = self.shard(key);

        // Fast path under the read lock
        {
            let data = shard.read();
            match data.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.value.clone()),
                Some(_) => {}
                None => {
                    self.miss_count.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }

        let mut data = shard.write();
        match data.get(key) {
            Some(entry) if entry.is_expired() => {
                self.track_ttl(data.remove(key).as_ref(), None);
                self.key_count.fetch_sub(1, Ordering::Relaxed);
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                None
            }
            // Another writer replaced it between the two locks
            Some(entry) => Some(entry.value.clone()),
            None => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Removes `key`. Returns `true` if it existed.
    pub fn remove(&self, key: &[u8]) -> bool {
        let removed = self.shard(key).write().remove(key);
        if removed.is_some() {
            self.track_ttl(removed.as_ref(), None);
            self.key_count.fetch_sub(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Number of keys currently stored, expired-but-unswept ones included.
    pub fn len(&self) -> u64 {
        self.key_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries that carry an expiry deadline.
    pub fn ttl_entries(&self) -> u64 {
        self.ttl_entries.load(Ordering::Relaxed)
    }

    /// Keeps `ttl_entries` in step when `old` is replaced by `new`.
    /// Callers hold the shard's write lock.
    fn track_ttl(&self, old: Option<&Entry>, new: Option<&Entry>) {
        let had = old.is_some_and(|e| e.expires_at.is_some());
        let has = new.is_some_and(|e| e.expires_at.is_some());
        match (had, has) {
            (false, true) => {
                self.ttl_entries.fetch_add(1, Ordering::Relaxed);
            }
            (true, false) => {
                self.ttl_entries.fetch_sub(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    /// Scans every shard and drops expired entries.
    ///
    /// Returns the number of entries removed. When no entry has a deadline the
    /// scan is skipped and no shard lock is taken.
    pub fn purge_expired(&self) -> u64 {
        if self.ttl_entries() == 0 {
            return 0;
        }

        let mut purged = 0u64;

        for shard in &self.shards {
            let mut data = shard.write();
            let before = data.len();
            data.retain(|_, entry| !entry.is_expired());
            purged += (before - data.len()) as u64;
        }

        if purged > 0 {
            self.key_count.fetch_sub(purged, Ordering::Relaxed);
            self.ttl_entries.fetch_sub(purged, Ordering::Relaxed);
            self.expired_count.fetch_add(purged, Ordering::Relaxed);
        }

        purged
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            keys: self.len(),
            inserts: self.insert_count.load(Ordering::Relaxed),
            rejected_inserts: self.rejected_count.load(Ordering::Relaxed),
            gets: self.get_count.load(Ordering::Relaxed),
            misses: self.miss_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}
