//! Documents and key generation.
//!
//! Keys look like `key-{index}-{run_id}`. The run id is drawn once per
//! [`KeyGenerator`], so two runs against the same backend, or two machines
//! running at once, never collide.

use bytes::Bytes;
use rand::distr::Alphanumeric;
use rand::Rng;

/// Length of the random run identifier
const RUN_ID_LEN: usize = 16;

const PAYLOAD_LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// A document on its way to the writers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub key: String,
    pub value: Bytes,
}

/// What a writer forwards to the readers: just the key, the value is
/// fetched fresh from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRecord {
    pub key: String,
}

impl From<String> for ReadRecord {
    fn from(key: String) -> Self {
        Self { key }
    }
}

/// Produces run-scoped unique keys.
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    run_id: String,
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyGenerator {
    /// Creates a generator with a fresh random run id.
    pub fn new() -> Self {
        let run_id = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(RUN_ID_LEN)
            .map(char::from)
            .collect();
        Self { run_id }
    }

    /// Creates a generator with a fixed run id.
    pub fn with_run_id(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The key for document `index` of this run.
    pub fn key(&self, index: u64) -> String {
        format!("key-{}-{}", index, self.run_id)
    }

    /// A single key for this run, for workloads that reuse one document.
    pub fn single_key(&self) -> String {
        format!("key-{}", self.run_id)
    }
}

/// Builds `size` bytes of random ASCII letters.
pub fn synthetic_payload(size: usize) -> Bytes {
    let mut rng = rand::rng();
    (0..size)
        .map(|_| PAYLOAD_LETTERS[rng.random_range(0..PAYLOAD_LETTERS.len())])
        .collect::<Vec<u8>>()
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_key_format() {
        let keys = KeyGenerator::with_run_id("abc");
        assert_eq!(keys.key(0), "key-0-abc");
        assert_eq!(keys.key(42), "key-42-abc");
        assert_eq!(keys.single_key(), "key-abc");
    }

    #[test]
    fn test_run_ids_differ() {
        let a = KeyGenerator::new();
        let b = KeyGenerator::new();
        assert_eq!(a.run_id().len(), RUN_ID_LEN);
        assert_ne!(a.run_id(), b.run_id());
        assert_ne!(a.key(0), b.key(0));
    }

    #[test]
    fn test_keys_unique_within_run() {
        let keys = KeyGenerator::new();
        let unique: HashSet<_> = (0..10_000).map(|i| keys.key(i)).collect();
        assert_eq!(unique.len(), 10_000);
    }

    #[test]
    fn test_payload_size_and_alphabet() {
        assert!(synthetic_payload(0).is_empty());

        let payload = synthetic_payload(1024);
        assert_eq!(payload.len(), 1024);
        assert!(payload.iter().all(|b| b.is_ascii_alphabetic()));
    }
}
