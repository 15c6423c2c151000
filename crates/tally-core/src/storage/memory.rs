//! In-memory key-value store
//!
//! Clones share the same underlying map, so a test can keep a handle to the
//! store it hands to a tracker and inspect or corrupt what was written.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::error::{StorageError, StorageResult};
use super::KeyValueStore;

/// Volatile key-value store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fail_writes: Arc<AtomicBool>,
    failing_keys: Arc<Mutex<HashSet<String>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make writes to `key` alone fail (or succeed again)
    pub fn set_fail_key(&self, key: &str, fail: bool) {
        let mut keys = self.failing_keys.lock();
        if fail {
            keys.insert(key.to_string());
        } else {
            keys.remove(key);
        }
    }

    /// Whether a blob exists under `key`
    pub fn contains(&self, key: &str) -> bool {
        self.blobs.lock().contains_key(key)
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    /// Whether the store holds no keys
    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.blobs.lock().get(key).cloned())
    }

    fn write(&self, key: &str, blob: &[u8]) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) || self.failing_keys.lock().contains(key) {
            return Err(StorageError::Unavailable(format!(
                "write to '{key}' rejected"
            )));
        }
        self.blobs.lock().insert(key.to_string(), blob.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let store = MemoryStore::new();
        let handle = store.clone();

        store.write("events", b"[]").unwrap();

        assert!(handle.contains("events"));
        assert_eq!(handle.len(), 1);
    }

    #[test]
    fn test_failing_writes_keep_previous_value() {
        let store = MemoryStore::new();
        store.write("events", b"[1]").unwrap();

        store.set_fail_writes(true);
        let err = store.write("events", b"[2]").unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
        assert_eq!(store.read("events").unwrap().unwrap(), b"[1]");

        store.set_fail_writes(false);
        store.write("events", b"[2]").unwrap();
        assert_eq!(store.read("events").unwrap().unwrap(), b"[2]");
    }

    #[test]
    fn test_failing_single_key() {
        let store = MemoryStore::new();
        store.set_fail_key("pending_operations", true);

        store.write("events", b"[]").unwrap();
        assert!(store.write("pending_operations", b"[]").is_err());

        store.set_fail_key("pending_operations", false);
        store.write("pending_operations", b"[]").unwrap();
    }
}
