//! Storage layer
//!
//! A durable key-value capability holding named blobs. The tracker keeps
//! two records in it:
//!
//! - `events` - the full event collection (JSON array)
//! - `pending_operations` - the unacknowledged operation log (JSON array)
//!
//! An unreadable `events` blob is copied to `events.corrupt` before anything
//! overwrites it.
//!
//! Stores are pass-through: no retries, no merging. Failures propagate
//! verbatim to the caller.

pub mod error;
pub mod memory;
pub mod persistence;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use persistence::FileStore;

/// Key holding the event collection snapshot
pub const EVENTS_KEY: &str = "events";

/// Key holding the pending-operation log
pub const PENDING_KEY: &str = "pending_operations";

/// Key receiving an `events` blob that could not be read or decoded
pub const EVENTS_BACKUP_KEY: &str = "events.corrupt";

/// A durable key-value store
pub trait KeyValueStore: Send + Sync {
    /// Read the blob stored under `key`, or `None` if absent
    fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Replace the blob stored under `key`
    fn write(&self, key: &str, blob: &[u8]) -> StorageResult<()>;
}

/// Read and decode a JSON value stored under `key`
pub fn read_json<T, S>(store: &S, key: &str) -> StorageResult<Option<T>>
where
    T: DeserializeOwned,
    S: KeyValueStore + ?Sized,
{
    let Some(bytes) = store.read(key)? else {
        return Ok(None);
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StorageError::InvalidFormat {
            key: key.to_string(),
            source,
        })
}

/// Encode a value as JSON and store it under `key`
pub fn write_json<T, S>(store: &S, key: &str, value: &T) -> StorageResult<()>
where
    T: Serialize + ?Sized,
    S: KeyValueStore + ?Sized,
{
    let bytes = serde_json::to_vec(value).map_err(|source| StorageError::InvalidFormat {
        key: key.to_string(),
        source,
    })?;
    store.write(key, &bytes)
}
