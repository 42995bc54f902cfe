//! Storage - the only door to the durable and volatile key-value stores.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      StorageFacade                           │
//! │  get / put / delete / update_json / volatile_* / latest     │
//! └─────────────────────────────────────────────────────────────┘
//!              │                                   │
//!              ▼                                   ▼
//! ┌──────────────────────────┐        ┌──────────────────────────┐
//! │  QuotaGuardian (durable) │        │  volatile InMemoryStore  │
//! └──────────────────────────┘        │  (one per context)       │
//!              │                      └──────────────────────────┘
//!              ▼
//! ┌──────────────────────────┐
//! │  KeyValueStore (shared)  │
//! └──────────────────────────┘
//! ```
//!
//! Writes to a single key are atomic. There is no transaction across keys.

mod facade;
mod in_memory;
pub mod keys;

use serde::de::DeserializeOwned;
use thiserror::Error;

pub use facade::{Revisioned, StorageFacade};
pub use in_memory::InMemoryStore;

/// Physical envelope of one stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRecord {
    pub key: String,
    pub payload: String,
    pub byte_size: u64,
    pub last_write_timestamp: u64,
}

impl StorageRecord {
    pub fn new(key: impl Into<String>, payload: impl Into<String>, written_at: u64) -> Self {
        let key = key.into();
        let payload = payload.into();
        let byte_size = Self::measure(&key, &payload);
        Self {
            key,
            payload,
            byte_size,
            last_write_timestamp: written_at,
        }
    }

    /// Bytes a key/payload pair occupies in the store.
    pub fn measure(key: &str, payload: &str) -> u64 {
        (key.len() + payload.len()) as u64
    }

    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_str(&self.payload).map_err(|e| StoreError::Malformed {
            key: self.key.clone(),
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("quota exceeded writing {key}: {required} bytes needed, {available} available")]
    QuotaExceeded {
        key: String,
        required: u64,
        available: u64,
    },
    #[error("malformed payload at {key}: {reason}")]
    Malformed { key: String, reason: String },
    #[error("gave up writing {0} after repeated concurrent modification")]
    Contended(String),
}

/// Abstract key-value storage shared by every execution context.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<StorageRecord>, StoreError>;

    /// Insert or overwrite a record.
    fn put(&self, record: StorageRecord) -> Result<(), StoreError>;

    /// Like [`put`](Self::put), but fails with `QuotaExceeded` if the store
    /// would then hold more than `ceiling` bytes. The check and the write
    /// happen under one lock.
    fn put_within(&self, record: StorageRecord, ceiling: u64) -> Result<(), StoreError>;

    /// Atomically replace `key` if its current payload equals `expected`
    /// (`None` meaning absent). A `None` replacement deletes the key.
    /// Returns `false` when the current payload did not match.
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        replacement: Option<StorageRecord>,
    ) -> Result<bool, StoreError>;

    /// [`compare_and_swap`](Self::compare_and_swap) that also refuses to take
    /// the store past `ceiling` bytes, checked under the same lock.
    fn compare_and_swap_within(
        &self,
        key: &str,
        expected: Option<&str>,
        replacement: Option<StorageRecord>,
        ceiling: u64,
    ) -> Result<bool, StoreError>;

    /// Remove a key, returning the record it held.
    fn delete(&self, key: &str) -> Result<Option<StorageRecord>, StoreError>;

    fn keys(&self) -> Result<Vec<String>, StoreError>;

    /// Total bytes held.
    fn usage(&self) -> Result<u64, StoreError>;

    fn records(&self) -> Result<Vec<StorageRecord>, StoreError> {
        let mut records = Vec::new();
        for key in self.keys()? {
            if let Some(record) = self.get(&key)? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_measures_key_and_payload() {
        let record = StorageRecord::new("abc", "12345", 7);
        assert_eq!(record.byte_size, 8);
        assert_eq!(record.last_write_timestamp, 7);
    }

    #[test]
    fn parse_failure_is_malformed() {
        let record = StorageRecord::new("bookmarkedGuides", "{not json", 0);
        let err = record.parse::<Vec<String>>().unwrap_err();
        assert!(matches!(err, StoreError::Malformed { ref key, .. } if key == "bookmarkedGuides"));
    }
}
