//! InMemoryStore - BTreeMap-backed key-value store.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{KeyValueStore, StorageRecord, StoreError};

#[derive(Default)]
struct StoreState {
    records: BTreeMap<String, StorageRecord>,
    used: u64,
}

impl StoreState {
    fn check_capacity(
        &self,
        capacity: Option<u64>,
        record: &StorageRecord,
    ) -> Result<(), StoreError> {
        let Some(capacity) = capacity else {
            return Ok(());
        };
        let existing = self
            .records
            .get(&record.key)
            .map(|r| r.byte_size)
            .unwrap_or(0);
        let projected = self.used - existing + record.byte_size;
        if projected > capacity {
            return Err(StoreError::QuotaExceeded {
                key: record.key.clone(),
                required: record.byte_size,
                available: capacity.saturating_sub(self.used - existing),
            });
        }
        Ok(())
    }

    fn insert(&mut self, record: StorageRecord) {
        let size = record.byte_size;
        if let Some(old) = self.records.insert(record.key.clone(), record) {
            self.used -= old.byte_size;
        }
        self.used += size;
    }

    fn remove(&mut self, key: &str) -> Option<StorageRecord> {
        let removed = self.records.remove(key);
        if let Some(record) = &removed {
            self.used -= record.byte_size;
        }
        removed
    }
}

/// In-memory key-value store.
///
/// Clones share the same records, so one instance handed to several
/// directories behaves like a store shared between execution contexts.
/// An optional hard capacity makes writes fail the way a full browser
/// store does.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
    capacity: Option<u64>,
}

impl InMemoryStore {
    /// Create an unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that refuses writes beyond `capacity` bytes.
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            capacity: Some(capacity),
        }
    }

    pub fn capacity(&self) -> Option<u64> {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every record.
    pub fn clear(&self) {
        let mut state = self.write();
        state.records.clear();
        state.used = 0;
    }

    // Every mutation leaves `StoreState` consistent before it can panic, so a
    // poisoned lock still guards valid data.
    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn limit(&self, ceiling: Option<u64>) -> Option<u64> {
        match (self.capacity, ceiling) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn put_limited(&self, record: StorageRecord, ceiling: Option<u64>) -> Result<(), StoreError> {
        let mut state = self.write();
        state.check_capacity(self.limit(ceiling), &record)?;
        state.insert(record);
        Ok(())
    }

    fn swap_limited(
        &self,
        key: &str,
        expected: Option<&str>,
        replacement: Option<StorageRecord>,
        ceiling: Option<u64>,
    ) -> Result<bool, StoreError> {
        let mut state = self.write();
        let current = state.records.get(key).map(|r| r.payload.as_str());
        if current != expected {
            return Ok(false);
        }

        match replacement {
            Some(record) => {
                state.check_capacity(self.limit(ceiling), &record)?;
                state.insert(record);
            }
            None => {
                state.remove(key);
            }
        }
        Ok(true)
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<StorageRecord>, StoreError> {
        Ok(self.read().records.get(key).cloned())
    }

    fn put(&self, record: StorageRecord) -> Result<(), StoreError> {
        self.put_limited(record, None)
    }

    fn put_within(&self, record: StorageRecord, ceiling: u64) -> Result<(), StoreError> {
        self.put_limited(record, Some(ceiling))
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        replacement: Option<StorageRecord>,
    ) -> Result<bool, StoreError> {
        self.swap_limited(key, expected, replacement, None)
    }

    fn compare_and_swap_within(
        &self,
        key: &str,
        expected: Option<&str>,
        replacement: Option<StorageRecord>,
        ceiling: u64,
    ) -> Result<bool, StoreError> {
        self.swap_limited(key, expected, replacement, Some(ceiling))
    }

    fn delete(&self, key: &str) -> Result<Option<StorageRecord>, StoreError> {
        Ok(self.write().remove(key))
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.read().records.keys().cloned().collect())
    }

    fn usage(&self) -> Result<u64, StoreError> {
        Ok(self.read().used)
    }

    fn records(&self) -> Result<Vec<StorageRecord>, StoreError> {
        Ok(self.read().records.values().cloned().collect())
    }
}
