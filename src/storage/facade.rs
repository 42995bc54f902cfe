//! StorageFacade - one API over the durable shared store and the volatile
//! per-context store.
//!
//! Read precedence for one logical entity:
//!
//! 1. A draft in this context's volatile store wins, but only for this
//!    context's own edit forms (see `GuideDirectory::load_for_edit`).
//! 2. Otherwise the durable record with the highest revision wins, ties
//!    broken by the most recent write.
//!
//! Payloads that fail to parse are logged and read as absent.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{InMemoryStore, KeyValueStore, StorageRecord, StoreError};
use crate::clock::Clock;
use crate::error::DirectoryError;
use crate::quota::QuotaGuardian;

const MAX_UPDATE_ATTEMPTS: usize = 16;

/// Records that carry a last-writer-wins revision.
pub trait Revisioned {
    fn revision(&self) -> u64;
}

pub struct StorageFacade<S: KeyValueStore = InMemoryStore> {
    durable: S,
    volatile: InMemoryStore,
    guardian: QuotaGuardian,
    clock: Arc<dyn Clock>,
}

impl<S: KeyValueStore> StorageFacade<S> {
    /// Wrap a shared durable store. The volatile store is private to this facade.
    pub fn new(durable: S, guardian: QuotaGuardian, clock: Arc<dyn Clock>) -> Self {
        Self {
            durable,
            volatile: InMemoryStore::new(),
            guardian,
            clock,
        }
    }

    pub fn durable(&self) -> &S {
        &self.durable
    }

    pub fn guardian(&self) -> &QuotaGuardian {
        &self.guardian
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn usage(&self) -> Result<u64, DirectoryError> {
        Ok(self.durable.usage()?)
    }

    pub fn durable_keys(&self) -> Result<Vec<String>, DirectoryError> {
        Ok(self.durable.keys()?)
    }

    pub fn get(&self, key: &str) -> Result<Option<StorageRecord>, DirectoryError> {
        Ok(self.durable.get(key)?)
    }

    /// Read and parse a durable value; malformed payloads read as absent.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DirectoryError> {
        Ok(self
            .durable
            .get(key)?
            .and_then(|record| parse_or_absent(&record)))
    }

    /// Pick the record with the highest revision among `keys` (rule 2).
    pub fn latest<T: DeserializeOwned + Revisioned>(
        &self,
        keys: &[String],
    ) -> Result<Option<T>, DirectoryError> {
        let mut best: Option<(u64, u64, T)> = None;
        for key in keys {
            let Some(record) = self.durable.get(key)? else {
                continue;
            };
            let Some(value) = parse_or_absent::<T>(&record) else {
                continue;
            };
            let rank = (value.revision(), record.last_write_timestamp);
            let better = match &best {
                Some((rev, written, _)) => rank > (*rev, *written),
                None => true,
            };
            if better {
                best = Some((rank.0, rank.1, value));
            }
        }
        Ok(best.map(|(_, _, value)| value))
    }

    /// Write a durable value through the quota guardian.
    pub fn put(
        &self,
        key: &str,
        payload: impl Into<String>,
    ) -> Result<StorageRecord, DirectoryError> {
        let record = StorageRecord::new(key, payload, self.clock.now_ms());
        Ok(self.write_admitted(record)?)
    }

    pub fn put_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<StorageRecord, DirectoryError> {
        let payload = to_payload(key, value)?;
        self.put(key, payload)
    }

    pub fn delete(&self, key: &str) -> Result<bool, DirectoryError> {
        let removed = self.durable.delete(key)?;
        tracing::debug!(key, existed = removed.is_some(), "durable delete");
        Ok(removed.is_some())
    }

    /// Put back a record exactly as it was, skipping compaction.
    ///
    /// Only used to undo a write this facade made moments earlier. The
    /// ceiling still holds.
    pub(crate) fn restore(
        &self,
        key: &str,
        previous: Option<StorageRecord>,
    ) -> Result<(), DirectoryError> {
        match previous {
            Some(record) => self.durable.put_within(record, self.guardian.ceiling())?,
            None => {
                self.durable.delete(key)?;
            }
        }
        Ok(())
    }

    /// Atomically read-modify-write one durable key.
    ///
    /// `apply` receives the current value (absent if missing or malformed) and
    /// returns the new value, or `None` to delete the key. It may run more
    /// than once when another context writes the key concurrently, and must
    /// not have side effects beyond computing the next value.
    pub fn update_json<T, F>(&self, key: &str, mut apply: F) -> Result<Option<T>, DirectoryError>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(Option<T>) -> Result<Option<T>, DirectoryError>,
    {
        let mut compacted = false;
        for attempt in 0..MAX_UPDATE_ATTEMPTS {
            let current = self.durable.get(key)?;
            let expected = current.as_ref().map(|r| r.payload.clone());
            let next = apply(current.as_ref().and_then(parse_or_absent))?;

            let now = self.clock.now_ms();
            let replacement = match &next {
                Some(value) => Some(StorageRecord::new(key, to_payload(key, value)?, now)),
                None => None,
            };
            if replacement.as_ref().map(|r| &r.payload) == expected.as_ref() {
                return Ok(next);
            }
            if let Some(record) = &replacement {
                self.guardian.admit(&self.durable, record, now)?;
            }

            match self.durable.compare_and_swap_within(
                key,
                expected.as_deref(),
                replacement.clone(),
                self.guardian.ceiling(),
            ) {
                Ok(true) => return Ok(next),
                Ok(false) => {
                    tracing::debug!(key, attempt, "concurrent write, retrying update");
                }
                Err(StoreError::QuotaExceeded { .. }) if !compacted => {
                    if let Some(record) = &replacement {
                        tracing::warn!(key, "store refused write, compacting and retrying");
                        self.guardian.compact(&self.durable, record, now)?;
                    }
                    compacted = true;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Contended(key.to_string()).into())
    }

    pub fn volatile_get_json<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, DirectoryError> {
        Ok(self
            .volatile
            .get(key)?
            .and_then(|record| parse_or_absent(&record)))
    }

    pub fn volatile_put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), DirectoryError> {
        let payload = to_payload(key, value)?;
        self.volatile
            .put(StorageRecord::new(key, payload, self.clock.now_ms()))?;
        Ok(())
    }

    pub fn volatile_delete(&self, key: &str) -> Result<bool, DirectoryError> {
        Ok(self.volatile.delete(key)?.is_some())
    }

    pub fn volatile_keys(&self) -> Result<Vec<String>, DirectoryError> {
        Ok(self.volatile.keys()?)
    }

    fn write_admitted(&self, record: StorageRecord) -> Result<StorageRecord, StoreError> {
        let now = record.last_write_timestamp;
        let mut compacted = false;
        loop {
            if let Some(report) = self.guardian.admit(&self.durable, &record, now)? {
                tracing::debug!(key = %record.key, reclaimed = report.reclaimed(), "admitted after compaction");
            }
            // Admission read usage without a lock; the store re-checks the
            // ceiling atomically with the write.
            match self.durable.put_within(record.clone(), self.guardian.ceiling()) {
                Ok(()) => {
                    tracing::debug!(key = %record.key, bytes = record.byte_size, "durable write");
                    return Ok(record);
                }
                Err(StoreError::QuotaExceeded { .. }) if !compacted => {
                    tracing::warn!(key = %record.key, "store refused write, compacting and retrying");
                    self.guardian.compact(&self.durable, &record, now)?;
                    compacted = true;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn parse_or_absent<T: DeserializeOwned>(record: &StorageRecord) -> Option<T> {
    match record.parse() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key = %record.key, "treating malformed record as absent: {e}");
            None
        }
    }
}

fn to_payload<T: Serialize>(key: &str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Malformed {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
