//! Quota Guardian - keeps the durable store under its byte ceiling.
//!
//! Every durable write is admitted through [`QuotaGuardian::admit`]:
//!
//! ```text
//! candidate ──► before_write ──► Allow ─────────────────────────► write
//!                     │
//!                     ├────────► CompactThenRetry ──► compact ──► re-check
//!                     │                                   │
//!                     │                         fits ─────┴──► write
//!                     │                         still over ───► QuotaExceeded
//!                     └────────► Reject ──────────────────────► QuotaExceeded
//! ```
//!
//! Compaction runs a fixed, ordered policy (see [`CompactionStep`]) and stops
//! as soon as the store plus the incoming record fits under the safety
//! margin. The candidate's own key is never touched by compaction.

mod compaction;
mod photo;

use std::sync::Arc;

use crate::config::DirectoryConfig;
use crate::storage::{KeyValueStore, StorageRecord, StoreError};

pub use compaction::{CompactionReport, CompactionStep, StepOutcome};
pub use photo::{DetachingShrinker, PhotoShrinker, PrefixShrinker};

/// Outcome of checking a candidate write against the ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    /// The write fits only after `overflow` bytes are reclaimed.
    CompactThenRetry { overflow: u64 },
    /// The record can never fit.
    Reject { required: u64, available: u64 },
}

/// Enforces the durable store's byte ceiling.
#[derive(Clone)]
pub struct QuotaGuardian {
    ceiling: u64,
    target: u64,
    max_record_bytes: u64,
    history_limit: usize,
    history_keys: Vec<String>,
    draft_max_age_ms: u64,
    photo_max_bytes: u64,
    trim_fields: Vec<String>,
    shrinker: Arc<dyn PhotoShrinker>,
}

impl QuotaGuardian {
    pub fn new(config: &DirectoryConfig) -> Self {
        Self {
            ceiling: config.quota_bytes,
            target: config.compaction_target(),
            max_record_bytes: config.max_record_bytes,
            history_limit: config.history_limit,
            history_keys: config.history_keys.clone(),
            draft_max_age_ms: config.draft_max_age_ms,
            photo_max_bytes: config.photo_max_bytes,
            trim_fields: config.trim_fields.clone(),
            shrinker: Arc::new(DetachingShrinker),
        }
    }

    /// Replace the photo re-encoder used by compaction.
    pub fn with_shrinker(mut self, shrinker: impl PhotoShrinker + 'static) -> Self {
        self.shrinker = Arc::new(shrinker);
        self
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// Usage level compaction aims for.
    pub fn target(&self) -> u64 {
        self.target
    }

    /// Bytes the store would grow by if `candidate` were written.
    fn incoming<S: KeyValueStore>(
        &self,
        store: &S,
        candidate: &StorageRecord,
    ) -> Result<(u64, u64), StoreError> {
        let usage = store.usage()?;
        let existing = store
            .get(&candidate.key)?
            .map(|r| r.byte_size)
            .unwrap_or(0);
        Ok((usage.saturating_sub(existing), candidate.byte_size))
    }

    pub fn before_write<S: KeyValueStore>(
        &self,
        store: &S,
        candidate: &StorageRecord,
    ) -> Result<Verdict, StoreError> {
        let limit = self.ceiling.min(self.max_record_bytes);
        if candidate.byte_size > limit {
            return Ok(Verdict::Reject {
                required: candidate.byte_size,
                available: limit,
            });
        }

        let (others, incoming) = self.incoming(store, candidate)?;
        let projected = others + incoming;
        if projected <= self.ceiling {
            Ok(Verdict::Allow)
        } else {
            Ok(Verdict::CompactThenRetry {
                overflow: projected - self.ceiling,
            })
        }
    }

    /// Run the compaction policy on behalf of `candidate`.
    pub fn compact<S: KeyValueStore>(
        &self,
        store: &S,
        candidate: &StorageRecord,
        now_ms: u64,
    ) -> Result<CompactionReport, StoreError> {
        let (_, incoming) = self.incoming(store, candidate)?;
        let report = compaction::Compactor {
            store,
            guardian: self,
            protect: &candidate.key,
            incoming,
            now_ms,
        }
        .run()?;

        tracing::info!(
            key = %candidate.key,
            before = report.usage_before,
            after = report.usage_after,
            reclaimed = report.reclaimed(),
            "durable store compacted"
        );
        Ok(report)
    }

    /// Decide whether `candidate` may be written, compacting first if needed.
    ///
    /// Returns the compaction report when compaction ran.
    pub fn admit<S: KeyValueStore>(
        &self,
        store: &S,
        candidate: &StorageRecord,
        now_ms: u64,
    ) -> Result<Option<CompactionReport>, StoreError> {
        match self.before_write(store, candidate)? {
            Verdict::Allow => Ok(None),
            Verdict::Reject {
                required,
                available,
            } => {
                tracing::warn!(key = %candidate.key, required, available, "record can never fit");
                Err(StoreError::QuotaExceeded {
                    key: candidate.key.clone(),
                    required,
                    available,
                })
            }
            Verdict::CompactThenRetry { overflow } => {
                tracing::debug!(key = %candidate.key, overflow, "write over ceiling, compacting");
                let report = self.compact(store, candidate, now_ms)?;
                match self.before_write(store, candidate)? {
                    Verdict::Allow => Ok(Some(report)),
                    _ => {
                        let (others, _) = self.incoming(store, candidate)?;
                        let available = self.ceiling.saturating_sub(others);
                        tracing::warn!(
                            key = %candidate.key,
                            required = candidate.byte_size,
                            available,
                            "compaction could not make room"
                        );
                        Err(StoreError::QuotaExceeded {
                            key: candidate.key.clone(),
                            required: candidate.byte_size,
                            available,
                        })
                    }
                }
            }
        }
    }
}
