//! Ordered compaction policy.

use std::collections::HashSet;

use serde_json::{Map, Value};

use super::QuotaGuardian;
use crate::model::PhotoRef;
use crate::storage::keys::{self, KeyKind};
use crate::storage::{KeyValueStore, StorageRecord, StoreError};

/// Compaction steps, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompactionStep {
    /// Stale or orphaned `*_timestamp` keys and durable `draft_*` leftovers.
    StaleEphemera,
    /// History lists cut to their most recent entries.
    HistoryTruncation,
    /// Inline photos re-encoded smaller.
    PhotoReencode,
    /// Non-essential descriptive fields dropped from the largest records.
    FieldTrim,
}

impl CompactionStep {
    pub const ORDER: [CompactionStep; 4] = [
        CompactionStep::StaleEphemera,
        CompactionStep::HistoryTruncation,
        CompactionStep::PhotoReencode,
        CompactionStep::FieldTrim,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub step: CompactionStep,
    pub reclaimed: u64,
    /// Keys rewritten or removed by the step.
    pub touched: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionReport {
    pub usage_before: u64,
    pub usage_after: u64,
    pub steps: Vec<StepOutcome>,
}

impl CompactionReport {
    pub fn reclaimed(&self) -> u64 {
        self.steps.iter().map(|s| s.reclaimed).sum()
    }

    pub fn ran(&self, step: CompactionStep) -> bool {
        self.steps.iter().any(|s| s.step == step)
    }

    pub fn touched(&self, step: CompactionStep) -> &[String] {
        self.steps
            .iter()
            .find(|s| s.step == step)
            .map(|s| s.touched.as_slice())
            .unwrap_or(&[])
    }
}

pub(super) struct Compactor<'a, S: KeyValueStore> {
    pub(super) store: &'a S,
    pub(super) guardian: &'a QuotaGuardian,
    pub(super) protect: &'a str,
    pub(super) incoming: u64,
    pub(super) now_ms: u64,
}

impl<S: KeyValueStore> Compactor<'_, S> {
    pub(super) fn run(self) -> Result<CompactionReport, StoreError> {
        let usage_before = self.store.usage()?;
        let mut report = CompactionReport {
            usage_before,
            ..CompactionReport::default()
        };

        for step in CompactionStep::ORDER {
            if self.fits()? {
                break;
            }
            let mut outcome = StepOutcome {
                step,
                reclaimed: 0,
                touched: Vec::new(),
            };
            match step {
                CompactionStep::StaleEphemera => self.discard_stale(&mut outcome)?,
                CompactionStep::HistoryTruncation => self.truncate_histories(&mut outcome)?,
                CompactionStep::PhotoReencode => self.reencode_photos(&mut outcome)?,
                CompactionStep::FieldTrim => self.trim_fields(&mut outcome)?,
            }
            tracing::debug!(?step, reclaimed = outcome.reclaimed, "compaction step done");
            report.steps.push(outcome);
        }

        report.usage_after = self.store.usage()?;
        Ok(report)
    }

    fn fits(&self) -> Result<bool, StoreError> {
        let replaced = self
            .store
            .get(self.protect)?
            .map(|r| r.byte_size)
            .unwrap_or(0);
        let usage = self.store.usage()?.saturating_sub(replaced);
        Ok(usage + self.incoming <= self.guardian.target)
    }

    fn is_stale(&self, stamp: Option<u64>) -> bool {
        match stamp {
            Some(written) => self.now_ms.saturating_sub(written) > self.guardian.draft_max_age_ms,
            None => true,
        }
    }

    /// Remove `record` unless another context changed it meanwhile.
    fn remove(&self, record: &StorageRecord, outcome: &mut StepOutcome) -> Result<(), StoreError> {
        if record.key == self.protect {
            return Ok(());
        }
        if self
            .store
            .compare_and_swap(&record.key, Some(&record.payload), None)?
        {
            outcome.reclaimed += record.byte_size;
            outcome.touched.push(record.key.clone());
        }
        Ok(())
    }

    /// Replace `record`'s payload when that makes it smaller.
    fn rewrite(
        &self,
        record: &StorageRecord,
        payload: String,
        outcome: &mut StepOutcome,
    ) -> Result<(), StoreError> {
        if record.key == self.protect {
            return Ok(());
        }
        let replacement = StorageRecord::new(record.key.clone(), payload, self.now_ms);
        if replacement.byte_size >= record.byte_size {
            return Ok(());
        }
        let saved = record.byte_size - replacement.byte_size;
        if self
            .store
            .compare_and_swap(&record.key, Some(&record.payload), Some(replacement))?
        {
            outcome.reclaimed += saved;
            outcome.touched.push(record.key.clone());
        }
        Ok(())
    }

    fn discard_stale(&self, outcome: &mut StepOutcome) -> Result<(), StoreError> {
        let records = self.store.records()?;
        let present: HashSet<&str> = records.iter().map(|r| r.key.as_str()).collect();
        let stamp_of = |key: &str| -> Option<u64> {
            records
                .iter()
                .find(|r| r.key == key)
                .and_then(|r| parse_stamp(&r.payload))
        };

        for record in &records {
            match KeyKind::classify(&record.key) {
                KeyKind::Timestamp { base } => {
                    if base == self.protect {
                        continue;
                    }
                    let orphaned = !present.contains(base);
                    if orphaned || self.is_stale(parse_stamp(&record.payload)) {
                        self.remove(record, outcome)?;
                    }
                }
                KeyKind::Draft(_) => {
                    let stamp_key = keys::timestamp_for(&record.key);
                    let orphaned = !present.contains(stamp_key.as_str());
                    if orphaned || self.is_stale(stamp_of(&stamp_key)) {
                        self.remove(record, outcome)?;
                    }
                }
                _ => {}
            }
            if self.fits()? {
                break;
            }
        }
        Ok(())
    }

    fn truncate_histories(&self, outcome: &mut StepOutcome) -> Result<(), StoreError> {
        let limit = self.guardian.history_limit;
        for list_key in &self.guardian.history_keys {
            if list_key == self.protect {
                continue;
            }
            let Some(record) = self.store.get(list_key)? else {
                continue;
            };
            let entries: Vec<Value> = match serde_json::from_str(&record.payload) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(key = %list_key, "history list unreadable, skipping: {e}");
                    continue;
                }
            };
            if entries.len() <= limit {
                continue;
            }

            let (kept, dropped) = entries.split_at(limit);
            let payload = serde_json::to_string(kept).map_err(|e| StoreError::Malformed {
                key: list_key.clone(),
                reason: e.to_string(),
            })?;
            self.rewrite(&record, payload, outcome)?;

            for entry in dropped.iter().filter_map(Value::as_str) {
                let Some(entry_key) = keys::history_entry(list_key, entry) else {
                    continue;
                };
                if let Some(entry_record) = self.store.get(&entry_key)? {
                    self.remove(&entry_record, outcome)?;
                }
            }
            if self.fits()? {
                break;
            }
        }
        Ok(())
    }

    fn reencode_photos(&self, outcome: &mut StepOutcome) -> Result<(), StoreError> {
        for record in self.largest_first()? {
            if record.key == self.protect {
                continue;
            }
            let Ok(mut value) = serde_json::from_str::<Value>(&record.payload) else {
                continue;
            };
            if self.shrink_photos(&mut value) == 0 {
                continue;
            }
            self.rewrite(&record, value.to_string(), outcome)?;
            if self.fits()? {
                break;
            }
        }
        Ok(())
    }

    /// Shrink every oversized inline `PhotoRef` object inside `value`.
    fn shrink_photos(&self, value: &mut Value) -> usize {
        match value {
            Value::Object(map) => {
                let mut count = 0;
                if let Some(photo) = inline_photo(map) {
                    if photo.inline_len() > self.guardian.photo_max_bytes {
                        if let Some(smaller) = self
                            .guardian
                            .shrinker
                            .shrink(&photo, self.guardian.photo_max_bytes)
                        {
                            map.insert("uri".into(), Value::String(smaller.uri));
                            map.insert("reduced".into(), Value::Bool(true));
                            if let Some(original) = smaller.original_bytes {
                                map.insert("originalBytes".into(), Value::from(original));
                            }
                            count += 1;
                        }
                    }
                }
                for child in map.values_mut() {
                    count += self.shrink_photos(child);
                }
                count
            }
            Value::Array(items) => items.iter_mut().map(|v| self.shrink_photos(v)).sum(),
            _ => 0,
        }
    }

    fn trim_fields(&self, outcome: &mut StepOutcome) -> Result<(), StoreError> {
        for record in self.largest_first()? {
            if record.key == self.protect || KeyKind::classify(&record.key).is_guide_record() {
                continue;
            }
            let Ok(Value::Object(mut map)) = serde_json::from_str::<Value>(&record.payload) else {
                continue;
            };

            let mut trimmed: Vec<Value> = match map.remove("trimmedFields") {
                Some(Value::Array(existing)) => existing,
                _ => Vec::new(),
            };
            let before = trimmed.len();
            for field in &self.guardian.trim_fields {
                if map.remove(field).is_some() {
                    trimmed.push(Value::String(field.clone()));
                }
            }
            if trimmed.len() == before {
                continue;
            }
            map.insert("trimmedFields".into(), Value::Array(trimmed));

            self.rewrite(&record, Value::Object(map).to_string(), outcome)?;
            if self.fits()? {
                break;
            }
        }
        Ok(())
    }

    fn largest_first(&self) -> Result<Vec<StorageRecord>, StoreError> {
        let mut records = self.store.records()?;
        records.sort_by(|a, b| b.byte_size.cmp(&a.byte_size).then(a.key.cmp(&b.key)));
        Ok(records)
    }
}

fn parse_stamp(payload: &str) -> Option<u64> {
    payload.trim().trim_matches('"').parse().ok()
}

fn inline_photo(map: &Map<String, Value>) -> Option<PhotoRef> {
    let uri = map.get("uri")?.as_str()?;
    if !PhotoRef::is_inline_uri(uri) {
        return None;
    }
    Some(PhotoRef {
        uri: uri.to_string(),
        reduced: map.get("reduced").and_then(Value::as_bool).unwrap_or(false),
        original_bytes: map.get("originalBytes").and_then(Value::as_u64),
    })
}
