//! Reconciliation Loop - the pull-based resync that guarantees convergence.
//!
//! Every tick re-derives the canonical collection from storage and diffs it
//! against what this context last rendered:
//!
//! ```text
//!   canonical (storage)        rendered (last tick)
//!          │                           │
//!          └──────────► diff ◄─────────┘
//!                        │
//!         ┌──────────────┼───────────────┐
//!         ▼              ▼               ▼
//!       added         updated         removed
//!   (id is new)  (revision moved)  (id disappeared)
//! ```
//!
//! Ticks are idempotent: a tick with no storage change reports nothing.

mod thread;

use std::collections::BTreeMap;

use crate::model::{GuideId, GuideProfile};

pub use thread::{ReconcileStats, ReconcilerThread};

/// What changed between two ticks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<GuideId>,
    pub updated: Vec<GuideId>,
    pub removed: Vec<GuideId>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    pub fn changes(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }
}

/// Holds the collection this context last rendered.
#[derive(Debug, Default)]
pub struct Reconciler {
    rendered: Vec<GuideProfile>,
    revisions: BTreeMap<GuideId, u64>,
    ticks: u64,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rendered(&self) -> &[GuideProfile] {
        &self.rendered
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Replace the rendered collection with `canonical` and report the diff.
    pub fn tick(&mut self, canonical: Vec<GuideProfile>) -> ReconcileReport {
        self.ticks += 1;
        let mut report = ReconcileReport::default();
        let mut next = BTreeMap::new();

        for profile in &canonical {
            match self.revisions.get(&profile.id) {
                None => report.added.push(profile.id.clone()),
                Some(&seen) if seen != profile.revision => {
                    if profile.revision < seen {
                        tracing::warn!(
                            id = %profile.id,
                            seen,
                            now = profile.revision,
                            "guide revision went backwards"
                        );
                    }
                    report.updated.push(profile.id.clone());
                }
                Some(_) => {}
            }
            next.insert(profile.id.clone(), profile.revision);
        }

        for id in self.revisions.keys() {
            if !next.contains_key(id) {
                report.removed.push(id.clone());
            }
        }

        if !report.is_empty() {
            tracing::debug!(
                added = report.added.len(),
                updated = report.updated.len(),
                removed = report.removed.len(),
                "reconciled guide collection"
            );
        }

        self.revisions = next;
        self.rendered = canonical;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DraftProfile;

    fn profile(id: &str, revision: u64) -> GuideProfile {
        let mut p = DraftProfile::new(GuideId::from(id))
            .with_display_name(id)
            .merge_into(None, 1);
        p.revision = revision;
        p
    }

    #[test]
    fn first_tick_adds_everything() {
        let mut r = Reconciler::new();
        let report = r.tick(vec![profile("a", 1), profile("b", 1)]);
        assert_eq!(report.added, vec![GuideId::from("a"), GuideId::from("b")]);
        assert_eq!(r.rendered().len(), 2);
    }

    #[test]
    fn unchanged_storage_reports_nothing() {
        let mut r = Reconciler::new();
        r.tick(vec![profile("a", 1)]);
        assert!(r.tick(vec![profile("a", 1)]).is_empty());
        assert_eq!(r.ticks(), 2);
    }

    #[test]
    fn revision_bump_is_an_update_and_absence_a_removal() {
        let mut r = Reconciler::new();
        r.tick(vec![profile("a", 1), profile("b", 1)]);

        let report = r.tick(vec![profile("a", 2)]);
        assert_eq!(report.updated, vec![GuideId::from("a")]);
        assert_eq!(report.removed, vec![GuideId::from("b")]);
        assert!(report.added.is_empty());
        assert_eq!(report.changes(), 2);
    }
}
