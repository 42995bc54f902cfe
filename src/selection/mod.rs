//! Selection Set Manager - bookmarks and the bounded comparison list.
//!
//! Both sets live in the durable store as JSON id arrays
//! (`bookmarkedGuides`, `comparedGuides`) and every mutation is a single
//! compare-and-swap on its key, so two contexts toggling at once can never
//! push the comparison list past [`COMPARE_CAPACITY`].

use std::collections::HashSet;

use crate::error::DirectoryError;
use crate::model::{GuideId, GuideProfile};
use crate::storage::{keys, KeyValueStore, StorageFacade};

/// Maximum number of guides in the comparison list.
pub const COMPARE_CAPACITY: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionCounts {
    pub bookmarks: usize,
    pub compared: usize,
}

/// Result of one toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionChange {
    pub id: GuideId,
    /// Whether `id` is a member after the toggle.
    pub selected: bool,
    pub members: Vec<GuideId>,
}

/// A guide as handed to rendering, with selection flags overlaid.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleGuide {
    pub profile: GuideProfile,
    pub bookmarked: bool,
    pub compared: bool,
}

#[derive(Clone, Copy)]
enum Set {
    Bookmarks,
    Compared,
}

impl Set {
    fn key(self) -> &'static str {
        match self {
            Set::Bookmarks => keys::BOOKMARKS,
            Set::Compared => keys::COMPARED,
        }
    }

    fn capacity(self) -> Option<usize> {
        match self {
            Set::Bookmarks => None,
            Set::Compared => Some(COMPARE_CAPACITY),
        }
    }
}

/// Selection operations over one storage facade.
///
/// ```ignore
/// let selections = Selections::new(&facade);
/// selections.toggle_compare(&id)?;
/// let counts = selections.counts()?;
/// ```
pub struct Selections<'a, S: KeyValueStore> {
    facade: &'a StorageFacade<S>,
}

impl<'a, S: KeyValueStore> Selections<'a, S> {
    pub fn new(facade: &'a StorageFacade<S>) -> Self {
        Self { facade }
    }

    pub fn toggle_bookmark(&self, id: &GuideId) -> Result<SelectionChange, DirectoryError> {
        self.toggle(Set::Bookmarks, id)
    }

    /// Adding a fourth guide fails with `CapacityExceeded` and changes nothing.
    pub fn toggle_compare(&self, id: &GuideId) -> Result<SelectionChange, DirectoryError> {
        self.toggle(Set::Compared, id)
    }

    pub fn remove_bookmark(&self, id: &GuideId) -> Result<bool, DirectoryError> {
        self.remove(Set::Bookmarks, id)
    }

    pub fn remove_compare(&self, id: &GuideId) -> Result<bool, DirectoryError> {
        self.remove(Set::Compared, id)
    }

    /// Returns how many bookmarks were cleared.
    pub fn clear_bookmarks(&self) -> Result<usize, DirectoryError> {
        self.clear(Set::Bookmarks)
    }

    pub fn clear_compared(&self) -> Result<usize, DirectoryError> {
        self.clear(Set::Compared)
    }

    pub fn bookmarks(&self) -> Result<Vec<GuideId>, DirectoryError> {
        self.read(Set::Bookmarks)
    }

    pub fn compared(&self) -> Result<Vec<GuideId>, DirectoryError> {
        self.read(Set::Compared)
    }

    pub fn counts(&self) -> Result<SelectionCounts, DirectoryError> {
        Ok(SelectionCounts {
            bookmarks: self.bookmarks()?.len(),
            compared: self.compared()?.len(),
        })
    }

    /// Flag each profile with its current selection state.
    pub fn overlay<'p>(
        &self,
        profiles: impl IntoIterator<Item = &'p GuideProfile>,
    ) -> Result<Vec<VisibleGuide>, DirectoryError> {
        let bookmarks: HashSet<GuideId> = self.bookmarks()?.into_iter().collect();
        let compared: HashSet<GuideId> = self.compared()?.into_iter().collect();
        Ok(profiles
            .into_iter()
            .map(|profile| VisibleGuide {
                bookmarked: bookmarks.contains(&profile.id),
                compared: compared.contains(&profile.id),
                profile: profile.clone(),
            })
            .collect())
    }

    /// Drop `id` from both sets; used when a guide is removed.
    pub(crate) fn forget(&self, id: &GuideId) -> Result<(), DirectoryError> {
        self.remove(Set::Bookmarks, id)?;
        self.remove(Set::Compared, id)?;
        Ok(())
    }

    fn read(&self, set: Set) -> Result<Vec<GuideId>, DirectoryError> {
        let stored = self.facade.get_json::<Vec<GuideId>>(set.key())?;
        Ok(normalize(set, stored.unwrap_or_default()))
    }

    fn toggle(&self, set: Set, id: &GuideId) -> Result<SelectionChange, DirectoryError> {
        let mut selected = false;
        let members = self.facade.update_json::<Vec<GuideId>, _>(set.key(), |current| {
            let mut ids = normalize(set, current.unwrap_or_default());
            if let Some(pos) = ids.iter().position(|m| m == id) {
                ids.remove(pos);
                selected = false;
            } else {
                if let Some(capacity) = set.capacity() {
                    if ids.len() >= capacity {
                        return Err(DirectoryError::CapacityExceeded { capacity });
                    }
                }
                ids.push(id.clone());
                selected = true;
            }
            Ok(Some(ids))
        })?;

        tracing::debug!(key = set.key(), id = %id, selected, "selection toggled");
        Ok(SelectionChange {
            id: id.clone(),
            selected,
            members: members.unwrap_or_default(),
        })
    }

    fn remove(&self, set: Set, id: &GuideId) -> Result<bool, DirectoryError> {
        let mut removed = false;
        self.facade.update_json::<Vec<GuideId>, _>(set.key(), |current| {
            let Some(current) = current else {
                removed = false;
                return Ok(None);
            };
            let mut ids = normalize(set, current);
            let before = ids.len();
            ids.retain(|m| m != id);
            removed = ids.len() != before;
            Ok(Some(ids))
        })?;
        Ok(removed)
    }

    fn clear(&self, set: Set) -> Result<usize, DirectoryError> {
        let mut cleared = 0;
        self.facade.update_json::<Vec<GuideId>, _>(set.key(), |current| {
            cleared = current.map(|ids| normalize(set, ids).len()).unwrap_or(0);
            Ok(Some(Vec::new()))
        })?;
        Ok(cleared)
    }
}

/// Dedupe keeping first occurrence, then clamp to the set's capacity.
fn normalize(set: Set, ids: Vec<GuideId>) -> Vec<GuideId> {
    let mut seen = HashSet::new();
    let mut ids: Vec<GuideId> = ids.into_iter().filter(|id| seen.insert(id.clone())).collect();
    if let Some(capacity) = set.capacity() {
        if ids.len() > capacity {
            tracing::warn!(key = set.key(), len = ids.len(), capacity, "clamping over-long selection list");
            ids.truncate(capacity);
        }
    }
    ids
}
