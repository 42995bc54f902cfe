//! Sponsor directory - partner shop entries stored beside the guides.
//!
//! Each entry lives under `store_<id>`; `registeredSponsors` lists the ids
//! most recent first and is capped at the configured history limit. Entries
//! pushed off the end of the list are deleted. Both keys go through the same
//! quota guardian as guide records, so their photos and descriptive fields
//! are what compaction reclaims first.

use serde::{Deserialize, Serialize};

use crate::error::DirectoryError;
use crate::model::PhotoRef;
use crate::storage::{keys, KeyValueStore, StorageFacade};

/// Extra photos kept per entry.
pub const MAX_ADDITIONAL_IMAGES: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorEntry {
    pub id: String,
    pub store_name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_image: Option<PhotoRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_image: Option<PhotoRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_images: Vec<PhotoRef>,
    #[serde(default)]
    pub updated_at: u64,
    /// Fields compaction removed from this entry to make room.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trimmed_fields: Vec<String>,
}

fn default_status() -> String {
    "published".to_string()
}

impl SponsorEntry {
    pub fn new(id: impl Into<String>, store_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            store_name: store_name.into(),
            category: String::new(),
            status: default_status(),
            description: String::new(),
            main_image: None,
            logo_image: None,
            additional_images: Vec::new(),
            updated_at: 0,
            trimmed_fields: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_main_image(mut self, photo: PhotoRef) -> Self {
        self.main_image = Some(photo);
        self
    }

    pub fn with_logo_image(mut self, photo: PhotoRef) -> Self {
        self.logo_image = Some(photo);
        self
    }

    pub fn with_additional_image(mut self, photo: PhotoRef) -> Self {
        self.additional_images.push(photo);
        self
    }

    /// Whether compaction has removed descriptive content.
    pub fn is_trimmed(&self) -> bool {
        !self.trimmed_fields.is_empty()
    }
}

/// Sponsor operations over one storage facade.
pub struct Sponsors<'a, S: KeyValueStore> {
    facade: &'a StorageFacade<S>,
    limit: usize,
}

impl<'a, S: KeyValueStore> Sponsors<'a, S> {
    /// `limit` is the list cap; at least the entry being saved is kept.
    pub fn new(facade: &'a StorageFacade<S>, limit: usize) -> Self {
        Self {
            facade,
            limit: limit.max(1),
        }
    }

    /// Store `entry` and move its id to the front of the list.
    ///
    /// If the list cannot be updated the entry write is undone.
    pub fn save(&self, mut entry: SponsorEntry) -> Result<SponsorEntry, DirectoryError> {
        entry.additional_images.truncate(MAX_ADDITIONAL_IMAGES);
        entry.updated_at = self.facade.now_ms();

        let key = keys::sponsor(&entry.id);
        let previous = self.facade.get(&key)?;
        self.facade.put_json(&key, &entry)?;

        let mut dropped = Vec::new();
        let limit = self.limit;
        let listed = self.facade.update_json::<Vec<String>, _>(keys::SPONSOR_LIST, |current| {
            let mut ids: Vec<String> = current
                .unwrap_or_default()
                .into_iter()
                .filter(|id| id != &entry.id)
                .collect();
            ids.insert(0, entry.id.clone());
            dropped = if ids.len() > limit {
                ids.split_off(limit)
            } else {
                Vec::new()
            };
            Ok(Some(ids))
        });
        if let Err(e) = listed {
            tracing::warn!(id = %entry.id, "sponsor list update failed, undoing entry write: {e}");
            self.facade.restore(&key, previous)?;
            return Err(e);
        }

        for id in &dropped {
            self.facade.delete(&keys::sponsor(id))?;
        }
        tracing::info!(id = %entry.id, evicted = dropped.len(), "sponsor saved");
        Ok(entry)
    }

    pub fn get(&self, id: &str) -> Result<Option<SponsorEntry>, DirectoryError> {
        self.facade.get_json(&keys::sponsor(id))
    }

    /// Entries in list order, most recent first. Ids whose entry is gone
    /// are skipped.
    pub fn list(&self) -> Result<Vec<SponsorEntry>, DirectoryError> {
        let ids = self
            .facade
            .get_json::<Vec<String>>(keys::SPONSOR_LIST)?
            .unwrap_or_default();
        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entry) = self.get(&id)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    pub fn remove(&self, id: &str) -> Result<bool, DirectoryError> {
        let existed = self.facade.delete(&keys::sponsor(id))?;
        self.facade
            .update_json::<Vec<String>, _>(keys::SPONSOR_LIST, |current| {
                Ok(current.map(|ids| ids.into_iter().filter(|m| m != id).collect()))
            })?;
        Ok(existed)
    }
}
