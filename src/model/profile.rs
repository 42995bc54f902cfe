use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{GuideId, PhotoRef};
use crate::storage::Revisioned;

/// The canonical, committed record of one guide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuideProfile {
    pub id: GuideId,
    pub display_name: String,
    pub username: String,
    pub email: String,
    pub location: String,
    #[serde(default)]
    pub languages: BTreeSet<String>,
    #[serde(default)]
    pub specialties: BTreeSet<String>,
    pub session_fee: u64,
    #[serde(default)]
    pub bio: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_photo_ref: Option<PhotoRef>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default)]
    pub verified: bool,
    pub created_at: u64,
    pub updated_at: u64,
    pub revision: u64,
}

impl GuideProfile {
    /// Text the keyword filter searches: name, bio and specialties.
    pub fn search_text(&self) -> String {
        let mut text = String::with_capacity(
            self.display_name.len() + self.bio.len() + self.specialties.len() * 12,
        );
        text.push_str(&self.display_name);
        text.push(' ');
        text.push_str(&self.bio);
        for specialty in &self.specialties {
            text.push(' ');
            text.push_str(specialty);
        }
        text
    }

    pub fn summary(&self) -> DirectoryEntry {
        DirectoryEntry {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            location: self.location.clone(),
            session_fee: self.session_fee,
            verified: self.verified,
            revision: self.revision,
            updated_at: self.updated_at,
        }
    }
}

impl Revisioned for GuideProfile {
    fn revision(&self) -> u64 {
        self.revision
    }
}

/// Denormalized list-rendering summary kept in `guidesDirectory`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    pub id: GuideId,
    pub display_name: String,
    pub location: String,
    pub session_fee: u64,
    #[serde(default)]
    pub verified: bool,
    pub revision: u64,
    pub updated_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> GuideProfile {
        GuideProfile {
            id: GuideId::from("g1"),
            display_name: "Hanako".into(),
            username: "hanako".into(),
            email: "hanako@example.jp".into(),
            location: "Tokyo, Shibuya".into(),
            languages: ["ja", "en"].iter().map(|s| s.to_string()).collect(),
            specialties: ["Ramen", "History"].iter().map(|s| s.to_string()).collect(),
            session_fee: 6000,
            bio: "Street food walks".into(),
            profile_photo_ref: Some(PhotoRef::from_uri("photos/g1.jpg")),
            rating: 4.8,
            review_count: 12,
            verified: true,
            created_at: 1,
            updated_at: 2,
            revision: 3,
        }
    }

    #[test]
    fn json_uses_camel_case_record_shape() {
        let json = serde_json::to_value(profile()).unwrap();
        assert_eq!(json["displayName"], "Hanako");
        assert_eq!(json["sessionFee"], 6000);
        assert_eq!(json["profilePhotoRef"]["uri"], "photos/g1.jpg");
        assert_eq!(json["reviewCount"], 12);
    }

    #[test]
    fn search_text_covers_name_bio_specialties() {
        let text = profile().search_text();
        assert!(text.contains("Hanako"));
        assert!(text.contains("Street food"));
        assert!(text.contains("Ramen"));
        assert!(!text.contains("Tokyo"));
    }

    #[test]
    fn summary_mirrors_profile() {
        let entry = profile().summary();
        assert_eq!(entry.id.as_str(), "g1");
        assert_eq!(entry.revision, 3);
        assert_eq!(entry.session_fee, 6000);
    }
}
