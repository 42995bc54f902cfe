use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{GuideId, GuideProfile, PhotoRef};

/// Working copy bound to one open edit form.
///
/// Lives only in the volatile store of the context that opened it. The id is
/// fixed when the draft is opened and carries over to the committed profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftProfile {
    pub id: GuideId,
    /// Revision of the committed profile this draft started from; 0 for a new guide.
    pub base_revision: u64,
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
}

impl DraftProfile {
    /// Empty draft for a guide that has never been committed.
    pub fn new(id: GuideId) -> Self {
        Self {
            id,
            base_revision: 0,
            display_name: String::new(),
            username: String::new(),
            email: String::new(),
            location: String::new(),
            languages: BTreeSet::new(),
            specialties: BTreeSet::new(),
            session_fee: 0,
            bio: String::new(),
            profile_photo_ref: None,
        }
    }

    pub fn from_profile(profile: &GuideProfile) -> Self {
        Self {
            id: profile.id.clone(),
            base_revision: profile.revision,
            display_name: profile.display_name.clone(),
            username: profile.username.clone(),
            email: profile.email.clone(),
            location: profile.location.clone(),
            languages: profile.languages.clone(),
            specialties: profile.specialties.clone(),
            session_fee: profile.session_fee,
            bio: profile.bio.clone(),
            profile_photo_ref: profile.profile_photo_ref.clone(),
        }
    }

    pub fn is_new(&self) -> bool {
        self.base_revision == 0
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.languages.insert(language.into());
        self
    }

    pub fn with_specialty(mut self, specialty: impl Into<String>) -> Self {
        self.specialties.insert(specialty.into());
        self
    }

    pub fn with_session_fee(mut self, fee: u64) -> Self {
        self.session_fee = fee;
        self
    }

    pub fn with_bio(mut self, bio: impl Into<String>) -> Self {
        self.bio = bio.into();
        self
    }

    pub fn with_photo(mut self, photo: PhotoRef) -> Self {
        self.profile_photo_ref = Some(photo);
        self
    }

    /// Merge the form fields over `current` (the latest committed record, if
    /// any), producing the next revision.
    ///
    /// Rating, review count and verification are not editable from the form
    /// and carry over from `current`.
    pub fn merge_into(self, current: Option<&GuideProfile>, now_ms: u64) -> GuideProfile {
        let base = current.map(|p| p.revision).unwrap_or(0);
        GuideProfile {
            id: self.id,
            display_name: self.display_name,
            username: self.username,
            email: self.email,
            location: self.location,
            languages: self.languages,
            specialties: self.specialties,
            session_fee: self.session_fee,
            bio: self.bio,
            profile_photo_ref: self.profile_photo_ref,
            rating: current.map(|p| p.rating).unwrap_or(0.0),
            review_count: current.map(|p| p.review_count).unwrap_or(0),
            verified: current.map(|p| p.verified).unwrap_or(false),
            created_at: current.map(|p| p.created_at).unwrap_or(now_ms),
            updated_at: now_ms,
            revision: base.max(self.base_revision) + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_draft_commits_as_revision_one() {
        let draft = DraftProfile::new(GuideId::from("g1"))
            .with_display_name("Ken")
            .with_location("Osaka")
            .with_language("ja")
            .with_session_fee(12000);
        assert!(draft.is_new());

        let profile = draft.merge_into(None, 500);
        assert_eq!(profile.revision, 1);
        assert_eq!(profile.created_at, 500);
        assert_eq!(profile.updated_at, 500);
        assert!(profile.languages.contains("ja"));
        assert!(!profile.verified);
    }

    #[test]
    fn edit_keeps_non_form_fields() {
        let first = DraftProfile::new(GuideId::from("g1"))
            .with_display_name("Ken")
            .merge_into(None, 100);
        let mut current = first.clone();
        current.verified = true;
        current.rating = 4.5;
        current.review_count = 8;

        let edited = DraftProfile::from_profile(&current)
            .with_bio("Castle tours")
            .merge_into(Some(&current), 200);

        assert_eq!(edited.revision, 2);
        assert_eq!(edited.created_at, 100);
        assert_eq!(edited.updated_at, 200);
        assert!(edited.verified);
        assert_eq!(edited.rating, 4.5);
        assert_eq!(edited.review_count, 8);
        assert_eq!(edited.bio, "Castle tours");
    }

    #[test]
    fn stale_draft_still_gets_a_newer_revision() {
        let v1 = DraftProfile::new(GuideId::from("g1")).merge_into(None, 1);
        let stale = DraftProfile::from_profile(&v1);

        let mut v5 = v1.clone();
        v5.revision = 5;

        let committed = stale.merge_into(Some(&v5), 2);
        assert_eq!(committed.revision, 6);
    }
}
