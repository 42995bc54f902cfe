//! Filter/Search Engine - pure predicate evaluation over a guide collection.
//!
//! Each query dimension is optional; an empty dimension matches everything
//! and the dimensions AND together. Keywords OR among themselves.
//!
//! ```text
//! collection ──► location ──► language ──► fee bucket ──► keywords ──► visible
//!                (substring)  (exact)      ((lo, hi])     (any substring)
//! ```

mod fee;

use std::collections::BTreeSet;

use crate::model::GuideProfile;

pub use fee::{FeeBucket, UnknownFeeBucket};

/// Criteria selected on the search page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterQuery {
    pub location_text: String,
    pub language: Option<String>,
    pub fee_bucket: Option<FeeBucket>,
    /// Lowercased; a guide matches if any keyword matches.
    pub keywords: BTreeSet<String>,
}

impl FilterQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_location(mut self, text: impl Into<String>) -> Self {
        self.location_text = text.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_fee_bucket(mut self, bucket: FeeBucket) -> Self {
        self.fee_bucket = Some(bucket);
        self
    }

    /// Add one checkbox-style keyword.
    pub fn with_keyword(mut self, keyword: &str) -> Self {
        let keyword = keyword.trim().to_lowercase();
        if !keyword.is_empty() {
            self.keywords.insert(keyword);
        }
        self
    }

    /// Add the comma-separated tokens of a free-text keyword field.
    pub fn with_keyword_text(mut self, text: &str) -> Self {
        self.keywords.extend(parse_keywords(text));
        self
    }

    /// True when every guide matches.
    pub fn is_empty(&self) -> bool {
        self.location_text.trim().is_empty()
            && self.language.as_deref().map_or(true, |l| l.trim().is_empty())
            && self.fee_bucket.is_none()
            && self.keywords.is_empty()
    }

    pub fn matches(&self, profile: &GuideProfile) -> bool {
        self.matches_location(profile)
            && self.matches_language(profile)
            && self.matches_fee(profile)
            && self.matches_keywords(profile)
    }

    fn matches_location(&self, profile: &GuideProfile) -> bool {
        let wanted = self.location_text.trim();
        wanted.is_empty() || profile.location.to_lowercase().contains(&wanted.to_lowercase())
    }

    fn matches_language(&self, profile: &GuideProfile) -> bool {
        match self.language.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(language) => profile.languages.contains(language),
        }
    }

    fn matches_fee(&self, profile: &GuideProfile) -> bool {
        self.fee_bucket
            .map_or(true, |bucket| bucket.contains(profile.session_fee))
    }

    fn matches_keywords(&self, profile: &GuideProfile) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let haystack = profile.search_text().to_lowercase();
        self.keywords.iter().any(|k| haystack.contains(k.as_str()))
    }
}

/// Split free text on commas into trimmed, lowercased, non-empty keywords.
pub fn parse_keywords(text: &str) -> BTreeSet<String> {
    text.split(',')
        .map(|token| token.trim().to_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

/// The subset of `collection` matching `query`, in collection order.
///
/// No match yields an empty vector, never an error.
pub fn apply<'a>(collection: &'a [GuideProfile], query: &FilterQuery) -> Vec<&'a GuideProfile> {
    collection.iter().filter(|p| query.matches(p)).collect()
}
