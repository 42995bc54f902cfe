//! Models - guide profiles, drafts and the records derived from them.
//!
//! Every persisted type serializes with camelCase field names so the durable
//! payloads keep the shape the pages already read:
//!
//! ```text
//! guide_<id>        -> GuideProfile
//! guidesDirectory   -> [DirectoryEntry, ...]
//! ```

mod draft;
mod photo;
mod profile;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use draft::DraftProfile;
pub use photo::PhotoRef;
pub use profile::{DirectoryEntry, GuideProfile};

/// Stable identifier of a guide, assigned once when its first draft is opened.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuideId(String);

impl GuideId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh, globally unique id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GuideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GuideId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for GuideId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for GuideId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
