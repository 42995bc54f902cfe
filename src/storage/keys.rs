//! Durable key layout.

pub const GUIDE_PREFIX: &str = "guide_";
/// Older pages persisted a second copy of each profile under this prefix.
pub const LEGACY_GUIDE_PREFIX: &str = "guide_profile_";
pub const DIRECTORY: &str = "guidesDirectory";
pub const BOOKMARKS: &str = "bookmarkedGuides";
pub const COMPARED: &str = "comparedGuides";
pub const SPONSOR_LIST: &str = "registeredSponsors";
pub const SPONSOR_PREFIX: &str = "store_";
pub const DRAFT_PREFIX: &str = "draft_";
pub const TIMESTAMP_SUFFIX: &str = "_timestamp";

pub fn guide(id: &str) -> String {
    format!("{}{}", GUIDE_PREFIX, id)
}

pub fn legacy_guide(id: &str) -> String {
    format!("{}{}", LEGACY_GUIDE_PREFIX, id)
}

pub fn draft(id: &str) -> String {
    format!("{}{}", DRAFT_PREFIX, id)
}

pub fn sponsor(id: &str) -> String {
    format!("{}{}", SPONSOR_PREFIX, id)
}

pub fn timestamp_for(key: &str) -> String {
    format!("{}{}", key, TIMESTAMP_SUFFIX)
}

/// What a durable key holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyKind<'a> {
    Guide(&'a str),
    LegacyGuide(&'a str),
    Directory,
    Bookmarks,
    Compared,
    SponsorList,
    Sponsor(&'a str),
    Draft(&'a str),
    /// A companion key holding only the write time of `base`.
    Timestamp { base: &'a str },
    Other,
}

impl<'a> KeyKind<'a> {
    pub fn classify(key: &'a str) -> Self {
        if let Some(base) = key.strip_suffix(TIMESTAMP_SUFFIX) {
            return KeyKind::Timestamp { base };
        }
        match key {
            DIRECTORY => return KeyKind::Directory,
            BOOKMARKS => return KeyKind::Bookmarks,
            COMPARED => return KeyKind::Compared,
            SPONSOR_LIST => return KeyKind::SponsorList,
            _ => {}
        }
        if let Some(id) = key.strip_prefix(LEGACY_GUIDE_PREFIX) {
            KeyKind::LegacyGuide(id)
        } else if let Some(id) = key.strip_prefix(GUIDE_PREFIX) {
            KeyKind::Guide(id)
        } else if let Some(id) = key.strip_prefix(SPONSOR_PREFIX) {
            KeyKind::Sponsor(id)
        } else if let Some(id) = key.strip_prefix(DRAFT_PREFIX) {
            KeyKind::Draft(id)
        } else {
            KeyKind::Other
        }
    }

    pub fn guide_id(&self) -> Option<&'a str> {
        match self {
            KeyKind::Guide(id) | KeyKind::LegacyGuide(id) => Some(id),
            _ => None,
        }
    }

    /// Guide records are never trimmed by compaction.
    pub fn is_guide_record(&self) -> bool {
        self.guide_id().is_some()
    }
}

/// Key of the record an entry of the history list `list_key` points at.
pub fn history_entry(list_key: &str, entry: &str) -> Option<String> {
    match list_key {
        SPONSOR_LIST => Some(sponsor(entry)),
        _ => None,
    }
}
