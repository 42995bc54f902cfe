use serde::{Deserialize, Serialize};

/// Topic every guide change is announced on.
pub const GUIDE_UPDATES: &str = "guide_updates";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    GuideCreated,
    GuideUpdated,
    GuideRemoved,
    SelectionChanged,
}

/// `{type, guideId, data, timestamp}` hint that something changed.
///
/// Receivers re-pull from storage; the payload is never treated as the
/// authoritative state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuideNotice {
    #[serde(rename = "type")]
    pub kind: NoticeKind,
    pub guide_id: Option<String>,
    /// JSON text; kept as a string so the binary envelope stays schema-free.
    pub data: Option<String>,
    pub timestamp: u64,
}

impl GuideNotice {
    pub fn new(kind: NoticeKind, guide_id: Option<String>, timestamp: u64) -> Self {
        Self {
            kind,
            guide_id,
            data: None,
            timestamp,
        }
    }

    pub fn guide(kind: NoticeKind, guide_id: impl Into<String>, timestamp: u64) -> Self {
        Self::new(kind, Some(guide_id.into()), timestamp)
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Encode for the wire.
    pub fn encode(&self) -> Result<Vec<u8>, bitcode::Error> {
        bitcode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bitcode::Error> {
        bitcode::deserialize(bytes)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
