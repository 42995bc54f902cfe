use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

const DATA_IMAGE: &str = "data:image/";
const BASE64_MARKER: &str = ";base64,";

/// Reference to a photo. Either an external URI or an inline
/// `data:image/...;base64,` payload forwarded by the capture widgets.
///
/// `reduced` and `original_bytes` record that the quota guardian shrank
/// the inline payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRef {
    pub uri: String,
    #[serde(default)]
    pub reduced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_bytes: Option<u64>,
}

impl PhotoRef {
    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            reduced: false,
            original_bytes: None,
        }
    }

    /// Build an inline data URL from raw image bytes.
    pub fn inline(mime_type: &str, bytes: &[u8]) -> Self {
        Self::from_uri(format!(
            "data:{}{}{}",
            mime_type,
            BASE64_MARKER,
            STANDARD.encode(bytes)
        ))
    }

    pub fn is_inline(&self) -> bool {
        Self::is_inline_uri(&self.uri)
    }

    pub fn is_inline_uri(uri: &str) -> bool {
        uri.starts_with(DATA_IMAGE) && uri.contains(BASE64_MARKER)
    }

    /// Mime type of an inline payload, e.g. `image/jpeg`.
    pub fn mime_type(&self) -> Option<&str> {
        let rest = self.uri.strip_prefix("data:")?;
        let end = rest.find(BASE64_MARKER)?;
        Some(&rest[..end])
    }

    fn encoded_payload(&self) -> Option<&str> {
        if !self.is_inline() {
            return None;
        }
        let start = self.uri.find(BASE64_MARKER)? + BASE64_MARKER.len();
        Some(&self.uri[start..])
    }

    /// Decoded size of the inline payload; zero for external references.
    pub fn inline_len(&self) -> u64 {
        match self.encoded_payload() {
            Some(encoded) => {
                let trimmed = encoded.trim_end_matches('=');
                (trimmed.len() as u64 * 3) / 4
            }
            None => 0,
        }
    }

    pub fn decode_inline(&self) -> Option<Vec<u8>> {
        STANDARD.decode(self.encoded_payload()?).ok()
    }

    /// Copy of this reference with its payload replaced, marked as reduced.
    pub fn reduced_to(&self, uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            reduced: true,
            original_bytes: self.original_bytes.or(Some(self.inline_len())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_roundtrips_bytes() {
        let photo = PhotoRef::inline("image/png", &[1, 2, 3, 4, 5]);
        assert!(photo.is_inline());
        assert_eq!(photo.mime_type(), Some("image/png"));
        assert_eq!(photo.inline_len(), 5);
        assert_eq!(photo.decode_inline().unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn external_uri_has_no_payload() {
        let photo = PhotoRef::from_uri("https://cdn.example/p.jpg");
        assert!(!photo.is_inline());
        assert_eq!(photo.inline_len(), 0);
        assert!(photo.decode_inline().is_none());
        assert!(photo.mime_type().is_none());
    }

    #[test]
    fn reduced_to_keeps_first_original_size() {
        let photo = PhotoRef::inline("image/jpeg", &[0u8; 300]);
        let once = photo.reduced_to("data:image/jpeg;base64,AAAA");
        assert!(once.reduced);
        assert_eq!(once.original_bytes, Some(300));

        let twice = once.reduced_to("data:image/jpeg;base64,");
        assert_eq!(twice.original_bytes, Some(300));
    }

    #[test]
    fn serialized_shape_is_camel_case() {
        let photo = PhotoRef::from_uri("x").reduced_to("y");
        let json = serde_json::to_value(&photo).unwrap();
        assert_eq!(json["uri"], "y");
        assert_eq!(json["reduced"], true);
        assert!(json.get("originalBytes").is_some());

        let plain = serde_json::to_value(PhotoRef::from_uri("x")).unwrap();
        assert!(plain.get("originalBytes").is_none());
    }
}
