//! Photo re-encoding seam used by compaction.

use std::sync::Arc;

use crate::model::PhotoRef;

/// Produces a smaller version of an inline photo.
///
/// Implementations return `None` when they cannot make the photo smaller
/// than it already is. Whatever they return is stored with `reduced` set.
pub trait PhotoShrinker: Send + Sync {
    fn shrink(&self, photo: &PhotoRef, target_bytes: u64) -> Option<PhotoRef>;
}

impl<P: PhotoShrinker + ?Sized> PhotoShrinker for Arc<P> {
    fn shrink(&self, photo: &PhotoRef, target_bytes: u64) -> Option<PhotoRef> {
        (**self).shrink(photo, target_bytes)
    }
}

/// Default shrinker: with no image codec available it detaches the inline
/// payload, keeping the mime type and the original size on the reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachingShrinker;

impl PhotoShrinker for DetachingShrinker {
    fn shrink(&self, photo: &PhotoRef, target_bytes: u64) -> Option<PhotoRef> {
        if !photo.is_inline() || photo.inline_len() <= target_bytes {
            return None;
        }
        let mime = photo.mime_type().unwrap_or("image/jpeg");
        Some(photo.reduced_to(format!("data:{};base64,", mime)))
    }
}

/// Keeps a prefix of the decoded bytes no longer than the target.
///
/// Only meaningful for formats that tolerate truncation (progressive
/// previews); mostly useful to exercise compaction in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrefixShrinker;

impl PhotoShrinker for PrefixShrinker {
    fn shrink(&self, photo: &PhotoRef, target_bytes: u64) -> Option<PhotoRef> {
        let bytes = photo.decode_inline()?;
        if bytes.len() as u64 <= target_bytes {
            return None;
        }
        let mime = photo.mime_type().unwrap_or("image/jpeg");
        let smaller = PhotoRef::inline(mime, &bytes[..target_bytes as usize]);
        Some(photo.reduced_to(smaller.uri))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detaching_leaves_small_photos_alone() {
        let photo = PhotoRef::inline("image/png", &[0u8; 10]);
        assert!(DetachingShrinker.shrink(&photo, 100).is_none());
        assert!(DetachingShrinker
            .shrink(&PhotoRef::from_uri("https://x/y.png"), 0)
            .is_none());
    }

    #[test]
    fn detaching_records_reduction() {
        let photo = PhotoRef::inline("image/png", &[0u8; 1000]);
        let shrunk = DetachingShrinker.shrink(&photo, 100).unwrap();
        assert_eq!(shrunk.uri, "data:image/png;base64,");
        assert!(shrunk.reduced);
        assert_eq!(shrunk.original_bytes, Some(1000));
    }

    #[test]
    fn prefix_keeps_target_bytes() {
        let photo = PhotoRef::inline("image/jpeg", &[7u8; 900]);
        let shrunk = PrefixShrinker.shrink(&photo, 300).unwrap();
        assert_eq!(shrunk.decode_inline().unwrap().len(), 300);
        assert_eq!(shrunk.original_bytes, Some(900));
    }
}
