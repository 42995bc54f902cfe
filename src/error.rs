use thiserror::Error;

use crate::broadcast::ChannelError;
use crate::config::ConfigError;
use crate::storage::StoreError;

/// Every failure the directory surfaces to its callers.
///
/// Storage-layer failures are resolved to one of these kinds before they leave
/// the crate. `MalformedRecord` and `ChannelUnavailable` are normally recovered
/// locally (absent record, polling-only mode) and only appear when a caller
/// asks for them explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// The durable store is still over its ceiling after compaction.
    #[error("quota exceeded writing {key}: {required} bytes needed, {available} available")]
    QuotaExceeded {
        key: String,
        required: u64,
        available: u64,
    },

    /// A stored payload could not be parsed.
    #[error("malformed record at {key}: {reason}")]
    MalformedRecord { key: String, reason: String },

    /// The comparison set already holds its maximum number of guides.
    #[error("comparison set is full ({capacity} guides)")]
    CapacityExceeded { capacity: usize },

    /// No record exists for the requested id.
    #[error("guide not found: {0}")]
    NotFound(String),

    /// The cross-context channel is missing in this context.
    #[error("cross-context channel unavailable")]
    ChannelUnavailable,

    /// Another context kept rewriting the key; the write did not land.
    #[error("gave up writing {0} after repeated concurrent modification")]
    Contended(String),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

impl DirectoryError {
    /// Whether the caller must present this error to the user.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            DirectoryError::QuotaExceeded { .. }
                | DirectoryError::CapacityExceeded { .. }
                | DirectoryError::Contended(_)
        )
    }
}

impl From<StoreError> for DirectoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::QuotaExceeded {
                key,
                required,
                available,
            } => DirectoryError::QuotaExceeded {
                key,
                required,
                available,
            },
            StoreError::Malformed { key, reason } => {
                DirectoryError::MalformedRecord { key, reason }
            }
            StoreError::Contended(key) => DirectoryError::Contended(key),
        }
    }
}

impl From<ChannelError> for DirectoryError {
    fn from(_: ChannelError) -> Self {
        DirectoryError::ChannelUnavailable
    }
}

impl From<ConfigError> for DirectoryError {
    fn from(err: ConfigError) -> Self {
        DirectoryError::Config(err.to_string())
    }
}
