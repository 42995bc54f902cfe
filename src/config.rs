//! Tunable limits for the directory.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration. Environment overrides are applied last.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const QUOTA_BYTES_ENV: &str = "GUIDE_DIRECTORY_QUOTA_BYTES";
pub const POLL_INTERVAL_ENV: &str = "GUIDE_DIRECTORY_POLL_INTERVAL_MS";

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Byte ceiling for the durable store.
    pub quota_bytes: u64,
    /// Compaction stops once usage is at or below `quota_bytes * safety_margin`.
    pub safety_margin: f64,
    /// Largest single record the durable store accepts.
    pub max_record_bytes: u64,
    /// Entries kept when a history list is truncated.
    pub history_limit: usize,
    /// Age after which durable draft and timestamp keys count as stale.
    pub draft_max_age_ms: u64,
    /// Reconciliation timer period.
    pub poll_interval_ms: u64,
    /// Target size for re-encoded inline photos.
    pub photo_max_bytes: u64,
    /// Fields that may be dropped from the largest non-guide records.
    pub trim_fields: Vec<String>,
    /// Durable keys that hold most-recent-first history lists.
    pub history_keys: Vec<String>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            quota_bytes: 5 * 1024 * 1024,
            safety_margin: 0.9,
            max_record_bytes: 500 * 1024,
            history_limit: 50,
            draft_max_age_ms: 3 * DAY_MS,
            poll_interval_ms: 2_000,
            photo_max_bytes: 64 * 1024,
            trim_fields: vec![
                "description".to_string(),
                "additionalImages".to_string(),
                "notes".to_string(),
            ],
            history_keys: vec![crate::storage::keys::SPONSOR_LIST.to_string()],
        }
    }
}

impl DirectoryConfig {
    /// Parse a TOML document, then apply environment overrides.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Self::parse_with(contents, |name| std::env::var(name).ok())
    }

    /// Load from a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    fn parse_with(
        contents: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config: DirectoryConfig = toml::from_str(contents)?;
        config.apply_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(QUOTA_BYTES_ENV) {
            match raw.trim().parse() {
                Ok(bytes) => self.quota_bytes = bytes,
                Err(e) => tracing::warn!("ignoring {QUOTA_BYTES_ENV}={raw}: {e}"),
            }
        }
        if let Some(raw) = lookup(POLL_INTERVAL_ENV) {
            match raw.trim().parse() {
                Ok(ms) => self.poll_interval_ms = ms,
                Err(e) => tracing::warn!("ignoring {POLL_INTERVAL_ENV}={raw}: {e}"),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quota_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "quota_bytes",
                reason: "must be greater than zero".into(),
            });
        }
        if !(self.safety_margin > 0.0 && self.safety_margin <= 1.0) {
            return Err(ConfigError::Invalid {
                field: "safety_margin",
                reason: format!("{} is outside (0, 1]", self.safety_margin),
            });
        }
        if self.history_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "history_limit",
                reason: "must keep at least one entry".into(),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "poll_interval_ms",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Usage level compaction aims for.
    pub fn compaction_target(&self) -> u64 {
        (self.quota_bytes as f64 * self.safety_margin) as u64
    }
}
