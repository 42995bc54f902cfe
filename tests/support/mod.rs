//! Shared fixtures: several contexts over one store and one channel.

#![allow(dead_code)]

use guide_directory::{
    DirectoryConfig, DraftProfile, GuideDirectory, InMemoryChannel, InMemoryStore, ManualClock,
};
use std::thread;
use std::time::{Duration, Instant};

pub const START_MS: u64 = 1_700_000_000_000;

/// One simulated browser: a durable store, a channel and a clock shared by
/// every context opened from it.
pub struct Browser {
    pub store: InMemoryStore,
    pub channel: InMemoryChannel,
    pub clock: ManualClock,
    pub config: DirectoryConfig,
}

impl Default for Browser {
    fn default() -> Self {
        Self::new()
    }
}

impl Browser {
    pub fn new() -> Self {
        Self::with_config(DirectoryConfig {
            poll_interval_ms: 20,
            ..DirectoryConfig::default()
        })
    }

    pub fn with_config(config: DirectoryConfig) -> Self {
        init_tracing();
        Self {
            store: InMemoryStore::new(),
            channel: InMemoryChannel::new(),
            clock: ManualClock::new(START_MS),
            config,
        }
    }

    /// Open a new context (tab) on this browser.
    pub fn open(&self, name: &str) -> GuideDirectory {
        GuideDirectory::builder(self.store.clone())
            .config(self.config.clone())
            .clock(self.clock.clone())
            .channel(self.channel.join())
            .context_id(name)
            .open()
            .expect("open context")
    }
}

pub fn guide_draft(directory: &GuideDirectory, name: &str, location: &str, fee: u64) -> DraftProfile {
    directory
        .begin_draft()
        .expect("begin draft")
        .with_display_name(name)
        .with_username(name.to_lowercase())
        .with_email(format!("{}@example.jp", name.to_lowercase()))
        .with_location(location)
        .with_language("Japanese")
        .with_session_fee(fee)
}

/// Poll `check` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
