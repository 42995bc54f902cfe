//! Guide directory kept consistent across several execution contexts that
//! share one quota-limited durable store.
//!
//! ```text
//! ┌────────────────────────────── GuideDirectory ──────────────────────────────┐
//! │ commit / drafts / remove    filter + overlay     toggle bookmark / compare │
//! └───────┬──────────────────────────┬──────────────────────────┬──────────────┘
//!         ▼                          ▼                          ▼
//!   StorageFacade ──► QuotaGuardian   Reconciler ◄── Broadcaster   Selections
//!         │                                │
//!         ▼                                ▼
//!   KeyValueStore (shared)        Channel (best effort)
//! ```

pub mod broadcast;
pub mod clock;
pub mod config;
pub mod directory;
pub mod error;
pub mod filter;
pub mod model;
pub mod quota;
pub mod reconcile;
pub mod selection;
pub mod sponsor;
pub mod storage;

pub use broadcast::{
    Broadcaster, Channel, ChannelError, FaultMode, GuideNotice, InMemoryChannel, NoticeKind,
    GUIDE_UPDATES,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, DirectoryConfig};
pub use directory::{DirectoryBuilder, GuideDirectory, SyncOutcome};
pub use error::DirectoryError;
pub use filter::{FeeBucket, FilterQuery};
pub use model::{DirectoryEntry, DraftProfile, GuideId, GuideProfile, PhotoRef};
pub use quota::{CompactionReport, CompactionStep, DetachingShrinker, PhotoShrinker, QuotaGuardian};
pub use reconcile::{ReconcileReport, ReconcileStats, Reconciler, ReconcilerThread};
pub use selection::{SelectionChange, SelectionCounts, VisibleGuide, COMPARE_CAPACITY};
pub use sponsor::{SponsorEntry, Sponsors};
pub use storage::{InMemoryStore, KeyValueStore, StorageFacade, StorageRecord, StoreError};
