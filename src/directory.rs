//! GuideDirectory - the caller-facing API of one execution context.
//!
//! ```text
//! commit_profile ──► StorageFacade ──► QuotaGuardian ──► durable store
//!        │                                                    │
//!        └──► Broadcaster ──► siblings ──► sync() ──► tick() ◄┘
//!                                              │
//!                               Reconciler (rendered collection)
//!                                              │
//!                    apply_filter / visible ◄──┘  (+ selection overlay)
//! ```
//!
//! Every context opens its own `GuideDirectory` over the shared durable
//! store. Clones share the same context.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::broadcast::{Broadcaster, Channel, GuideNotice, NoticeKind, GUIDE_UPDATES};
use crate::clock::{Clock, SystemClock};
use crate::config::DirectoryConfig;
use crate::error::DirectoryError;
use crate::filter::{self, FilterQuery};
use crate::model::{DirectoryEntry, DraftProfile, GuideId, GuideProfile};
use crate::quota::{PhotoShrinker, QuotaGuardian};
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::selection::{SelectionChange, SelectionCounts, Selections, VisibleGuide};
use crate::sponsor::Sponsors;
use crate::storage::keys::{self, KeyKind};
use crate::storage::{InMemoryStore, KeyValueStore, StorageFacade};

/// What one [`GuideDirectory::sync`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Notices received from sibling contexts.
    pub notices: usize,
    pub report: ReconcileReport,
}

pub struct DirectoryBuilder<S: KeyValueStore> {
    store: S,
    config: DirectoryConfig,
    clock: Arc<dyn Clock>,
    channel: Option<Box<dyn Channel>>,
    shrinker: Option<Arc<dyn PhotoShrinker>>,
    context_id: Option<String>,
}

impl<S: KeyValueStore> DirectoryBuilder<S> {
    pub fn config(mut self, config: DirectoryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Without a channel the context relies on polling alone.
    pub fn channel(mut self, channel: impl Channel + 'static) -> Self {
        self.channel = Some(Box::new(channel));
        self
    }

    pub fn shrinker(mut self, shrinker: impl PhotoShrinker + 'static) -> Self {
        self.shrinker = Some(Arc::new(shrinker));
        self
    }

    pub fn context_id(mut self, id: impl Into<String>) -> Self {
        self.context_id = Some(id.into());
        self
    }

    /// Validate the configuration and run the first reconciliation tick.
    pub fn open(self) -> Result<GuideDirectory<S>, DirectoryError> {
        self.config.validate()?;

        let mut guardian = QuotaGuardian::new(&self.config);
        if let Some(shrinker) = self.shrinker {
            guardian = guardian.with_shrinker(shrinker);
        }
        let context_id = self
            .context_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        let broadcaster = match self.channel {
            Some(channel) => Broadcaster::new(context_id.clone(), channel),
            None => {
                tracing::warn!(context = %context_id, "no channel, falling back to polling");
                Broadcaster::unavailable(context_id.clone())
            }
        };

        let directory = GuideDirectory {
            inner: Arc::new(Inner {
                context_id,
                facade: StorageFacade::new(self.store, guardian, self.clock),
                broadcaster: Mutex::new(broadcaster),
                reconciler: Mutex::new(Reconciler::new()),
                config: self.config,
                closed: AtomicBool::new(false),
            }),
        };
        directory.tick()?;
        tracing::info!(
            context = %directory.context_id(),
            guides = directory.list_guides().len(),
            "guide directory opened"
        );
        Ok(directory)
    }
}

struct Inner<S: KeyValueStore> {
    context_id: String,
    facade: StorageFacade<S>,
    broadcaster: Mutex<Broadcaster>,
    reconciler: Mutex<Reconciler>,
    config: DirectoryConfig,
    closed: AtomicBool,
}

/// One context's view of the shared guide directory.
pub struct GuideDirectory<S: KeyValueStore = InMemoryStore> {
    inner: Arc<Inner<S>>,
}

impl<S: KeyValueStore> Clone for GuideDirectory<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl GuideDirectory<InMemoryStore> {
    /// Context over a fresh in-memory store with default settings.
    pub fn in_memory() -> Result<Self, DirectoryError> {
        Self::builder(InMemoryStore::new()).open()
    }
}

impl<S: KeyValueStore> GuideDirectory<S> {
    pub fn builder(store: S) -> DirectoryBuilder<S> {
        DirectoryBuilder {
            store,
            config: DirectoryConfig::default(),
            clock: Arc::new(SystemClock),
            channel: None,
            shrinker: None,
            context_id: None,
        }
    }

    pub fn open(store: S, config: DirectoryConfig) -> Result<Self, DirectoryError> {
        Self::builder(store).config(config).open()
    }

    pub fn context_id(&self) -> &str {
        &self.inner.context_id
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.inner.config
    }

    pub fn storage(&self) -> &StorageFacade<S> {
        &self.inner.facade
    }

    /// Bytes held by the durable store.
    pub fn usage(&self) -> Result<u64, DirectoryError> {
        self.inner.facade.usage()
    }

    // ------------------------------------------------------------------
    // Profiles
    // ------------------------------------------------------------------

    /// Merge `draft` into the next revision of its guide and persist it.
    ///
    /// The guide record is written first, then its `guidesDirectory` entry.
    /// If the second write fails the first is undone, so the commit either
    /// lands fully or not at all. The draft is discarded on success.
    pub fn commit_profile(&self, draft: DraftProfile) -> Result<GuideProfile, DirectoryError> {
        let facade = &self.inner.facade;
        let current = self.current_profile(&draft.id)?;
        if let Some(current) = &current {
            if current.revision > draft.base_revision {
                tracing::warn!(
                    id = %draft.id,
                    base = draft.base_revision,
                    current = current.revision,
                    "committing over a newer revision, last writer wins"
                );
            }
        }

        let profile = draft.merge_into(current.as_ref(), facade.now_ms());
        let key = keys::guide(profile.id.as_str());
        let previous = facade.get(&key)?;
        facade.put_json(&key, &profile)?;

        let summary = profile.summary();
        let listed = facade.update_json::<Vec<DirectoryEntry>, _>(keys::DIRECTORY, |entries| {
            let mut entries = entries.unwrap_or_default();
            match entries.iter_mut().find(|e| e.id == summary.id) {
                Some(entry) => *entry = summary.clone(),
                None => entries.push(summary.clone()),
            }
            Ok(Some(entries))
        });
        if let Err(e) = listed {
            tracing::warn!(id = %profile.id, "directory update failed, rolling back commit: {e}");
            facade.restore(&key, previous)?;
            return Err(e);
        }

        facade.volatile_delete(&keys::draft(profile.id.as_str()))?;
        tracing::info!(
            context = %self.context_id(),
            id = %profile.id,
            revision = profile.revision,
            "guide committed"
        );

        let kind = if current.is_some() {
            NoticeKind::GuideUpdated
        } else {
            NoticeKind::GuideCreated
        };
        self.announce(
            GuideNotice::guide(kind, profile.id.as_str(), profile.updated_at)
                .with_data(format!(r#"{{"revision":{}}}"#, profile.revision)),
        );
        self.tick()?;
        Ok(profile)
    }

    /// The collection as of this context's last reconciliation tick.
    pub fn list_guides(&self) -> Vec<GuideProfile> {
        self.reconciler().rendered().to_vec()
    }

    pub fn apply_filter(&self, query: &FilterQuery) -> Vec<GuideProfile> {
        let reconciler = self.reconciler();
        filter::apply(reconciler.rendered(), query)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Filtered guides with bookmark and compare flags for rendering.
    pub fn visible(&self, query: &FilterQuery) -> Result<Vec<VisibleGuide>, DirectoryError> {
        let filtered = self.apply_filter(query);
        self.selections().overlay(&filtered)
    }

    /// Latest committed record, read straight from storage.
    pub fn get_guide(&self, id: &GuideId) -> Result<GuideProfile, DirectoryError> {
        self.current_profile(id)?
            .ok_or_else(|| DirectoryError::NotFound(id.to_string()))
    }

    /// Delete a guide, its directory entry and its selection memberships.
    pub fn remove_guide(&self, id: &GuideId) -> Result<(), DirectoryError> {
        let facade = &self.inner.facade;
        let record_keys = [keys::guide(id.as_str()), keys::legacy_guide(id.as_str())];
        let mut existed = false;
        for key in &record_keys {
            existed |= facade.delete(key)?;
        }
        if !existed {
            return Err(DirectoryError::NotFound(id.to_string()));
        }

        facade.update_json::<Vec<DirectoryEntry>, _>(keys::DIRECTORY, |entries| {
            Ok(entries.map(|entries| entries.into_iter().filter(|e| &e.id != id).collect()))
        })?;
        self.selections().forget(id)?;
        facade.volatile_delete(&keys::draft(id.as_str()))?;

        tracing::info!(context = %self.context_id(), id = %id, "guide removed");
        self.announce(GuideNotice::guide(
            NoticeKind::GuideRemoved,
            id.as_str(),
            facade.now_ms(),
        ));
        self.tick()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Drafts
    // ------------------------------------------------------------------

    /// Open a draft for a brand-new guide with a freshly minted id.
    pub fn begin_draft(&self) -> Result<DraftProfile, DirectoryError> {
        let draft = DraftProfile::new(GuideId::generate());
        self.save_draft(&draft)?;
        Ok(draft)
    }

    /// Open a draft from the latest committed record.
    pub fn edit_profile(&self, id: &GuideId) -> Result<DraftProfile, DirectoryError> {
        let draft = DraftProfile::from_profile(&self.get_guide(id)?);
        self.save_draft(&draft)?;
        Ok(draft)
    }

    /// Keep the form state in this context only.
    pub fn save_draft(&self, draft: &DraftProfile) -> Result<(), DirectoryError> {
        self.inner
            .facade
            .volatile_put_json(&keys::draft(draft.id.as_str()), draft)
    }

    /// This context's open draft if there is one, otherwise a draft of the
    /// latest committed record.
    pub fn load_for_edit(&self, id: &GuideId) -> Result<DraftProfile, DirectoryError> {
        if let Some(draft) = self
            .inner
            .facade
            .volatile_get_json::<DraftProfile>(&keys::draft(id.as_str()))?
        {
            return Ok(draft);
        }
        Ok(DraftProfile::from_profile(&self.get_guide(id)?))
    }

    pub fn discard_draft(&self, id: &GuideId) -> Result<bool, DirectoryError> {
        self.inner.facade.volatile_delete(&keys::draft(id.as_str()))
    }

    // ------------------------------------------------------------------
    // Selections
    // ------------------------------------------------------------------

    pub fn toggle_bookmark(&self, id: &GuideId) -> Result<SelectionChange, DirectoryError> {
        let change = self.selections().toggle_bookmark(id)?;
        self.announce_selection(Some(id));
        Ok(change)
    }

    pub fn toggle_compare(&self, id: &GuideId) -> Result<SelectionChange, DirectoryError> {
        let change = self.selections().toggle_compare(id)?;
        self.announce_selection(Some(id));
        Ok(change)
    }

    pub fn remove_bookmark(&self, id: &GuideId) -> Result<bool, DirectoryError> {
        let removed = self.selections().remove_bookmark(id)?;
        if removed {
            self.announce_selection(Some(id));
        }
        Ok(removed)
    }

    pub fn remove_compare(&self, id: &GuideId) -> Result<bool, DirectoryError> {
        let removed = self.selections().remove_compare(id)?;
        if removed {
            self.announce_selection(Some(id));
        }
        Ok(removed)
    }

    pub fn clear_bookmarks(&self) -> Result<usize, DirectoryError> {
        let cleared = self.selections().clear_bookmarks()?;
        if cleared > 0 {
            self.announce_selection(None);
        }
        Ok(cleared)
    }

    pub fn clear_compared(&self) -> Result<usize, DirectoryError> {
        let cleared = self.selections().clear_compared()?;
        if cleared > 0 {
            self.announce_selection(None);
        }
        Ok(cleared)
    }

    pub fn bookmarks(&self) -> Result<Vec<GuideId>, DirectoryError> {
        self.selections().bookmarks()
    }

    pub fn compared(&self) -> Result<Vec<GuideId>, DirectoryError> {
        self.selections().compared()
    }

    pub fn get_selection_counts(&self) -> Result<SelectionCounts, DirectoryError> {
        self.selections().counts()
    }

    pub fn sponsors(&self) -> Sponsors<'_, S> {
        Sponsors::new(&self.inner.facade, self.inner.config.history_limit)
    }

    // ------------------------------------------------------------------
    // Notifications and reconciliation
    // ------------------------------------------------------------------

    /// Call `handler` for every notice received from a sibling context.
    ///
    /// Handlers run on background threads after [`GuideDirectory::sync`]
    /// drains the channel. Returns the id for [`GuideDirectory::unsubscribe`].
    pub fn subscribe<F>(&self, handler: F) -> String
    where
        F: Fn(GuideNotice) + Send + Sync + 'static,
    {
        self.broadcaster().subscribe(GUIDE_UPDATES, handler)
    }

    pub fn unsubscribe(&self, listener_id: &str) -> bool {
        self.broadcaster().unsubscribe(listener_id)
    }

    pub fn is_broadcasting(&self) -> bool {
        self.broadcaster().is_available()
    }

    /// Re-pull the canonical collection and diff it against the rendered one.
    ///
    /// A closed context skips the tick and reports nothing.
    pub fn tick(&self) -> Result<ReconcileReport, DirectoryError> {
        if self.is_closed() {
            return Ok(ReconcileReport::default());
        }
        let canonical = self.canonical()?;
        Ok(self.reconciler().tick(canonical))
    }

    /// Drain sibling notices, then tick.
    ///
    /// The tick runs whether or not anything arrived; a lost notice is made
    /// up for by the next timer-driven sync.
    pub fn sync(&self) -> Result<SyncOutcome, DirectoryError> {
        if self.is_closed() {
            return Ok(SyncOutcome::default());
        }
        let notices = self.broadcaster().receive().len();
        let report = self.tick()?;
        Ok(SyncOutcome { notices, report })
    }

    /// Tear this context down. Pending and future ticks are skipped.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            tracing::info!(context = %self.context_id(), "guide directory closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn selections(&self) -> Selections<'_, S> {
        Selections::new(&self.inner.facade)
    }

    fn reconciler(&self) -> MutexGuard<'_, Reconciler> {
        self.inner
            .reconciler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn broadcaster(&self) -> MutexGuard<'_, Broadcaster> {
        self.inner
            .broadcaster
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn announce(&self, notice: GuideNotice) {
        if self.is_closed() {
            return;
        }
        self.broadcaster().publish(GUIDE_UPDATES, &notice);
    }

    fn announce_selection(&self, id: Option<&GuideId>) {
        let notice = GuideNotice::new(
            NoticeKind::SelectionChanged,
            id.map(|id| id.to_string()),
            self.inner.facade.now_ms(),
        );
        self.announce(notice);
    }

    fn current_profile(&self, id: &GuideId) -> Result<Option<GuideProfile>, DirectoryError> {
        self.inner
            .facade
            .latest(&[keys::guide(id.as_str()), keys::legacy_guide(id.as_str())])
    }

    /// Every guide with a readable record, in directory order followed by
    /// guides missing from the directory.
    ///
    /// Record existence decides membership; `guidesDirectory` only supplies
    /// the order.
    fn canonical(&self) -> Result<Vec<GuideProfile>, DirectoryError> {
        let facade = &self.inner.facade;
        let listed = facade
            .get_json::<Vec<DirectoryEntry>>(keys::DIRECTORY)?
            .unwrap_or_default();

        let stored: BTreeSet<String> = facade
            .durable_keys()?
            .iter()
            .filter_map(|key| KeyKind::classify(key).guide_id().map(str::to_string))
            .collect();

        let mut order: Vec<GuideId> = Vec::with_capacity(stored.len());
        let mut placed = BTreeSet::new();
        for entry in listed {
            if stored.contains(entry.id.as_str()) && placed.insert(entry.id.to_string()) {
                order.push(entry.id);
            }
        }
        for id in &stored {
            if placed.insert(id.clone()) {
                order.push(GuideId::from(id.as_str()));
            }
        }

        let mut collection = Vec::with_capacity(order.len());
        for id in order {
            if let Some(profile) = self.current_profile(&id)? {
                collection.push(profile);
            }
        }
        Ok(collection)
    }
}
