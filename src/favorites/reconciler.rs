//! The favorites reconciler.
//!
//! Owns the authoritative in-memory ordered set of favorites. Store
//! notifications and user moves both funnel through here, and every change to
//! the set is mirrored to the attached view as an ordered [`Diff`] so that a
//! view replaying the diffs in receipt order ends up with the same set.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Weak};

use tracing::{debug, error, info, warn};

use super::order::{self, is_strictly_increasing};
use super::store::{FavoritesStore, Subscription};
use super::types::{ChangeNotification, Diff, FavoriteEntry};
use super::view::{dispatch, EditingObserver, FavoritesView};
use crate::error::{ReconcileError, ReconcileResult};
use crate::storage::{DatabaseManager, FavoritesSettings};

pub struct FavoritesReconciler<S: FavoritesStore> {
    store: S,
    /// Visible entries, strictly increasing by order
    entries: Vec<FavoriteEntry>,
    /// Entries withheld because their URL is unusable, by id
    quarantined: HashMap<String, FavoriteEntry>,
    view: Option<Weak<dyn FavoritesView>>,
    observers: Vec<Weak<dyn EditingObserver>>,
    editing: bool,
    subscription: Option<Subscription>,
    spacing: i64,
}

impl<S: FavoritesStore> FavoritesReconciler<S> {
    /// Create an empty reconciler with default settings
    pub fn new(store: S) -> Self {
        Self::with_settings(store, &FavoritesSettings::default())
    }

    pub fn with_settings(store: S, settings: &FavoritesSettings) -> Self {
        Self {
            store,
            entries: Vec::new(),
            quarantined: HashMap::new(),
            view: None,
            observers: Vec::new(),
            editing: false,
            subscription: None,
            spacing: settings.effective_spacing(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Attach the view that receives diffs. Only a weak reference is kept.
    pub fn attach_view<V: FavoritesView + 'static>(&mut self, view: &Arc<V>) {
        let view: Arc<dyn FavoritesView> = view.clone();
        self.view = Some(Arc::downgrade(&view));
    }

    pub fn detach_view(&mut self) {
        self.view = None;
    }

    /// Register an edit-mode observer. Only a weak reference is kept.
    pub fn add_editing_observer<O: EditingObserver + 'static>(&mut self, observer: &Arc<O>) {
        let observer: Arc<dyn EditingObserver> = observer.clone();
        self.observers.push(Arc::downgrade(&observer));
    }

    /// Subscribe to the store and load the full set.
    ///
    /// A failed fetch is logged and leaves the set empty.
    pub fn initialize(&mut self) {
        // Subscribe first so nothing that lands between the fetch and the
        // subscription is lost; replays of already-fetched changes resolve by id.
        self.subscription = Some(self.store.subscribe());

        match self.store.fetch_all() {
            Ok(fetched) => self.load(fetched),
            Err(source) => {
                let err = ReconcileError::FetchFailed(source);
                error!(error = %err, "favorites fetch failed, presenting empty set");
                self.entries.clear();
            }
        }

        info!(
            count = self.entries.len(),
            hidden = self.quarantined.len(),
            "favorites reconciler initialized"
        );
        self.emit(Diff::Reloaded {
            entries: self.entries.clone(),
        });
    }

    /// Re-fetch everything from the store, keeping the current set on failure
    pub fn resync(&mut self) -> ReconcileResult<()> {
        match self.store.fetch_all() {
            Ok(fetched) => {
                self.load(fetched);
                self.emit(Diff::Reloaded {
                    entries: self.entries.clone(),
                });
                Ok(())
            }
            Err(source) => {
                let err = ReconcileError::FetchFailed(source);
                error!(error = %err, "favorites re-fetch failed, keeping current set");
                Err(err)
            }
        }
    }

    /// Number of renderable favorites
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[FavoriteEntry] {
        &self.entries
    }

    pub fn entry_at(&self, position: usize) -> ReconcileResult<&FavoriteEntry> {
        self.entries
            .get(position)
            .ok_or(ReconcileError::NotFound { position })
    }

    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    /// Hand the store subscription to an external event loop
    pub fn take_subscription(&mut self) -> Option<Subscription> {
        self.subscription.take()
    }

    /// Apply every queued store notification; returns how many were applied
    pub fn process_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Some(notification) = self.subscription.as_mut().and_then(Subscription::try_next) {
            self.on_change_notification(notification);
            applied += 1;
        }
        applied
    }

    /// Move the entry at `from` so it ends up at `to`, persisting new order keys.
    ///
    /// Nothing changes locally unless the store accepted the new keys.
    pub fn move_entry(&mut self, from: usize, to: usize) -> ReconcileResult<()> {
        let len = self.entries.len();
        if from >= len {
            return Err(ReconcileError::NotFound { position: from });
        }
        if to >= len {
            return Err(ReconcileError::NotFound { position: to });
        }
        if from == to {
            return Ok(());
        }

        let reserved = self.reserved_orders();
        let (arranged, updates) = order::plan_move(&self.entries, from, to, self.spacing, &reserved);

        if !updates.is_empty() {
            if let Err(source) = self.store.persist_order(&updates) {
                warn!(from, to, error = %source, "favorite move rejected, keeping previous order");
                if let Some(view) = self.live_view() {
                    view.on_move_rejected(from, to);
                }
                return Err(ReconcileError::MoveRejected { from, to, source });
            }
        }

        self.entries = arranged;
        debug!(from, to, changed = updates.len(), "favorite moved");
        self.emit(Diff::Moved { from, to });

        let changed: HashSet<&str> = updates.iter().map(|u| u.id.as_str()).collect();
        let refreshed: Vec<Diff> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| changed.contains(e.id.as_str()))
            .map(|(position, entry)| Diff::Updated {
                position,
                entry: entry.clone(),
            })
            .collect();
        for diff in refreshed {
            self.emit(diff);
        }

        Ok(())
    }

    /// Apply one store-side change
    pub fn on_change_notification(&mut self, notification: ChangeNotification) {
        match notification {
            ChangeNotification::Insert { entry, position } => self.apply_insert(entry, Some(position)),
            ChangeNotification::Delete { id, position } => self.apply_delete(&id, position),
            ChangeNotification::Update {
                entry,
                old_position,
                new_position,
            } => {
                debug!(id = %entry.id, old_position, ?new_position, "favorite updated in store");
                self.apply_update(entry);
            }
            ChangeNotification::Move { id, from, to } => {
                debug!(%id, from, to, "ignoring store-initiated move");
            }
        }
    }

    /// Toggle edit mode, broadcasting only real changes
    pub fn set_editing(&mut self, editing: bool) {
        if self.editing == editing {
            return;
        }
        self.editing = editing;

        self.observers.retain(|o| o.strong_count() > 0);
        for observer in self.observers.iter().filter_map(Weak::upgrade) {
            observer.on_editing_changed(editing);
        }
    }

    fn apply_insert(&mut self, entry: FavoriteEntry, hint: Option<usize>) {
        if self.position_of(&entry.id).is_some() {
            debug!(id = %entry.id, "insert for known favorite, treating as update");
            self.apply_update(entry);
            return;
        }

        let Some(entry) = self.admit(entry) else {
            return;
        };

        match self.entries.binary_search_by_key(&entry.order, |e| e.order) {
            Ok(_) => {
                warn!(id = %entry.id, order = entry.order, "order key collision on insert, re-fetching");
                if let Err(err) = self.resync() {
                    warn!(id = %entry.id, error = %err, "favorite insert dropped after failed re-fetch");
                }
            }
            Err(position) => {
                if hint.is_some_and(|h| h != position) {
                    debug!(id = %entry.id, ?hint, position, "insert position hint disagrees with order");
                }
                self.entries.insert(position, entry.clone());
                self.emit(Diff::Inserted { position, entry });
            }
        }
    }

    fn apply_delete(&mut self, id: &str, hint: usize) {
        match self.position_of(id) {
            Some(position) => {
                if position != hint {
                    debug!(%id, hint, position, "delete position hint is stale, resolved by id");
                }
                self.entries.remove(position);
                self.emit(Diff::Deleted { position });
            }
            None => {
                if self.quarantined.remove(id).is_none() {
                    debug!(%id, "delete for unknown favorite ignored");
                }
            }
        }
    }

    fn apply_update(&mut self, entry: FavoriteEntry) {
        let Some(old) = self.position_of(&entry.id) else {
            // Hidden or never seen: becomes visible only if it is valid now
            self.apply_insert(entry, None);
            return;
        };

        let Some(entry) = self.admit(entry) else {
            self.entries.remove(old);
            self.emit(Diff::Deleted { position: old });
            return;
        };

        let previous = self.entries.remove(old);
        match self.entries.binary_search_by_key(&entry.order, |e| e.order) {
            Ok(_) => {
                self.entries.insert(old, previous);
                warn!(id = %entry.id, order = entry.order, "order key collision on update, re-fetching");
                if let Err(err) = self.resync() {
                    warn!(id = %entry.id, error = %err, "favorite update dropped after failed re-fetch");
                }
            }
            Err(new) => {
                self.entries.insert(new, entry.clone());
                if new != old {
                    self.emit(Diff::Moved { from: old, to: new });
                }
                self.emit(Diff::Updated { position: new, entry });
            }
        }
    }

    /// Validate an incoming entry, quarantining it when its URL is unusable
    fn admit(&mut self, entry: FavoriteEntry) -> Option<FavoriteEntry> {
        match entry.parsed_url() {
            Ok(_) => {
                self.quarantined.remove(&entry.id);
                Some(entry)
            }
            Err(reason) => {
                let seen = self
                    .quarantined
                    .get(&entry.id)
                    .is_some_and(|q| q.url == entry.url);
                self.quarantine(entry, reason, !seen);
                None
            }
        }
    }

    fn quarantine(&mut self, entry: FavoriteEntry, reason: String, log: bool) {
        if log {
            let err = ReconcileError::InvalidEntry {
                id: entry.id.clone(),
                reason,
            };
            warn!(error = %err, "invalid favorite entry excluded");
        }
        self.quarantined.insert(entry.id.clone(), entry);
    }

    fn load(&mut self, mut fetched: Vec<FavoriteEntry>) {
        fetched.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));

        let previous = std::mem::take(&mut self.quarantined);
        self.entries.clear();
        for entry in fetched {
            match entry.parsed_url() {
                Ok(_) => self.entries.push(entry),
                Err(reason) => {
                    let seen = previous.get(&entry.id).is_some_and(|q| q.url == entry.url);
                    self.quarantine(entry, reason, !seen);
                }
            }
        }

        if !is_strictly_increasing(&self.entries) {
            self.repair_duplicate_orders();
        }
    }

    /// Give the visible set fresh unique keys and write them back to the store
    fn repair_duplicate_orders(&mut self) {
        let reserved = self.reserved_orders();
        let before = self.entries.clone();
        order::renumber(&mut self.entries, self.spacing, &reserved);
        let updates = order::changed_orders(&before, &self.entries);

        warn!(changed = updates.len(), "fetched favorites contain duplicate order keys, renumbering");
        if let Err(err) = self.store.persist_order(&updates) {
            warn!(error = %err, "renumbered favorite order not persisted");
        }
    }

    fn reserved_orders(&self) -> BTreeSet<i64> {
        self.quarantined.values().map(|e| e.order).collect()
    }

    fn live_view(&self) -> Option<Arc<dyn FavoritesView>> {
        self.view.as_ref().and_then(Weak::upgrade)
    }

    fn emit(&self, diff: Diff) {
        if let Some(view) = self.live_view() {
            dispatch(view.as_ref(), &diff);
        }
    }
}

impl FavoritesReconciler<Arc<DatabaseManager>> {
    /// Build a reconciler over the SQLite store using its persisted settings
    pub fn for_database(db: Arc<DatabaseManager>) -> Self {
        let settings = db.get_favorites_settings().unwrap_or_else(|err| {
            warn!(error = %err, "could not read favorites settings, using defaults");
            FavoritesSettings::default()
        });
        Self::with_settings(db, &settings)
    }
}
