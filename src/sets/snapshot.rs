//! Set membership snapshots.
//!
//! Each set owns a [`SetSlot`] whose current [`SetContent`] sits behind an
//! `ArcSwapOption`: readers load it without locking and keep whatever
//! generation they loaded for as long as they hold the `Arc`. Exports build a
//! complete new `SetContent` and store it in one step. The slot map itself is
//! an `ArcSwap` updated copy-on-write, so lookups never block either.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::SetContent;

/// Why the most recent export of a set did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportFailure {
    pub message: String,
    pub failed_at: DateTime<Utc>,
    /// Consecutive failed attempts since the last success
    pub attempts: u32,
}

/// Summary of a set's snapshot for the management surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentState {
    pub generation: Option<u64>,
    pub size: usize,
    pub generated_at: Option<DateTime<Utc>>,
    pub stale: bool,
    pub last_failure: Option<ExportFailure>,
}

#[derive(Debug, Default)]
pub struct SetSlot {
    content: ArcSwapOption<SetContent>,
    /// Serializes exports (and the purge) of this one set.
    pub(crate) export_lock: tokio::sync::Mutex<()>,
    stale: AtomicBool,
    purged: AtomicBool,
    last_failure: std::sync::Mutex<Option<ExportFailure>>,
}

impl SetSlot {
    pub fn current(&self) -> Option<Arc<SetContent>> {
        self.content.load_full()
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    pub fn is_purged(&self) -> bool {
        self.purged.load(Ordering::SeqCst)
    }

    pub fn last_failure(&self) -> Option<ExportFailure> {
        self.failure_guard().clone()
    }

    pub(crate) fn clear_stale(&self) {
        self.stale.store(false, Ordering::SeqCst);
    }

    /// Installs a completed snapshot. Only called with `export_lock` held.
    pub(crate) fn publish(&self, content: SetContent) -> Arc<SetContent> {
        let content = Arc::new(content);
        self.content.store(Some(Arc::clone(&content)));
        *self.failure_guard() = None;
        content
    }

    pub(crate) fn record_failure(&self, message: String) -> ExportFailure {
        let mut guard = self.failure_guard();
        let attempts = guard.as_ref().map_or(0, |f| f.attempts) + 1;
        let failure = ExportFailure {
            message,
            failed_at: Utc::now(),
            attempts,
        };
        *guard = Some(failure.clone());
        failure
    }

    fn failure_guard(&self) -> std::sync::MutexGuard<'_, Option<ExportFailure>> {
        match self.last_failure.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn state(&self) -> ContentState {
        let content = self.current();
        ContentState {
            generation: content.as_ref().map(|c| c.generation),
            size: content.as_ref().map_or(0, |c| c.len()),
            generated_at: content.as_ref().map(|c| c.generated_at),
            stale: self.is_stale(),
            last_failure: self.last_failure(),
        }
    }
}

/// All set snapshots, keyed by set name.
#[derive(Debug)]
pub struct SnapshotStore {
    slots: ArcSwap<HashMap<String, Arc<SetSlot>>>,
    next_generation: AtomicU64,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self {
            slots: ArcSwap::from_pointee(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, set_name: &str) -> Option<Arc<SetSlot>> {
        self.slots.load().get(set_name).cloned()
    }

    pub(crate) fn slot_or_create(&self, set_name: &str) -> Arc<SetSlot> {
        if let Some(slot) = self.slot(set_name) {
            return slot;
        }
        let fresh = Arc::new(SetSlot::default());
        let mut installed = Arc::clone(&fresh);
        self.slots.rcu(|slots| {
            let mut slots = HashMap::clone(slots);
            installed = Arc::clone(
                slots
                    .entry(set_name.to_string())
                    .or_insert_with(|| Arc::clone(&fresh)),
            );
            slots
        });
        installed
    }

    /// Latest completed snapshot of a set, if it was ever exported.
    pub fn current(&self, set_name: &str) -> Option<Arc<SetContent>> {
        self.slot(set_name).and_then(|slot| slot.current())
    }

    pub fn generation(&self, set_name: &str) -> Option<u64> {
        self.current(set_name).map(|c| c.generation)
    }

    pub(crate) fn next_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::SeqCst)
    }

    /// Flags a set's snapshot as out of date with its definition. The snapshot
    /// keeps serving until the next export replaces it.
    pub fn mark_stale(&self, set_name: &str) {
        if let Some(slot) = self.slot(set_name) {
            slot.stale.store(true, Ordering::SeqCst);
        }
    }

    pub fn state(&self, set_name: &str) -> ContentState {
        match self.slot(set_name) {
            Some(slot) => slot.state(),
            None => ContentState {
                generation: None,
                size: 0,
                generated_at: None,
                stale: false,
                last_failure: None,
            },
        }
    }

    /// Names of every set whose current snapshot lists `identifier`, sorted.
    pub fn sets_containing(&self, identifier: &str) -> Vec<String> {
        let slots = self.slots.load();
        let mut names: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| slot.current().is_some_and(|c| c.contains(identifier)))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Sets whose most recent export failed.
    pub fn failed_sets(&self) -> Vec<String> {
        let slots = self.slots.load();
        let mut names: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| slot.last_failure().is_some())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Drops a set's snapshot, waiting out any in-flight export of it first.
    pub async fn purge(&self, set_name: &str) {
        let Some(slot) = self.slot(set_name) else {
            return;
        };
        let _guard = slot.export_lock.lock().await;
        slot.purged.store(true, Ordering::SeqCst);
        slot.content.store(None);
        self.remove_slot(set_name, &slot);
    }

    /// Removes `slot` from the map if it is still the one registered under
    /// `set_name`.
    pub(crate) fn remove_slot(&self, set_name: &str, slot: &Arc<SetSlot>) {
        self.slots.rcu(|slots| {
            let mut slots = HashMap::clone(slots);
            if slots.get(set_name).is_some_and(|s| Arc::ptr_eq(s, slot)) {
                slots.remove(set_name);
            }
            slots
        });
    }
}
