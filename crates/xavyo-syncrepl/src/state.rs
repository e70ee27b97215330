//! Per-connection shadow of the directory.
//!
//! Holds the last known state of every live entry, the presence set of the
//! current refresh cycle, the phase flag and the session cookie. A new
//! `SyncState` is created for every connection attempt and dropped with it.

use std::collections::{BTreeMap, BTreeSet};

use crate::entry::{Entry, EntryId};

/// Phase of the content synchronization session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    /// Initial bulk load; entry changes are applied silently.
    #[default]
    Refreshing,
    /// Live phase; every change is published as it arrives.
    Persisting,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncPhase::Refreshing => write!(f, "refreshing"),
            SyncPhase::Persisting => write!(f, "persisting"),
        }
    }
}

/// Shadow store for one synchronization session.
#[derive(Debug, Default)]
pub struct SyncState {
    entries: BTreeMap<EntryId, Entry>,
    present: BTreeSet<EntryId>,
    phase: SyncPhase,
    cookie: Option<Vec<u8>>,
}

impl SyncState {
    /// Create an empty state in the refreshing phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current phase.
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Check if changes are currently published.
    pub fn is_persisting(&self) -> bool {
        self.phase == SyncPhase::Persisting
    }

    /// Switch to the persisting phase. Returns false if already persisting.
    pub fn finish_refresh(&mut self) -> bool {
        let was_refreshing = self.phase == SyncPhase::Refreshing;
        self.phase = SyncPhase::Persisting;
        was_refreshing
    }

    /// Store an entry, returning the previous state if it was known.
    pub fn upsert(&mut self, id: EntryId, entry: Entry) -> Option<Entry> {
        self.entries.insert(id, entry)
    }

    /// Remove an entry, returning its last known state.
    pub fn remove(&mut self, id: &EntryId) -> Option<Entry> {
        self.entries.remove(id)
    }

    /// Get the last known state of an entry.
    pub fn get(&self, id: &EntryId) -> Option<&Entry> {
        self.entries.get(id)
    }

    /// Check if an entry is live.
    pub fn contains(&self, id: &EntryId) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no entry is live.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mark an entry as present in the current refresh cycle.
    pub fn mark_present(&mut self, id: EntryId) {
        self.present.insert(id);
    }

    /// Check if an entry was marked present in the current cycle.
    pub fn is_present(&self, id: &EntryId) -> bool {
        self.present.contains(id)
    }

    /// Live entries that were not marked present in the current cycle.
    pub fn absent_ids(&self) -> Vec<EntryId> {
        self.entries
            .keys()
            .filter(|id| !self.present.contains(*id))
            .cloned()
            .collect()
    }

    /// Forget the presence set at the end of a presence phase.
    pub fn clear_present(&mut self) {
        self.present.clear();
    }

    /// Get the latest cookie received in this session.
    pub fn cookie(&self) -> Option<&[u8]> {
        self.cookie.as_deref()
    }

    /// Remember the latest cookie received in this session.
    pub fn set_cookie(&mut self, cookie: Vec<u8>) {
        self.cookie = Some(cookie);
    }
}
