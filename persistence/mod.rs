/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Entity persistence behind a narrow store interface.
//!
//! Architecture:
//! - `insert`/`delete` stage changes; nothing is durable until `save`
//! - fetches see committed records overlaid with staged ones
//! - `RedbStore` writes rkyv records, zstd-compressed, one redb table per entity
//! - `MemoryStore` keeps everything in process and can be told to fail saves

pub mod redb_store;
pub mod types;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::model::{HistoryEntry, HistoryId, Profile, ProfileId, Space, SpaceId, Tab, TabId};

pub use redb_store::RedbStore;

/// A persistable entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Profile(Profile),
    Space(Space),
    Tab(Tab),
    History(HistoryEntry),
}

impl Record {
    pub fn key(&self) -> RecordKey {
        match self {
            Record::Profile(profile) => RecordKey::Profile(profile.id),
            Record::Space(space) => RecordKey::Space(space.id),
            Record::Tab(tab) => RecordKey::Tab(tab.id),
            Record::History(entry) => RecordKey::History(entry.id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKey {
    Profile(ProfileId),
    Space(SpaceId),
    Tab(TabId),
    History(HistoryId),
}

pub trait PersistentStore {
    fn fetch_profiles(&self, predicate: &dyn Fn(&Profile) -> bool)
    -> Result<Vec<Profile>, StoreError>;
    fn fetch_spaces(&self, predicate: &dyn Fn(&Space) -> bool) -> Result<Vec<Space>, StoreError>;
    fn fetch_tabs(&self, predicate: &dyn Fn(&Tab) -> bool) -> Result<Vec<Tab>, StoreError>;
    fn fetch_history(
        &self,
        predicate: &dyn Fn(&HistoryEntry) -> bool,
    ) -> Result<Vec<HistoryEntry>, StoreError>;

    /// Stage an upsert.
    fn insert(&mut self, record: Record);
    /// Stage a removal. Unknown keys are ignored at save time.
    fn delete(&mut self, key: RecordKey);
    /// Commit staged changes. On failure the staged changes are kept.
    fn save(&mut self) -> Result<(), StoreError>;
}

/// Staged changes keyed by record; `None` marks a delete. Last write wins.
#[derive(Debug, Default, Clone)]
pub(crate) struct StagedChanges {
    changes: BTreeMap<RecordKey, Option<Record>>,
}

impl StagedChanges {
    pub(crate) fn insert(&mut self, record: Record) {
        self.changes.insert(record.key(), Some(record));
    }

    pub(crate) fn delete(&mut self, key: RecordKey) {
        self.changes.insert(key, None);
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&RecordKey, &Option<Record>)> {
        self.changes.iter()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.changes.clear();
    }

    /// Apply staged changes of one entity kind on top of `committed`.
    pub(crate) fn overlay<T: Entity>(
        &self,
        committed: Vec<T>,
        predicate: &dyn Fn(&T) -> bool,
    ) -> Vec<T> {
        let mut rows: BTreeMap<RecordKey, T> =
            committed.into_iter().map(|row| (row.record_key(), row)).collect();
        for (key, change) in &self.changes {
            if !T::owns(key) {
                continue;
            }
            match change.as_ref().and_then(T::from_record) {
                Some(row) => {
                    rows.insert(*key, row.clone());
                },
                None => {
                    rows.remove(key);
                },
            }
        }
        rows.into_values().filter(|row| predicate(row)).collect()
    }
}

pub(crate) trait Entity: Clone {
    fn record_key(&self) -> RecordKey;
    fn owns(key: &RecordKey) -> bool;
    fn from_record(record: &Record) -> Option<&Self>;
}

impl Entity for Profile {
    fn record_key(&self) -> RecordKey {
        RecordKey::Profile(self.id)
    }
    fn owns(key: &RecordKey) -> bool {
        matches!(key, RecordKey::Profile(_))
    }
    fn from_record(record: &Record) -> Option<&Self> {
        match record {
            Record::Profile(profile) => Some(profile),
            _ => None,
        }
    }
}

impl Entity for Space {
    fn record_key(&self) -> RecordKey {
        RecordKey::Space(self.id)
    }
    fn owns(key: &RecordKey) -> bool {
        matches!(key, RecordKey::Space(_))
    }
    fn from_record(record: &Record) -> Option<&Self> {
        match record {
            Record::Space(space) => Some(space),
            _ => None,
        }
    }
}

impl Entity for Tab {
    fn record_key(&self) -> RecordKey {
        RecordKey::Tab(self.id)
    }
    fn owns(key: &RecordKey) -> bool {
        matches!(key, RecordKey::Tab(_))
    }
    fn from_record(record: &Record) -> Option<&Self> {
        match record {
            Record::Tab(tab) => Some(tab),
            _ => None,
        }
    }
}

impl Entity for HistoryEntry {
    fn record_key(&self) -> RecordKey {
        RecordKey::History(self.id)
    }
    fn owns(key: &RecordKey) -> bool {
        matches!(key, RecordKey::History(_))
    }
    fn from_record(record: &Record) -> Option<&Self> {
        match record {
            Record::History(entry) => Some(entry),
            _ => None,
        }
    }
}

#[derive(Default)]
struct MemoryStoreInner {
    committed: BTreeMap<RecordKey, Record>,
    staged: StagedChanges,
    failing_saves: usize,
    save_count: usize,
}

impl MemoryStoreInner {
    fn committed<T: Entity>(&self) -> Vec<T> {
        self.committed
            .values()
            .filter_map(T::from_record)
            .cloned()
            .collect()
    }
}

/// In-process store. Clones share state, so a handle kept by a test observes
/// what the shell committed.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` saves fail with `StoreError::Unavailable`.
    pub fn fail_next_saves(&self, count: usize) {
        self.inner.lock().failing_saves = count;
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.inner.lock().save_count
    }

    pub fn has_staged_changes(&self) -> bool {
        !self.inner.lock().staged.is_empty()
    }

    /// Committed record for `key`, ignoring staged changes.
    pub fn committed(&self, key: RecordKey) -> Option<Record> {
        self.inner.lock().committed.get(&key).cloned()
    }
}

impl PersistentStore for MemoryStore {
    fn fetch_profiles(
        &self,
        predicate: &dyn Fn(&Profile) -> bool,
    ) -> Result<Vec<Profile>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.staged.overlay(inner.committed(), predicate))
    }

    fn fetch_spaces(&self, predicate: &dyn Fn(&Space) -> bool) -> Result<Vec<Space>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.staged.overlay(inner.committed(), predicate))
    }

    fn fetch_tabs(&self, predicate: &dyn Fn(&Tab) -> bool) -> Result<Vec<Tab>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.staged.overlay(inner.committed(), predicate))
    }

    fn fetch_history(
        &self,
        predicate: &dyn Fn(&HistoryEntry) -> bool,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.staged.overlay(inner.committed(), predicate))
    }

    fn insert(&mut self, record: Record) {
        self.inner.lock().staged.insert(record);
    }

    fn delete(&mut self, key: RecordKey) {
        self.inner.lock().staged.delete(key);
    }

    fn save(&mut self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.failing_saves > 0 {
            inner.failing_saves -= 1;
            return Err(StoreError::Unavailable(
                "memory store configured to fail".to_string(),
            ));
        }
        let staged = std::mem::take(&mut inner.staged);
        for (key, change) in staged.iter() {
            match change {
                Some(record) => {
                    inner.committed.insert(*key, record.clone());
                },
                None => {
                    inner.committed.remove(key);
                },
            }
        }
        inner.save_count += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    Io(String),
    Redb(String),
    Codec(String),
    Compression(String),
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "IO error: {e}"),
            StoreError::Redb(e) => write!(f, "Redb error: {e}"),
            StoreError::Codec(e) => write!(f, "Codec error: {e}"),
            StoreError::Compression(e) => write!(f, "Compression error: {e}"),
            StoreError::Unavailable(e) => write!(f, "Store unavailable: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}
