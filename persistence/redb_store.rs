/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::path::{Path, PathBuf};

use log::{debug, warn};
use redb::{ReadableDatabase, ReadableTable};

use super::types::{PersistedHistoryEntry, PersistedProfile, PersistedSpace, PersistedTab};
use super::{PersistentStore, Record, RecordKey, StagedChanges, StoreError};
use crate::model::{HistoryEntry, Profile, Space, Tab};

const PROFILE_TABLE: redb::TableDefinition<&str, &[u8]> = redb::TableDefinition::new("profiles");
const SPACE_TABLE: redb::TableDefinition<&str, &[u8]> = redb::TableDefinition::new("spaces");
const TAB_TABLE: redb::TableDefinition<&str, &[u8]> = redb::TableDefinition::new("tabs");
const HISTORY_TABLE: redb::TableDefinition<&str, &[u8]> = redb::TableDefinition::new("history");
const ZSTD_LEVEL: i32 = 3;

/// Durable store: one redb table per entity kind, values are zstd-compressed
/// rkyv bytes keyed by the entity id.
pub struct RedbStore {
    db: redb::Database,
    path: PathBuf,
    staged: StagedChanges,
}

impl RedbStore {
    /// Open or create the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("Failed to create dir: {e}")))?;
        }
        let db = redb::Database::create(&path).map_err(|e| StoreError::Redb(format!("{e}")))?;

        // Create every table up front so reads never see a missing table.
        let write_txn = db
            .begin_write()
            .map_err(|e| StoreError::Redb(format!("{e}")))?;
        for table in [PROFILE_TABLE, SPACE_TABLE, TAB_TABLE, HISTORY_TABLE] {
            write_txn
                .open_table(table)
                .map_err(|e| StoreError::Redb(format!("{e}")))?;
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::Redb(format!("{e}")))?;

        debug!("Opened entity store at {}", path.display());
        Ok(Self {
            db,
            path,
            staged: StagedChanges::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decompressed rows of one table, copied into aligned buffers.
    fn read_rows(
        &self,
        table_def: redb::TableDefinition<&str, &[u8]>,
    ) -> Result<Vec<(String, rkyv::util::AlignedVec<16>)>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Redb(format!("{e}")))?;
        let table = read_txn
            .open_table(table_def)
            .map_err(|e| StoreError::Redb(format!("{e}")))?;
        let iter = table.iter().map_err(|e| StoreError::Redb(format!("{e}")))?;

        let mut rows = Vec::new();
        for entry in iter {
            let (key, value) = entry.map_err(|e| StoreError::Redb(format!("{e}")))?;
            match decompress(value.value()) {
                Ok(aligned) => rows.push((key.value().to_string(), aligned)),
                Err(e) => warn!("Skipping unreadable record {}: {e}", key.value()),
            }
        }
        Ok(rows)
    }

    fn write_staged(&self) -> Result<(), StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Redb(format!("{e}")))?;
        (|| -> Result<(), StoreError> {
            let mut profiles = write_txn
                .open_table(PROFILE_TABLE)
                .map_err(|e| StoreError::Redb(format!("{e}")))?;
            let mut spaces = write_txn
                .open_table(SPACE_TABLE)
                .map_err(|e| StoreError::Redb(format!("{e}")))?;
            let mut tabs = write_txn
                .open_table(TAB_TABLE)
                .map_err(|e| StoreError::Redb(format!("{e}")))?;
            let mut history = write_txn
                .open_table(HISTORY_TABLE)
                .map_err(|e| StoreError::Redb(format!("{e}")))?;

            for (key, change) in self.staged.iter() {
                let (table, id) = match key {
                    RecordKey::Profile(id) => (&mut profiles, id.to_string()),
                    RecordKey::Space(id) => (&mut spaces, id.to_string()),
                    RecordKey::Tab(id) => (&mut tabs, id.to_string()),
                    RecordKey::History(id) => (&mut history, id.to_string()),
                };
                match change {
                    Some(record) => {
                        let bytes = encode_record(record)?;
                        table
                            .insert(id.as_str(), bytes.as_slice())
                            .map_err(|e| StoreError::Redb(format!("{e}")))?;
                    },
                    None => {
                        table
                            .remove(id.as_str())
                            .map_err(|e| StoreError::Redb(format!("{e}")))?;
                    },
                }
            }
            Ok(())
        })()?;
        write_txn
            .commit()
            .map_err(|e| StoreError::Redb(format!("{e}")))
    }
}

fn encode_record(record: &Record) -> Result<Vec<u8>, StoreError> {
    let plaintext = match record {
        Record::Profile(profile) => {
            rkyv::to_bytes::<rkyv::rancor::Error>(&PersistedProfile::from(profile))
        },
        Record::Space(space) => rkyv::to_bytes::<rkyv::rancor::Error>(&PersistedSpace::from(space)),
        Record::Tab(tab) => rkyv::to_bytes::<rkyv::rancor::Error>(&PersistedTab::from(tab)),
        Record::History(entry) => {
            rkyv::to_bytes::<rkyv::rancor::Error>(&PersistedHistoryEntry::from(entry))
        },
    }
    .map_err(|e| StoreError::Codec(format!("rkyv encode failed: {e}")))?;
    zstd::stream::encode_all(std::io::Cursor::new(plaintext.as_ref()), ZSTD_LEVEL)
        .map_err(|e| StoreError::Compression(format!("zstd encode failed: {e}")))
}

fn decompress(stored: &[u8]) -> Result<rkyv::util::AlignedVec<16>, StoreError> {
    let bytes = zstd::stream::decode_all(std::io::Cursor::new(stored))
        .map_err(|e| StoreError::Compression(format!("zstd decode failed: {e}")))?;
    // Copy to aligned buffer; redb bytes may not satisfy rkyv alignment.
    let mut aligned = rkyv::util::AlignedVec::<16>::new();
    aligned.extend_from_slice(&bytes);
    Ok(aligned)
}

macro_rules! decode_rows {
    ($rows:expr, $persisted:ty, $convert:path) => {
        $rows
            .into_iter()
            .filter_map(
                |(key, bytes)| match rkyv::from_bytes::<$persisted, rkyv::rancor::Error>(&bytes) {
                    Ok(persisted) => $convert(persisted),
                    Err(e) => {
                        warn!("Skipping undecodable record {key}: {e}");
                        None
                    },
                },
            )
            .collect::<Vec<_>>()
    };
}

impl PersistentStore for RedbStore {
    fn fetch_profiles(
        &self,
        predicate: &dyn Fn(&Profile) -> bool,
    ) -> Result<Vec<Profile>, StoreError> {
        let committed = decode_rows!(
            self.read_rows(PROFILE_TABLE)?,
            PersistedProfile,
            PersistedProfile::into_profile
        );
        Ok(self.staged.overlay(committed, predicate))
    }

    fn fetch_spaces(&self, predicate: &dyn Fn(&Space) -> bool) -> Result<Vec<Space>, StoreError> {
        let committed = decode_rows!(
            self.read_rows(SPACE_TABLE)?,
            PersistedSpace,
            PersistedSpace::into_space
        );
        Ok(self.staged.overlay(committed, predicate))
    }

    fn fetch_tabs(&self, predicate: &dyn Fn(&Tab) -> bool) -> Result<Vec<Tab>, StoreError> {
        let committed = decode_rows!(
            self.read_rows(TAB_TABLE)?,
            PersistedTab,
            PersistedTab::into_tab
        );
        Ok(self.staged.overlay(committed, predicate))
    }

    fn fetch_history(
        &self,
        predicate: &dyn Fn(&HistoryEntry) -> bool,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        let committed = decode_rows!(
            self.read_rows(HISTORY_TABLE)?,
            PersistedHistoryEntry,
            PersistedHistoryEntry::into_entry
        );
        Ok(self.staged.overlay(committed, predicate))
    }

    fn insert(&mut self, record: Record) {
        self.staged.insert(record);
    }

    fn delete(&mut self, key: RecordKey) {
        self.staged.delete(key);
    }

    fn save(&mut self) -> Result<(), StoreError> {
        if self.staged.is_empty() {
            return Ok(());
        }
        self.write_staged()?;
        self.staged.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProfileId, TabId};
    use tempfile::TempDir;
    use url::Url;

    fn create_test_store() -> (RedbStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RedbStore::open(dir.path().join("store.redb")).unwrap();
        (store, dir)
    }

    #[test]
    fn test_empty_startup() {
        let (store, _dir) = create_test_store();
        assert!(store.fetch_profiles(&|_| true).unwrap().is_empty());
        assert!(store.fetch_tabs(&|_| true).unwrap().is_empty());
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.redb");
        let profile = Profile::new("Default");
        let mut space = Space::new("Space 1", "#3357FF", profile.id);
        let tab = Tab::new(Url::parse("https://example.com/a").unwrap(), "A");
        space.today.push(tab.id);

        {
            let mut store = RedbStore::open(&path).unwrap();
            store.insert(Record::Profile(profile.clone()));
            store.insert(Record::Space(space.clone()));
            store.insert(Record::Tab(tab.clone()));
            store.save().unwrap();
        }

        let store = RedbStore::open(&path).unwrap();
        let profiles = store.fetch_profiles(&|_| true).unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].id, profile.id);
        assert_eq!(profiles[0].name, "Default");

        let spaces = store.fetch_spaces(&|_| true).unwrap();
        assert_eq!(spaces[0].today, vec![tab.id]);
        assert_eq!(spaces[0].profile, profile.id);

        let tabs = store.fetch_tabs(&|_| true).unwrap();
        assert_eq!(tabs[0].address, tab.address);
    }

    #[test]
    fn test_unsaved_changes_are_not_durable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.redb");
        {
            let mut store = RedbStore::open(&path).unwrap();
            store.insert(Record::Tab(Tab::new(
                Url::parse("https://example.com").unwrap(),
                "lost",
            )));
            assert_eq!(store.fetch_tabs(&|_| true).unwrap().len(), 1);
        }
        let store = RedbStore::open(&path).unwrap();
        assert!(store.fetch_tabs(&|_| true).unwrap().is_empty());
    }

    #[test]
    fn test_delete_removes_committed_row() {
        let (mut store, _dir) = create_test_store();
        let profile = Profile::new("Work");
        store.insert(Record::Profile(profile.clone()));
        store.save().unwrap();

        store.delete(RecordKey::Profile(profile.id));
        store.delete(RecordKey::Tab(TabId::new()));
        store.save().unwrap();

        let remaining = store.fetch_profiles(&|p| p.id != ProfileId::new()).unwrap();
        assert!(remaining.is_empty());
    }
}
