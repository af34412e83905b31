//! Persistent store for animal and global records.
//!
//! The store is exclusively owned by the main loop. It is rewritten in
//! full (write-then-rename) on every save; there are no partial writes
//! and no concurrent writers.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{AnimalRecord, GlobalRecord};
use crate::error::Result;

/// All persisted experiment state: one record per known subject plus the
/// global counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordStore {
    global: GlobalRecord,
    animals: BTreeMap<String, AnimalRecord>,
}

impl RecordStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the store from `path`, preparing every record for a new
    /// session (session counters zeroed, windows sized to
    /// `trials_in_block`). A missing file yields a fresh store.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or
    /// decoded.
    pub fn load<P: AsRef<Path>>(path: P, trials_in_block: usize) -> Result<Self> {
        let path = path.as_ref();
        let mut store = if path.exists() {
            let content = fs::read_to_string(path)?;
            serde_json::from_str::<Self>(&content)?
        } else {
            info!(path = %path.display(), "record store not found, starting fresh");
            Self::new()
        };
        store.global.begin_session();
        for record in store.animals.values_mut() {
            record.begin_session(trials_in_block);
        }
        Ok(store)
    }

    /// Rewrite the store at `path` in full.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), animals = self.animals.len(), "record store saved");
        Ok(())
    }

    /// Number of known subjects.
    #[must_use]
    pub fn animal_count(&self) -> usize {
        self.animals.len()
    }

    /// Record for `tag`, if the subject is known.
    #[must_use]
    pub fn animal(&self, tag: &str) -> Option<&AnimalRecord> {
        self.animals.get(tag)
    }

    /// Mutable record for `tag`, if the subject is known.
    pub fn animal_mut(&mut self, tag: &str) -> Option<&mut AnimalRecord> {
        self.animals.get_mut(tag)
    }

    /// Record for `tag`, created on first detection.
    pub fn get_or_insert(&mut self, tag: &str, trials_in_block: usize) -> &mut AnimalRecord {
        self.animals.entry(tag.to_string()).or_insert_with(|| {
            info!(tag, "new subject detected");
            let mut record = AnimalRecord::default();
            record.begin_session(trials_in_block);
            record
        })
    }

    /// The global counters.
    #[must_use]
    pub const fn global(&self) -> &GlobalRecord {
        &self.global
    }

    /// Mutable global counters.
    pub fn global_mut(&mut self) -> &mut GlobalRecord {
        &mut self.global
    }

    /// Mutable borrows of one subject's record and the global counters at
    /// the same time (the shape every trial mutation needs).
    pub fn pair_mut(&mut self, tag: &str) -> Option<(&mut AnimalRecord, &mut GlobalRecord)> {
        let Self { animals, global } = self;
        animals.get_mut(tag).map(|a| (a, &mut *global))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");

        let mut store = RecordStore::new();
        let record = store.get_or_insert("0071A2B3", 4);
        record.push_count_either = 3;
        record.preference = Some(crate::Side::Left);
        store.global_mut().shuffle_order = vec![2, 0, 3, 1];
        store.save(&path).unwrap();

        let loaded = RecordStore::load(&path, 4).unwrap();
        assert_eq!(loaded.animal("0071A2B3"), store.animal("0071A2B3"));
        assert_eq!(loaded.global().shuffle_order, vec![2, 0, 3, 1]);
    }

    #[test]
    fn test_load_missing_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::load(dir.path().join("none.json"), 4).unwrap();
        assert_eq!(store.animal_count(), 0);
    }

    #[test]
    fn test_load_resizes_stale_windows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");

        let mut store = RecordStore::new();
        store.get_or_insert("A", 12);
        store.save(&path).unwrap();

        let loaded = RecordStore::load(&path, 4).unwrap();
        assert_eq!(loaded.animal("A").unwrap().sliding_window.len(), 4);
    }

    #[test]
    fn test_load_applies_session_resets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");

        let mut store = RecordStore::new();
        store.get_or_insert("A", 4).entry_count = 2;
        store.global_mut().rewards_today = 17;
        store.save(&path).unwrap();

        let loaded = RecordStore::load(&path, 4).unwrap();
        assert_eq!(loaded.animal("A").unwrap().entry_count, 0);
        assert_eq!(loaded.global().rewards_today, 0);
    }
}
