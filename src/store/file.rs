//! File-backed record store
//!
//! Every record lives in a single JSON document (`records.json`) so that a
//! commit touching several records is one atomic file replacement.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::types::ValueMap;

use super::atomic::{atomic_write, cleanup_temp_files};
use super::{
    merge_changes, BufferedSession, RecordBackend, RecordKey, SessionFactory, StoreSession,
    Subservice,
};

const RECORDS_FILE: &str = "records.json";

/// Record store persisted under a data directory
pub struct FileStore {
    data_dir: PathBuf,
    /// Committed records keyed by `store_type/agent`
    records: Mutex<BTreeMap<String, ValueMap>>,
}

impl FileStore {
    /// Open the store, loading any committed records
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, StoreError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;

        let cleaned = cleanup_temp_files(&data_dir)?;
        if cleaned > 0 {
            warn!(
                data_dir = %data_dir.display(),
                cleaned, "Removed temp files left by an interrupted commit"
            );
        }

        let records_path = data_dir.join(RECORDS_FILE);
        let records = if records_path.exists() {
            let content = fs::read_to_string(&records_path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };

        info!(
            data_dir = %data_dir.display(),
            records = records.len(),
            "Opened file store"
        );

        Ok(Self {
            data_dir,
            records: Mutex::new(records),
        })
    }

    pub fn records_path(&self) -> PathBuf {
        self.data_dir.join(RECORDS_FILE)
    }
}

impl RecordBackend for FileStore {
    fn read(&self, key: &RecordKey) -> Result<Option<ValueMap>, StoreError> {
        Ok(self.records.lock().get(&key.to_string()).cloned())
    }

    fn write_all(&self, changes: &BTreeMap<RecordKey, ValueMap>) -> Result<(), StoreError> {
        let mut records = self.records.lock();

        let mut updated = records.clone();
        merge_changes(&mut updated, changes, RecordKey::to_string);

        let content = serde_json::to_string_pretty(&updated)?;
        atomic_write(self.records_path(), &content)?;

        *records = updated;
        Ok(())
    }
}

impl SessionFactory for FileStore {
    fn open_session(
        &self,
        subservice: Subservice,
    ) -> Result<Box<dyn StoreSession + '_>, StoreError> {
        Ok(Box::new(BufferedSession::new(self, subservice)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn offset_values(offset: u64) -> ValueMap {
        json!({ "offset": offset }).as_object().cloned().unwrap()
    }

    #[test]
    fn test_committed_records_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let key = RecordKey::new("packages", "sub1");

        {
            let store = FileStore::open(temp_dir.path()).unwrap();
            let mut session = store.open_session(Subservice::Importer).unwrap();
            session.stage(&key, offset_values(42)).unwrap();
            session.commit().unwrap();
        }

        let store = FileStore::open(temp_dir.path()).unwrap();
        let session = store.open_session(Subservice::Bookkeeper).unwrap();
        let record = session.load(&key).unwrap().unwrap();
        assert_eq!(record["offset"], 42);
    }

    #[test]
    fn test_uncommitted_changes_are_not_written() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).unwrap();

        {
            let mut session = store.open_session(Subservice::Importer).unwrap();
            session
                .stage(&RecordKey::new("packages", "sub1"), offset_values(1))
                .unwrap();
        }

        assert!(!store.records_path().exists());
    }

    #[test]
    fn test_open_removes_stale_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("records.tmp"), "{\"partial").unwrap();

        let store = FileStore::open(temp_dir.path()).unwrap();

        assert!(!temp_dir.path().join("records.tmp").exists());
        let session = store.open_session(Subservice::Bookkeeper).unwrap();
        assert!(session
            .load(&RecordKey::new("packages", "sub1"))
            .unwrap()
            .is_none());
    }
}
