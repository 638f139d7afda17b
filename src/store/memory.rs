//! In-memory record store

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::StoreError;
use crate::types::ValueMap;

use super::{
    merge_changes, BufferedSession, RecordBackend, RecordKey, SessionFactory, StoreSession,
    Subservice,
};

/// Record store held in memory
///
/// Commits are atomic with respect to readers. Session acquisition and
/// commits can be made to fail, to exercise error paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<RecordKey, ValueMap>>,
    deny_sessions: AtomicBool,
    fail_commits: AtomicBool,
    commits: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed record, if any
    pub fn record(&self, store_type: &str, agent: &str) -> Option<ValueMap> {
        self.records
            .read()
            .get(&RecordKey::new(store_type, agent))
            .cloned()
    }

    /// Make `open_session` fail with an authorization error
    pub fn deny_sessions(&self, deny: bool) {
        self.deny_sessions.store(deny, Ordering::SeqCst);
    }

    /// Make `commit` fail with a persistence error
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of successful non-empty commits
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }
}

impl RecordBackend for MemoryStore {
    fn read(&self, key: &RecordKey) -> Result<Option<ValueMap>, StoreError> {
        Ok(self.records.read().get(key).cloned())
    }

    fn write_all(&self, changes: &BTreeMap<RecordKey, ValueMap>) -> Result<(), StoreError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Persistence("commit rejected".to_string()));
        }
        let mut records = self.records.write();
        merge_changes(&mut *records, changes, RecordKey::clone);
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl SessionFactory for MemoryStore {
    fn open_session(
        &self,
        subservice: Subservice,
    ) -> Result<Box<dyn StoreSession + '_>, StoreError> {
        if self.deny_sessions.load(Ordering::SeqCst) {
            return Err(StoreError::Authorization {
                subservice: subservice.to_string(),
                reason: "sessions denied".to_string(),
            });
        }
        Ok(Box::new(BufferedSession::new(self, subservice)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn values(value: Value) -> ValueMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_commit_publishes_all_changes() {
        let store = MemoryStore::new();
        let status = RecordKey::new("statuses", "sub1");
        let offsets = RecordKey::new("packages", "sub1");

        let mut session = store.open_session(Subservice::Importer).unwrap();
        session.stage(&status, values(json!({"statusNumber": 2}))).unwrap();
        session.stage(&offsets, values(json!({"offset": 10}))).unwrap();
        assert!(store.record("packages", "sub1").is_none());

        session.commit().unwrap();

        assert_eq!(store.record("statuses", "sub1").unwrap()["statusNumber"], 2);
        assert_eq!(store.record("packages", "sub1").unwrap()["offset"], 10);
        assert_eq!(store.commit_count(), 1);
    }

    #[test]
    fn test_dropped_session_discards_changes() {
        let store = MemoryStore::new();
        let key = RecordKey::new("packages", "sub1");

        {
            let mut session = store.open_session(Subservice::Bookkeeper).unwrap();
            session.stage(&key, values(json!({"offset": 5}))).unwrap();
            assert!(session.has_pending_changes());
        }

        assert!(store.record("packages", "sub1").is_none());
    }

    #[test]
    fn test_session_reads_own_staged_changes() {
        let store = MemoryStore::new();
        let key = RecordKey::new("statuses", "sub1");
        let mut session = store.open_session(Subservice::Bookkeeper).unwrap();
        session.stage(&key, values(json!({"sent": false, "offset": 1}))).unwrap();
        session.commit().unwrap();

        let mut session = store.open_session(Subservice::Bookkeeper).unwrap();
        session.stage(&key, values(json!({"sent": true}))).unwrap();

        let merged = session.load(&key).unwrap().unwrap();
        assert_eq!(merged["sent"], true);
        assert_eq!(merged["offset"], 1);
    }

    #[test]
    fn test_failed_commit_leaves_store_untouched() {
        let store = MemoryStore::new();
        store.fail_commits(true);
        let key = RecordKey::new("packages", "sub1");

        let mut session = store.open_session(Subservice::Importer).unwrap();
        session.stage(&key, values(json!({"offset": 5}))).unwrap();

        assert!(matches!(session.commit(), Err(StoreError::Persistence(_))));
        assert!(store.record("packages", "sub1").is_none());
    }

    #[test]
    fn test_denied_session() {
        let store = MemoryStore::new();
        store.deny_sessions(true);

        let result = store.open_session(Subservice::Importer);
        assert!(matches!(result, Err(StoreError::Authorization { .. })));
    }
}
