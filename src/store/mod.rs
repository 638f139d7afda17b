//! Durable record store
//!
//! Records are value maps addressed by a store type (`statuses`, the offset
//! store type, the clear-offset store type) and the subscriber agent name.
//! All writes go through a [`StoreSession`]:
//!
//! ```text
//! open_session() ──► stage(..) ──► stage(..) ──► commit()
//!        │                                          │
//!        └──────────── drop: uncommitted changes are discarded
//! ```
//!
//! Changes staged in one session become visible together on `commit()` or
//! not at all. A session is released when it is dropped, on every exit path.

mod atomic;
mod file;
mod local;
mod memory;

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::error::StoreError;
use crate::types::ValueMap;

pub use atomic::{atomic_write, cleanup_temp_files};
pub use file::FileStore;
pub use local::LocalStore;
pub(crate) use local::value_of;
pub use memory::MemoryStore;

/// Service identity a session is opened for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subservice {
    /// Package import path
    Importer,
    /// Every other bookkeeping path
    Bookkeeper,
}

impl Subservice {
    pub fn as_str(self) -> &'static str {
        match self {
            Subservice::Importer => "importer",
            Subservice::Bookkeeper => "bookkeeper",
        }
    }
}

impl fmt::Display for Subservice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of a single record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    pub store_type: String,
    pub agent: String,
}

impl RecordKey {
    pub fn new(store_type: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            store_type: store_type.into(),
            agent: agent.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.store_type, self.agent)
    }
}

/// A scoped transaction over the store
pub trait StoreSession {
    /// Committed record merged with the changes staged in this session
    fn load(&self, key: &RecordKey) -> Result<Option<ValueMap>, StoreError>;

    /// Merge `values` into the record; visible to others after `commit()`
    fn stage(&mut self, key: &RecordKey, values: ValueMap) -> Result<(), StoreError>;

    /// Atomically publish every staged change
    fn commit(&mut self) -> Result<(), StoreError>;

    fn has_pending_changes(&self) -> bool;
}

/// Hands out store sessions
pub trait SessionFactory: Send + Sync {
    fn open_session(
        &self,
        subservice: Subservice,
    ) -> Result<Box<dyn StoreSession + '_>, StoreError>;
}

/// Storage shared by the store implementations
pub(crate) trait RecordBackend: Send + Sync {
    fn read(&self, key: &RecordKey) -> Result<Option<ValueMap>, StoreError>;

    /// Apply every change or none
    fn write_all(&self, changes: &BTreeMap<RecordKey, ValueMap>) -> Result<(), StoreError>;
}

/// Session buffering staged changes until commit
pub(crate) struct BufferedSession<'a> {
    backend: &'a dyn RecordBackend,
    subservice: Subservice,
    pending: BTreeMap<RecordKey, ValueMap>,
}

impl<'a> BufferedSession<'a> {
    pub(crate) fn new(backend: &'a dyn RecordBackend, subservice: Subservice) -> Self {
        Self {
            backend,
            subservice,
            pending: BTreeMap::new(),
        }
    }
}

impl StoreSession for BufferedSession<'_> {
    fn load(&self, key: &RecordKey) -> Result<Option<ValueMap>, StoreError> {
        let committed = self.backend.read(key)?;
        match (committed, self.pending.get(key)) {
            (None, None) => Ok(None),
            (committed, staged) => {
                let mut merged = committed.unwrap_or_default();
                if let Some(staged) = staged {
                    merged.extend(staged.clone());
                }
                Ok(Some(merged))
            }
        }
    }

    fn stage(&mut self, key: &RecordKey, values: ValueMap) -> Result<(), StoreError> {
        self.pending.entry(key.clone()).or_default().extend(values);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.backend.write_all(&self.pending)?;
        self.pending.clear();
        Ok(())
    }

    fn has_pending_changes(&self) -> bool {
        !self.pending.is_empty()
    }
}

impl Drop for BufferedSession<'_> {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            debug!(
                subservice = %self.subservice,
                records = self.pending.len(),
                "Releasing store session with uncommitted changes"
            );
        }
    }
}

/// Merge staged changes into a record map, the way every backend commits
pub(crate) fn merge_changes<K, F>(
    records: &mut BTreeMap<K, ValueMap>,
    changes: &BTreeMap<RecordKey, ValueMap>,
    to_key: F,
) where
    K: Ord,
    F: Fn(&RecordKey) -> K,
{
    for (key, values) in changes {
        records.entry(to_key(key)).or_default().extend(values.clone());
    }
}
