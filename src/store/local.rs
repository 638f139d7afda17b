//! Record store scoped to one store type and subscriber agent

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::StoreError;
use crate::types::ValueMap;

use super::{RecordKey, SessionFactory, StoreSession, Subservice};

/// Accessor for a single record (`store_type/agent`)
///
/// Reads and writes either join a caller's session, so they commit with
/// the caller's other changes, or open and commit a session of their own.
#[derive(Clone)]
pub struct LocalStore {
    factory: Arc<dyn SessionFactory>,
    key: RecordKey,
}

impl LocalStore {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        store_type: impl Into<String>,
        agent: impl Into<String>,
    ) -> Self {
        Self {
            factory,
            key: RecordKey::new(store_type, agent),
        }
    }

    /// Committed record, empty when absent
    pub fn load(&self) -> Result<ValueMap, StoreError> {
        let session = self.factory.open_session(Subservice::Bookkeeper)?;
        self.load_in(session.as_ref())
    }

    /// Record as seen by `session`, empty when absent
    pub fn load_in(&self, session: &dyn StoreSession) -> Result<ValueMap, StoreError> {
        Ok(session.load(&self.key)?.unwrap_or_default())
    }

    /// Typed value under `key`, `None` when absent
    pub fn load_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let record = self.load()?;
        value_of(&record, key)
    }

    pub fn stage(
        &self,
        session: &mut dyn StoreSession,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<(), StoreError> {
        let mut values = ValueMap::new();
        values.insert(key.to_string(), value.into());
        session.stage(&self.key, values)
    }

    pub fn stage_map(
        &self,
        session: &mut dyn StoreSession,
        values: ValueMap,
    ) -> Result<(), StoreError> {
        session.stage(&self.key, values)
    }

    /// Write a single value in a session of its own
    pub fn store(&self, key: &str, value: impl Into<Value>) -> Result<(), StoreError> {
        let mut session = self.factory.open_session(Subservice::Bookkeeper)?;
        self.stage(session.as_mut(), key, value)?;
        session.commit()
    }
}

/// Deserialize `key` out of a record
pub(crate) fn value_of<T: DeserializeOwned>(
    record: &ValueMap,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match record.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
    }
}
