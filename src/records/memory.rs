//! In-memory record store.

use super::{validate_key, RecordStore};
use crate::error::Result;
use crate::types::ObservationRecord;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Non-durable record store. Useful for tests and throwaway diaries.
#[derive(Default)]
pub struct MemoryRecordStore {
    entries: RwLock<HashMap<String, Vec<ObservationRecord>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryRecordStore {
    fn get(&self, key: &str) -> Result<Option<Vec<ObservationRecord>>> {
        validate_key(key)?;
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, records: &[ObservationRecord]) -> Result<()> {
        validate_key(key)?;
        self.entries.write().insert(key.to_string(), records.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.entries.write().remove(key);
        Ok(())
    }
}
