//! Record store implementation.
//!
//! A record store maps a logical key to the full, ordered list of persisted
//! observation records. Every `set` replaces the whole value; there are no
//! partial updates.

mod file;
mod memory;

pub use file::FileRecordStore;
pub use memory::MemoryRecordStore;

use crate::error::{Result, StoreError};
use crate::types::ObservationRecord;

/// Key under which the observation collection is stored.
pub const OBSERVATIONS_KEY: &str = "observation";

/// Durable key-value container for observation record lists.
pub trait RecordStore: Send + Sync {
    /// Read the list stored under `key`. `None` if nothing was ever stored.
    fn get(&self, key: &str) -> Result<Option<Vec<ObservationRecord>>>;

    /// Replace the list stored under `key`.
    fn set(&self, key: &str, records: &[ObservationRecord]) -> Result<()>;

    /// Remove `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Keys become file names, so only `[A-Za-z0-9_-]` is accepted.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}
