//! File-backed record store.

use super::{validate_key, RecordStore};
use crate::error::{Result, StoreError};
use crate::types::ObservationRecord;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Magic bytes for record files.
const RECORD_MAGIC: &[u8; 4] = b"OBS\0";

/// Current record file format version.
const RECORD_VERSION: u8 = 1;

/// Bytes around the payload: magic, version, length and checksum.
const RECORD_OVERHEAD: u64 = 4 + 1 + 8 + 4;

/// Extension of record files.
const RECORD_EXTENSION: &str = "rec";

/// Record store keeping one file per key.
///
/// File layout: magic, version, u64 payload length, MessagePack payload,
/// crc32 of the payload. Writes go to a temp file in the same directory and
/// are renamed over the target, so readers see either the old or the new
/// list.
pub struct FileRecordStore {
    /// Directory holding the record files.
    path: PathBuf,

    /// Serializes writers so temp-file renames never race each other.
    write_lock: Mutex<()>,
}

impl FileRecordStore {
    /// Open a record store at the given directory, creating it if needed.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Directory holding the record files.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn key_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.path.join(format!("{}.{}", key, RECORD_EXTENSION)))
    }

    fn write_file(&self, target: &Path, records: &[ObservationRecord]) -> Result<()> {
        let encoded = rmp_serde::to_vec_named(records)?;

        let mut tmp = NamedTempFile::new_in(&self.path)?;
        {
            let file = tmp.as_file_mut();

            file.write_all(RECORD_MAGIC)?;
            file.write_all(&[RECORD_VERSION])?;

            file.write_all(&(encoded.len() as u64).to_le_bytes())?;
            file.write_all(&encoded)?;

            let checksum = crc32fast::hash(&encoded);
            file.write_all(&checksum.to_le_bytes())?;

            file.sync_all()?;
        }

        tmp.persist(target).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    fn read_file(path: &Path) -> Result<Vec<ObservationRecord>> {
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();

        // Read and verify magic
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != RECORD_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid record file magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != RECORD_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported record file version: {}",
                version[0]
            )));
        }

        let mut len_bytes = [0u8; 8];
        file.read_exact(&mut len_bytes)?;
        let len = u64::from_le_bytes(len_bytes);

        // Payload must fit between the header and the trailing checksum
        let available = file_len.saturating_sub(RECORD_OVERHEAD);
        if len > available {
            return Err(StoreError::InvalidFormat(format!(
                "Record payload length {} exceeds file size ({} bytes available)",
                len, available
            )));
        }

        let mut encoded = vec![0u8; len as usize];
        file.read_exact(&mut encoded)?;

        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)?;
        let stored_checksum = u32::from_le_bytes(checksum_bytes);
        let computed_checksum = crc32fast::hash(&encoded);

        if stored_checksum != computed_checksum {
            return Err(StoreError::ChecksumMismatch {
                expected: stored_checksum,
                got: computed_checksum,
            });
        }

        Ok(rmp_serde::from_slice(&encoded)?)
    }
}

impl RecordStore for FileRecordStore {
    fn get(&self, key: &str) -> Result<Option<Vec<ObservationRecord>>> {
        let path = self.key_path(key)?;
        match Self::read_file(&path) {
            Ok(records) => Ok(Some(records)),
            Err(StoreError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set(&self, key: &str, records: &[ObservationRecord]) -> Result<()> {
        let path = self.key_path(key)?;
        let _lock = self.write_lock.lock();
        self.write_file(&path, records)?;
        debug!(key, count = records.len(), "Wrote record list");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.key_path(key)?;
        let _lock = self.write_lock.lock();
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(key, "Removed record list");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
