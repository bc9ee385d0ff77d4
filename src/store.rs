//! Main Diary struct tying all components together.

use crate::blobs::{ImageStore, DEFAULT_IMAGE_DIR};
use crate::error::{Result, StoreError};
use crate::records::FileRecordStore;
use crate::repository::{ClearReport, LoadReport, ObservationRepository, RemoveReport, SaveReport};
use crate::subscriptions::{SubscriptionConfig, SubscriptionHandle, SubscriptionId};
use crate::types::{ImageQuality, Observation};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Diary configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base path for the diary (the app's private data area).
    pub path: PathBuf,

    /// Name of the image subdirectory under `path`.
    pub image_dir: String,

    /// Decoded image cache size (number of images).
    pub image_cache_size: usize,

    /// Whether to create the diary if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./diary"),
            image_dir: DEFAULT_IMAGE_DIR.to_string(),
            image_cache_size: 64,
            create_if_missing: true,
        }
    }
}

impl StoreConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Storage footprint of a diary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiaryStats {
    pub observations: usize,
    pub image_files: usize,
    pub image_bytes: u64,
}

/// Magic bytes for the diary manifest.
const DIARY_MAGIC: &[u8; 4] = b"ODS\0";

/// Current diary format version.
const DIARY_VERSION: u8 = 1;

const MANIFEST_FILE: &str = "MANIFEST";
const LOCK_FILE: &str = "LOCK";
const RECORDS_DIR: &str = "records";

/// An opened observation diary.
///
/// Holds an exclusive lock on its directory for as long as it lives, so a
/// process gets exactly one store instance per diary. Construct it once and
/// share it by reference.
pub struct Diary {
    /// Diary configuration.
    config: StoreConfig,

    /// Lock file for exclusive access.
    _lock_file: File,

    repository: ObservationRepository,
}

impl Diary {
    /// Open an existing diary or create a new one.
    pub fn open_or_create(config: StoreConfig) -> Result<Self> {
        if config.path.join(MANIFEST_FILE).exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    /// Create a new diary.
    pub fn create(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;

        let lock_file = Self::acquire_lock(&config.path)?;
        Self::write_manifest(&config.path)?;

        let diary = Self::assemble(config, lock_file)?;
        info!(path = %diary.config.path.display(), "Created diary");
        Ok(diary)
    }

    /// Open an existing diary.
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::verify_manifest(&config.path)?;

        let lock_file = Self::acquire_lock(&config.path)?;
        let diary = Self::assemble(config, lock_file)?;
        info!(path = %diary.config.path.display(), "Opened diary");
        Ok(diary)
    }

    fn assemble(config: StoreConfig, lock_file: File) -> Result<Self> {
        let records = Arc::new(FileRecordStore::new(config.path.join(RECORDS_DIR))?);
        let images = Arc::new(ImageStore::new(
            config.path.join(&config.image_dir),
            config.image_cache_size,
        ));

        Ok(Self {
            repository: ObservationRepository::new(records, images),
            _lock_file: lock_file,
            config,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn repository(&self) -> &ObservationRepository {
        &self.repository
    }

    // --- Observation Operations ---

    /// Materialize all observations, newest first.
    pub async fn load_all(&self, quality: ImageQuality) -> Result<LoadReport> {
        self.repository.load_all(quality).await
    }

    /// Save (insert or replace) an observation.
    pub async fn save(&self, observation: &Observation) -> Result<SaveReport> {
        self.repository.save(observation).await
    }

    /// Remove an observation and its images.
    pub async fn remove(&self, observation: &Observation) -> Result<RemoveReport> {
        self.repository.remove(observation).await
    }

    /// Erase every observation and image.
    pub async fn clear_all(&self) -> Result<ClearReport> {
        self.repository.clear_all().await
    }

    pub async fn stats(&self) -> Result<DiaryStats> {
        let observations = self.repository.count().await?;
        let images = self.repository.images();

        Ok(DiaryStats {
            observations,
            image_files: images.list().len(),
            image_bytes: images.total_size(),
        })
    }

    // --- Subscriptions ---

    /// Receive an event after every finished load and mutation.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        self.repository.events().subscribe(config)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.repository.events().unsubscribe(id)
    }

    // --- Manifest & Lock ---

    fn write_manifest(path: &Path) -> Result<()> {
        use std::io::Write;

        let manifest_path = path.join(MANIFEST_FILE);
        let mut file = File::create(manifest_path)?;

        file.write_all(DIARY_MAGIC)?;
        file.write_all(&[DIARY_VERSION])?;
        file.sync_all()?;

        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        use std::io::Read;

        let manifest_path = path.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(StoreError::NotInitialized);
        }
        let mut file = File::open(manifest_path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != DIARY_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid diary magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != DIARY_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported diary version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_path = path.join(LOCK_FILE);
        let lock_file = File::create(lock_path)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;

        Ok(lock_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> StoreConfig {
        StoreConfig {
            path: dir.path().join("diary"),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_writes_manifest() {
        let dir = TempDir::new().unwrap();
        let diary = Diary::create(config(&dir)).unwrap();

        assert!(diary.config().path.join(MANIFEST_FILE).exists());
        assert!(diary.config().path.join(RECORDS_DIR).is_dir());
    }

    #[test]
    fn test_open_missing_without_create() {
        let dir = TempDir::new().unwrap();
        let result = Diary::open_or_create(StoreConfig {
            create_if_missing: false,
            ..config(&dir)
        });

        assert!(matches!(result, Err(StoreError::NotInitialized)));
    }

    #[test]
    fn test_reopen_after_drop() {
        let dir = TempDir::new().unwrap();
        drop(Diary::create(config(&dir)).unwrap());

        assert!(Diary::open_or_create(config(&dir)).is_ok());
    }

    #[test]
    fn test_create_on_locked_diary_leaves_manifest_alone() {
        let dir = TempDir::new().unwrap();
        let _held = Diary::create(config(&dir)).unwrap();

        let manifest = dir.path().join("diary").join(MANIFEST_FILE);
        let mut marked = fs::read(&manifest).unwrap();
        marked.push(0x7f);
        fs::write(&manifest, &marked).unwrap();

        let result = Diary::create(config(&dir));
        assert!(matches!(result, Err(StoreError::Locked)));
        assert_eq!(fs::read(&manifest).unwrap(), marked);
    }

    #[test]
    fn test_bad_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("diary");
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join(MANIFEST_FILE), b"XXXX\x01").unwrap();

        let result = Diary::open(config(&dir));
        assert!(matches!(result, Err(StoreError::InvalidFormat(_))));
    }

    #[test]
    fn test_config_from_json_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "path": "/tmp/birds", "image_cache_size": 8 }"#).unwrap();

        let config = StoreConfig::from_json_file(&path).unwrap();
        assert_eq!(config.path, PathBuf::from("/tmp/birds"));
        assert_eq!(config.image_cache_size, 8);
        assert_eq!(config.image_dir, DEFAULT_IMAGE_DIR);
        assert!(config.create_if_missing);
    }
}
