//! Image store implementation.

use crate::types::{ImageId, ImagePayload};
use lru::LruCache;
use parking_lot::Mutex;
use std::fs::{self, Metadata};
use std::io::{ErrorKind, Write};
use std::num::NonZeroUsize;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tempfile::NamedTempFile;
use tracing::{debug, error, warn};

/// Identity of a file on disk at the time it was cached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    fn of(meta: &Metadata) -> Self {
        Self {
            modified: meta.modified().ok(),
            len: meta.len(),
        }
    }
}

/// A decoded image and the stamp of the file it came from.
struct CachedImage {
    stamp: FileStamp,
    payload: ImagePayload,
}

/// Flat directory of PNG images addressed by stored name.
///
/// Every operation is best-effort: failures are logged and reported as
/// absence (`None` / `false`), never as errors. Writes are atomic per file.
pub struct ImageStore {
    /// Directory holding the images. Created on first write.
    path: PathBuf,

    /// LRU cache of decoded images by stored name. `None` when disabled.
    /// Entries are only served while the file still matches their stamp.
    cache: Option<Mutex<LruCache<String, CachedImage>>>,
}

impl ImageStore {
    /// Create an image store rooted at `path`. Nothing touches the disk yet.
    ///
    /// `cache_size` is the number of decoded images kept in memory; `0`
    /// disables the cache.
    pub fn new(path: impl AsRef<Path>, cache_size: usize) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            cache: NonZeroUsize::new(cache_size).map(|size| Mutex::new(LruCache::new(size))),
        }
    }

    /// Directory holding the images.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encode `payload` as PNG and store it under `id`.
    ///
    /// Returns the stored file name, or `None` if encoding or writing failed.
    pub fn save(&self, payload: &ImagePayload, id: ImageId) -> Option<String> {
        let name = id.file_name();

        let encoded = match payload.encode_png() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(image = %name, error = %e, "Failed to encode image");
                return None;
            }
        };

        self.ensure_dir();

        self.forget(&name);
        let meta = match self.write_atomic(&name, &encoded) {
            Ok(meta) => meta,
            Err(e) => {
                warn!(image = %name, error = %e, "Failed to write image");
                return None;
            }
        };

        self.remember(&name, FileStamp::of(&meta), payload);
        debug!(image = %name, bytes = encoded.len(), "Saved image");
        Some(name)
    }

    /// Read and decode a stored image.
    ///
    /// A cached decode is returned only if the file is still present and
    /// unchanged since it was cached.
    pub fn load_image(&self, name: &str) -> Option<ImagePayload> {
        let path = self.resolve(name)?;

        let stamp = match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => FileStamp::of(&meta),
            Ok(_) => {
                warn!(image = %name, "Image path is not a file");
                self.forget(name);
                return None;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(image = %name, "Image not found");
                self.forget(name);
                return None;
            }
            Err(e) => {
                warn!(image = %name, error = %e, "Failed to stat image");
                self.forget(name);
                return None;
            }
        };

        if let Some(cached) = self.cached(name, stamp) {
            return Some(cached);
        }

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(image = %name, error = %e, "Failed to read image");
                return None;
            }
        };

        match ImagePayload::decode(&bytes) {
            Ok(payload) => {
                self.remember(name, stamp, &payload);
                Some(payload)
            }
            Err(e) => {
                warn!(image = %name, error = %e, "Failed to decode image");
                self.forget(name);
                None
            }
        }
    }

    /// Delete the image stored under `id`. Returns true if a file was removed.
    pub fn delete_image(&self, id: ImageId) -> bool {
        self.delete_named(&id.file_name())
    }

    /// Delete an image by stored name. Absent files are not an error.
    pub fn delete_named(&self, name: &str) -> bool {
        self.forget(name);

        let Some(path) = self.resolve(name) else {
            return false;
        };

        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(image = %name, "Deleted image");
                true
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(image = %name, "Image already absent");
                false
            }
            Err(e) => {
                warn!(image = %name, error = %e, "Failed to delete image");
                false
            }
        }
    }

    /// Check if an image with this stored name exists on disk.
    pub fn exists(&self, name: &str) -> bool {
        self.resolve(name).map(|p| p.is_file()).unwrap_or(false)
    }

    /// List stored image names.
    pub fn list(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.path) else {
            return Vec::new();
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| {
                Path::new(name)
                    .extension()
                    .map(|ext| ext == super::IMAGE_EXTENSION)
                    .unwrap_or(false)
            })
            .collect();
        names.sort();
        names
    }

    /// Total size in bytes of all stored images.
    pub fn total_size(&self) -> u64 {
        self.list()
            .iter()
            .filter_map(|name| fs::metadata(self.path.join(name)).ok())
            .map(|meta| meta.len())
            .sum()
    }

    /// Create the image directory if missing. Failure is logged only; the
    /// following file operation will fail on its own.
    fn ensure_dir(&self) {
        if self.path.is_dir() {
            return;
        }
        match fs::create_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Created image directory"),
            Err(e) => error!(
                path = %self.path.display(),
                error = %e,
                "Failed to create image directory"
            ),
        }
    }

    /// Write via temp file and rename. Returns the metadata of the new file.
    fn write_atomic(&self, name: &str, bytes: &[u8]) -> std::io::Result<Metadata> {
        let target = self.path.join(name);
        let mut tmp = NamedTempFile::new_in(&self.path)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        fs::metadata(&target)
    }

    // --- Cache ---

    fn cached(&self, name: &str, stamp: FileStamp) -> Option<ImagePayload> {
        let mut cache = self.cache.as_ref()?.lock();
        if cache.peek(name).is_some_and(|entry| entry.stamp != stamp) {
            cache.pop(name);
            return None;
        }
        cache.get(name).map(|entry| entry.payload.clone())
    }

    fn remember(&self, name: &str, stamp: FileStamp, payload: &ImagePayload) {
        if let Some(cache) = &self.cache {
            cache.lock().put(
                name.to_string(),
                CachedImage {
                    stamp,
                    payload: payload.clone(),
                },
            );
        }
    }

    fn forget(&self, name: &str) {
        if let Some(cache) = &self.cache {
            cache.lock().pop(name);
        }
    }

    /// Map a stored name to its path. Names must be one plain path component.
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Some(self.path.join(name)),
            _ => {
                warn!(image = %name, "Rejected image name");
                None
            }
        }
    }
}
