//! File-backed image storage.
//!
//! Images are PNG-encoded and stored flat in one directory, named by the
//! derived image id of their observation slot.

mod storage;

pub use storage::ImageStore;

/// Extension of stored image files.
pub const IMAGE_EXTENSION: &str = "png";

/// Default name of the image directory under the diary root.
pub const DEFAULT_IMAGE_DIR: &str = "StoredImages";
