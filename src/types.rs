//! Core types for the observation store.

use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for an observation. Assigned once, never reassigned.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObservationId(pub Uuid);

impl ObservationId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        ObservationId(Uuid::new_v4())
    }
}

impl Default for ObservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObservationId({})", self)
    }
}

impl fmt::Display for ObservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", upper_hyphenated(&self.0))
    }
}

/// Storage identifier of one image slot of one observation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(pub Uuid);

impl ImageId {
    /// File name used by the image store for this id.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self, crate::blobs::IMAGE_EXTENSION)
    }
}

impl fmt::Debug for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageId({}...)", &self.to_string()[..8])
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", upper_hyphenated(&self.0))
    }
}

fn upper_hyphenated(uuid: &Uuid) -> String {
    uuid.hyphenated().to_string().to_uppercase()
}

/// Derive the storage id for image `slot` of an observation.
///
/// The preimage is the observation id's text form followed by the slot as
/// eight little-endian bytes. The first 16 bytes of its SHA-256 digest become
/// the new id, so re-saving slot N always targets the same file.
pub fn derive_image_id(observation: ObservationId, slot: usize) -> ImageId {
    let mut hasher = Sha256::new();
    hasher.update(observation.to_string().as_bytes());
    hasher.update((slot as u64).to_le_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    ImageId(Uuid::from_bytes(bytes))
}

/// Fidelity applied to images when materializing observations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ImageQuality {
    /// Return images exactly as decoded from disk.
    #[default]
    Original,
    /// Recompress through JPEG at the given quality (1-100) to bound memory.
    Jpeg(u8),
}

impl ImageQuality {
    /// Quality used by list, detail and favorites views.
    pub const PREVIEW: ImageQuality = ImageQuality::Jpeg(10);

    /// Quality used by the statistics view.
    pub const STATISTICS: ImageQuality = ImageQuality::Jpeg(30);
}

/// A decoded image. Clones share the pixel buffer.
#[derive(Clone)]
pub struct ImagePayload(Arc<DynamicImage>);

impl ImagePayload {
    /// Wrap a decoded image.
    pub fn new(image: DynamicImage) -> Self {
        ImagePayload(Arc::new(image))
    }

    /// Decode an encoded image, guessing the format from its contents.
    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, image::ImageError> {
        Ok(Self::new(image::load_from_memory(bytes)?))
    }

    /// Encode as PNG.
    pub fn encode_png(&self) -> std::result::Result<Vec<u8>, image::ImageError> {
        let mut buf = Cursor::new(Vec::new());
        self.0.write_to(&mut buf, ImageFormat::Png)?;
        Ok(buf.into_inner())
    }

    /// Re-encode at the requested quality and decode again.
    pub fn recompress(&self, quality: ImageQuality) -> std::result::Result<Self, image::ImageError> {
        match quality {
            ImageQuality::Original => Ok(self.clone()),
            ImageQuality::Jpeg(q) => {
                let rgb = self.0.to_rgb8();
                let mut buf = Vec::new();
                JpegEncoder::new_with_quality(&mut buf, q.clamp(1, 100)).encode_image(&rgb)?;
                let decoded = image::load_from_memory_with_format(&buf, ImageFormat::Jpeg)?;
                Ok(Self::new(decoded))
            }
        }
    }

    /// Borrow the decoded image.
    pub fn as_image(&self) -> &DynamicImage {
        &self.0
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }
}

impl From<DynamicImage> for ImagePayload {
    fn from(image: DynamicImage) -> Self {
        Self::new(image)
    }
}

impl PartialEq for ImagePayload {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.width() == other.0.width()
                && self.0.height() == other.0.height()
                && self.0.color() == other.0.color()
                && self.0.as_bytes() == other.0.as_bytes())
    }
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ImagePayload({}x{} {:?})",
            self.0.width(),
            self.0.height(),
            self.0.color()
        )
    }
}

/// One bird-sighting diary entry with all images decoded in memory.
///
/// Two observations are the same entity iff their ids match; equality
/// ignores every other field.
#[derive(Clone, Debug)]
pub struct Observation {
    pub id: ObservationId,
    pub date: DateTime<Utc>,
    pub images: Vec<ImagePayload>,
    pub species: String,
    pub behavior: String,
    pub habits: String,
    pub is_favorite: bool,
}

impl Observation {
    /// A blank entry dated now.
    pub fn new() -> Self {
        Self {
            id: ObservationId::new(),
            date: Utc::now(),
            images: Vec::new(),
            species: String::new(),
            behavior: String::new(),
            habits: String::new(),
            is_favorite: false,
        }
    }

    /// Rebuild an observation from its persisted record and resolved images.
    pub fn from_record(record: &ObservationRecord, images: Vec<ImagePayload>) -> Self {
        Self {
            id: record.id,
            date: record.date,
            images,
            species: record.species.clone(),
            behavior: record.behavior.clone(),
            habits: record.habits.clone(),
            is_favorite: record.is_favorite,
        }
    }

    /// True when there is at least one image and no empty text field.
    pub fn is_complete(&self) -> bool {
        !self.images.is_empty()
            && !self.species.is_empty()
            && !self.behavior.is_empty()
            && !self.habits.is_empty()
    }

    pub fn toggle_favorite(&mut self) {
        self.is_favorite = !self.is_favorite;
    }
}

impl Default for Observation {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Observation {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Observation {}

/// On-disk shape of an observation: image references instead of pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub id: ObservationId,
    pub date: DateTime<Utc>,
    /// Stored file names in slot order, for images written at last save.
    pub image_paths: Vec<String>,
    pub species: String,
    pub behavior: String,
    pub habits: String,
    pub is_favorite: bool,
}

impl ObservationRecord {
    pub fn from_observation(observation: &Observation, image_paths: Vec<String>) -> Self {
        Self {
            id: observation.id,
            date: observation.date,
            image_paths,
            species: observation.species.clone(),
            behavior: observation.behavior.clone(),
            habits: observation.habits.clone(),
            is_favorite: observation.is_favorite,
        }
    }
}
