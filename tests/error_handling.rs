//! Error handling and edge case tests.

use image::{DynamicImage, Rgb, RgbImage};
use observation_store::{
    derive_image_id, Diary, ImagePayload, ImageQuality, Observation, StoreConfig, StoreError,
};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn test_config(dir: &TempDir) -> StoreConfig {
    StoreConfig {
        path: dir.path().join("diary"),
        ..Default::default()
    }
}

fn test_diary(dir: &TempDir) -> Diary {
    Diary::create(test_config(dir)).unwrap()
}

fn image_dir(dir: &TempDir) -> PathBuf {
    dir.path().join("diary").join("StoredImages")
}

fn photo(seed: u8) -> ImagePayload {
    let img = RgbImage::from_fn(4, 4, |x, y| Rgb([seed, x as u8, y as u8]));
    ImagePayload::new(DynamicImage::ImageRgb8(img))
}

fn sighting(species: &str, photos: usize) -> Observation {
    let mut obs = Observation::new();
    obs.species = species.to_string();
    obs.images = (0..photos).map(|i| photo(i as u8 * 30)).collect();
    obs
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("observation_store=debug")
        .with_test_writer()
        .try_init();
}

// --- Image Failures ---

#[tokio::test]
async fn test_missing_image_is_dropped() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let diary = test_diary(&dir);

    let entry = sighting("Owl", 3);
    diary.save(&entry).await.unwrap();

    // Warm the decoded-image cache
    let warm = diary.load_all(ImageQuality::Original).await.unwrap();
    assert!(warm.is_complete());

    // Delete the middle image behind the store's back
    let middle = derive_image_id(entry.id, 1).file_name();
    fs::remove_file(image_dir(&dir).join(&middle)).unwrap();
    assert!(!diary.repository().images().exists(&middle));
    assert!(diary.repository().images().load_image(&middle).is_none());

    let report = diary.load_all(ImageQuality::Original).await.unwrap();
    assert_eq!(report.dropped_images, 1);
    assert!(!report.is_complete());

    let restored = &report.observations[0];
    assert_eq!(restored.id, entry.id);
    assert_eq!(restored.images, vec![entry.images[0].clone(), entry.images[2].clone()]);
}

#[tokio::test]
async fn test_undecodable_image_is_dropped() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let entry = sighting("Owl", 2);

    {
        let diary = test_diary(&dir);
        diary.save(&entry).await.unwrap();
    }

    let first = derive_image_id(entry.id, 0).file_name();
    fs::write(image_dir(&dir).join(first), b"garbage, not a png").unwrap();

    let diary = Diary::open(test_config(&dir)).unwrap();
    let report = diary.load_all(ImageQuality::Original).await.unwrap();
    assert_eq!(report.dropped_images, 1);
    assert_eq!(report.observations[0].images, vec![entry.images[1].clone()]);
}

#[tokio::test]
async fn test_failed_image_write_shortens_record() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let diary = test_diary(&dir);
    let entry = sighting("Owl", 3);

    // A non-empty directory where slot 1 should be written
    let blocker = image_dir(&dir).join(derive_image_id(entry.id, 1).file_name());
    fs::create_dir_all(blocker.join("occupied")).unwrap();

    let report = diary.save(&entry).await.unwrap();
    assert_eq!(report.written, 2);
    assert_eq!(report.dropped, 1);
    assert!(!report.is_complete());

    let loaded = diary.load_all(ImageQuality::Original).await.unwrap();
    assert!(loaded.is_complete());
    assert_eq!(
        loaded.observations[0].images,
        vec![entry.images[0].clone(), entry.images[2].clone()]
    );
}

#[tokio::test]
async fn test_unusable_image_directory_is_not_fatal() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let diary = test_diary(&dir);

    // A plain file where the image directory should be
    fs::write(image_dir(&dir), b"in the way").unwrap();

    let entry = sighting("Owl", 2);
    let report = diary.save(&entry).await.unwrap();
    assert_eq!(report.written, 0);
    assert_eq!(report.dropped, 2);

    let loaded = diary.load_all(ImageQuality::Original).await.unwrap();
    assert_eq!(loaded.observations, vec![entry]);
    assert!(loaded.observations[0].images.is_empty());
}

// --- Record Store Failures ---

#[tokio::test]
async fn test_corrupt_collection_is_an_error() {
    let dir = TempDir::new().unwrap();
    let diary = test_diary(&dir);
    diary.save(&sighting("Owl", 0)).await.unwrap();

    let record_file = dir.path().join("diary").join("records").join("observation.rec");
    let mut bytes = fs::read(&record_file).unwrap();
    let payload_byte = bytes.len() - 6;
    bytes[payload_byte] ^= 0x55;
    fs::write(&record_file, &bytes).unwrap();

    let result = diary.load_all(ImageQuality::Original).await;
    assert!(matches!(result, Err(StoreError::ChecksumMismatch { .. })));

    // A save must not replace a collection it could not read
    let result = diary.save(&sighting("Crow", 0)).await;
    assert!(result.is_err());
    assert_eq!(fs::read(&record_file).unwrap(), bytes);
}

// --- Diary Lifecycle ---

#[test]
fn test_store_locking() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    let _diary = Diary::create(config.clone()).unwrap();

    // Second diary should fail with lock error
    let result = Diary::open(config);
    assert!(matches!(result, Err(StoreError::Locked)));
}

#[test]
fn test_open_uninitialized() {
    let dir = TempDir::new().unwrap();

    let result = Diary::open(test_config(&dir));
    assert!(matches!(result, Err(StoreError::NotInitialized)));
}

#[tokio::test]
async fn test_operations_on_empty_diary() {
    let dir = TempDir::new().unwrap();
    let diary = test_diary(&dir);

    let loaded = diary.load_all(ImageQuality::PREVIEW).await.unwrap();
    assert!(loaded.observations.is_empty());

    let cleared = diary.clear_all().await.unwrap();
    assert_eq!(cleared.observations, 0);
    assert_eq!(cleared.images_deleted, 0);

    let stats = diary.stats().await.unwrap();
    assert_eq!(stats.observations, 0);
    assert_eq!(stats.image_files, 0);
}
