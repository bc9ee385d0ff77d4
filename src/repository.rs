//! Observation repository: load, save and remove fully materialized
//! observations on top of the record store and the image store.
//!
//! Image I/O fans out to tokio's blocking pool, one task per image, and is
//! joined with `join_all`, so results always come back in slot order no
//! matter which task finishes first. Every mutation of the persisted list is
//! a full read-modify-write performed under a single async mutex; concurrent
//! saves and removes queue up instead of overwriting each other.

use crate::blobs::ImageStore;
use crate::error::Result;
use crate::records::{RecordStore, OBSERVATIONS_KEY};
use crate::subscriptions::{DiaryEvent, SubscriptionManager};
use crate::types::{
    derive_image_id, ImagePayload, ImageQuality, Observation, ObservationId, ObservationRecord,
};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task;
use tracing::{debug, warn};

/// Result of [`ObservationRepository::load_all`].
#[derive(Clone, Debug)]
pub struct LoadReport {
    /// Observations ordered by date, newest first.
    pub observations: Vec<Observation>,
    /// Image references that could not be resolved (missing or undecodable).
    pub dropped_images: usize,
}

impl LoadReport {
    /// True if every recorded image was materialized.
    pub fn is_complete(&self) -> bool {
        self.dropped_images == 0
    }
}

/// Result of [`ObservationRepository::save`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveReport {
    pub id: ObservationId,
    /// Images written and referenced by the stored record.
    pub written: usize,
    /// Images that failed to encode or write and were left out.
    pub dropped: usize,
    /// True if an existing record with the same id was replaced.
    pub replaced: bool,
}

impl SaveReport {
    pub fn is_complete(&self) -> bool {
        self.dropped == 0
    }
}

/// Result of [`ObservationRepository::remove`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoveReport {
    pub id: ObservationId,
    /// False if no record with this id was stored.
    pub existed: bool,
    /// Image files actually deleted.
    pub images_deleted: usize,
}

/// Result of [`ObservationRepository::clear_all`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClearReport {
    /// Records erased.
    pub observations: usize,
    /// Image files actually deleted.
    pub images_deleted: usize,
}

/// Orchestrates the record store and image store.
pub struct ObservationRepository {
    records: Arc<dyn RecordStore>,
    images: Arc<ImageStore>,
    events: Arc<SubscriptionManager>,

    /// Single writer for the persisted list.
    write_lock: Mutex<()>,
}

impl ObservationRepository {
    pub fn new(records: Arc<dyn RecordStore>, images: Arc<ImageStore>) -> Self {
        Self::with_events(records, images, Arc::new(SubscriptionManager::new()))
    }

    /// Create a repository that publishes to an existing subscription manager.
    pub fn with_events(
        records: Arc<dyn RecordStore>,
        images: Arc<ImageStore>,
        events: Arc<SubscriptionManager>,
    ) -> Self {
        Self {
            records,
            images,
            events,
            write_lock: Mutex::new(()),
        }
    }

    pub fn events(&self) -> &Arc<SubscriptionManager> {
        &self.events
    }

    pub fn images(&self) -> &Arc<ImageStore> {
        &self.images
    }

    // --- Reads ---

    /// Materialize every stored observation, newest first.
    ///
    /// Missing or undecodable images are dropped and counted; they never fail
    /// the load. Images are recompressed at `quality` before being returned.
    pub async fn load_all(&self, quality: ImageQuality) -> Result<LoadReport> {
        let records = self.read_records().await?;

        let materialized =
            join_all(records.iter().map(|record| self.materialize(record, quality))).await;

        let mut dropped_images = 0;
        let mut observations: Vec<Observation> = materialized
            .into_iter()
            .map(|(observation, dropped)| {
                dropped_images += dropped;
                observation
            })
            .collect();
        observations.sort_by(|a, b| b.date.cmp(&a.date));

        debug!(
            observations = observations.len(),
            dropped_images, "Loaded observations"
        );
        self.events.publish(DiaryEvent::Loaded {
            observations: observations.len(),
            dropped_images,
        });

        Ok(LoadReport {
            observations,
            dropped_images,
        })
    }

    /// Number of stored observations.
    pub async fn count(&self) -> Result<usize> {
        Ok(self.read_records().await?.len())
    }

    /// Resolve one record's images concurrently. Returns the observation and
    /// how many images were dropped.
    async fn materialize(
        &self,
        record: &ObservationRecord,
        quality: ImageQuality,
    ) -> (Observation, usize) {
        let loads = record.image_paths.iter().map(|name| {
            let images = Arc::clone(&self.images);
            let name = name.clone();
            task::spawn_blocking(move || load_with_quality(&images, &name, quality))
        });

        let mut dropped = 0;
        let mut resolved = Vec::with_capacity(record.image_paths.len());
        for result in join_all(loads).await {
            match result {
                Ok(Some(payload)) => resolved.push(payload),
                Ok(None) => dropped += 1,
                Err(e) => {
                    warn!(observation = %record.id, error = %e, "Image load task failed");
                    dropped += 1;
                }
            }
        }

        (Observation::from_record(record, resolved), dropped)
    }

    // --- Mutations ---

    /// Write an observation's images and upsert its record.
    ///
    /// Image `i` is stored under `derive_image_id(observation.id, i)`. Images
    /// that fail to encode or write are left out of the record. Files that the
    /// previous version of the record referenced but the new one does not are
    /// deleted afterwards. Saving with zero images is allowed.
    pub async fn save(&self, observation: &Observation) -> Result<SaveReport> {
        let _guard = self.write_lock.lock().await;

        let writes = observation
            .images
            .iter()
            .enumerate()
            .map(|(slot, image)| {
                let images = Arc::clone(&self.images);
                let image = image.clone();
                let image_id = derive_image_id(observation.id, slot);
                task::spawn_blocking(move || images.save(&image, image_id))
            });

        let results = join_all(writes).await;
        let attempted = results.len();
        let image_paths: Vec<String> = results
            .into_iter()
            .filter_map(|result| match result {
                Ok(name) => name,
                Err(e) => {
                    warn!(observation = %observation.id, error = %e, "Image save task failed");
                    None
                }
            })
            .collect();

        let written = image_paths.len();
        let dropped = attempted - written;
        let record = ObservationRecord::from_observation(observation, image_paths);

        let mut records = self.read_records().await?;
        let (replaced, stale) = match records.iter().position(|r| r.id == record.id) {
            Some(index) => {
                let previous = std::mem::replace(&mut records[index], record.clone());
                let stale: Vec<String> = previous
                    .image_paths
                    .into_iter()
                    .filter(|name| !record.image_paths.contains(name))
                    .collect();
                (true, stale)
            }
            None => {
                records.push(record);
                (false, Vec::new())
            }
        };

        self.write_records(records).await?;

        if !stale.is_empty() {
            let deleted = self.delete_files(stale).await;
            debug!(observation = %observation.id, deleted, "Deleted stale images");
        }

        if dropped > 0 {
            warn!(
                observation = %observation.id,
                written, dropped, "Saved observation with missing images"
            );
        } else {
            debug!(observation = %observation.id, written, replaced, "Saved observation");
        }

        self.events.publish(DiaryEvent::Saved {
            id: observation.id,
            written,
            dropped,
        });

        Ok(SaveReport {
            id: observation.id,
            written,
            dropped,
            replaced,
        })
    }

    /// Delete an observation's images and its record.
    ///
    /// Files for slots `0..images.len()` and every file the stored record
    /// references are deleted best-effort. Unknown ids are a no-op.
    pub async fn remove(&self, observation: &Observation) -> Result<RemoveReport> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.read_records().await?;
        let position = records.iter().position(|r| r.id == observation.id);

        let mut names: Vec<String> = (0..observation.images.len())
            .map(|slot| derive_image_id(observation.id, slot).file_name())
            .collect();
        if let Some(index) = position {
            for name in &records[index].image_paths {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }

        let images_deleted = self.delete_files(names).await;

        let existed = position.is_some();
        if let Some(index) = position {
            records.remove(index);
            self.write_records(records).await?;
        }

        debug!(observation = %observation.id, existed, images_deleted, "Removed observation");
        self.events.publish(DiaryEvent::Removed {
            id: observation.id,
            existed,
        });

        Ok(RemoveReport {
            id: observation.id,
            existed,
            images_deleted,
        })
    }

    /// Erase the whole collection and every image it references.
    pub async fn clear_all(&self) -> Result<ClearReport> {
        let _guard = self.write_lock.lock().await;

        let records = self.read_records().await?;
        let names: Vec<String> = records
            .iter()
            .flat_map(|record| record.image_paths.iter().cloned())
            .collect();

        let images_deleted = self.delete_files(names).await;
        self.remove_records().await?;

        debug!(observations = records.len(), images_deleted, "Cleared diary");
        self.events.publish(DiaryEvent::Cleared {
            observations: records.len(),
        });

        Ok(ClearReport {
            observations: records.len(),
            images_deleted,
        })
    }

    // --- Helpers ---

    async fn read_records(&self) -> Result<Vec<ObservationRecord>> {
        let store = Arc::clone(&self.records);
        let records = task::spawn_blocking(move || store.get(OBSERVATIONS_KEY)).await??;
        Ok(records.unwrap_or_default())
    }

    async fn write_records(&self, records: Vec<ObservationRecord>) -> Result<()> {
        let store = Arc::clone(&self.records);
        task::spawn_blocking(move || store.set(OBSERVATIONS_KEY, &records)).await?
    }

    async fn remove_records(&self) -> Result<()> {
        let store = Arc::clone(&self.records);
        task::spawn_blocking(move || store.remove(OBSERVATIONS_KEY)).await?
    }

    /// Delete files concurrently, returning how many were actually removed.
    async fn delete_files(&self, names: Vec<String>) -> usize {
        let deletes = names.into_iter().map(|name| {
            let images = Arc::clone(&self.images);
            task::spawn_blocking(move || images.delete_named(&name))
        });

        join_all(deletes)
            .await
            .into_iter()
            .filter(|result| matches!(result, Ok(true)))
            .count()
    }
}

fn load_with_quality(images: &ImageStore, name: &str, quality: ImageQuality) -> Option<ImagePayload> {
    let payload = images.load_image(name)?;
    match payload.recompress(quality) {
        Ok(payload) => Some(payload),
        Err(e) => {
            warn!(image = %name, error = %e, "Failed to recompress image");
            None
        }
    }
}
