//! # Observation Store
//!
//! Local persistence and aggregation core for a wildlife observation diary.
//!
//! ## Core Concepts
//!
//! - **Records**: The whole observation list, stored under one key and
//!   rewritten in full on every change
//! - **Images**: PNG files addressed by ids derived from observation id + slot
//! - **Repository**: Loads, saves and removes fully decoded observations
//! - **Queries**: Favorites, filters, search and statistics over a loaded list
//!
//! ## Example
//!
//! ```ignore
//! use observation_store::{query, Diary, ImageQuality, Observation, StoreConfig};
//!
//! let diary = Diary::open_or_create(StoreConfig {
//!     path: "./my-diary".into(),
//!     ..Default::default()
//! })?;
//!
//! let mut observation = Observation::new();
//! observation.species = "Woodpecker".into();
//! diary.save(&observation).await?;
//!
//! let loaded = diary.load_all(ImageQuality::PREVIEW).await?;
//! let top = query::top_species(&loaded.observations, query::TOP_SPECIES_LIMIT);
//! ```

pub mod blobs;
pub mod error;
pub mod query;
pub mod records;
pub mod repository;
pub mod store;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use blobs::ImageStore;
pub use error::{Result, StoreError};
pub use query::{Filter, MonthBucket, MonthlyHistogram, SpeciesCount};
pub use records::{FileRecordStore, MemoryRecordStore, RecordStore, OBSERVATIONS_KEY};
pub use repository::{ClearReport, LoadReport, ObservationRepository, RemoveReport, SaveReport};
pub use store::{Diary, DiaryStats, StoreConfig};
pub use subscriptions::{
    DiaryEvent, DropReason, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId, SubscriptionManager,
};
pub use types::*;
