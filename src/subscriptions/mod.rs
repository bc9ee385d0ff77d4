//! Subscription system for diary updates.
//!
//! The repository does all I/O on background tasks. Observers that live on a
//! single UI-affinity thread subscribe here and receive the final result of
//! each load or mutation over a bounded channel:
//! - Collection loads
//! - Saves, removals and clears
//!
//! Slow subscribers whose buffer fills up are dropped.
//!
//! # Example
//!
//! ```ignore
//! let handle = diary.subscribe(SubscriptionConfig::default());
//!
//! loop {
//!     match handle.recv() {
//!         Ok(DiaryEvent::Saved { id, .. }) => println!("Saved {}", id),
//!         Ok(DiaryEvent::Dropped { .. }) | Err(_) => break,
//!         Ok(_) => {}
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    DiaryEvent, DropReason, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId,
};
