//! Subscription types for diary events.

use crate::types::ObservationId;
use serde::{Deserialize, Serialize};

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered events before dropping subscriber.
    /// Default: 256
    pub buffer_size: usize,

    /// Filter criteria.
    pub filter: SubscriptionFilter,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 256,
            filter: SubscriptionFilter::all(),
        }
    }
}

/// Filter criteria for subscriptions.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionFilter {
    /// Include `Loaded` events.
    pub include_loads: bool,

    /// Include `Saved`, `Removed` and `Cleared` events.
    pub include_mutations: bool,
}

impl SubscriptionFilter {
    /// Only collection loads.
    pub fn loads() -> Self {
        Self {
            include_loads: true,
            ..Default::default()
        }
    }

    /// Only saves, removals and clears.
    pub fn mutations() -> Self {
        Self {
            include_mutations: true,
            ..Default::default()
        }
    }

    /// Subscribe to everything.
    pub fn all() -> Self {
        Self {
            include_loads: true,
            include_mutations: true,
        }
    }

    pub(crate) fn matches(&self, event: &DiaryEvent) -> bool {
        match event {
            DiaryEvent::Loaded { .. } => self.include_loads,
            DiaryEvent::Saved { .. } | DiaryEvent::Removed { .. } | DiaryEvent::Cleared { .. } => {
                self.include_mutations
            }
            DiaryEvent::Dropped { .. } => true,
        }
    }
}

/// Events published by the repository once an operation has finished.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiaryEvent {
    /// The collection was materialized.
    Loaded {
        observations: usize,
        dropped_images: usize,
    },

    /// An observation was written.
    Saved {
        id: ObservationId,
        written: usize,
        dropped: usize,
    },

    /// An observation was removed. `existed` is false for unknown ids.
    Removed { id: ObservationId, existed: bool },

    /// The whole collection was erased.
    Cleared { observations: usize },

    /// Subscription was dropped.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to manage a subscription.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<DiaryEvent>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<DiaryEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<DiaryEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<DiaryEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}
