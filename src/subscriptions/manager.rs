//! Subscription manager for broadcasting diary events.

use crossbeam_channel::{bounded, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::types::{
    DiaryEvent, DropReason, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
};

/// Internal subscription state.
///
/// The channel holds one slot more than `config.buffer_size`. Regular events
/// never use the last slot, so the final `Dropped` notice always fits.
struct Subscription {
    config: SubscriptionConfig,
    sender: Sender<DiaryEvent>,
    /// Makes the capacity check and the send one step.
    send_lock: Mutex<()>,
}

impl Subscription {
    /// Try to send an event. Returns false if buffer is full or the receiver is gone.
    fn try_send(&self, event: DiaryEvent) -> bool {
        let _guard = self.send_lock.lock();
        if self.sender.len() >= self.config.buffer_size {
            return false;
        }
        self.sender.try_send(event).is_ok()
    }

    /// Send the final notice into the reserved slot. Best effort.
    fn notify_dropped(&self, reason: DropReason) {
        let _guard = self.send_lock.lock();
        let _ = self.sender.try_send(DiaryEvent::Dropped { reason });
    }
}

/// Manages subscriptions and broadcasts events.
pub struct SubscriptionManager {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a new subscription. Only events published afterwards are delivered.
    pub fn subscribe(&self, mut config: SubscriptionConfig) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        config.buffer_size = config.buffer_size.max(1);
        let (sender, receiver) = bounded(config.buffer_size + 1);

        self.subscriptions.write().insert(
            id,
            Subscription {
                config,
                sender,
                send_lock: Mutex::new(()),
            },
        );

        SubscriptionHandle { id, receiver }
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        if let Some(sub) = self.subscriptions.write().remove(&id) {
            sub.notify_dropped(DropReason::Unsubscribed);
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Deliver an event to every matching subscription. Subscribers that
    /// cannot receive (full buffer, dropped receiver) are removed; a slow
    /// subscriber finds `Dropped { BufferOverflow }` after its buffered events.
    pub fn publish(&self, event: DiaryEvent) {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if sub.config.filter.matches(&event) && !sub.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for id in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    debug!(subscription = id.0, "Dropping slow subscriber");
                    sub.notify_dropped(DropReason::BufferOverflow);
                }
            }
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriptions::SubscriptionFilter;
    use crate::types::ObservationId;
    use std::time::Duration;

    fn saved() -> DiaryEvent {
        DiaryEvent::Saved {
            id: ObservationId::new(),
            written: 2,
            dropped: 0,
        }
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let manager = SubscriptionManager::new();
        let handle = manager.subscribe(SubscriptionConfig::default());
        assert_eq!(manager.subscription_count(), 1);

        manager.unsubscribe(handle.id);
        assert_eq!(manager.subscription_count(), 0);
        assert_eq!(
            handle.try_recv().unwrap(),
            DiaryEvent::Dropped {
                reason: DropReason::Unsubscribed
            }
        );
    }

    #[test]
    fn test_publish_to_matching() {
        let manager = SubscriptionManager::new();

        let loads = manager.subscribe(SubscriptionConfig {
            filter: SubscriptionFilter::loads(),
            ..Default::default()
        });
        let mutations = manager.subscribe(SubscriptionConfig {
            filter: SubscriptionFilter::mutations(),
            ..Default::default()
        });

        let event = saved();
        manager.publish(event.clone());
        manager.publish(DiaryEvent::Loaded {
            observations: 3,
            dropped_images: 0,
        });

        assert_eq!(
            mutations.recv_timeout(Duration::from_millis(100)).unwrap(),
            event
        );
        assert!(mutations.try_recv().is_err());

        assert!(matches!(
            loads.recv_timeout(Duration::from_millis(100)).unwrap(),
            DiaryEvent::Loaded { observations: 3, .. }
        ));
        assert!(loads.try_recv().is_err());
    }

    #[test]
    fn test_slow_subscriber_dropped() {
        let manager = SubscriptionManager::new();
        let handle = manager.subscribe(SubscriptionConfig {
            buffer_size: 2,
            ..Default::default()
        });

        manager.publish(saved());
        manager.publish(saved());
        assert_eq!(manager.subscription_count(), 1);

        // Third event overflows the buffer
        manager.publish(saved());
        assert_eq!(manager.subscription_count(), 0);

        // The two buffered events are still readable, then the notice
        assert!(matches!(handle.try_recv().unwrap(), DiaryEvent::Saved { .. }));
        assert!(matches!(handle.try_recv().unwrap(), DiaryEvent::Saved { .. }));
        assert_eq!(
            handle.try_recv().unwrap(),
            DiaryEvent::Dropped {
                reason: DropReason::BufferOverflow
            }
        );
        assert!(handle.try_recv().is_err());
    }

    #[test]
    fn test_unsubscribe_with_full_buffer_still_notifies() {
        let manager = SubscriptionManager::new();
        let handle = manager.subscribe(SubscriptionConfig {
            buffer_size: 1,
            ..Default::default()
        });

        manager.publish(saved());
        manager.unsubscribe(handle.id);

        assert!(matches!(handle.try_recv().unwrap(), DiaryEvent::Saved { .. }));
        assert_eq!(
            handle.try_recv().unwrap(),
            DiaryEvent::Dropped {
                reason: DropReason::Unsubscribed
            }
        );
    }

    #[test]
    fn test_dropped_receiver_is_removed() {
        let manager = SubscriptionManager::new();
        let handle = manager.subscribe(SubscriptionConfig::default());
        drop(handle);

        manager.publish(saved());
        assert_eq!(manager.subscription_count(), 0);
    }

    #[test]
    fn test_event_serializes_tagged() {
        let json = serde_json::to_value(DiaryEvent::Cleared { observations: 4 }).unwrap();
        assert_eq!(json["type"], "cleared");
        assert_eq!(json["observations"], 4);
    }
}
