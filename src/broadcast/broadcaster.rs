//! Per-event serialization and fan-out.
//!
//! Each event is serialized exactly once, then delivered to every live
//! subscriber in turn. A transport that reports closed is pruned instead of
//! written to; a transport that fails mid-send is logged, pruned, and the
//! fan-out continues. The fan-out for one event completes before the caller
//! moves on to the next, which preserves cross-subscriber event ordering.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tracing::{trace, warn};

use crate::notify::{Notification, Notifier};
use crate::protocol::EventEnvelope;

use super::registry::SubscriberRegistry;

// ============================================================================
// Broadcaster
// ============================================================================

/// Fans normalized events out to the registered subscribers.
pub struct Broadcaster {
    registry: Arc<SubscriberRegistry>,
    notifier: Notifier,
}

impl Broadcaster {
    /// Creates a broadcaster over the given registry.
    #[must_use]
    pub fn new(registry: Arc<SubscriberRegistry>, notifier: Notifier) -> Arc<Self> {
        Arc::new(Self { registry, notifier })
    }

    /// Delivers one event to every open subscriber transport.
    ///
    /// Returns the number of successful deliveries.
    pub async fn broadcast(&self, event: &EventEnvelope) -> usize {
        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(method = %event.method, error = %e, "Event serialization failed");
                return 0;
            }
        };

        let mut delivered = 0;
        for (key, id, transport) in self.registry.active() {
            if !transport.is_open() {
                trace!(subscriber = %id, "Transport closed, pruning");
                self.registry.remove_key(key);
                continue;
            }

            match transport.send_frame(&frame).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(subscriber = %id, error = %e, "Delivery failed, pruning");
                    self.registry.remove_key(key);
                }
            }
        }

        trace!(method = %event.method, delivered, "Event broadcast");
        delivered
    }

    /// Delivers one event through the dual path: subscriber fan-out plus the
    /// notification channel.
    pub async fn deliver(&self, event: EventEnvelope) {
        self.broadcast(&event).await;
        self.notifier.publish(Notification::Event(event));
    }
}

// ============================================================================
// Tests
// ============================================================================
