//! Subscriber identity and transport tracking.
//!
//! The registry maps transport handles to stable [`SubscriberId`]s. A
//! transport registered twice keeps its id (and gets its activity time
//! refreshed), so reconnect-free duplicate registration is harmless.
//!
//! Transports are held as `Weak` references: the registry tracks them but
//! never owns them. Closing a transport is the transport owner's job; the
//! registry only reacts, via the close hook it installs at registration.

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::error::Result;
use crate::identifiers::{SubscriberId, TransportKey};
use crate::notify::{Notification, Notifier};
use crate::protocol::timestamp_ms;

// ============================================================================
// SubscriberTransport
// ============================================================================

/// Hook invoked when a transport closes.
pub type CloseHook = Box<dyn Fn() + Send + Sync>;

/// Delivery channel to one subscriber.
///
/// Implementations report liveness via [`is_open`](Self::is_open) and accept
/// one serialized frame at a time. The registry installs a close hook so the
/// transport can announce its own demise.
#[async_trait]
pub trait SubscriberTransport: Send + Sync {
    /// Returns `true` while frames can still be delivered.
    fn is_open(&self) -> bool;

    /// Delivers one serialized frame.
    async fn send_frame(&self, frame: &str) -> Result<()>;

    /// Installs the close hook. Later installs replace earlier ones.
    fn set_close_hook(&self, hook: CloseHook);
}

// ============================================================================
// SubscriberInfo
// ============================================================================

/// Lookup view of one registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberInfo {
    /// Stable subscriber id.
    pub id: SubscriberId,
    /// Registration time in milliseconds since the Unix epoch.
    pub created_at: u64,
    /// Last registration refresh in milliseconds since the Unix epoch.
    pub last_active_at: u64,
}

// ============================================================================
// SubscriberEntry
// ============================================================================

/// Internal registry entry.
struct SubscriberEntry {
    id: SubscriberId,
    transport: Weak<dyn SubscriberTransport>,
    created_at: u64,
    last_active_at: u64,
}

// ============================================================================
// SubscriberRegistry
// ============================================================================

/// Internal map pair, kept consistent under one lock.
#[derive(Default)]
struct RegistryInner {
    by_key: FxHashMap<TransportKey, SubscriberEntry>,
    by_id: FxHashMap<SubscriberId, TransportKey>,
}

/// Tracks active subscriber identities.
///
/// The registry is the only component that mutates the subscriber set.
pub struct SubscriberRegistry {
    inner: Mutex<RegistryInner>,
    notifier: Notifier,
}

impl SubscriberRegistry {
    /// Creates a new registry publishing on the given notifier.
    #[must_use]
    pub fn new(notifier: Notifier) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(RegistryInner::default()),
            notifier,
        })
    }

    /// Registers a transport, returning its stable id.
    ///
    /// Idempotent per transport identity: a repeat registration returns the
    /// existing id and refreshes `last_active_at` without emitting another
    /// client-connected notification.
    pub fn add(self: &Arc<Self>, transport: &Arc<dyn SubscriberTransport>) -> SubscriberId {
        let key = TransportKey::of(transport);
        let now = timestamp_ms();

        let (id, fresh) = {
            let mut inner = self.inner.lock();
            if let Some(entry) = inner.by_key.get_mut(&key) {
                entry.last_active_at = now;
                (entry.id, false)
            } else {
                let id = SubscriberId::generate();
                inner.by_key.insert(
                    key,
                    SubscriberEntry {
                        id,
                        transport: Arc::downgrade(transport),
                        created_at: now,
                        last_active_at: now,
                    },
                );
                inner.by_id.insert(id, key);
                (id, true)
            }
        };

        if !fresh {
            trace!(id = %id, "Transport already registered");
            return id;
        }

        // Remove the subscriber when the transport owner closes it
        let registry = Arc::downgrade(self);
        transport.set_close_hook(Box::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.remove_key(key);
            }
        }));

        debug!(id = %id, key = %key, "Subscriber registered");
        self.notifier.publish(Notification::ClientConnected {
            id,
            timestamp: now,
        });
        id
    }

    /// Removes a transport's registration, if present.
    pub fn remove(&self, transport: &Arc<dyn SubscriberTransport>) {
        self.remove_key(TransportKey::of(transport));
    }

    /// Removes a registration by transport identity, if present.
    pub fn remove_key(&self, key: TransportKey) {
        let removed = {
            let mut inner = self.inner.lock();
            match inner.by_key.remove(&key) {
                Some(entry) => {
                    inner.by_id.remove(&entry.id);
                    Some(entry.id)
                }
                None => None,
            }
        };

        if let Some(id) = removed {
            debug!(id = %id, "Subscriber removed");
            self.notifier.publish(Notification::ClientDisconnected {
                id,
                timestamp: timestamp_ms(),
            });
        }
    }

    /// Returns the number of registered subscribers.
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.lock().by_key.len()
    }

    /// Looks up a subscriber by id.
    #[must_use]
    pub fn lookup(&self, id: SubscriberId) -> Option<SubscriberInfo> {
        let inner = self.inner.lock();
        let key = inner.by_id.get(&id)?;
        inner.by_key.get(key).map(|entry| SubscriberInfo {
            id: entry.id,
            created_at: entry.created_at,
            last_active_at: entry.last_active_at,
        })
    }

    /// Snapshots the live subscriber set for fan-out.
    ///
    /// Entries whose transport has been dropped are pruned on the way out.
    pub(crate) fn active(&self) -> Vec<(TransportKey, SubscriberId, Arc<dyn SubscriberTransport>)> {
        let mut live = Vec::new();
        let mut dead = Vec::new();

        {
            let inner = self.inner.lock();
            for (key, entry) in &inner.by_key {
                match entry.transport.upgrade() {
                    Some(transport) => live.push((*key, entry.id, transport)),
                    None => dead.push(*key),
                }
            }
        }

        for key in dead {
            self.remove_key(key);
        }

        live
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testutil::RecordingTransport;

    fn registry() -> Arc<SubscriberRegistry> {
        SubscriberRegistry::new(Notifier::new())
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let registry = registry();
        let transport: Arc<dyn SubscriberTransport> = Arc::new(RecordingTransport::new());

        let first = registry.add(&transport);
        let second = registry.add(&transport);

        assert_eq!(first, second);
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn test_distinct_transports_get_distinct_ids() {
        let registry = registry();
        let a: Arc<dyn SubscriberTransport> = Arc::new(RecordingTransport::new());
        let b: Arc<dyn SubscriberTransport> = Arc::new(RecordingTransport::new());

        assert_ne!(registry.add(&a), registry.add(&b));
        assert_eq!(registry.count(), 2);
    }

    #[tokio::test]
    async fn test_remove_and_noop_remove() {
        let registry = registry();
        let transport: Arc<dyn SubscriberTransport> = Arc::new(RecordingTransport::new());

        registry.add(&transport);
        registry.remove(&transport);
        assert_eq!(registry.count(), 0);

        // Second remove is a no-op
        registry.remove(&transport);
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn test_lookup() {
        let registry = registry();
        let transport: Arc<dyn SubscriberTransport> = Arc::new(RecordingTransport::new());

        let id = registry.add(&transport);
        let info = registry.lookup(id).expect("registered");
        assert_eq!(info.id, id);
        assert!(info.created_at > 0);

        registry.remove(&transport);
        assert!(registry.lookup(id).is_none());
    }

    #[tokio::test]
    async fn test_close_hook_removes_subscriber() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();
        let registry = SubscriberRegistry::new(notifier);

        let concrete = Arc::new(RecordingTransport::new());
        let transport: Arc<dyn SubscriberTransport> = concrete.clone();
        registry.add(&transport);
        assert_eq!(registry.count(), 1);

        concrete.fire_close_hook();
        assert_eq!(registry.count(), 0);

        let connected = rx.recv().await.expect("client-connected");
        assert_eq!(connected.kind(), "client-connected");
        let disconnected = rx.recv().await.expect("client-disconnected");
        assert_eq!(disconnected.kind(), "client-disconnected");
    }

    #[tokio::test]
    async fn test_active_prunes_dropped_transports() {
        let registry = registry();
        let keep: Arc<dyn SubscriberTransport> = Arc::new(RecordingTransport::new());
        let drop_me: Arc<dyn SubscriberTransport> = Arc::new(RecordingTransport::new());

        registry.add(&keep);
        registry.add(&drop_me);
        drop(drop_me);

        let live = registry.active();
        assert_eq!(live.len(), 1);
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn test_refresh_updates_last_active() {
        let registry = registry();
        let transport: Arc<dyn SubscriberTransport> = Arc::new(RecordingTransport::new());

        let id = registry.add(&transport);
        let before = registry.lookup(id).expect("registered");

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        registry.add(&transport);
        let after = registry.lookup(id).expect("still registered");

        assert!(after.last_active_at >= before.last_active_at);
        assert_eq!(after.created_at, before.created_at);
    }
}
