//! Typed notification channel.
//!
//! Lifecycle and subscriber activity is published as a typed [`Notification`]
//! enum over a `tokio::sync::broadcast` channel. Each consumer holds its own
//! receiver: a slow or dropped consumer lags independently and cannot affect
//! other consumers or the event fan-out.
//!
//! # Notification Kinds
//!
//! | Kind | Payload |
//! |------|---------|
//! | `connect` | optional session id, timestamp |
//! | `disconnect` | optional reason, optional session id, timestamp |
//! | `event` | full [`EventEnvelope`] |
//! | `client-connected` | subscriber id, timestamp |
//! | `client-disconnected` | subscriber id, timestamp |

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::broadcast;
use tracing::trace;

use crate::identifiers::SubscriberId;
use crate::protocol::EventEnvelope;

// ============================================================================
// Constants
// ============================================================================

/// Buffered notifications per receiver before lagging.
const NOTIFY_CAPACITY: usize = 256;

// ============================================================================
// Notification
// ============================================================================

/// A typed notification emitted by the proxy.
#[derive(Debug, Clone)]
pub enum Notification {
    /// The session transitioned to connected.
    Connected {
        /// Hosted session id, when known.
        session_id: Option<String>,
        /// Transition time in milliseconds since the Unix epoch.
        timestamp: u64,
    },

    /// The session transitioned to disconnected.
    Disconnected {
        /// Caller-supplied reason, when given.
        reason: Option<String>,
        /// Hosted session id of the released session, when known.
        session_id: Option<String>,
        /// Transition time in milliseconds since the Unix epoch.
        timestamp: u64,
    },

    /// A normalized event passed through the proxy.
    Event(EventEnvelope),

    /// A subscriber registered.
    ClientConnected {
        /// The new subscriber's id.
        id: SubscriberId,
        /// Registration time in milliseconds since the Unix epoch.
        timestamp: u64,
    },

    /// A subscriber was removed.
    ClientDisconnected {
        /// The removed subscriber's id.
        id: SubscriberId,
        /// Removal time in milliseconds since the Unix epoch.
        timestamp: u64,
    },
}

impl Notification {
    /// Returns the notification kind as a stable string.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connect",
            Self::Disconnected { .. } => "disconnect",
            Self::Event(_) => "event",
            Self::ClientConnected { .. } => "client-connected",
            Self::ClientDisconnected { .. } => "client-disconnected",
        }
    }
}

// ============================================================================
// Notifier
// ============================================================================

/// Shared publisher for [`Notification`]s.
///
/// Cloning is cheap; all clones publish into the same channel.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    /// Creates a notifier with the default buffer capacity.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self { tx }
    }

    /// Subscribes a new consumer.
    ///
    /// The receiver observes notifications published after this call.
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Publishes a notification to all current consumers.
    ///
    /// Publishing with no consumers is not an error.
    pub fn publish(&self, notification: Notification) {
        let kind = notification.kind();
        match self.tx.send(notification) {
            Ok(receivers) => trace!(kind, receivers, "Notification published"),
            Err(_) => trace!(kind, "Notification dropped (no consumers)"),
        }
    }

    /// Returns the number of active consumers.
    #[inline]
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
