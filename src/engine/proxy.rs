//! The [`EventProxy`] facade and lifecycle actor.
//!
//! The facade is cheap to clone and safe to use from any task; every
//! lifecycle operation is forwarded to one actor task that exclusively owns
//! the session handles. Subscriber registration goes straight to the
//! registry, which owns the subscriber set.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bridge::{InstrumentationBridge, ProtocolEventBridge};
use crate::broadcast::{Broadcaster, SubscriberInfo, SubscriberRegistry, SubscriberTransport};
use crate::config::ProxyConfig;
use crate::error::{Error, Result};
use crate::identifiers::SubscriberId;
use crate::notify::{Notification, Notifier};
use crate::protocol::{Domain, timestamp_ms};
use crate::session::provider::{ConnectOptions, SessionHandles, SessionProvider};

use super::state::ConnectionState;

// ============================================================================
// ConnectInfo
// ============================================================================

/// Result of a completed connect.
#[derive(Debug, Clone)]
pub struct ConnectInfo {
    /// Hosted session id, when known.
    pub session_id: Option<String>,

    /// Transition time in milliseconds since the Unix epoch.
    pub timestamp: u64,
}

// ============================================================================
// LifecycleCommand
// ============================================================================

/// Commands for the lifecycle actor.
enum LifecycleCommand {
    /// Acquire a session and install the bridges.
    Connect {
        reply: oneshot::Sender<Result<ConnectInfo>>,
    },
    /// Release the session.
    Disconnect {
        reason: Option<String>,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Forward a protocol command through the active session.
    SendCommand {
        method: String,
        params: Value,
        reply: oneshot::Sender<Result<Value>>,
    },
    /// Release the session and stop the actor.
    Shutdown,
}

// ============================================================================
// EventProxy
// ============================================================================

/// Shared inner state for the proxy.
struct ProxyInner {
    /// Channel to the lifecycle actor.
    command_tx: mpsc::UnboundedSender<LifecycleCommand>,
    /// State mirror, written only by the actor.
    state: Arc<Mutex<ConnectionState>>,
    /// Subscriber registry.
    registry: Arc<SubscriberRegistry>,
    /// Event fan-out.
    broadcaster: Arc<Broadcaster>,
    /// Notification channel.
    notifier: Notifier,
    /// Engine creation time in milliseconds since the Unix epoch.
    created_at: u64,
}

impl Drop for ProxyInner {
    fn drop(&mut self) {
        let _ = self.command_tx.send(LifecycleCommand::Shutdown);
    }
}

/// Event-stream relay engine.
///
/// # Example
///
/// ```ignore
/// use browserbase_event_proxy::{EventProxy, ProxyConfig, RemoteSessionProvider};
///
/// let config = ProxyConfig::from_env();
/// let proxy = EventProxy::new(config, Arc::new(RemoteSessionProvider::new()));
///
/// let info = proxy.connect().await?;
/// println!("relaying session {:?}", info.session_id);
/// ```
#[derive(Clone)]
pub struct EventProxy {
    inner: Arc<ProxyInner>,
}

// ============================================================================
// EventProxy - Construction
// ============================================================================

impl EventProxy {
    /// Creates a proxy over the given provider and spawns the lifecycle
    /// actor.
    #[must_use]
    pub fn new(config: ProxyConfig, provider: Arc<dyn SessionProvider>) -> Self {
        let notifier = Notifier::new();
        let registry = SubscriberRegistry::new(notifier.clone());
        let broadcaster = Broadcaster::new(Arc::clone(&registry), notifier.clone());
        let state = Arc::new(Mutex::new(ConnectionState::Disconnected));

        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let actor = LifecycleActor {
            provider,
            config,
            state: Arc::clone(&state),
            broadcaster: Arc::clone(&broadcaster),
            notifier: notifier.clone(),
            session: None,
        };
        tokio::spawn(actor.run(command_rx));

        Self {
            inner: Arc::new(ProxyInner {
                command_tx,
                state,
                registry,
                broadcaster,
                notifier,
                created_at: timestamp_ms(),
            }),
        }
    }
}

// ============================================================================
// EventProxy - Lifecycle
// ============================================================================

impl EventProxy {
    /// Connects to a browser session and starts relaying events.
    ///
    /// A no-op while already connecting or connected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] (or the provider's fault) when session
    /// acquisition fails; the proxy reverts to disconnected.
    pub async fn connect(&self) -> Result<ConnectInfo> {
        let (reply, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(LifecycleCommand::Connect { reply })
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await?
    }

    /// Disconnects from the session, releasing every handle.
    ///
    /// A no-op while already disconnected.
    pub async fn disconnect(&self, reason: Option<String>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(LifecycleCommand::Disconnect { reason, reply })
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await?
    }

    /// Forwards a protocol command through the active session.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownDomain`] when the method's domain prefix is outside
    ///   the fixed set
    /// - [`Error::NotConnected`] when no session is active
    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value> {
        Domain::of_method(method)?;

        let (reply, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(LifecycleCommand::SendCommand {
                method: method.to_string(),
                params,
                reply,
            })
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await?
    }

    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Returns `true` while a session is connected.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Returns the engine creation time in milliseconds since the Unix
    /// epoch.
    #[inline]
    #[must_use]
    pub fn created_at(&self) -> u64 {
        self.inner.created_at
    }
}

// ============================================================================
// EventProxy - Subscribers
// ============================================================================

impl EventProxy {
    /// Registers a subscriber transport, returning its stable id.
    ///
    /// Idempotent per transport identity.
    pub fn add_subscriber(&self, transport: &Arc<dyn SubscriberTransport>) -> SubscriberId {
        self.inner.registry.add(transport)
    }

    /// Removes a subscriber transport's registration, if present.
    pub fn remove_subscriber(&self, transport: &Arc<dyn SubscriberTransport>) {
        self.inner.registry.remove(transport);
    }

    /// Returns the number of registered subscribers.
    #[inline]
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.count()
    }

    /// Looks up a subscriber by id.
    #[must_use]
    pub fn lookup_subscriber(&self, id: SubscriberId) -> Option<SubscriberInfo> {
        self.inner.registry.lookup(id)
    }

    /// Subscribes to the typed notification channel.
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifier.subscribe()
    }

    /// Returns the broadcaster, for delivering events from outside the
    /// session pump (diagnostics, replay tooling).
    #[inline]
    #[must_use]
    pub fn broadcaster(&self) -> Arc<Broadcaster> {
        Arc::clone(&self.inner.broadcaster)
    }
}

// ============================================================================
// LifecycleActor
// ============================================================================

/// An acquired session plus its running event pump.
struct ActiveSession {
    handles: SessionHandles,
    pump: Option<JoinHandle<()>>,
}

/// Exclusive owner of the session handles and state transitions.
struct LifecycleActor {
    provider: Arc<dyn SessionProvider>,
    config: ProxyConfig,
    state: Arc<Mutex<ConnectionState>>,
    broadcaster: Arc<Broadcaster>,
    notifier: Notifier,
    session: Option<ActiveSession>,
}

impl LifecycleActor {
    /// Command loop. Runs until shutdown or every facade clone is dropped.
    async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<LifecycleCommand>) {
        while let Some(command) = command_rx.recv().await {
            match command {
                LifecycleCommand::Connect { reply } => {
                    let _ = reply.send(self.handle_connect().await);
                }
                LifecycleCommand::Disconnect { reason, reply } => {
                    self.handle_disconnect(reason).await;
                    let _ = reply.send(Ok(()));
                }
                LifecycleCommand::SendCommand {
                    method,
                    params,
                    reply,
                } => {
                    let _ = reply.send(self.handle_send(&method, params).await);
                }
                LifecycleCommand::Shutdown => {
                    self.handle_disconnect(None).await;
                    break;
                }
            }
        }

        debug!("Lifecycle actor terminated");
    }

    /// Moves the state mirror through a legal transition.
    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.lock();
        debug_assert!(state.can_transition(next), "{} -> {next}", *state);
        debug!(from = %*state, to = %next, "Connection state transition");
        *state = next;
    }

    /// Acquires a session and installs the bridges.
    async fn handle_connect(&mut self) -> Result<ConnectInfo> {
        let current = *self.state.lock();
        if current != ConnectionState::Disconnected {
            debug!(state = %current, "connect() while active is a no-op");
            return Ok(ConnectInfo {
                session_id: self
                    .session
                    .as_ref()
                    .and_then(|s| s.handles.session_id.clone()),
                timestamp: timestamp_ms(),
            });
        }

        self.set_state(ConnectionState::Connecting);

        let options = ConnectOptions::from(&self.config);
        let handles = match self.provider.connect(&options).await {
            Ok(handles) => handles,
            Err(e) => {
                // The only hard failure: revert and surface
                warn!(error = %e, "Session acquisition failed");
                self.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let session_id = handles.session_id.clone();

        // Bridge installation degrades gracefully: the session stays usable
        // for commands even if event relaying could not be set up.
        let instrumentation = Arc::new(InstrumentationBridge::new(session_id.clone()));
        if let Err(e) = instrumentation
            .inject(&handles.protocol, &handles.page)
            .await
        {
            warn!(error = %e, "Instrumentation injection failed");
        }

        let bridge =
            ProtocolEventBridge::new(self.config.enabled_domains.clone(), session_id.clone());
        let pump = match bridge
            .attach(&handles, instrumentation, Arc::clone(&self.broadcaster))
            .await
        {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "Protocol event bridge attach failed");
                None
            }
        };

        self.session = Some(ActiveSession { handles, pump });
        self.set_state(ConnectionState::Connected);

        let timestamp = timestamp_ms();
        self.notifier.publish(Notification::Connected {
            session_id: session_id.clone(),
            timestamp,
        });
        info!(
            session_id = session_id.as_deref().unwrap_or("<local>"),
            "Session connected"
        );

        Ok(ConnectInfo {
            session_id,
            timestamp,
        })
    }

    /// Releases the session handles in order, each fault-tolerant.
    async fn handle_disconnect(&mut self, reason: Option<String>) {
        let Some(active) = self.session.take() else {
            debug!("disconnect() while disconnected is a no-op");
            return;
        };

        if let Some(pump) = active.pump {
            pump.abort();
        }

        let session_id = active.handles.session_id.clone();
        let released = self.provider.disconnect(active.handles).await;
        if !released.success {
            warn!("Session release reported handle failures");
        }

        self.set_state(ConnectionState::Disconnected);

        let timestamp = timestamp_ms();
        self.notifier.publish(Notification::Disconnected {
            reason: reason.clone(),
            session_id: session_id.clone(),
            timestamp,
        });
        info!(
            session_id = session_id.as_deref().unwrap_or("<local>"),
            reason = reason.as_deref().unwrap_or("<none>"),
            "Session disconnected"
        );
    }

    /// Forwards a protocol command through the active session.
    async fn handle_send(&self, method: &str, params: Value) -> Result<Value> {
        if !self.state.lock().is_connected() {
            return Err(Error::NotConnected);
        }
        let Some(active) = self.session.as_ref() else {
            return Err(Error::NotConnected);
        };

        active.handles.protocol.send_command(method, params).await
    }
}

// ============================================================================
// Tests
// ============================================================================
