//! Browserbase Event Proxy - browser event relay library.
//!
//! This library relays structured events from a single remote browser
//! session to many concurrent subscribers, and augments the native protocol
//! stream with synthesized DOM-interaction events captured by script
//! instrumentation injected into the page.
//!
//! # Architecture
//!
//! The proxy sits between one browser session and N subscribers:
//!
//! - **Session side**: acquires a devtools session (hosted or locally
//!   launched), enables the configured domains, and pumps the raw event
//!   stream.
//! - **Page side**: injects a DOM tracker whose only path back out of the
//!   page's isolated context is a marker-prefixed console side channel.
//! - **Subscriber side**: fans every normalized event out as one JSON frame
//!   per event, best-effort, pruning closed transports.
//!
//! Key design principles:
//!
//! - One lifecycle actor owns the session; connect/disconnect never race
//! - Events are delivered in session order; one fan-out finishes before the
//!   next begins
//! - Every boundary fault is normalized locally; only session acquisition
//!   fails a `connect()` outright
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use browserbase_event_proxy::{
//!     EventProxy, ProxyConfig, RemoteSessionProvider, Result, SubscriberServer,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ProxyConfig::from_env();
//!     let proxy = EventProxy::new(config, Arc::new(RemoteSessionProvider::new()));
//!
//!     // Accept subscribers, then start relaying
//!     let server = SubscriberServer::bind(proxy.clone(), 8787).await?;
//!     println!("subscribers: {}", server.ws_url());
//!
//!     let info = proxy.connect().await?;
//!     println!("relaying session {:?}", info.session_id);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bridge`] | Protocol-event and instrumentation bridges |
//! | [`broadcast`] | Subscriber registry and event fan-out |
//! | [`config`] | Proxy configuration and builder |
//! | [`engine`] | [`EventProxy`] lifecycle engine |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`notify`] | Typed notification channel |
//! | [`protocol`] | Event envelopes and protocol message types |
//! | [`server`] | Subscriber-facing WebSocket server |
//! | [`session`] | Session providers and protocol session surface |

// ============================================================================
// Modules
// ============================================================================

/// Protocol-event and instrumentation bridges.
///
/// The instrumentation bridge carries the in-page DOM tracker and decodes
/// its console side channel; the protocol bridge normalizes native events.
pub mod bridge;

/// Subscriber registry and event fan-out.
pub mod broadcast;

/// Proxy configuration and builder.
///
/// Use [`ProxyConfig::builder()`] or [`ProxyConfig::from_env()`].
pub mod config;

/// Session lifecycle engine.
///
/// [`EventProxy`] is the coordinating type for the whole crate.
pub mod engine;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for proxy entities.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Typed notification channel.
pub mod notify;

/// Event envelopes and protocol message types.
pub mod protocol;

/// Subscriber-facing WebSocket server.
pub mod server;

/// Session providers and the protocol session surface.
pub mod session;

#[cfg(test)]
pub(crate) mod testutil;

// ============================================================================
// Re-exports
// ============================================================================

// Engine types
pub use engine::{ConnectInfo, ConnectionState, EventProxy};

// Configuration types
pub use config::{ProxyConfig, ProxyConfigBuilder};

// Error types
pub use error::{Error, Result, StatusClass};

// Identifier types
pub use identifiers::{CommandId, SubscriberId, TransportKey};

// Notification types
pub use notify::{Notification, Notifier};

// Protocol types
pub use protocol::{Domain, DomInteractionDetail, DomInteractionPayload, EventEnvelope};

// Session types
pub use session::{
    ConnectOptions, LocalSessionProvider, RemoteSessionProvider, SessionHandles, SessionProvider,
};

// Broadcast types
pub use broadcast::{Broadcaster, SubscriberInfo, SubscriberRegistry, SubscriberTransport};

// Server types
pub use server::SubscriberServer;
