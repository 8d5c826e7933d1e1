//! Session acquisition and the protocol session surface.
//!
//! The proxy never talks to a browser directly; it goes through the
//! capability traits defined here. Two providers ship with the crate:
//!
//! | Provider | Description |
//! |----------|-------------|
//! | [`RemoteSessionProvider`] | Attaches to a hosted session over `wss://` |
//! | [`LocalSessionProvider`] | Launches a local browser process |
//!
//! Both wrap the raw devtools socket in a [`CdpSession`] and derive the
//! browser/context/page handles from it.

// ============================================================================
// Submodules
// ============================================================================

/// Devtools WebSocket session and handle implementations.
pub mod cdp;

/// Local browser launch provider.
pub mod local;

/// Session provider traits and handle seams.
pub mod provider;

/// Hosted session provider.
pub mod remote;

// ============================================================================
// Re-exports
// ============================================================================

pub use cdp::CdpSession;
pub use local::LocalSessionProvider;
pub use provider::{
    BrowserHandle, ConnectOptions, ContextHandle, DisconnectResult, PageHandle, ProtocolSession,
    SessionHandles, SessionProvider,
};
pub use remote::RemoteSessionProvider;
