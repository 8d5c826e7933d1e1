//! Protocol-event and instrumentation bridges.
//!
//! Two bridges sit between the protocol session and the broadcaster:
//!
//! | Bridge | Description |
//! |--------|-------------|
//! | [`ProtocolEventBridge`] | Enables domains, normalizes native events, drives the pump |
//! | [`InstrumentationBridge`] | Injects the DOM tracker, decodes its console side channel |
//!
//! # Side Channel
//!
//! The injected script runs inside the page's isolated context; its only
//! path back to the controller is console output. Captured interactions are
//! emitted as a marker-prefixed first argument plus a JSON payload second
//! argument, and decoded back into normalized events out here.

// ============================================================================
// Submodules
// ============================================================================

/// In-page DOM tracker injection and side-channel decoding.
pub mod instrumentation;

/// Domain enabling, native event normalization, and the event pump.
pub mod protocol_events;

// ============================================================================
// Re-exports
// ============================================================================

pub use instrumentation::{
    DecodeOutcome, INITIALIZED_MARKER, INTERACTION_MARKER_PREFIX, InstrumentationBridge,
    MARKER_PREFIX,
};
pub use protocol_events::{NATIVE_EVENT_METHODS, ProtocolEventBridge};
