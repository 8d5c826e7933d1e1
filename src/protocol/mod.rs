//! Protocol message and event types.
//!
//! This module defines the shapes shared between the protocol session,
//! the bridges, and the subscriber wire format.
//!
//! # Event Flow
//!
//! | Type | Direction | Purpose |
//! |------|-----------|---------|
//! | [`CommandRequest`] | Proxy → Session | Protocol command |
//! | [`CommandResponse`] | Session → Proxy | Command result |
//! | [`RawEvent`] | Session → Proxy | Unnormalized protocol event |
//! | [`EventEnvelope`] | Proxy → Subscribers | Normalized event frame |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `domain` | Fixed protocol domain set |
//! | `envelope` | Normalized event envelope and wire frame |
//! | `dom` | DOM interaction detail payloads |
//! | `message` | Session-level command/response/event shapes |

// ============================================================================
// Submodules
// ============================================================================

/// Fixed protocol domain set.
pub mod domain;

/// DOM interaction detail payloads.
pub mod dom;

/// Normalized event envelope and subscriber wire frame.
pub mod envelope;

/// Session-level command, response, and raw event shapes.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use domain::Domain;
pub use dom::{BoundingRect, DomInteractionDetail, DomInteractionPayload};
pub use envelope::{EventEnvelope, WireFrame, timestamp_ms};
pub use message::{CommandError, CommandRequest, CommandResponse, RawEvent};
