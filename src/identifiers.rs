//! Type-safe identifiers for proxy entities.
//!
//! Newtype wrappers prevent mixing incompatible ids at compile time:
//!
//! | Type | Backing | Used for |
//! |------|---------|----------|
//! | [`SubscriberId`] | UUID v4 | Subscribers in the registry |
//! | [`CommandId`] | u64 | Protocol request/response correlation |
//! | [`TransportKey`] | pointer identity | Idempotent transport registration |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// SubscriberId
// ============================================================================

/// Opaque stable identifier for a registered subscriber.
///
/// Stable for the life of one transport connection: re-registering the same
/// transport yields the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// Generates a fresh random id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses an id from its string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Returns the underlying UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// CommandId
// ============================================================================

/// Monotonic identifier correlating protocol commands with their responses.
///
/// Allocated per protocol session; the wire carries it as a JSON integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(u64);

impl CommandId {
    /// Creates a command id from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// TransportKey
// ============================================================================

/// Identity key for a subscriber transport handle.
///
/// Derived from the `Arc` allocation address, so the same shared transport
/// always maps to the same key while it is alive. Keys are never dereferenced;
/// a key may only be compared against keys of live registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportKey(usize);

impl TransportKey {
    /// Returns the identity key for a shared transport handle.
    #[inline]
    #[must_use]
    pub fn of<T: ?Sized>(transport: &Arc<T>) -> Self {
        Self(Arc::as_ptr(transport) as *const () as usize)
    }
}

impl fmt::Display for TransportKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriber_id_unique() {
        let a = SubscriberId::generate();
        let b = SubscriberId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_subscriber_id_parse_roundtrip() {
        let id = SubscriberId::generate();
        let parsed = SubscriberId::parse(&id.to_string()).expect("parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_subscriber_id_parse_rejects_garbage() {
        assert!(SubscriberId::parse("not-a-uuid").is_none());
    }

    #[test]
    fn test_command_id_value() {
        let id = CommandId::new(42);
        assert_eq!(id.value(), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn test_command_id_serializes_as_integer() {
        let id = CommandId::new(7);
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "7");
    }

    #[test]
    fn test_transport_key_identity() {
        let a: Arc<str> = Arc::from("transport");
        let b = Arc::clone(&a);
        let c: Arc<str> = Arc::from("transport");

        assert_eq!(TransportKey::of(&a), TransportKey::of(&b));
        assert_ne!(TransportKey::of(&a), TransportKey::of(&c));
    }
}
