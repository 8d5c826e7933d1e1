//! Normalized event envelope and subscriber wire frame.
//!
//! Every event leaving the proxy, native and synthesized alike, is
//! wrapped in an immutable [`EventEnvelope`]
//! and delivered to subscribers as one [`WireFrame`] per event:
//!
//! ```json
//! {
//!   "event": {
//!     "browserbaseSessionId": "abc123",
//!     "timestamp": 1722470400000,
//!     "type": "browser",
//!     "domain": "Page",
//!     "method": "Page.loadEventFired",
//!     "params": {}
//!   }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

use super::Domain;

// ============================================================================
// Constants
// ============================================================================

/// Envelope `type` discriminator carried on every frame.
const EVENT_KIND: &str = "browser";

// ============================================================================
// Time
// ============================================================================

/// Returns the current time as milliseconds since the Unix epoch.
#[inline]
#[must_use]
pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ============================================================================
// EventEnvelope
// ============================================================================

/// Immutable normalized event.
///
/// Built once by a bridge, then broadcast to subscribers and published on
/// the notification channel without further mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Hosted session id, when the session has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browserbase_session_id: Option<String>,

    /// Capture time in milliseconds since the Unix epoch.
    pub timestamp: u64,

    /// Envelope discriminator (always `"browser"`).
    #[serde(rename = "type")]
    pub kind: String,

    /// Domain the event belongs to.
    pub domain: Domain,

    /// Event name in `"<domain>.<name>"` format.
    pub method: String,

    /// Opaque event payload.
    pub params: Value,
}

impl EventEnvelope {
    /// Creates an envelope stamped with the current time.
    #[must_use]
    pub fn new(
        domain: Domain,
        method: impl Into<String>,
        params: Value,
        session_id: Option<String>,
    ) -> Self {
        Self {
            browserbase_session_id: session_id,
            timestamp: timestamp_ms(),
            kind: EVENT_KIND.to_string(),
            domain,
            method: method.into(),
            params,
        }
    }

    /// Creates an envelope from a raw method string, validating its domain
    /// prefix against the fixed domain set.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnknownDomain`] when the prefix is not
    /// relayed.
    pub fn from_method(method: &str, params: Value, session_id: Option<String>) -> Result<Self> {
        let domain = Domain::of_method(method)?;
        Ok(Self::new(domain, method, params, session_id))
    }

    /// Serializes the envelope into its subscriber wire frame.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if serialization fails.
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(&WireFrame { event: self })?)
    }
}

// ============================================================================
// WireFrame
// ============================================================================

/// One delivered frame: the envelope nested under an `"event"` key.
#[derive(Debug, Serialize)]
pub struct WireFrame<'a> {
    /// The normalized event.
    pub event: &'a EventEnvelope,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_envelope_new_stamps_kind_and_time() {
        let env = EventEnvelope::new(Domain::Page, "Page.loadEventFired", json!({}), None);
        assert_eq!(env.kind, "browser");
        assert_eq!(env.domain, Domain::Page);
        assert!(env.timestamp > 0);
    }

    #[test]
    fn test_from_method_valid() {
        let env = EventEnvelope::from_method("Network.requestWillBeSent", json!({}), None)
            .expect("valid domain");
        assert_eq!(env.domain, Domain::Network);
        assert_eq!(env.method, "Network.requestWillBeSent");
    }

    #[test]
    fn test_from_method_rejects_unknown_domain() {
        let result = EventEnvelope::from_method("Fetch.requestPaused", json!({}), None);
        assert!(result.unwrap_err().is_validation());
    }

    #[test]
    fn test_frame_shape() {
        let env = EventEnvelope::new(
            Domain::Page,
            "Page.loadEventFired",
            json!({"url": "https://example.com"}),
            Some("sess-1".to_string()),
        );
        let frame = env.to_frame().expect("serialize");
        let value: Value = serde_json::from_str(&frame).expect("parse");

        let event = value.get("event").expect("event key");
        assert_eq!(event["browserbaseSessionId"], "sess-1");
        assert_eq!(event["type"], "browser");
        assert_eq!(event["domain"], "Page");
        assert_eq!(event["method"], "Page.loadEventFired");
        assert_eq!(event["params"]["url"], "https://example.com");
        assert!(event["timestamp"].is_u64());
    }

    #[test]
    fn test_frame_omits_missing_session_id() {
        let env = EventEnvelope::new(Domain::Console, "Console.messageAdded", json!({}), None);
        let frame = env.to_frame().expect("serialize");
        let value: Value = serde_json::from_str(&frame).expect("parse");

        assert!(value["event"].get("browserbaseSessionId").is_none());
    }

    #[test]
    fn test_envelope_deserializes() {
        let json_str = r#"{
            "browserbaseSessionId": "sess-2",
            "timestamp": 1722470400000,
            "type": "browser",
            "domain": "DOM",
            "method": "DOM.interaction.click",
            "params": {"type": "click"}
        }"#;

        let env: EventEnvelope = serde_json::from_str(json_str).expect("parse");
        assert_eq!(env.domain, Domain::Dom);
        assert_eq!(env.browserbase_session_id.as_deref(), Some("sess-2"));
    }
}
