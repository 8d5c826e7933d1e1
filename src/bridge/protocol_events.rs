//! Domain enabling, native event normalization, and the event pump.
//!
//! The bridge enables each configured domain (best-effort), then pumps the
//! session's raw event stream:
//!
//! 1. Console events are offered to the instrumentation decoder first;
//!    side-channel frames become synthesized `DOM.interaction.*` events.
//! 2. Native events in the fixed listener set are normalized into
//!    [`EventEnvelope`]s; everything else is ignored.
//! 3. Every normalized event takes the dual path: broadcast fan-out, then
//!    the notification channel.
//! 4. A page load re-triggers instrumentation injection, since navigation
//!    destroys the page's script context.
//!
//! One pump task drives all of this, so events reach subscribers in session
//! order and one event's fan-out finishes before the next begins.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::broadcast::Broadcaster;
use crate::error::{Error, Result};
use crate::protocol::{Domain, EventEnvelope, RawEvent};
use crate::session::provider::{PageHandle, ProtocolSession, SessionHandles};

use super::instrumentation::{DecodeOutcome, InstrumentationBridge};

// ============================================================================
// Constants
// ============================================================================

/// The fixed native listener set. Raw events outside it are not relayed.
pub const NATIVE_EVENT_METHODS: [&str; 8] = [
    "Page.loadEventFired",
    "Page.frameNavigated",
    "Network.requestWillBeSent",
    "Network.responseReceived",
    "Console.messageAdded",
    "Runtime.consoleAPICalled",
    "Runtime.exceptionThrown",
    "DOM.documentUpdated",
];

/// Console event offered to the side-channel decoder.
const CONSOLE_API_METHOD: &str = "Runtime.consoleAPICalled";

/// Page load event that re-triggers instrumentation.
const PAGE_LOAD_METHOD: &str = "Page.loadEventFired";

// ============================================================================
// ProtocolEventBridge
// ============================================================================

/// Enables protocol domains and normalizes the native event stream.
#[derive(Clone)]
pub struct ProtocolEventBridge {
    /// Domains to issue enable commands for.
    enabled: Vec<Domain>,
    /// Session id stamped on normalized events.
    session_id: Option<String>,
}

impl ProtocolEventBridge {
    /// Creates a bridge for the given domain set and session.
    #[inline]
    #[must_use]
    pub fn new(enabled: Vec<Domain>, session_id: Option<String>) -> Self {
        Self {
            enabled,
            session_id,
        }
    }

    /// Issues an enable command for each configured domain.
    ///
    /// Best-effort: a domain that refuses to enable is logged and skipped,
    /// never fatal.
    pub async fn enable_domains(&self, protocol: &Arc<dyn ProtocolSession>) {
        for domain in &self.enabled {
            match protocol
                .send_command(&domain.enable_method(), Value::Object(Default::default()))
                .await
            {
                Ok(_) => trace!(domain = %domain, "Domain enabled"),
                Err(e) => warn!(domain = %domain, error = %e, "Domain enable failed, skipping"),
            }
        }
    }

    /// Normalizes a raw event into an envelope.
    ///
    /// Returns `None` for events outside the fixed listener set and for
    /// events whose domain prefix is rejected.
    #[must_use]
    pub fn normalize(&self, raw: &RawEvent) -> Option<EventEnvelope> {
        if !NATIVE_EVENT_METHODS.contains(&raw.method.as_str()) {
            trace!(method = %raw.method, "Event outside listener set, ignoring");
            return None;
        }

        match raw.domain() {
            Ok(domain) => Some(EventEnvelope::new(
                domain,
                raw.method.clone(),
                raw.params.clone(),
                self.session_id.clone(),
            )),
            Err(e) => {
                warn!(method = %raw.method, error = %e, "Event rejected");
                None
            }
        }
    }

    /// Attaches the bridge to a session: enables domains, takes the raw
    /// event stream, and spawns the pump task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] when the session's event stream has
    /// already been taken.
    pub async fn attach(
        &self,
        handles: &SessionHandles,
        instrumentation: Arc<InstrumentationBridge>,
        broadcaster: Arc<Broadcaster>,
    ) -> Result<JoinHandle<()>> {
        self.enable_domains(&handles.protocol).await;

        let events = handles
            .protocol
            .take_events()
            .ok_or_else(|| Error::session("Session event stream already taken"))?;

        debug!(domains = self.enabled.len(), "Protocol event bridge attached");

        Ok(tokio::spawn(Self::pump(
            self.clone(),
            events,
            Arc::clone(&handles.page),
            instrumentation,
            broadcaster,
        )))
    }

    /// The event pump: decode, normalize, deliver, re-inject.
    async fn pump(
        bridge: Self,
        mut events: mpsc::UnboundedReceiver<RawEvent>,
        page: Arc<dyn PageHandle>,
        instrumentation: Arc<InstrumentationBridge>,
        broadcaster: Arc<Broadcaster>,
    ) {
        while let Some(raw) = events.recv().await {
            // Side channel first: marker frames never surface as console events
            if raw.method == CONSOLE_API_METHOD {
                match instrumentation.decode(&raw) {
                    DecodeOutcome::Interaction(envelope) => {
                        broadcaster.deliver(envelope).await;
                        continue;
                    }
                    DecodeOutcome::Initialized => {
                        debug!("In-page instrumentation initialized");
                        continue;
                    }
                    DecodeOutcome::Malformed(e) => {
                        warn!(error = %e, "Dropped malformed side-channel payload");
                        continue;
                    }
                    DecodeOutcome::NotMarker => {}
                }
            }

            let Some(envelope) = bridge.normalize(&raw) else {
                continue;
            };

            let page_loaded = envelope.method == PAGE_LOAD_METHOD;
            broadcaster.deliver(envelope).await;

            if page_loaded {
                instrumentation.reinject(page.as_ref()).await;
            }
        }

        debug!("Protocol event pump terminated");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::notify::Notifier;
    use crate::testutil::{MockProtocolSession, console_event};

    fn bridge() -> ProtocolEventBridge {
        ProtocolEventBridge::new(vec![Domain::Page, Domain::Network], Some("sess-1".to_string()))
    }

    #[test]
    fn test_normalize_native_event() {
        let raw = RawEvent {
            method: "Network.responseReceived".to_string(),
            params: json!({"requestId": "R1"}),
            session_id: None,
        };

        let envelope = bridge().normalize(&raw).expect("normalized");
        assert_eq!(envelope.domain, Domain::Network);
        assert_eq!(envelope.method, "Network.responseReceived");
        assert_eq!(envelope.browserbase_session_id.as_deref(), Some("sess-1"));
        assert_eq!(envelope.params["requestId"], "R1");
    }

    #[test]
    fn test_normalize_ignores_unlisted_method() {
        let raw = RawEvent {
            method: "Page.frameAttached".to_string(),
            params: json!({}),
            session_id: None,
        };
        assert!(bridge().normalize(&raw).is_none());
    }

    #[test]
    fn test_normalize_ignores_foreign_domain() {
        let raw = RawEvent {
            method: "Target.targetCreated".to_string(),
            params: json!({}),
            session_id: None,
        };
        assert!(bridge().normalize(&raw).is_none());
    }

    #[test]
    fn test_listener_set_is_the_documented_eight() {
        assert_eq!(NATIVE_EVENT_METHODS.len(), 8);
        for method in NATIVE_EVENT_METHODS {
            assert!(Domain::of_method(method).is_ok(), "bad method {method}");
        }
    }

    #[tokio::test]
    async fn test_enable_domains_issues_configured_enables() {
        let session = MockProtocolSession::new();
        let protocol: Arc<dyn ProtocolSession> = session.clone();

        bridge().enable_domains(&protocol).await;

        let commands = session.commands();
        let methods: Vec<&str> = commands.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(methods, vec!["Page.enable", "Network.enable"]);
    }

    #[tokio::test]
    async fn test_enable_domains_skips_failures() {
        let session = MockProtocolSession::new();
        session.fail_method("Page.enable");
        let protocol: Arc<dyn ProtocolSession> = session.clone();

        bridge().enable_domains(&protocol).await;

        // The Page failure did not stop the Network enable
        let methods: Vec<String> = session.commands().into_iter().map(|(m, _)| m).collect();
        assert!(methods.contains(&"Network.enable".to_string()));
    }

    #[tokio::test]
    async fn test_console_marker_bypasses_native_normalization() {
        // A marker console event decodes to exactly one DOM interaction,
        // not an additional Runtime.consoleAPICalled envelope.
        let instrumentation = InstrumentationBridge::new(None);
        let raw = console_event(
            "BROWSERBASE_EVENT_PROXY:DOM_INTERACTION:CLICK",
            r#"{"type":"click","element":{"tag":"a"}}"#,
        );

        match instrumentation.decode(&raw) {
            DecodeOutcome::Interaction(env) => {
                assert_eq!(env.method, "DOM.interaction.click");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        // While a plain console event still normalizes natively
        let plain = console_event("hello", "");
        assert!(matches!(
            instrumentation.decode(&plain),
            DecodeOutcome::NotMarker
        ));
        let envelope = ProtocolEventBridge::new(Domain::ALL.to_vec(), None)
            .normalize(&plain)
            .expect("native console event");
        assert_eq!(envelope.method, "Runtime.consoleAPICalled");
    }

    #[tokio::test]
    async fn test_attach_fails_when_stream_taken() {
        let session = MockProtocolSession::new();
        let handles = crate::testutil::mock_handles(session.clone());
        let _stolen = session.take_events().expect("first take");

        let notifier = Notifier::new();
        let registry = crate::broadcast::SubscriberRegistry::new(notifier.clone());
        let broadcaster = Broadcaster::new(registry, notifier);

        let result = bridge()
            .attach(
                &handles,
                Arc::new(InstrumentationBridge::new(None)),
                broadcaster,
            )
            .await;

        assert!(matches!(result.unwrap_err(), Error::Session { .. }));
    }
}
