//! In-page DOM tracker injection and side-channel decoding.
//!
//! The instrumentation script runs inside the page and binds listeners to
//! every interactive element, including elements inserted after load (via a
//! mutation observer). Each captured interaction is serialized through the
//! console as a marker-prefixed message:
//!
//! ```text
//! console.log("BROWSERBASE_EVENT_PROXY:DOM_INTERACTION:CLICK",
//!             "{\"type\":\"click\",\"element\":{...},\"timestamp\":...}")
//! ```
//!
//! Out here, [`InstrumentationBridge::decode`] recognizes those console
//! events and reconstructs them as normalized `DOM.interaction.*` events.
//! Malformed payloads are dropped as diagnostics; they never stop the
//! decoder.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::{Domain, DomInteractionPayload, EventEnvelope};

use crate::session::provider::{PageHandle, ProtocolSession};

// ============================================================================
// Markers
// ============================================================================

/// Prefix shared by every side-channel message.
pub const MARKER_PREFIX: &str = "BROWSERBASE_EVENT_PROXY:";

/// Prefix of interaction messages; the interaction type follows it.
pub const INTERACTION_MARKER_PREFIX: &str = "BROWSERBASE_EVENT_PROXY:DOM_INTERACTION:";

/// Completion marker. Emitted by the script, logged out here, not awaited.
pub const INITIALIZED_MARKER: &str = "BROWSERBASE_EVENT_PROXY:INITIALIZED";

/// Console event carrying the side channel.
const CONSOLE_API_METHOD: &str = "Runtime.consoleAPICalled";

/// Domains the instrumentation itself needs: console output and DOM queries.
const INSTRUMENTATION_DOMAINS: [Domain; 2] = [Domain::Runtime, Domain::Dom];

// ============================================================================
// Instrumentation Script
// ============================================================================

/// The DOM tracker, executed in the page context.
///
/// Self-guarding: re-evaluation in an already-instrumented document is a
/// no-op, while each fresh document (navigation destroys the script
/// context) instruments from scratch.
pub(crate) const INSTRUMENTATION_SCRIPT: &str = r#"
(() => {
  'use strict';
  if (window.__browserbaseEventProxyInstrumented) { return; }
  window.__browserbaseEventProxyInstrumented = true;

  const MARKER = 'BROWSERBASE_EVENT_PROXY:';
  const EVENT_TYPES = ['click', 'focus', 'blur', 'input', 'change',
                       'mousedown', 'mouseup', 'touchstart', 'touchend'];
  const INTERACTIVE_SELECTOR = ['a[href]', 'button', 'input', 'textarea', 'select',
                                'option', '[role]', '[contenteditable]', '[tabindex]'].join(',');

  const tracked = new WeakSet();

  function extractDetail(el) {
    try {
      const style = window.getComputedStyle(el);
      const rect = el.getBoundingClientRect();
      const attributes = {};
      for (const attr of el.attributes) { attributes[attr.name] = attr.value; }
      return {
        tag: el.tagName.toLowerCase(),
        id: el.id || '',
        class: el.getAttribute('class') || '',
        type: el.type || null,
        value: el.value !== undefined ? String(el.value) : null,
        checked: typeof el.checked === 'boolean' ? el.checked : null,
        placeholder: el.placeholder || null,
        name: el.name || null,
        isContentEditable: el.isContentEditable === true,
        visible: style.display !== 'none' && style.visibility !== 'hidden',
        disabled: el.disabled === true,
        readOnly: el.readOnly === true,
        attributes: attributes,
        rect: {
          top: rect.top, right: rect.right, bottom: rect.bottom, left: rect.left,
          width: rect.width, height: rect.height, x: rect.x, y: rect.y
        }
      };
    } catch (err) {
      return null;
    }
  }

  function emit(type, target) {
    if (!target || target.nodeType !== 1) { return; }
    const element = extractDetail(target);
    if (!element) { return; }
    const payload = { type: type, element: element, timestamp: Date.now() };
    console.log(MARKER + 'DOM_INTERACTION:' + type.toUpperCase(), JSON.stringify(payload));
  }

  function instrument(el) {
    if (tracked.has(el)) { return; }
    tracked.add(el);
    for (const type of EVENT_TYPES) {
      el.addEventListener(type, (ev) => emit(type, ev.currentTarget));
    }
  }

  function scan(root) {
    if (!root || root.nodeType !== 1) { return; }
    if (root.matches && root.matches(INTERACTIVE_SELECTOR)) { instrument(root); }
    if (root.querySelectorAll) {
      for (const el of root.querySelectorAll(INTERACTIVE_SELECTOR)) { instrument(el); }
    }
  }

  // focus/blur do not bubble to arbitrary ancestors; capture at the root
  // and attribute to the event target.
  document.addEventListener('focusin', (ev) => emit('focus', ev.target));
  document.addEventListener('focusout', (ev) => emit('blur', ev.target));

  const observer = new MutationObserver((mutations) => {
    for (const mutation of mutations) {
      for (const node of mutation.addedNodes) { scan(node); }
    }
  });
  observer.observe(document.documentElement, { childList: true, subtree: true });

  scan(document.documentElement);
  console.log(MARKER + 'INITIALIZED');
})();
"#;

// ============================================================================
// DecodeOutcome
// ============================================================================

/// Result of offering a console event to the decoder.
#[derive(Debug)]
pub enum DecodeOutcome {
    /// A well-formed interaction, reconstructed as a normalized event.
    Interaction(EventEnvelope),

    /// The script's completion marker.
    Initialized,

    /// A marker-prefixed message whose payload did not decode.
    Malformed(Error),

    /// Not a side-channel message at all.
    NotMarker,
}

// ============================================================================
// InstrumentationBridge
// ============================================================================

/// Injects the DOM tracker and decodes its side-channel output.
pub struct InstrumentationBridge {
    /// Session id stamped on synthesized events.
    session_id: Option<String>,
}

impl InstrumentationBridge {
    /// Creates a bridge for the given session.
    #[inline]
    #[must_use]
    pub fn new(session_id: Option<String>) -> Self {
        Self { session_id }
    }

    /// Installs the instrumentation into the session's page.
    ///
    /// Enables the domains the script depends on (best-effort, per-domain
    /// failures are skipped), registers the script for every new document,
    /// and evaluates it in the current document.
    ///
    /// # Errors
    ///
    /// Returns an error when the script cannot be installed at all; callers
    /// treat this as non-fatal degradation.
    pub async fn inject(
        &self,
        protocol: &Arc<dyn ProtocolSession>,
        page: &Arc<dyn PageHandle>,
    ) -> Result<()> {
        for domain in INSTRUMENTATION_DOMAINS {
            if let Err(e) = protocol
                .send_command(&domain.enable_method(), Value::Object(Default::default()))
                .await
            {
                warn!(domain = %domain, error = %e, "Instrumentation domain enable failed");
            }
        }

        page.add_init_script(INSTRUMENTATION_SCRIPT).await?;
        page.evaluate(INSTRUMENTATION_SCRIPT).await?;

        debug!("Instrumentation installed");
        Ok(())
    }

    /// Re-evaluates the tracker after a page load.
    ///
    /// Navigation destroys the page's script context; failures here are
    /// logged and swallowed so the event pump keeps running.
    pub async fn reinject(&self, page: &dyn PageHandle) {
        if let Err(e) = page.evaluate(INSTRUMENTATION_SCRIPT).await {
            warn!(error = %e, "Instrumentation re-injection failed");
        } else {
            debug!("Instrumentation re-injected after page load");
        }
    }

    /// Offers a raw protocol event to the side-channel decoder.
    ///
    /// Recognizes `Runtime.consoleAPICalled` events whose first argument is
    /// a marker-prefixed string; the JSON payload is taken from the second
    /// argument.
    #[must_use]
    pub fn decode(&self, raw: &crate::protocol::RawEvent) -> DecodeOutcome {
        if raw.method != CONSOLE_API_METHOD {
            return DecodeOutcome::NotMarker;
        }

        let args = match raw.params.get("args").and_then(Value::as_array) {
            Some(args) => args,
            None => return DecodeOutcome::NotMarker,
        };

        let first = args
            .first()
            .and_then(|a| a.get("value"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        if first.starts_with(INITIALIZED_MARKER) {
            return DecodeOutcome::Initialized;
        }

        let Some(interaction_type) = first.strip_prefix(INTERACTION_MARKER_PREFIX) else {
            if first.starts_with(MARKER_PREFIX) {
                return DecodeOutcome::Malformed(Error::protocol(format!(
                    "Unrecognized side-channel marker: {first}"
                )));
            }
            return DecodeOutcome::NotMarker;
        };

        let Some(payload_text) = args
            .get(1)
            .and_then(|a| a.get("value"))
            .and_then(Value::as_str)
        else {
            return DecodeOutcome::Malformed(Error::protocol(
                "Side-channel message missing payload argument",
            ));
        };

        let payload: DomInteractionPayload = match serde_json::from_str(payload_text) {
            Ok(payload) => payload,
            Err(e) => {
                return DecodeOutcome::Malformed(Error::protocol(format!(
                    "Side-channel payload did not decode: {e}"
                )));
            }
        };

        let method = format!("DOM.interaction.{}", interaction_type.to_lowercase());
        let params = match serde_json::to_value(&payload) {
            Ok(params) => params,
            Err(e) => return DecodeOutcome::Malformed(Error::Json(e)),
        };

        DecodeOutcome::Interaction(EventEnvelope::new(
            Domain::Dom,
            method,
            params,
            self.session_id.clone(),
        ))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testutil::console_event;

    fn bridge() -> InstrumentationBridge {
        InstrumentationBridge::new(Some("sess-1".to_string()))
    }

    #[test]
    fn test_script_emits_documented_markers() {
        assert!(INSTRUMENTATION_SCRIPT.contains("BROWSERBASE_EVENT_PROXY:"));
        assert!(INSTRUMENTATION_SCRIPT.contains("DOM_INTERACTION:"));
        assert!(INSTRUMENTATION_SCRIPT.contains("INITIALIZED"));
    }

    #[test]
    fn test_script_covers_interaction_set() {
        for event in [
            "click",
            "focus",
            "blur",
            "input",
            "change",
            "mousedown",
            "mouseup",
            "touchstart",
            "touchend",
        ] {
            assert!(
                INSTRUMENTATION_SCRIPT.contains(&format!("'{event}'")),
                "missing listener for {event}"
            );
        }
    }

    #[test]
    fn test_decode_click() {
        let payload = r#"{"type":"click","element":{"tag":"button","id":"go"},"timestamp":1000}"#;
        let raw = console_event("BROWSERBASE_EVENT_PROXY:DOM_INTERACTION:CLICK", payload);

        match bridge().decode(&raw) {
            DecodeOutcome::Interaction(env) => {
                assert_eq!(env.domain, Domain::Dom);
                assert_eq!(env.method, "DOM.interaction.click");
                assert_eq!(env.browserbase_session_id.as_deref(), Some("sess-1"));
                assert_eq!(env.params["element"]["tag"], "button");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_decode_initialized() {
        let raw = console_event("BROWSERBASE_EVENT_PROXY:INITIALIZED", "");
        assert!(matches!(bridge().decode(&raw), DecodeOutcome::Initialized));
    }

    #[test]
    fn test_decode_malformed_then_wellformed() {
        let bridge = bridge();

        let truncated = console_event(
            "BROWSERBASE_EVENT_PROXY:DOM_INTERACTION:CLICK",
            r#"{"type":"click","element":{"#,
        );
        assert!(matches!(
            bridge.decode(&truncated),
            DecodeOutcome::Malformed(_)
        ));

        // The decoder recovers on the next message
        let good = console_event(
            "BROWSERBASE_EVENT_PROXY:DOM_INTERACTION:FOCUS",
            r#"{"type":"focus","element":{"tag":"input"}}"#,
        );
        match bridge.decode(&good) {
            DecodeOutcome::Interaction(env) => assert_eq!(env.method, "DOM.interaction.focus"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_decode_missing_payload_argument() {
        let mut raw = console_event("BROWSERBASE_EVENT_PROXY:DOM_INTERACTION:CLICK", "");
        raw.params["args"]
            .as_array_mut()
            .expect("args array")
            .truncate(1);

        assert!(matches!(bridge().decode(&raw), DecodeOutcome::Malformed(_)));
    }

    #[test]
    fn test_decode_ignores_plain_console_output() {
        let raw = console_event("hello world", "");
        assert!(matches!(bridge().decode(&raw), DecodeOutcome::NotMarker));
    }

    #[test]
    fn test_decode_ignores_other_methods() {
        let raw = crate::protocol::RawEvent {
            method: "Console.messageAdded".to_string(),
            params: serde_json::json!({"message": {"text": "BROWSERBASE_EVENT_PROXY:INITIALIZED"}}),
            session_id: None,
        };
        assert!(matches!(bridge().decode(&raw), DecodeOutcome::NotMarker));
    }

    #[test]
    fn test_decode_non_string_first_argument() {
        let raw = crate::protocol::RawEvent {
            method: "Runtime.consoleAPICalled".to_string(),
            params: serde_json::json!({"args": [{"type": "number", "value": 42}]}),
            session_id: None,
        };
        assert!(matches!(bridge().decode(&raw), DecodeOutcome::NotMarker));
    }

    mod properties {
        use super::*;

        use proptest::prelude::*;

        proptest! {
            // Arbitrary console text must never panic the decoder.
            #[test]
            fn decoder_total_over_arbitrary_text(first in ".*", second in ".*") {
                let raw = console_event(&first, &second);
                let _ = InstrumentationBridge::new(None).decode(&raw);
            }

            // Arbitrary payloads under a valid marker either decode or are
            // reported malformed; they never panic and never crash later
            // decodes.
            #[test]
            fn marker_payloads_decode_or_reject(payload in ".*") {
                let bridge = InstrumentationBridge::new(None);
                let raw = console_event("BROWSERBASE_EVENT_PROXY:DOM_INTERACTION:CLICK", &payload);
                match bridge.decode(&raw) {
                    DecodeOutcome::Interaction(env) => {
                        prop_assert_eq!(env.method.as_str(), "DOM.interaction.click");
                    }
                    DecodeOutcome::Malformed(_) => {}
                    other => prop_assert!(false, "unexpected outcome: {:?}", other),
                }
            }
        }
    }
}
