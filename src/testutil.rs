//! Shared test fixtures: recording transports and a scripted session
//! provider.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::broadcast::registry::{CloseHook, SubscriberTransport};
use crate::error::{Error, Result};
use crate::protocol::RawEvent;
use crate::session::provider::{
    BrowserHandle, ConnectOptions, ContextHandle, PageHandle, ProtocolSession, SessionHandles,
    SessionProvider,
};

// ============================================================================
// RecordingTransport
// ============================================================================

/// Subscriber transport that records every delivered frame.
pub(crate) struct RecordingTransport {
    frames: Mutex<Vec<String>>,
    open: AtomicBool,
    fail_sends: bool,
    close_hook: Mutex<Option<CloseHook>>,
}

impl RecordingTransport {
    pub(crate) fn new() -> Self {
        Self {
            frames: Mutex::new(Vec::new()),
            open: AtomicBool::new(true),
            fail_sends: false,
            close_hook: Mutex::new(None),
        }
    }

    /// A transport whose every send fails.
    pub(crate) fn failing() -> Self {
        Self {
            fail_sends: true,
            ..Self::new()
        }
    }

    /// Marks the transport closed without firing the hook.
    pub(crate) fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// Fires the installed close hook, as a real transport would on close.
    pub(crate) fn fire_close_hook(&self) {
        self.open.store(false, Ordering::SeqCst);
        if let Some(hook) = self.close_hook.lock().take() {
            hook();
        }
    }

    pub(crate) fn frames(&self) -> Vec<String> {
        self.frames.lock().clone()
    }
}

#[async_trait]
impl SubscriberTransport for RecordingTransport {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send_frame(&self, frame: &str) -> Result<()> {
        if self.fail_sends {
            return Err(Error::ConnectionClosed);
        }
        self.frames.lock().push(frame.to_string());
        Ok(())
    }

    fn set_close_hook(&self, hook: CloseHook) {
        *self.close_hook.lock() = Some(hook);
    }
}

// ============================================================================
// MockProtocolSession
// ============================================================================

/// Protocol session that records commands and replays scripted events.
pub(crate) struct MockProtocolSession {
    commands: Mutex<Vec<(String, Value)>>,
    failing_methods: Mutex<Vec<String>>,
    events_tx: mpsc::UnboundedSender<RawEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<RawEvent>>>,
    detached: AtomicBool,
}

impl MockProtocolSession {
    pub(crate) fn new() -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            commands: Mutex::new(Vec::new()),
            failing_methods: Mutex::new(Vec::new()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            detached: AtomicBool::new(false),
        })
    }

    /// Every send of `method` will fail from now on.
    pub(crate) fn fail_method(&self, method: &str) {
        self.failing_methods.lock().push(method.to_string());
    }

    /// Injects a raw event into the session's stream.
    pub(crate) fn emit(&self, event: RawEvent) {
        let _ = self.events_tx.send(event);
    }

    pub(crate) fn commands(&self) -> Vec<(String, Value)> {
        self.commands.lock().clone()
    }

    pub(crate) fn detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProtocolSession for MockProtocolSession {
    async fn send_command(&self, method: &str, params: Value) -> Result<Value> {
        self.commands.lock().push((method.to_string(), params));
        if self.failing_methods.lock().iter().any(|m| m == method) {
            return Err(Error::command_failed(method, "scripted failure"));
        }
        Ok(json!({}))
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<RawEvent>> {
        self.events_rx.lock().take()
    }

    fn is_open(&self) -> bool {
        !self.detached.load(Ordering::SeqCst)
    }

    async fn detach(&self) -> Result<()> {
        self.detached.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// MockPage / MockContext / MockBrowser
// ============================================================================

/// Page handle that records evaluations and init scripts.
pub(crate) struct MockPage {
    evaluations: Mutex<Vec<String>>,
    init_scripts: Mutex<Vec<String>>,
    closed: AtomicBool,
    fail_evaluate: AtomicBool,
}

impl MockPage {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            evaluations: Mutex::new(Vec::new()),
            init_scripts: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            fail_evaluate: AtomicBool::new(false),
        })
    }

    pub(crate) fn set_fail_evaluate(&self) {
        self.fail_evaluate.store(true, Ordering::SeqCst);
    }

    pub(crate) fn evaluations(&self) -> Vec<String> {
        self.evaluations.lock().clone()
    }

    pub(crate) fn init_scripts(&self) -> Vec<String> {
        self.init_scripts.lock().clone()
    }

    pub(crate) fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageHandle for MockPage {
    async fn evaluate(&self, expression: &str) -> Result<Value> {
        if self.fail_evaluate.load(Ordering::SeqCst) {
            return Err(Error::script("scripted evaluation failure"));
        }
        self.evaluations.lock().push(expression.to_string());
        Ok(Value::Null)
    }

    async fn add_init_script(&self, source: &str) -> Result<()> {
        self.init_scripts.lock().push(source.to_string());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Context handle tracking release.
pub(crate) struct MockContext {
    closed: AtomicBool,
}

impl MockContext {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl ContextHandle for MockContext {
    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Browser handle tracking release.
pub(crate) struct MockBrowser {
    closed: AtomicBool,
}

impl MockBrowser {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserHandle for MockBrowser {
    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// MockProvider
// ============================================================================

/// The mock parts backing the most recent acquisition.
#[derive(Clone)]
pub(crate) struct MockParts {
    pub(crate) session: Arc<MockProtocolSession>,
    pub(crate) page: Arc<MockPage>,
    pub(crate) browser: Arc<MockBrowser>,
}

/// Scripted session provider.
pub(crate) struct MockProvider {
    fail_next: AtomicBool,
    fail_evaluate: AtomicBool,
    last: Mutex<Option<MockParts>>,
}

impl MockProvider {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            fail_next: AtomicBool::new(false),
            fail_evaluate: AtomicBool::new(false),
            last: Mutex::new(None),
        })
    }

    /// The next acquisition fails; later ones succeed again.
    pub(crate) fn fail_next_connect(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Acquired pages refuse evaluation.
    pub(crate) fn fail_page_evaluate(&self) {
        self.fail_evaluate.store(true, Ordering::SeqCst);
    }

    pub(crate) fn last_session(&self) -> Option<Arc<MockProtocolSession>> {
        self.last.lock().as_ref().map(|p| Arc::clone(&p.session))
    }

    pub(crate) fn last_page(&self) -> Option<Arc<MockPage>> {
        self.last.lock().as_ref().map(|p| Arc::clone(&p.page))
    }

    pub(crate) fn last_browser(&self) -> Option<Arc<MockBrowser>> {
        self.last.lock().as_ref().map(|p| Arc::clone(&p.browser))
    }
}

#[async_trait]
impl SessionProvider for MockProvider {
    async fn connect(&self, options: &ConnectOptions) -> Result<SessionHandles> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::session("scripted acquisition refusal"));
        }

        let session = MockProtocolSession::new();
        let page = MockPage::new();
        if self.fail_evaluate.load(Ordering::SeqCst) {
            page.set_fail_evaluate();
        }
        let browser = MockBrowser::new();

        *self.last.lock() = Some(MockParts {
            session: Arc::clone(&session),
            page: Arc::clone(&page),
            browser: Arc::clone(&browser),
        });

        Ok(SessionHandles {
            session_id: options.session_id.clone(),
            browser,
            context: MockContext::new(),
            page,
            protocol: session,
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// A handle set over a mock session, for bridge-level tests.
pub(crate) fn mock_handles(session: Arc<MockProtocolSession>) -> SessionHandles {
    SessionHandles {
        session_id: None,
        browser: MockBrowser::new(),
        context: MockContext::new(),
        page: MockPage::new(),
        protocol: session,
    }
}

/// A `Runtime.consoleAPICalled` raw event with two string arguments.
pub(crate) fn console_event(first: &str, second: &str) -> RawEvent {
    RawEvent {
        method: "Runtime.consoleAPICalled".to_string(),
        params: json!({
            "type": "log",
            "args": [
                {"type": "string", "value": first},
                {"type": "string", "value": second},
            ],
        }),
        session_id: None,
    }
}
