//! Devtools WebSocket session and handle implementations.
//!
//! [`CdpSession`] owns the socket to the browser's devtools endpoint and
//! spawns an event loop task that handles:
//!
//! - Incoming messages (command responses, protocol events)
//! - Outgoing commands from the proxy
//! - Request/response correlation by integer id
//! - Raw event forwarding to the session's event stream
//!
//! The page, context, and browser handles are thin views over the same
//! session: page evaluation goes through `Runtime.evaluate`, init scripts
//! through `Page.addScriptToEvaluateOnNewDocument`, browser shutdown
//! through `Browser.close`.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, from_str, json, to_string};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::CommandId;
use crate::protocol::{CommandRequest, CommandResponse, RawEvent};

use super::provider::{BrowserHandle, ContextHandle, PageHandle, ProtocolSession};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for command execution.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum pending commands before rejecting new ones.
const MAX_PENDING_COMMANDS: usize = 100;

// ============================================================================
// Types
// ============================================================================

/// Client-side WebSocket stream (plain or TLS).
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Map of command ids to response channels.
type CorrelationMap = FxHashMap<CommandId, oneshot::Sender<Result<CommandResponse>>>;

// ============================================================================
// SessionCommand
// ============================================================================

/// Internal commands for the event loop.
enum SessionCommand {
    /// Send a request and wait for response.
    Send {
        request: CommandRequest,
        response_tx: oneshot::Sender<Result<CommandResponse>>,
    },
    /// Remove a timed-out correlation entry.
    RemovePending(CommandId),
    /// Shutdown the session.
    Shutdown,
}

// ============================================================================
// CdpSession
// ============================================================================

/// WebSocket session speaking the devtools protocol.
///
/// # Thread Safety
///
/// `CdpSession` is `Send + Sync` and is shared behind an `Arc` by the
/// handle implementations. All operations are non-blocking.
pub struct CdpSession {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<SessionCommand>,
    /// Correlation map (shared with event loop).
    pending: Arc<Mutex<CorrelationMap>>,
    /// Raw event stream, taken once by the proxy.
    events: Mutex<Option<mpsc::UnboundedReceiver<RawEvent>>>,
    /// Next command id.
    next_id: AtomicU64,
    /// Cleared when the event loop terminates.
    open: Arc<AtomicBool>,
}

impl std::fmt::Debug for CdpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdpSession")
            .field("next_id", &self.next_id)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

impl CdpSession {
    /// Dials a devtools endpoint and spawns the event loop.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the endpoint does not accept in time
    /// - [`Error::Connection`] if the WebSocket handshake fails
    pub async fn connect(endpoint: &Url, connect_timeout: Duration) -> Result<Self> {
        let connect_result = timeout(connect_timeout, connect_async(endpoint.as_str()))
            .await
            .map_err(|_| Error::connection_timeout(connect_timeout.as_millis() as u64))?;

        let (ws_stream, _) = connect_result
            .map_err(|e| Error::connection(format!("WebSocket handshake failed: {e}")))?;

        debug!(endpoint = %redacted(endpoint), "Devtools session established");
        Ok(Self::from_stream(ws_stream))
    }

    /// Creates a session from an established WebSocket stream.
    ///
    /// Spawns the event loop task internally.
    pub(crate) fn from_stream(ws_stream: WsStream) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let pending = Arc::new(Mutex::new(CorrelationMap::default()));
        let open = Arc::new(AtomicBool::new(true));

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&pending),
            events_tx,
            Arc::clone(&open),
        ));

        Self {
            command_tx,
            pending,
            events: Mutex::new(Some(events_rx)),
            next_id: AtomicU64::new(1),
            open,
        }
    }

    /// Sends a command and waits for its response with the default timeout.
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        self.send_with_timeout(method, params, DEFAULT_COMMAND_TIMEOUT)
            .await
    }

    /// Sends a command and waits for its response with a custom timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the session is closed
    /// - [`Error::RequestTimeout`] if no response arrives within the timeout
    /// - [`Error::Protocol`] if too many commands are pending
    /// - [`Error::CommandFailed`] if the browser answers with an error
    pub async fn send_with_timeout(
        &self,
        method: &str,
        params: Value,
        command_timeout: Duration,
    ) -> Result<Value> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }

        {
            let pending = self.pending.lock();
            if pending.len() >= MAX_PENDING_COMMANDS {
                warn!(
                    pending = pending.len(),
                    max = MAX_PENDING_COMMANDS,
                    "Too many pending commands"
                );
                return Err(Error::protocol(format!(
                    "Too many pending commands: {}/{}",
                    pending.len(),
                    MAX_PENDING_COMMANDS
                )));
            }
        }

        let id = CommandId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let request = CommandRequest::new(id, method, params);

        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(SessionCommand::Send {
                request,
                response_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        match timeout(command_timeout, response_rx).await {
            Ok(Ok(result)) => result?.into_result(method),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                // Timeout - clean up correlation entry
                let _ = self.command_tx.send(SessionCommand::RemovePending(id));
                Err(Error::request_timeout(
                    id,
                    command_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Returns the number of pending commands.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Shuts down the session gracefully.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(SessionCommand::Shutdown);
    }
}

// ============================================================================
// CdpSession - Event Loop
// ============================================================================

impl CdpSession {
    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop(
        ws_stream: WsStream,
        mut command_rx: mpsc::UnboundedReceiver<SessionCommand>,
        pending: Arc<Mutex<CorrelationMap>>,
        events_tx: mpsc::UnboundedSender<RawEvent>,
        open: Arc<AtomicBool>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming messages from the browser
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming_message(&text, &pending, &events_tx);
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Commands from the proxy
                command = command_rx.recv() => {
                    match command {
                        Some(SessionCommand::Send { request, response_tx }) => {
                            Self::handle_send_command(
                                request,
                                response_tx,
                                &mut ws_write,
                                &pending,
                            ).await;
                        }

                        Some(SessionCommand::RemovePending(id)) => {
                            pending.lock().remove(&id);
                            debug!(%id, "Removed timed-out correlation");
                        }

                        Some(SessionCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        open.store(false, Ordering::SeqCst);
        Self::fail_pending_commands(&pending);

        debug!("Session event loop terminated");
    }

    /// Handles an incoming text message from the browser.
    fn handle_incoming_message(
        text: &str,
        pending: &Arc<Mutex<CorrelationMap>>,
        events_tx: &mpsc::UnboundedSender<RawEvent>,
    ) {
        // Responses carry an id; try that first
        if let Ok(response) = from_str::<CommandResponse>(text) {
            let tx = pending.lock().remove(&response.id);

            if let Some(tx) = tx {
                let _ = tx.send(Ok(response));
            } else {
                warn!(id = %response.id, "Response for unknown command");
            }

            return;
        }

        // Events carry a method and no id
        if let Ok(event) = from_str::<RawEvent>(text) {
            trace!(method = %event.method, "Protocol event received");
            let _ = events_tx.send(event);
            return;
        }

        warn!(text = %text, "Failed to parse incoming message");
    }

    /// Handles a send command from the proxy.
    async fn handle_send_command(
        request: CommandRequest,
        response_tx: oneshot::Sender<Result<CommandResponse>>,
        ws_write: &mut futures_util::stream::SplitSink<WsStream, Message>,
        pending: &Arc<Mutex<CorrelationMap>>,
    ) {
        let id = request.id;

        let json = match to_string(&request) {
            Ok(j) => j,
            Err(e) => {
                let _ = response_tx.send(Err(Error::Json(e)));
                return;
            }
        };

        // Store correlation before sending
        pending.lock().insert(id, response_tx);

        if let Err(e) = ws_write.send(Message::Text(json.into())).await
            && let Some(tx) = pending.lock().remove(&id)
        {
            let _ = tx.send(Err(Error::connection(e.to_string())));
        }

        trace!(%id, "Command sent");
    }

    /// Fails all pending commands with ConnectionClosed.
    fn fail_pending_commands(pending: &Arc<Mutex<CorrelationMap>>) {
        let drained: Vec<_> = pending.lock().drain().collect();
        let count = drained.len();

        for (_, tx) in drained {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending commands on shutdown");
        }
    }
}

// ============================================================================
// CdpSession - ProtocolSession
// ============================================================================

#[async_trait]
impl ProtocolSession for CdpSession {
    async fn send_command(&self, method: &str, params: Value) -> Result<Value> {
        self.send(method, params).await
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<RawEvent>> {
        self.events.lock().take()
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn detach(&self) -> Result<()> {
        self.shutdown();
        Ok(())
    }
}

// ============================================================================
// Handle Implementations
// ============================================================================

/// Page handle backed by the devtools session.
pub struct CdpPage {
    session: Arc<CdpSession>,
}

impl CdpPage {
    /// Creates a page handle over the session.
    #[inline]
    #[must_use]
    pub fn new(session: Arc<CdpSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl PageHandle for CdpPage {
    async fn evaluate(&self, expression: &str) -> Result<Value> {
        let result = self
            .session
            .send(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let text = details
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or("evaluation threw");
            return Err(Error::script(text));
        }

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn add_init_script(&self, source: &str) -> Result<()> {
        self.session
            .send(
                "Page.addScriptToEvaluateOnNewDocument",
                json!({ "source": source }),
            )
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.session.send("Page.close", json!({})).await?;
        Ok(())
    }
}

/// Context handle backed by the devtools session.
///
/// A flat devtools endpoint has no separate context object; the context's
/// lifetime is the session's lifetime.
pub struct CdpContext;

impl CdpContext {
    /// Creates a context handle.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for CdpContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContextHandle for CdpContext {
    async fn close(&self) -> Result<()> {
        debug!("Context released with session");
        Ok(())
    }
}

/// Browser handle backed by the devtools session.
pub struct CdpBrowser {
    session: Arc<CdpSession>,
}

impl CdpBrowser {
    /// Creates a browser handle over the session.
    #[inline]
    #[must_use]
    pub fn new(session: Arc<CdpSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl BrowserHandle for CdpBrowser {
    async fn close(&self) -> Result<()> {
        // The session may already be detached; treat that as closed.
        if !self.session.is_open() {
            return Ok(());
        }
        self.session.send("Browser.close", json!({})).await?;
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Renders an endpoint without its query string (credentials live there).
fn redacted(endpoint: &Url) -> String {
    let mut shown = endpoint.clone();
    shown.set_query(None);
    shown.to_string()
}

// ============================================================================
// Tests
// ============================================================================
