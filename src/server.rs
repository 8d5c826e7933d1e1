//! Subscriber-facing WebSocket server.
//!
//! Accepts subscriber connections and registers each as a transport with
//! the proxy. Event frames flow one way, proxy to subscriber; incoming
//! messages are drained and ignored (pings excepted).
//!
//! # Connection Flow
//!
//! 1. Server binds to the configured address (port 0 for random)
//! 2. Subscriber connects and upgrades to WebSocket
//! 3. Connection is registered with the proxy (client-connected notification)
//! 4. Broadcast frames are queued to a per-connection writer task
//! 5. Socket close removes the subscriber (client-disconnected notification)

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::broadcast::{CloseHook, SubscriberTransport};
use crate::engine::EventProxy;
use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default bind address (localhost).
const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Accept poll interval while checking the shutdown flag.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// SubscriberServer
// ============================================================================

/// WebSocket server feeding the proxy's subscriber registry.
///
/// # Example
///
/// ```ignore
/// let server = SubscriberServer::bind(proxy.clone(), 0).await?;
/// println!("subscribers connect to {}", server.ws_url());
/// ```
pub struct SubscriberServer {
    /// Port the server is bound to.
    port: u16,
    /// Shutdown flag checked by the accept loop.
    shutdown: Arc<AtomicBool>,
}

impl SubscriberServer {
    /// Binds the server on localhost and starts the accept loop.
    ///
    /// Use port 0 to let the OS assign a random available port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(proxy: EventProxy, port: u16) -> Result<Self> {
        Self::bind_ip(proxy, DEFAULT_BIND_IP, port).await
    }

    /// Binds the server on a specific address and starts the accept loop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind_ip(proxy: EventProxy, ip: IpAddr, port: u16) -> Result<Self> {
        let addr = SocketAddr::new(ip, port);
        let listener = TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        let shutdown = Arc::new(AtomicBool::new(false));
        tokio::spawn(Self::accept_loop(
            proxy,
            listener,
            Arc::clone(&shutdown),
        ));

        info!(port = actual_port, "Subscriber server started");

        Ok(Self {
            port: actual_port,
            shutdown,
        })
    }

    /// Returns the port the server is bound to.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the WebSocket URL for this server.
    ///
    /// Format: `ws://127.0.0.1:{port}`
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Stops accepting new subscribers.
    ///
    /// Existing connections keep running until their sockets close.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        info!(port = self.port, "Subscriber server shutting down");
    }

    /// Background task that accepts new subscriber connections.
    async fn accept_loop(proxy: EventProxy, listener: TcpListener, shutdown: Arc<AtomicBool>) {
        debug!("Subscriber accept loop started");

        loop {
            if shutdown.load(Ordering::SeqCst) {
                debug!("Subscriber accept loop shutting down");
                break;
            }

            // Accept with timeout to allow checking the shutdown flag
            match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
                Ok(Ok((stream, addr))) => {
                    let proxy = proxy.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(proxy, stream, addr).await {
                            warn!(error = %e, ?addr, "Subscriber connection failed");
                        }
                    });
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Accept failed");
                }
                Err(_) => {
                    continue;
                }
            }
        }

        debug!("Subscriber accept loop terminated");
    }

    /// Handles a single subscriber connection for its lifetime.
    async fn handle_connection(
        proxy: EventProxy,
        stream: TcpStream,
        addr: SocketAddr,
    ) -> Result<()> {
        debug!(?addr, "New subscriber TCP connection");

        let ws_stream = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

        let (subscriber, writer_rx) = WsSubscriber::new(addr);
        let subscriber = Arc::new(subscriber);

        let transport: Arc<dyn SubscriberTransport> = subscriber.clone();
        let id = proxy.add_subscriber(&transport);
        info!(subscriber = %id, ?addr, "Subscriber connected");

        Self::run_connection(ws_stream, &subscriber, writer_rx).await;

        // Close hook fires removeSubscriber
        subscriber.mark_closed();
        debug!(subscriber = %id, ?addr, "Subscriber connection closed");
        Ok(())
    }

    /// Pumps the socket until it closes: queued frames out, control frames
    /// answered, everything else drained.
    async fn run_connection(
        ws_stream: WebSocketStream<TcpStream>,
        subscriber: &Arc<WsSubscriber>,
        mut writer_rx: mpsc::UnboundedReceiver<Message>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                frame = writer_rx.recv() => {
                    match frame {
                        Some(message) => {
                            if let Err(e) = ws_write.send(message).await {
                                debug!(error = %e, "Subscriber write failed");
                                break;
                            }
                        }
                        None => break,
                    }
                }

                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Ping(payload))) => {
                            if ws_write.send(Message::Pong(payload)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("Subscriber closed the connection");
                            break;
                        }
                        Some(Err(e)) => {
                            debug!(error = %e, "Subscriber socket error");
                            break;
                        }
                        // Inbound data frames are ignored
                        _ => {}
                    }
                }
            }
        }

        subscriber.mark_closed();
        let _ = ws_write.close().await;
    }
}

// ============================================================================
// WsSubscriber
// ============================================================================

/// Subscriber transport over an accepted WebSocket.
struct WsSubscriber {
    /// Queue to the connection's writer half.
    writer_tx: mpsc::UnboundedSender<Message>,
    /// Cleared once the socket is gone.
    open: AtomicBool,
    /// Hook installed by the registry.
    close_hook: Mutex<Option<CloseHook>>,
    /// Peer address, for diagnostics.
    peer: SocketAddr,
}

impl WsSubscriber {
    /// Creates the transport and its writer queue.
    fn new(peer: SocketAddr) -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        (
            Self {
                writer_tx,
                open: AtomicBool::new(true),
                close_hook: Mutex::new(None),
                peer,
            },
            writer_rx,
        )
    }

    /// Marks the transport closed and fires the close hook once.
    fn mark_closed(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            debug!(peer = %self.peer, "Subscriber transport closed");
            if let Some(hook) = self.close_hook.lock().take() {
                hook();
            }
        }
    }
}

#[async_trait]
impl SubscriberTransport for WsSubscriber {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send_frame(&self, frame: &str) -> Result<()> {
        if !self.is_open() {
            return Err(Error::ConnectionClosed);
        }
        self.writer_tx
            .send(Message::Text(frame.to_string().into()))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn set_close_hook(&self, hook: CloseHook) {
        *self.close_hook.lock() = Some(hook);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio_tungstenite::connect_async;

    use crate::config::ProxyConfig;
    use crate::protocol::{Domain, EventEnvelope};
    use crate::testutil::MockProvider;

    fn proxy() -> EventProxy {
        EventProxy::new(ProxyConfig::default(), MockProvider::new())
    }

    async fn wait_for<F: Fn() -> bool>(what: &str, check: F) {
        timeout(Duration::from_secs(2), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
    }

    #[tokio::test]
    async fn test_bind_random_port() {
        let server = SubscriberServer::bind(proxy(), 0).await.expect("bind");
        assert!(server.port() > 0);
        assert!(server.ws_url().starts_with("ws://127.0.0.1:"));
        server.shutdown();
    }

    #[tokio::test]
    async fn test_subscriber_lifecycle_and_delivery() {
        let proxy = proxy();
        let server = SubscriberServer::bind(proxy.clone(), 0).await.expect("bind");

        let (mut client, _) = connect_async(server.ws_url()).await.expect("client connect");
        wait_for("registration", || proxy.subscriber_count() == 1).await;

        // One broadcast, one frame
        let event = EventEnvelope::new(
            Domain::Page,
            "Page.loadEventFired",
            json!({"timestamp": 1.0}),
            None,
        );
        proxy.broadcaster().deliver(event).await;

        let message = timeout(Duration::from_secs(2), client.next())
            .await
            .expect("frame in time")
            .expect("stream open")
            .expect("frame ok");

        match message {
            Message::Text(text) => {
                let value: serde_json::Value = serde_json::from_str(&text).expect("frame parses");
                assert_eq!(value["event"]["method"], "Page.loadEventFired");
                assert_eq!(value["event"]["type"], "browser");
            }
            other => panic!("unexpected message: {other:?}"),
        }

        // Closing the client removes the subscriber
        client.close(None).await.expect("client close");
        wait_for("removal", || proxy.subscriber_count() == 0).await;

        server.shutdown();
    }

    #[tokio::test]
    async fn test_two_subscribers_receive_the_same_frame() {
        let proxy = proxy();
        let server = SubscriberServer::bind(proxy.clone(), 0).await.expect("bind");

        let (mut a, _) = connect_async(server.ws_url()).await.expect("client a");
        let (mut b, _) = connect_async(server.ws_url()).await.expect("client b");
        wait_for("registrations", || proxy.subscriber_count() == 2).await;

        let event = EventEnvelope::new(Domain::Dom, "DOM.documentUpdated", json!({}), None);
        proxy.broadcaster().deliver(event).await;

        let frame_a = timeout(Duration::from_secs(2), a.next())
            .await
            .expect("frame a in time")
            .expect("stream a open")
            .expect("frame a ok");
        let frame_b = timeout(Duration::from_secs(2), b.next())
            .await
            .expect("frame b in time")
            .expect("stream b open")
            .expect("frame b ok");

        assert_eq!(
            frame_a.into_text().expect("text a"),
            frame_b.into_text().expect("text b")
        );

        server.shutdown();
    }
}
