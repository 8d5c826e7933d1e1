//! Session provider traits and handle seams.
//!
//! A session provider acquires one browser session and hands back four
//! handles: browser, context, page, and protocol session. The proxy core
//! only ever sees these traits, so providers (and tests) are free to back
//! them however they like.
//!
//! Providers catch their internal faults and surface them as error results;
//! they never panic across this boundary.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

use crate::config::ProxyConfig;
use crate::error::{Error, Result};
use crate::protocol::{Domain, RawEvent};

// ============================================================================
// ConnectOptions
// ============================================================================

/// Options handed to a provider when acquiring a session.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Hosted session id to attach to, if any.
    pub session_id: Option<String>,

    /// API key for hosted endpoints.
    pub api_key: Option<String>,

    /// Endpoint the provider should dial.
    pub connect_url: String,

    /// Acquisition timeout; enforcement belongs to the provider.
    pub connection_timeout: Duration,

    /// Domains the session will be asked to enable.
    pub enabled_domains: Vec<Domain>,
}

impl ConnectOptions {
    /// Builds the endpoint URL with credentials as query parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the endpoint is not a valid URL.
    pub fn endpoint(&self) -> Result<Url> {
        let mut url = Url::parse(&self.connect_url)
            .map_err(|e| Error::config(format!("Invalid connect URL {}: {e}", self.connect_url)))?;

        {
            let mut query = url.query_pairs_mut();
            if let Some(ref key) = self.api_key {
                query.append_pair("apiKey", key);
            }
            if let Some(ref id) = self.session_id {
                query.append_pair("sessionId", id);
            }
        }

        Ok(url)
    }
}

impl From<&ProxyConfig> for ConnectOptions {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            session_id: config.session_id.clone(),
            api_key: config.api_key.clone(),
            connect_url: config.connect_url.clone(),
            connection_timeout: config.connection_timeout,
            enabled_domains: config.enabled_domains.clone(),
        }
    }
}

// ============================================================================
// Protocol Session
// ============================================================================

/// Control channel to the browser: command issuance plus the raw event
/// stream.
#[async_trait]
pub trait ProtocolSession: Send + Sync {
    /// Sends a protocol command and waits for its result.
    async fn send_command(&self, method: &str, params: Value) -> Result<Value>;

    /// Takes the raw event stream.
    ///
    /// The stream exists once per session; a second take returns `None`.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<RawEvent>>;

    /// Returns `true` while the underlying channel is usable.
    fn is_open(&self) -> bool;

    /// Detaches from the session, closing the underlying channel.
    async fn detach(&self) -> Result<()>;
}

// ============================================================================
// Page / Context / Browser Handles
// ============================================================================

/// Handle to the session's page.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Evaluates an expression in the page context.
    async fn evaluate(&self, expression: &str) -> Result<Value>;

    /// Registers a script to run in every new document.
    async fn add_init_script(&self, source: &str) -> Result<()>;

    /// Closes the page.
    async fn close(&self) -> Result<()>;
}

/// Handle to the session's browsing context.
#[async_trait]
pub trait ContextHandle: Send + Sync {
    /// Closes the context.
    async fn close(&self) -> Result<()>;
}

/// Handle to the browser itself.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    /// Closes the browser.
    async fn close(&self) -> Result<()>;
}

// ============================================================================
// SessionHandles
// ============================================================================

/// The complete handle set for one acquired session.
///
/// Every field is required: a provider that cannot produce all four handles
/// must fail acquisition instead of returning a partial set.
pub struct SessionHandles {
    /// Hosted session id, when the provider knows one.
    pub session_id: Option<String>,

    /// Browser handle, released last.
    pub browser: Arc<dyn BrowserHandle>,

    /// Browsing context handle.
    pub context: Arc<dyn ContextHandle>,

    /// Page handle used for instrumentation.
    pub page: Arc<dyn PageHandle>,

    /// Protocol session used for commands and events.
    pub protocol: Arc<dyn ProtocolSession>,
}

impl std::fmt::Debug for SessionHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandles")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// DisconnectResult
// ============================================================================

/// Outcome of a session release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectResult {
    /// `true` when every handle released cleanly.
    pub success: bool,

    /// Always `false` after release completes.
    pub connected: bool,
}

// ============================================================================
// SessionProvider
// ============================================================================

/// Capability that acquires and releases browser sessions.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Acquires a session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] (or a more specific fault) when the
    /// session cannot be acquired. Partial acquisitions are released before
    /// returning.
    async fn connect(&self, options: &ConnectOptions) -> Result<SessionHandles>;

    /// Releases a session.
    ///
    /// Handles are released in fixed order (protocol session, page,
    /// context, browser) and each release is independently fault-tolerant:
    /// one failure never skips the remaining releases.
    async fn disconnect(&self, handles: SessionHandles) -> DisconnectResult {
        let mut success = true;

        if let Err(e) = handles.protocol.detach().await {
            warn!(error = %e, "Protocol session detach failed");
            success = false;
        }
        if let Err(e) = handles.page.close().await {
            warn!(error = %e, "Page close failed");
            success = false;
        }
        if let Err(e) = handles.context.close().await {
            warn!(error = %e, "Context close failed");
            success = false;
        }
        if let Err(e) = handles.browser.close().await {
            warn!(error = %e, "Browser close failed");
            success = false;
        }

        debug!(success, "Session released");
        DisconnectResult {
            success,
            connected: false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
