//! Hosted session provider.
//!
//! Attaches to an already-running hosted browser session over a secure
//! WebSocket. The endpoint is assembled from the configured connect URL
//! plus the session id and API key as query parameters.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::cdp::{CdpBrowser, CdpContext, CdpPage, CdpSession};
use super::provider::{ConnectOptions, SessionHandles, SessionProvider};

// ============================================================================
// RemoteSessionProvider
// ============================================================================

/// Acquires hosted browser sessions over `wss://`.
///
/// # Example
///
/// ```ignore
/// let provider = RemoteSessionProvider::new();
/// let handles = provider.connect(&options).await?;
/// ```
#[derive(Debug, Default, Clone)]
pub struct RemoteSessionProvider;

impl RemoteSessionProvider {
    /// Creates a new provider.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SessionProvider for RemoteSessionProvider {
    async fn connect(&self, options: &ConnectOptions) -> Result<SessionHandles> {
        if options.api_key.as_deref().unwrap_or_default().is_empty() {
            return Err(Error::config(
                "API key is required for hosted sessions. Use .api_key() to set it.",
            ));
        }

        let endpoint = options.endpoint()?;
        debug!(
            session_id = options.session_id.as_deref().unwrap_or("<new>"),
            "Acquiring hosted session"
        );

        let session = Arc::new(
            CdpSession::connect(&endpoint, options.connection_timeout)
                .await
                .map_err(|e| Error::session(format!("Hosted session acquisition failed: {e}")))?,
        );

        info!(
            session_id = options.session_id.as_deref().unwrap_or("<new>"),
            "Hosted session acquired"
        );

        Ok(SessionHandles {
            session_id: options.session_id.clone(),
            browser: Arc::new(CdpBrowser::new(Arc::clone(&session))),
            context: Arc::new(CdpContext::new()),
            page: Arc::new(CdpPage::new(Arc::clone(&session))),
            protocol: session,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
