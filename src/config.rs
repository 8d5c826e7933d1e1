//! Proxy configuration and builder.
//!
//! Provides a type-safe interface for configuring the event proxy: session
//! credentials, relayed domains, and connection policy.
//!
//! # Example
//!
//! ```ignore
//! use browserbase_event_proxy::{ProxyConfig, protocol::Domain};
//!
//! let config = ProxyConfig::builder()
//!     .api_key("bb_live_...")
//!     .session_id("9c3e1f...")
//!     .enabled_domains([Domain::Page, Domain::Network])
//!     .connection_timeout_ms(15_000)
//!     .build()?;
//! ```
//!
//! The reconnect fields (`auto_reconnect`, `max_reconnect_attempts`,
//! `reconnect_delay`) are carried and validated but not acted on here;
//! reconnection policy belongs to the orchestration layer driving the proxy.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::protocol::Domain;

// ============================================================================
// Constants
// ============================================================================

/// Default hosted session endpoint.
const DEFAULT_CONNECT_URL: &str = "wss://connect.browserbase.com";

/// Default session acquisition timeout (30s).
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default delay between reconnect attempts (advisory).
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Environment variable carrying the API key.
const ENV_API_KEY: &str = "BROWSERBASE_API_KEY";

/// Environment variable carrying the session id.
const ENV_SESSION_ID: &str = "BROWSERBASE_SESSION_ID";

/// Environment variable overriding the connect endpoint.
const ENV_CONNECT_URL: &str = "BROWSERBASE_CONNECT_URL";

// ============================================================================
// ProxyConfig
// ============================================================================

/// Event proxy configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Hosted session id to attach to, if any.
    pub session_id: Option<String>,

    /// API key for the hosted session endpoint.
    pub api_key: Option<String>,

    /// Hosted session endpoint (`wss://...`).
    pub connect_url: String,

    /// Domains relayed to subscribers; enable commands are issued for each.
    pub enabled_domains: Vec<Domain>,

    /// Session acquisition timeout. Advisory: enforcement is delegated to
    /// the session provider.
    pub connection_timeout: Duration,

    /// Whether the orchestration layer should reconnect on session loss.
    pub auto_reconnect: bool,

    /// Reconnect attempt budget for the orchestration layer.
    pub max_reconnect_attempts: u32,

    /// Delay between reconnect attempts for the orchestration layer.
    pub reconnect_delay: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            session_id: None,
            api_key: None,
            connect_url: DEFAULT_CONNECT_URL.to_string(),
            enabled_domains: Domain::ALL.to_vec(),
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            auto_reconnect: false,
            max_reconnect_attempts: 3,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

// ============================================================================
// ProxyConfig - Constructors
// ============================================================================

impl ProxyConfig {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ProxyConfigBuilder {
        ProxyConfigBuilder::new()
    }

    /// Builds a configuration from the environment.
    ///
    /// Reads `BROWSERBASE_API_KEY`, `BROWSERBASE_SESSION_ID`, and
    /// `BROWSERBASE_CONNECT_URL`; everything else stays at defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(key) = std::env::var(ENV_API_KEY)
            && !key.is_empty()
        {
            config.api_key = Some(key);
        }
        if let Ok(id) = std::env::var(ENV_SESSION_ID)
            && !id.is_empty()
        {
            config.session_id = Some(id);
        }
        if let Ok(endpoint) = std::env::var(ENV_CONNECT_URL)
            && !endpoint.is_empty()
        {
            config.connect_url = endpoint;
        }
        config
    }
}

// ============================================================================
// ProxyConfig - Accessors
// ============================================================================

impl ProxyConfig {
    /// Returns `true` when the domain is in the relayed set.
    #[inline]
    #[must_use]
    pub fn is_domain_enabled(&self, domain: Domain) -> bool {
        self.enabled_domains.contains(&domain)
    }

    /// Builds the hosted endpoint URL with credentials as query parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the configured endpoint is not a
    /// valid URL.
    pub fn connect_endpoint(&self) -> Result<Url> {
        crate::session::ConnectOptions::from(self).endpoint()
    }
}

// ============================================================================
// ProxyConfigBuilder
// ============================================================================

/// Builder for [`ProxyConfig`].
///
/// Use [`ProxyConfig::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct ProxyConfigBuilder {
    session_id: Option<String>,
    api_key: Option<String>,
    connect_url: Option<String>,
    enabled_domains: Option<Vec<Domain>>,
    connection_timeout: Option<Duration>,
    auto_reconnect: bool,
    max_reconnect_attempts: Option<u32>,
    reconnect_delay: Option<Duration>,
}

impl ProxyConfigBuilder {
    /// Creates a new builder with no configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the hosted session id.
    #[inline]
    #[must_use]
    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    /// Sets the API key.
    #[inline]
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Overrides the hosted session endpoint.
    #[inline]
    #[must_use]
    pub fn connect_url(mut self, endpoint: impl Into<String>) -> Self {
        self.connect_url = Some(endpoint.into());
        self
    }

    /// Replaces the relayed domain set.
    #[inline]
    #[must_use]
    pub fn enabled_domains(mut self, domains: impl IntoIterator<Item = Domain>) -> Self {
        self.enabled_domains = Some(domains.into_iter().collect());
        self
    }

    /// Adds one domain to the relayed set.
    #[inline]
    #[must_use]
    pub fn enable_domain(mut self, domain: Domain) -> Self {
        self.enabled_domains.get_or_insert_default().push(domain);
        self
    }

    /// Sets the session acquisition timeout.
    #[inline]
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    /// Sets the session acquisition timeout in milliseconds.
    #[inline]
    #[must_use]
    pub fn connection_timeout_ms(self, timeout_ms: u64) -> Self {
        self.connection_timeout(Duration::from_millis(timeout_ms))
    }

    /// Sets the advisory reconnect flag.
    #[inline]
    #[must_use]
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Sets the advisory reconnect attempt budget.
    #[inline]
    #[must_use]
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }

    /// Sets the advisory reconnect delay in milliseconds.
    #[inline]
    #[must_use]
    pub fn reconnect_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect_delay = Some(Duration::from_millis(delay_ms));
        self
    }

    /// Builds the configuration with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the connection timeout is zero
    /// - [`Error::Config`] if the relayed domain set is empty
    /// - [`Error::Config`] if reconnection is requested with a zero budget
    pub fn build(self) -> Result<ProxyConfig> {
        let defaults = ProxyConfig::default();

        let connection_timeout = self.connection_timeout.unwrap_or(defaults.connection_timeout);
        if connection_timeout.is_zero() {
            return Err(Error::config("Connection timeout must be greater than zero"));
        }

        let mut enabled_domains = self.enabled_domains.unwrap_or(defaults.enabled_domains);
        let mut seen = Vec::with_capacity(enabled_domains.len());
        enabled_domains.retain(|d| {
            let fresh = !seen.contains(d);
            seen.push(*d);
            fresh
        });
        if enabled_domains.is_empty() {
            return Err(Error::config("At least one domain must be enabled"));
        }

        let max_reconnect_attempts = self
            .max_reconnect_attempts
            .unwrap_or(defaults.max_reconnect_attempts);
        if self.auto_reconnect && max_reconnect_attempts == 0 {
            return Err(Error::config(
                "auto_reconnect requires max_reconnect_attempts > 0",
            ));
        }

        Ok(ProxyConfig {
            session_id: self.session_id,
            api_key: self.api_key,
            connect_url: self.connect_url.unwrap_or(defaults.connect_url),
            enabled_domains,
            connection_timeout,
            auto_reconnect: self.auto_reconnect,
            max_reconnect_attempts,
            reconnect_delay: self.reconnect_delay.unwrap_or(defaults.reconnect_delay),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
