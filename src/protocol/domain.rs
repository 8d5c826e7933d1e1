//! Fixed protocol domain set.
//!
//! Events and commands are namespaced by domain (`"<domain>.<name>"`).
//! The proxy relays exactly five domains; anything else is rejected at
//! the boundary rather than forwarded.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Domain
// ============================================================================

/// Protocol domain namespace.
///
/// The wire form matches the protocol's own capitalization (`"DOM"`, not
/// `"Dom"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Domain {
    /// Page lifecycle and navigation.
    Page,
    /// Network request/response activity.
    Network,
    /// Document structure changes and synthesized interactions.
    #[serde(rename = "DOM")]
    Dom,
    /// Script runtime, console API, exceptions.
    Runtime,
    /// Legacy console messages.
    Console,
}

impl Domain {
    /// Every domain the proxy relays.
    pub const ALL: [Self; 5] = [
        Self::Page,
        Self::Network,
        Self::Dom,
        Self::Runtime,
        Self::Console,
    ];

    /// Returns the wire name of the domain.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Page => "Page",
            Self::Network => "Network",
            Self::Dom => "DOM",
            Self::Runtime => "Runtime",
            Self::Console => "Console",
        }
    }

    /// Parses a domain from its wire name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Page" => Some(Self::Page),
            "Network" => Some(Self::Network),
            "DOM" => Some(Self::Dom),
            "Runtime" => Some(Self::Runtime),
            "Console" => Some(Self::Console),
            _ => None,
        }
    }

    /// Extracts and validates the domain prefix of a `"<domain>.<name>"`
    /// method string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownDomain`] when the prefix is not in the fixed
    /// domain set.
    pub fn of_method(method: &str) -> Result<Self> {
        let prefix = method.split('.').next().unwrap_or_default();
        Self::parse(prefix).ok_or_else(|| Error::unknown_domain(prefix))
    }

    /// Returns the protocol enable command for this domain.
    ///
    /// # Example
    ///
    /// ```
    /// use browserbase_event_proxy::protocol::Domain;
    ///
    /// assert_eq!(Domain::Network.enable_method(), "Network.enable");
    /// ```
    #[inline]
    #[must_use]
    pub fn enable_method(&self) -> String {
        format!("{}.enable", self.as_str())
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
