//! Error types for the event proxy.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use browserbase_event_proxy::{Result, Error};
//!
//! async fn example(proxy: &EventProxy) -> Result<()> {
//!     proxy.connect().await?;
//!     proxy.send_command("Page.enable", serde_json::json!({})).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Validation | [`Error::Validation`], [`Error::UnknownDomain`] |
//! | Lifecycle | [`Error::NotConnected`], [`Error::Session`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Protocol`], [`Error::CommandFailed`], [`Error::RequestTimeout`] |
//! | Instrumentation | [`Error::Script`] |
//! | Not Found | [`Error::SubscriberNotFound`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |
//!
//! Every variant maps to a [`StatusClass`] distinguishing client-caused
//! faults from server/session-caused faults.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::{CommandId, SubscriberId};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// StatusClass
// ============================================================================

/// Fault attribution for an [`enum@Error`].
///
/// Mirrors the HTTP split: a `ClientError` means the caller sent something
/// invalid; a `ServerError` means the session, protocol, or transport failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    /// Caller-caused fault (invalid input, wrong state requested).
    ClientError,
    /// Session-, protocol-, or transport-caused fault.
    ServerError,
}

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when proxy configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Validation Errors
    // ========================================================================
    /// Invalid argument or request shape.
    #[error("Validation error: {message}")]
    Validation {
        /// Description of the invalid input.
        message: String,
    },

    /// Method references a domain outside the fixed domain set.
    ///
    /// Only `Page`, `Network`, `DOM`, `Runtime`, and `Console` are relayed.
    #[error("Unknown protocol domain: {domain}")]
    UnknownDomain {
        /// The rejected domain prefix.
        domain: String,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// No active session.
    ///
    /// Returned when a command is issued while disconnected.
    #[error("Not connected: no active browser session")]
    NotConnected,

    /// Session acquisition or release failed.
    #[error("Session error: {message}")]
    Session {
        /// Description of the session failure.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection timeout.
    ///
    /// Returned when the protocol endpoint does not accept within the
    /// configured timeout.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected message.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// The remote end answered a command with an error response.
    #[error("Command {method} failed: {message}")]
    CommandFailed {
        /// The command method that failed.
        method: String,
        /// Error message from the remote end.
        message: String,
    },

    /// Command response not received in time.
    #[error("Command {id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The command ID that timed out.
        id: CommandId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Instrumentation Errors
    // ========================================================================
    /// In-page script evaluation failed.
    #[error("Script error: {message}")]
    Script {
        /// Error message from script execution.
        message: String,
    },

    // ========================================================================
    // Not Found Errors
    // ========================================================================
    /// Subscriber not found by id.
    #[error("Subscriber not found: {id}")]
    SubscriberNotFound {
        /// The missing subscriber's id.
        id: SubscriberId,
    },

    // ========================================================================
    // Process Errors
    // ========================================================================
    /// Failed to launch the local browser process.
    #[error("Failed to launch browser: {message}")]
    ProcessLaunchFailed {
        /// Description of the launch failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a validation error.
    #[inline]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an unknown domain error.
    #[inline]
    pub fn unknown_domain(domain: impl Into<String>) -> Self {
        Self::UnknownDomain {
            domain: domain.into(),
        }
    }

    /// Creates a session error.
    #[inline]
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a command failed error.
    #[inline]
    pub fn command_failed(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(id: CommandId, timeout_ms: u64) -> Self {
        Self::RequestTimeout { id, timeout_ms }
    }

    /// Creates a script error.
    #[inline]
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script {
            message: message.into(),
        }
    }

    /// Creates a subscriber not found error.
    #[inline]
    pub fn subscriber_not_found(id: SubscriberId) -> Self {
        Self::SubscriberNotFound { id }
    }

    /// Creates a process launch failed error.
    #[inline]
    pub fn process_launch_failed(err: IoError) -> Self {
        Self::ProcessLaunchFailed {
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns the fault attribution for this error.
    #[must_use]
    pub fn status_class(&self) -> StatusClass {
        match self {
            Self::Config { .. }
            | Self::Validation { .. }
            | Self::UnknownDomain { .. }
            | Self::NotConnected
            | Self::SubscriberNotFound { .. } => StatusClass::ClientError,

            Self::Session { .. }
            | Self::Connection { .. }
            | Self::ConnectionTimeout { .. }
            | Self::ConnectionClosed
            | Self::Protocol { .. }
            | Self::CommandFailed { .. }
            | Self::RequestTimeout { .. }
            | Self::Script { .. }
            | Self::ProcessLaunchFailed { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::WebSocket(_)
            | Self::ChannelClosed(_) => StatusClass::ServerError,
        }
    }

    /// Returns `true` if this is a validation error.
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::UnknownDomain { .. })
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("failed to connect");
        assert_eq!(err.to_string(), "Connection failed: failed to connect");
    }

    #[test]
    fn test_unknown_domain_display() {
        let err = Error::unknown_domain("Fetch");
        assert_eq!(err.to_string(), "Unknown protocol domain: Fetch");
    }

    #[test]
    fn test_status_class_client() {
        assert_eq!(
            Error::validation("bad").status_class(),
            StatusClass::ClientError
        );
        assert_eq!(
            Error::unknown_domain("Fetch").status_class(),
            StatusClass::ClientError
        );
        assert_eq!(Error::NotConnected.status_class(), StatusClass::ClientError);
    }

    #[test]
    fn test_status_class_server() {
        assert_eq!(
            Error::session("acquisition failed").status_class(),
            StatusClass::ServerError
        );
        assert_eq!(
            Error::ConnectionClosed.status_class(),
            StatusClass::ServerError
        );
        assert_eq!(
            Error::command_failed("Page.enable", "denied").status_class(),
            StatusClass::ServerError
        );
    }

    #[test]
    fn test_is_validation() {
        assert!(Error::validation("bad").is_validation());
        assert!(Error::unknown_domain("Fetch").is_validation());
        assert!(!Error::NotConnected.is_validation());
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::ConnectionTimeout { timeout_ms: 5000 };
        let other_err = Error::connection("test");

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("test").is_connection_error());
        assert!(Error::ConnectionTimeout { timeout_ms: 1000 }.is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
