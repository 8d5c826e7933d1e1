//! Session-level command, response, and raw event shapes.
//!
//! These mirror the devtools wire protocol: commands carry an integer `id`
//! for correlation, responses echo it, and events arrive with a `method`
//! and no `id`.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::CommandId;

use super::Domain;

// ============================================================================
// CommandRequest
// ============================================================================

/// A protocol command from the proxy to the session.
///
/// # Format
///
/// ```json
/// { "id": 7, "method": "Page.enable", "params": {} }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct CommandRequest {
    /// Correlation id, unique per session.
    pub id: CommandId,

    /// Command name in `"<domain>.<name>"` format.
    pub method: String,

    /// Command parameters.
    pub params: Value,

    /// Target session scope, for multiplexed endpoints.
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl CommandRequest {
    /// Creates a new command request.
    #[inline]
    #[must_use]
    pub fn new(id: CommandId, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
            session_id: None,
        }
    }
}

// ============================================================================
// CommandResponse
// ============================================================================

/// A command response from the session.
///
/// # Format
///
/// Success:
/// ```json
/// { "id": 7, "result": { ... } }
/// ```
///
/// Error:
/// ```json
/// { "id": 7, "error": { "code": -32601, "message": "..." } }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CommandResponse {
    /// Matches the command `id`.
    pub id: CommandId,

    /// Result data (if success).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error payload (if error).
    #[serde(default)]
    pub error: Option<CommandError>,
}

impl CommandResponse {
    /// Returns `true` if this is a success response.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Extracts the result value, mapping error responses to
    /// [`Error::CommandFailed`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandFailed`] if the session answered with an
    /// error payload.
    pub fn into_result(self, method: &str) -> Result<Value> {
        match self.error {
            None => Ok(self.result.unwrap_or(Value::Null)),
            Some(err) => Err(Error::command_failed(method, err.message)),
        }
    }
}

// ============================================================================
// CommandError
// ============================================================================

/// Error payload inside an error response.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandError {
    /// Protocol error code.
    #[serde(default)]
    pub code: i64,

    /// Human-readable error message.
    #[serde(default)]
    pub message: String,
}

// ============================================================================
// RawEvent
// ============================================================================

/// An unnormalized event notification from the session.
///
/// # Format
///
/// ```json
/// { "method": "Page.loadEventFired", "params": { "timestamp": 123.4 } }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    /// Event name in `"<domain>.<name>"` format.
    pub method: String,

    /// Event-specific data.
    #[serde(default)]
    pub params: Value,

    /// Originating session scope, for multiplexed endpoints.
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
}

impl RawEvent {
    /// Validates and returns the event's domain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownDomain`] when the method prefix is outside
    /// the fixed domain set.
    #[inline]
    pub fn domain(&self) -> Result<Domain> {
        Domain::of_method(&self.method)
    }
}

// ============================================================================
// Tests
// ============================================================================
