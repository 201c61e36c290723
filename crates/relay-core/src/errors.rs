//! Error taxonomy for the relay.
//!
//! - [`InputError`]: the inbound prompt is missing or malformed; no Turn starts
//! - [`BackendError`]: the conversation run failed; the Turn ends with one `error` event
//! - [`RelayError`]: top-level enum covering every failure class a Turn can hit
//!
//! Nothing is retried. Every variant is terminal for the Turn it occurs in
//! (except `ProtocolViolation` and `PermissionTimeout`, which degrade in place)
//! and none of them crash the process.

use thiserror::Error;

/// The inbound prompt message could not be accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// Neither `prompt` nor `inputText` carried a non-empty string.
    #[error("No prompt or inputText provided")]
    MissingPrompt,

    /// The message was not a JSON object of a known shape.
    #[error("Invalid message: {0}")]
    Malformed(String),
}

/// A conversation-run backend failed or terminated abnormally.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Transport-level failure talking to the backend.
    #[error("HTTP error: {message}")]
    Http {
        /// Underlying error text.
        message: String,
    },

    /// The backend API answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// The event stream carried an error or ended in an invalid state.
    #[error("stream error: {0}")]
    Stream(String),

    /// A backend payload could not be (de)serialised.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The run's channel closed before it produced a result.
    #[error("conversation run closed before producing a result")]
    Closed,

    /// The run hit its turn limit without finishing.
    #[error("exceeded maximum of {0} turns")]
    MaxTurnsExceeded(u32),

    /// A tool invocation failed in a way the run cannot recover from.
    #[error("tool error: {0}")]
    Tool(String),

    /// The backend is not usable (e.g. no credential configured).
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Top-level relay error.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Empty or malformed prompt. Reported; the Turn never starts.
    #[error(transparent)]
    Input(#[from] InputError),

    /// Unmatched tool-result id or unexpected inbound message. Logged only.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The conversation run failed. Reported as a single `error` event.
    #[error("Agent run failed: {0}")]
    Backend(#[from] BackendError),

    /// No permission decision arrived in time. Treated as a denial.
    #[error("Permission request for {tool_name} timed out after {timeout_secs}s")]
    PermissionTimeout {
        /// Tool awaiting approval.
        tool_name: String,
        /// Wait budget that elapsed.
        timeout_secs: u64,
    },

    /// Sending to the client failed. No further sends are attempted.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
