//! # relay-llm
//!
//! Conversation backends behind the [`ConversationBackend`](relay_core::ConversationBackend) seam.
//!
//! - [`AnthropicBackend`]: streams the Anthropic Messages API over SSE and runs
//!   the tool loop, waiting on tool decisions for gated tools
//! - [`EchoBackend`]: deterministic offline backend for development and tests
//! - [`sse`]: shared SSE line parser
//! - [`TranscriptStore`]: per-continuation-token conversation memory

#![deny(unsafe_code)]

pub mod anthropic;
pub mod echo;
pub mod sse;
pub mod transcripts;

pub use anthropic::{AnthropicBackend, AnthropicConfig};
pub use echo::EchoBackend;
pub use transcripts::TranscriptStore;

/// Metric name: backend runs that ended in an error.
pub const BACKEND_ERRORS_TOTAL: &str = "backend_errors_total";

/// Record a failed run for `backend`.
pub(crate) fn record_backend_error(backend: &str, error: &relay_core::BackendError) {
    tracing::warn!(backend, error = %error, "conversation run failed");
    metrics::counter!(BACKEND_ERRORS_TOTAL, "backend" => backend.to_owned()).increment(1);
}
