//! # relay-core
//!
//! Shared vocabulary for the relay between a streaming conversation backend
//! and a message-oriented client transport.
//!
//! - **Wire events**: [`WireEvent`] is the stable client-facing output vocabulary,
//!   [`ClientMessage`] the inbound one
//! - **Backend events**: [`BackendEvent`] is the closed union every backend emits
//! - **Backend seam**: [`ConversationBackend`] starts a [`ConversationRun`] that
//!   streams events and accepts tool decisions
//! - **Errors**: [`RelayError`] taxonomy via `thiserror`
//! - **Pricing**: per-model token pricing for the end-of-turn cost line
//! - **Logging**: [`logging::init_subscriber`] for binaries and tests

#![deny(unsafe_code)]

pub mod backend;
pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod pricing;
pub mod tools;
pub mod wire;

pub use backend::{
    ConversationBackend, ConversationRun, DecisionInbox, RunRequest, RunSink, ToolDecision,
};
pub use errors::{BackendError, InputError, RelayError, Result};
pub use events::{
    BackendEvent, BlockKind, ContentSegment, RunSummary, StreamDelta, TurnSnapshot, Usage,
};
pub use ids::{ConnectionId, TurnId};
pub use tools::{ToolDefinition, ToolOutput};
pub use wire::{ClientMessage, PromptRequest, WireEvent};
