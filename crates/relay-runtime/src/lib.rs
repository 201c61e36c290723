//! # relay-runtime
//!
//! The Turn driver between a [`ConversationBackend`](relay_core::ConversationBackend)
//! and a client transport.
//!
//! - [`translator`]: backend events to wire events, with duplicate suppression
//! - [`tracker`]: tool-use id to tool name, scoped to one Turn
//! - [`permission`]: the approval gate in front of gated tools
//! - [`channel`]: the transport-neutral [`SessionChannel`]
//! - [`turn`]: [`run_turn`], [`serve_session`] and [`run_request`]
//! - [`context`]: the shared [`RelayContext`] built once at startup

#![deny(unsafe_code)]

pub mod channel;
pub mod context;
pub mod permission;
pub mod tracker;
pub mod translator;
pub mod turn;

pub use channel::{ChannelMode, SessionChannel};
pub use context::{PermissionPolicy, RelayContext};
pub use permission::{GateState, PermissionGate, PermissionOutcome};
pub use tracker::{ToolCallTracker, UNKNOWN_TOOL};
pub use translator::{EventTranslator, TranslatorOutput};
pub use turn::{SessionSummary, Turn, TurnStatus, run_request, run_turn, serve_session};
