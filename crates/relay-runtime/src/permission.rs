//! Permission gate: out-of-band approval before a gated tool executes.
//!
//! ```text
//! idle ──request──▶ awaiting_decision ──┬─ approved=true ─────────▶ approved
//!                                      ├─ approved=false / junk ─▶ denied
//!                                      ├─ wait budget elapsed ───▶ timed_out
//!                                      └─ client disconnected ───▶ aborted
//! ```
//!
//! The gate borrows the session channel for the whole wait, so while it is
//! awaiting a decision nothing else in the Turn makes progress and a second
//! gated tool queues behind the first.

use std::time::Duration;

use metrics::counter;
use relay_core::{ClientMessage, RelayError, ToolDecision, WireEvent};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::channel::SessionChannel;

/// Metric name: permission requests by outcome.
pub const PERMISSION_REQUESTS_TOTAL: &str = "permission_requests_total";

/// How a permission request ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionOutcome {
    /// The client approved.
    Approved,
    /// The client refused or answered with something that is not a decision.
    Denied,
    /// No answer within the wait budget.
    TimedOut,
    /// The client disconnected, or the channel cannot carry a decision.
    Aborted,
}

impl PermissionOutcome {
    /// Lowercase label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::TimedOut => "timed_out",
            Self::Aborted => "aborted",
        }
    }

    /// The decision handed to the backend. Only approval lets the tool run.
    pub fn decision(self, tool_name: &str, timeout: Duration) -> ToolDecision {
        match self {
            Self::Approved => ToolDecision::approve(),
            Self::Denied => {
                ToolDecision::deny(format!("User denied permission to use {tool_name}"))
            }
            Self::TimedOut => ToolDecision::deny(
                RelayError::PermissionTimeout {
                    tool_name: tool_name.to_owned(),
                    timeout_secs: timeout.as_secs(),
                }
                .to_string(),
            ),
            Self::Aborted => ToolDecision::deny(format!(
                "Permission for {tool_name} could not be obtained from the client"
            )),
        }
    }
}

/// Gate state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateState {
    /// No request outstanding.
    Idle,
    /// Waiting on the client for `tool_name`.
    AwaitingDecision {
        /// Tool awaiting approval.
        tool_name: String,
    },
    /// The last request ended with this outcome.
    Resolved(PermissionOutcome),
}

/// One Turn's permission gate.
#[derive(Debug)]
pub struct PermissionGate {
    timeout: Duration,
    state: GateState,
}

impl PermissionGate {
    /// Create an idle gate with the given wait budget.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            state: GateState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> &GateState {
        &self.state
    }

    /// Wait budget.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask the client to approve `tool_name` and wait for the answer.
    ///
    /// Events the gate produces are appended to `log`: the outbound
    /// `permission_request` and, when the client answers, the consumed
    /// `permission_response`. Fails only if the request cannot be sent.
    #[instrument(skip_all, fields(tool_name))]
    pub async fn request(
        &mut self,
        channel: &mut SessionChannel,
        log: &mut Vec<WireEvent>,
        tool_name: &str,
        input: Value,
    ) -> Result<PermissionOutcome, RelayError> {
        self.state = GateState::AwaitingDecision {
            tool_name: tool_name.to_owned(),
        };

        let request = WireEvent::PermissionRequest {
            tool_name: tool_name.to_owned(),
            input,
        };
        channel.send(request.clone()).await?;
        log.push(request);

        let outcome = if channel.has_inbound() {
            self.await_decision(channel, log, tool_name).await
        } else {
            warn!("channel has no inbound side, denying gated tool");
            PermissionOutcome::Aborted
        };

        info!(outcome = outcome.as_str(), "permission resolved");
        counter!(PERMISSION_REQUESTS_TOTAL, "outcome" => outcome.as_str()).increment(1);
        self.state = GateState::Resolved(outcome);
        Ok(outcome)
    }

    async fn await_decision(
        &self,
        channel: &mut SessionChannel,
        log: &mut Vec<WireEvent>,
        tool_name: &str,
    ) -> PermissionOutcome {
        let Ok(inbound) = tokio::time::timeout(self.timeout, channel.recv()).await else {
            warn!(
                timeout_secs = self.timeout.as_secs(),
                "no permission decision before the deadline"
            );
            return PermissionOutcome::TimedOut;
        };
        let Some(text) = inbound else {
            warn!("client disconnected while a permission request was pending");
            return PermissionOutcome::Aborted;
        };

        match ClientMessage::parse(&text) {
            Ok(ClientMessage::PermissionResponse { approved }) => {
                log.push(WireEvent::PermissionResponse { approved });
                if approved {
                    PermissionOutcome::Approved
                } else {
                    PermissionOutcome::Denied
                }
            }
            Ok(ClientMessage::Prompt(_)) => {
                let violation = RelayError::ProtocolViolation(format!(
                    "prompt received while awaiting permission for {tool_name}"
                ));
                warn!(error = %violation, "treating as denial");
                PermissionOutcome::Denied
            }
            Err(e) => {
                warn!(error = %e, "malformed permission response, treating as denial");
                PermissionOutcome::Denied
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
