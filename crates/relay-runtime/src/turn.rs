//! Turn driver.
//!
//! [`run_turn`] drives one backend run to its terminal event: backend events
//! go through the [`EventTranslator`], gated tool uses through the
//! [`PermissionGate`], and every resulting [`WireEvent`] is sent on the
//! [`SessionChannel`] in production order. [`serve_session`] loops a duplex
//! channel over prompts; [`run_request`] handles a single request/stream body.
//!
//! Exactly one `final_result` or `error` ends a Turn and nothing is sent after
//! it. A failed send abandons the Turn without further sends.

use relay_core::{
    BackendError, BackendEvent, ClientMessage, ConversationRun, InputError, PromptRequest,
    RelayError, RunRequest, TurnId, WireEvent,
};
use tracing::{Span, debug, error, info, instrument, warn};

use crate::channel::SessionChannel;
use crate::context::RelayContext;
use crate::permission::{PermissionGate, PermissionOutcome};
use crate::translator::{EventTranslator, TranslatorOutput};

/// Metric name: finished Turns by status.
pub const TURNS_TOTAL: &str = "turns_total";
/// Metric name: Turns in flight.
pub const TURNS_ACTIVE: &str = "turns_active";
/// Metric name: Turn wall-clock duration.
pub const TURN_DURATION_SECONDS: &str = "turn_duration_seconds";

/// Terminal status of a Turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnStatus {
    /// Still running.
    Pending,
    /// Ended with `final_result`.
    Completed,
    /// Ended with `error`, or abandoned after a transport failure.
    Errored,
}

impl TurnStatus {
    /// Lowercase label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Errored => "errored",
        }
    }
}

/// One prompt-to-terminal-result cycle.
#[derive(Clone, Debug)]
pub struct Turn {
    /// Turn id.
    pub id: TurnId,
    /// Prompt text.
    pub prompt: String,
    /// Continuation token the prompt carried.
    pub continuation_token: Option<String>,
    /// Every wire event the Turn produced, in order, including consumed
    /// permission responses.
    pub events: Vec<WireEvent>,
    /// Terminal status.
    pub status: TurnStatus,
}

impl Turn {
    fn new(request: PromptRequest) -> Self {
        Self {
            id: TurnId::new(),
            prompt: request.prompt,
            continuation_token: request.session_id,
            events: Vec::new(),
            status: TurnStatus::Pending,
        }
    }

    /// The event that ended the Turn, if it got that far.
    pub fn terminal_event(&self) -> Option<&WireEvent> {
        self.events.last().filter(|e| e.is_terminal())
    }

    /// Concatenated `stream_text` payloads.
    pub fn text(&self) -> String {
        self.events
            .iter()
            .filter_map(|e| match e {
                WireEvent::StreamText(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    async fn deliver(
        &mut self,
        channel: &SessionChannel,
        event: WireEvent,
    ) -> Result<(), RelayError> {
        channel.send(event.clone()).await?;
        self.events.push(event);
        Ok(())
    }
}

/// Why a Turn stopped before `final_result`.
enum Halt {
    /// Report this error to the client.
    Report(RelayError),
    /// The client is gone; log and stop.
    Abandon(RelayError),
}

impl From<RelayError> for Halt {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::Transport(_) => Self::Abandon(e),
            other => Self::Report(other),
        }
    }
}

impl From<BackendError> for Halt {
    fn from(e: BackendError) -> Self {
        Self::Report(RelayError::Backend(e))
    }
}

enum Step {
    Backend(Option<Result<BackendEvent, BackendError>>),
    Inbound(Option<String>),
}

/// Drive one Turn for `request` to its terminal event.
#[instrument(
    skip_all,
    fields(
        turn_id = tracing::field::Empty,
        session_id = request.session_id.as_deref().unwrap_or("-"),
        backend = ctx.backend.name(),
    )
)]
pub async fn run_turn(
    ctx: &RelayContext,
    channel: &mut SessionChannel,
    request: PromptRequest,
) -> Turn {
    let mut turn = Turn::new(request);
    let _ = Span::current().record("turn_id", turn.id.as_str());
    info!(prompt_len = turn.prompt.len(), "turn started");

    let active = ctx.enter_turn();

    turn.status = match drive(ctx, channel, &mut turn).await {
        Ok(()) => TurnStatus::Completed,
        Err(Halt::Report(e)) => {
            error!(error = %e, "turn failed");
            if let Err(send_err) = turn.deliver(channel, WireEvent::error(e.to_string())).await {
                warn!(error = %send_err, "could not report turn failure");
            }
            TurnStatus::Errored
        }
        Err(Halt::Abandon(e)) => {
            warn!(error = %e, "turn abandoned");
            TurnStatus::Errored
        }
    };

    info!(
        status = turn.status.as_str(),
        events = turn.events.len(),
        duration_ms = u64::try_from(active.elapsed().as_millis()).unwrap_or(u64::MAX),
        "turn finished"
    );
    active.finish(turn.status);
    turn
}

async fn drive(
    ctx: &RelayContext,
    channel: &mut SessionChannel,
    turn: &mut Turn,
) -> Result<(), Halt> {
    let gated = ctx.permissions.approval_required.clone();
    let run_request = RunRequest::new(turn.prompt.clone(), turn.continuation_token.clone())
        .with_gated_tools(gated.iter().cloned());
    let mut run = ctx.backend.start(run_request).await?;

    let mut translator = EventTranslator::new(gated);
    let mut gate = PermissionGate::new(ctx.permissions.timeout);
    let listening = channel.has_inbound();

    while !translator.is_finished() {
        let step = tokio::select! {
            biased;
            event = run.next_event() => Step::Backend(event),
            inbound = channel.recv(), if listening => Step::Inbound(inbound),
        };

        let event = match step {
            Step::Backend(Some(Ok(event))) => event,
            Step::Backend(Some(Err(e))) => return Err(e.into()),
            Step::Backend(None) => return Err(BackendError::Closed.into()),
            Step::Inbound(Some(text)) => {
                let violation =
                    RelayError::ProtocolViolation(format!("unexpected inbound message: {text}"));
                warn!(error = %violation, "ignored");
                continue;
            }
            Step::Inbound(None) => {
                return Err(Halt::Abandon(RelayError::Transport(
                    "client disconnected mid-turn".into(),
                )));
            }
        };

        debug!(?event, "backend event");
        for output in translator.translate(event) {
            match output {
                TranslatorOutput::Send(event) => turn.deliver(channel, event).await?,
                TranslatorOutput::AwaitApproval { tool_name, input } => {
                    approve(channel, turn, &mut gate, &run, tool_name, input).await?;
                }
            }
        }
    }
    Ok(())
}

/// Run the permission gate for one tool use and hand the decision to the run.
async fn approve(
    channel: &mut SessionChannel,
    turn: &mut Turn,
    gate: &mut PermissionGate,
    run: &ConversationRun,
    tool_name: String,
    input: serde_json::Value,
) -> Result<(), Halt> {
    let outcome = gate
        .request(channel, &mut turn.events, &tool_name, input)
        .await?;
    let decision = outcome.decision(&tool_name, gate.timeout());
    if let Err(e) = run.submit_tool_decision(decision) {
        warn!(error = %e, %tool_name, "run stopped before the decision was delivered");
    }

    // Without an inbound side the denial is expected and the Turn goes on.
    if outcome == PermissionOutcome::Aborted && channel.has_inbound() {
        return Err(Halt::Report(RelayError::Transport(format!(
            "Client disconnected while awaiting permission for {tool_name}"
        ))));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Session loops
// ─────────────────────────────────────────────────────────────────────────────

/// What a session did before its channel closed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Turns started.
    pub turns: usize,
    /// Turns that ended with `final_result`.
    pub completed: usize,
    /// Turns that ended with `error` or were abandoned.
    pub errored: usize,
    /// Inbound messages rejected before a Turn could start.
    pub input_errors: usize,
}

impl SessionSummary {
    fn record(&mut self, turn: &Turn) {
        self.turns += 1;
        match turn.status {
            TurnStatus::Completed => self.completed += 1,
            TurnStatus::Errored | TurnStatus::Pending => self.errored += 1,
        }
    }
}

/// Serve prompts from a duplex channel.
///
/// With `multi_turn` off the session ends after its first prompt (accepted or
/// rejected); otherwise it runs until the client disconnects.
#[instrument(skip_all, fields(multi_turn))]
pub async fn serve_session(
    ctx: &RelayContext,
    channel: &mut SessionChannel,
    multi_turn: bool,
) -> SessionSummary {
    let mut summary = SessionSummary::default();

    while let Some(text) = channel.recv().await {
        match ClientMessage::parse(&text) {
            Ok(ClientMessage::Prompt(request)) => {
                let turn = run_turn(ctx, channel, request).await;
                summary.record(&turn);
                if channel.is_closed() {
                    break;
                }
            }
            Ok(ClientMessage::PermissionResponse { .. }) => {
                let violation = RelayError::ProtocolViolation(
                    "permission response with no pending request".into(),
                );
                warn!(error = %violation, "ignored");
                continue;
            }
            Err(e) => {
                summary.input_errors += 1;
                if reject(channel, &e).await.is_err() {
                    break;
                }
            }
        }
        if !multi_turn {
            break;
        }
    }

    debug!(?summary, "session ended");
    summary
}

/// Handle one request/stream body.
///
/// Returns the Turn, or `None` when the body was rejected with an `error`
/// event.
pub async fn run_request(
    ctx: &RelayContext,
    channel: &mut SessionChannel,
    body: &str,
) -> Option<Turn> {
    let rejection = match ClientMessage::parse(body) {
        Ok(ClientMessage::Prompt(request)) => return Some(run_turn(ctx, channel, request).await),
        Ok(ClientMessage::PermissionResponse { .. }) => {
            InputError::Malformed("a permission response cannot start a turn".into())
        }
        Err(e) => e,
    };
    let _ = reject(channel, &rejection).await;
    None
}

async fn reject(channel: &SessionChannel, e: &InputError) -> Result<(), RelayError> {
    warn!(error = %e, "rejected inbound message");
    channel.send(WireEvent::error(e.to_string())).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
