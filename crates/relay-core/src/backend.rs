//! Conversation-run backend seam.
//!
//! A [`ConversationBackend`] starts one [`ConversationRun`] per Turn. The run
//! executes on its own task: it pushes [`BackendEvent`]s through a bounded
//! channel ([`RunSink`]) and, before executing any tool listed in
//! [`RunRequest::gated_tools`], blocks on a [`DecisionInbox`] until the relay
//! submits a [`ToolDecision`].
//!
//! Dropping a [`ConversationRun`] aborts the task, so an abandoned Turn never
//! leaves a backend run behind.

use std::collections::HashSet;
use std::future::Future;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::errors::BackendError;
use crate::events::BackendEvent;

/// Default capacity of a run's event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// A source of conversation runs.
#[async_trait]
pub trait ConversationBackend: Send + Sync {
    /// Backend name for logs and metrics.
    fn name(&self) -> &str;

    /// Start a run for `request`.
    async fn start(&self, request: RunRequest) -> Result<ConversationRun, BackendError>;
}

/// Everything a backend needs to start a run.
#[derive(Clone, Debug, Default)]
pub struct RunRequest {
    /// Prompt text.
    pub prompt: String,
    /// Token naming prior conversation state held by the backend.
    pub continuation_token: Option<String>,
    /// Tools that must wait for a [`ToolDecision`] before executing.
    pub gated_tools: HashSet<String>,
}

impl RunRequest {
    /// Build a request with no gated tools.
    pub fn new(prompt: impl Into<String>, continuation_token: Option<String>) -> Self {
        Self {
            prompt: prompt.into(),
            continuation_token,
            gated_tools: HashSet::new(),
        }
    }

    /// Set the gated tool names.
    #[must_use]
    pub fn with_gated_tools(mut self, tools: impl IntoIterator<Item = String>) -> Self {
        self.gated_tools = tools.into_iter().collect();
        self
    }

    /// Whether `tool_name` must wait for a decision.
    pub fn requires_approval(&self, tool_name: &str) -> bool {
        self.gated_tools.contains(tool_name)
    }
}

/// The relay's answer for one gated tool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolDecision {
    /// Whether the tool may run.
    pub approved: bool,
    /// Why it may not (reported to the model as the tool result).
    pub message: Option<String>,
}

impl ToolDecision {
    /// Allow the tool to run.
    pub fn approve() -> Self {
        Self {
            approved: true,
            message: None,
        }
    }

    /// Decline the tool with a reason.
    pub fn deny(message: impl Into<String>) -> Self {
        Self {
            approved: false,
            message: Some(message.into()),
        }
    }

    /// The reason text, with a generic fallback for denials without one.
    pub fn reason(&self) -> &str {
        self.message
            .as_deref()
            .unwrap_or(if self.approved { "approved" } else { "User declined to run this tool" })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Run handle (relay side)
// ─────────────────────────────────────────────────────────────────────────────

/// One in-flight conversation run.
pub struct ConversationRun {
    events: mpsc::Receiver<Result<BackendEvent, BackendError>>,
    decisions: mpsc::UnboundedSender<ToolDecision>,
    task: JoinHandle<()>,
}

impl ConversationRun {
    /// Spawn `body` as a run task.
    ///
    /// The body receives the event sink and the decision inbox. When it
    /// returns, the event channel closes.
    pub fn spawn<F, Fut>(capacity: usize, body: F) -> Self
    where
        F: FnOnce(RunSink, DecisionInbox) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (event_tx, event_rx) = mpsc::channel(capacity.max(1));
        let (decision_tx, decision_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(body(
            RunSink { tx: event_tx },
            DecisionInbox { rx: decision_rx },
        ));
        Self {
            events: event_rx,
            decisions: decision_tx,
            task,
        }
    }

    /// Build a run that replays a fixed event script without any gating.
    pub fn from_events(events: Vec<Result<BackendEvent, BackendError>>) -> Self {
        Self::spawn(events.len().max(1), move |sink, _inbox| async move {
            for event in events {
                let delivered = match event {
                    Ok(event) => sink.emit(event).await,
                    Err(error) => sink.fail(error).await,
                };
                if !delivered {
                    break;
                }
            }
        })
    }

    /// Wait for the next event. `None` once the run has finished.
    pub async fn next_event(&mut self) -> Option<Result<BackendEvent, BackendError>> {
        self.events.recv().await
    }

    /// Deliver a decision for the tool the run is currently waiting on.
    pub fn submit_tool_decision(&self, decision: ToolDecision) -> Result<(), BackendError> {
        self.decisions
            .send(decision)
            .map_err(|_| BackendError::Closed)
    }
}

impl Drop for ConversationRun {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend side
// ─────────────────────────────────────────────────────────────────────────────

/// Where a run task pushes its events.
#[derive(Clone)]
pub struct RunSink {
    tx: mpsc::Sender<Result<BackendEvent, BackendError>>,
}

impl RunSink {
    /// Push one event. Returns `false` once the relay has gone away.
    pub async fn emit(&self, event: BackendEvent) -> bool {
        self.tx.send(Ok(event)).await.is_ok()
    }

    /// Report a terminal failure. Returns `false` once the relay has gone away.
    pub async fn fail(&self, error: BackendError) -> bool {
        self.tx.send(Err(error)).await.is_ok()
    }
}

/// Where a run task waits for tool decisions.
pub struct DecisionInbox {
    rx: mpsc::UnboundedReceiver<ToolDecision>,
}

impl DecisionInbox {
    /// Wait for the decision on `tool_name`.
    ///
    /// A closed channel (the relay dropped the run) counts as a denial.
    pub async fn wait(&mut self, tool_name: &str) -> ToolDecision {
        if let Some(decision) = self.rx.recv().await {
            debug!(tool_name, approved = decision.approved, "tool decision received");
            decision
        } else {
            ToolDecision::deny(format!("Run cancelled before {tool_name} was approved"))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
