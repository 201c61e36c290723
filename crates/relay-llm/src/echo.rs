//! Offline echo backend.
//!
//! Deterministic stand-in for a model. A prompt containing `<a> + <b>` or
//! `<a> * <b>` is answered by calling `add_numbers` / `multiply_numbers` through
//! the tool registry, streamed the way a model would stream a `tool_use` block.
//! Any other prompt is answered with the conversation so far for its
//! continuation token. Every run costs nothing.

use std::sync::{Arc, LazyLock};
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;
use relay_core::backend::DEFAULT_EVENT_CAPACITY;
use relay_core::ids::new_tool_use_id;
use relay_core::{
    BackendError, BackendEvent, BlockKind, ContentSegment, ConversationBackend, ConversationRun,
    DecisionInbox, RunRequest, RunSink, RunSummary, StreamDelta, ToolOutput, TurnSnapshot,
};
use relay_tools::ToolRegistry;
use serde_json::json;
use tracing::{debug, instrument};

use crate::transcripts::TranscriptStore;

const BACKEND_NAME: &str = "echo";

static ARITHMETIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(-?\d+)\s*([+*×])\s*(-?\d+)").unwrap());

/// Arithmetic request recognised in a prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
struct ToolCall {
    tool: &'static str,
    a: i64,
    b: i64,
}

fn parse_arithmetic(prompt: &str) -> Option<ToolCall> {
    let caps = ARITHMETIC.captures(prompt)?;
    let a = caps[1].parse().ok()?;
    let b = caps[3].parse().ok()?;
    let tool = if &caps[2] == "+" {
        "add_numbers"
    } else {
        "multiply_numbers"
    };
    Some(ToolCall { tool, a, b })
}

/// Split `text` into word-sized fragments that concatenate back to it.
fn fragments(text: &str) -> Vec<String> {
    text.split_inclusive(' ').map(String::from).collect()
}

/// Deterministic offline backend.
pub struct EchoBackend {
    inner: Arc<Inner>,
}

struct Inner {
    tools: Arc<ToolRegistry>,
    history: TranscriptStore<String>,
}

impl EchoBackend {
    /// Create an echo backend that runs tools from `tools`.
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            inner: Arc::new(Inner {
                tools,
                history: TranscriptStore::new(),
            }),
        }
    }
}

#[async_trait]
impl ConversationBackend for EchoBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn start(&self, request: RunRequest) -> Result<ConversationRun, BackendError> {
        let inner = Arc::clone(&self.inner);
        Ok(ConversationRun::spawn(
            DEFAULT_EVENT_CAPACITY,
            move |sink, inbox| async move {
                match inner.run(request, &sink, inbox).await {
                    Ok(()) => {}
                    Err(BackendError::Closed) => debug!("relay dropped the run"),
                    Err(e) => {
                        crate::record_backend_error(BACKEND_NAME, &e);
                        let _ = sink.fail(e).await;
                    }
                }
            },
        ))
    }
}

async fn emit(sink: &RunSink, event: BackendEvent) -> Result<(), BackendError> {
    if sink.emit(event).await {
        Ok(())
    } else {
        Err(BackendError::Closed)
    }
}

async fn emit_delta(sink: &RunSink, delta: StreamDelta) -> Result<(), BackendError> {
    emit(sink, BackendEvent::Stream(delta)).await
}

impl Inner {
    #[instrument(skip_all, fields(session_id = request.continuation_token.as_deref().unwrap_or("-")))]
    async fn run(
        &self,
        request: RunRequest,
        sink: &RunSink,
        mut inbox: DecisionInbox,
    ) -> Result<(), BackendError> {
        let started = Instant::now();
        let token = request.continuation_token.as_deref();
        let mut history = self.history.load(token);
        history.push(request.prompt.clone());

        emit(
            sink,
            BackendEvent::SystemNotice {
                subtype: "init".into(),
                data: json!({ "backend": BACKEND_NAME, "session_id": token }),
            },
        )
        .await?;

        let (reply, num_turns) = match parse_arithmetic(&request.prompt) {
            Some(call) => {
                let output = self.call_tool(&request, &call, sink, &mut inbox).await?;
                let reply = if output.is_error {
                    format!("I could not run {}: {}", call.tool, output.text)
                } else {
                    output.text
                };
                (reply, 2)
            }
            None => (format!("Conversation so far: {}", history.join(" | ")), 1),
        };

        emit_delta(sink, StreamDelta::BlockStart { index: 0, kind: BlockKind::Text }).await?;
        for text in fragments(&reply) {
            emit_delta(sink, StreamDelta::TextDelta { index: 0, text }).await?;
        }
        emit_delta(sink, StreamDelta::BlockStop { index: 0 }).await?;
        emit(
            sink,
            BackendEvent::AssistantTurn(TurnSnapshot::new(vec![ContentSegment::text(reply)])),
        )
        .await?;

        self.history.save(token, history);
        let summary = RunSummary {
            total_cost_usd: Some(0.0),
            num_turns,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            session_id: request.continuation_token.clone(),
            is_error: false,
            usage: relay_core::Usage::default(),
        };
        emit(sink, BackendEvent::FinalResult(summary)).await
    }

    /// Stream a `tool_use` block for `call`, run it and report the result.
    async fn call_tool(
        &self,
        request: &RunRequest,
        call: &ToolCall,
        sink: &RunSink,
        inbox: &mut DecisionInbox,
    ) -> Result<ToolOutput, BackendError> {
        let id = new_tool_use_id();
        let input = json!({ "a": call.a, "b": call.b });
        let args = input.to_string();

        emit_delta(
            sink,
            StreamDelta::BlockStart {
                index: 0,
                kind: BlockKind::ToolUse {
                    id: id.clone(),
                    name: call.tool.into(),
                },
            },
        )
        .await?;
        let mid = args.find(',').unwrap_or(args.len());
        for partial_json in [&args[..mid], &args[mid..]] {
            if !partial_json.is_empty() {
                emit_delta(
                    sink,
                    StreamDelta::InputJsonDelta {
                        index: 0,
                        partial_json: partial_json.to_owned(),
                    },
                )
                .await?;
            }
        }
        emit_delta(sink, StreamDelta::BlockStop { index: 0 }).await?;
        emit(
            sink,
            BackendEvent::AssistantTurn(TurnSnapshot::new(vec![ContentSegment::ToolUse {
                id: id.clone(),
                name: call.tool.into(),
                input: input.clone(),
            }])),
        )
        .await?;

        let output = if request.requires_approval(call.tool) {
            let decision = inbox.wait(call.tool).await;
            if decision.approved {
                self.invoke(call.tool, input).await
            } else {
                ToolOutput::error(decision.reason())
            }
        } else {
            self.invoke(call.tool, input).await
        };

        emit(
            sink,
            BackendEvent::UserTurn(TurnSnapshot::new(vec![ContentSegment::ToolResult {
                tool_use_id: id,
                content: output.text.clone(),
                is_error: output.is_error,
            }])),
        )
        .await?;
        Ok(output)
    }

    async fn invoke(&self, name: &str, input: serde_json::Value) -> ToolOutput {
        self.tools
            .invoke(name, input)
            .await
            .unwrap_or_else(|e| ToolOutput::error(e.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use relay_core::ToolDecision;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn backend() -> EchoBackend {
        EchoBackend::new(Arc::new(relay_tools::builtin_registry()))
    }

    async fn drain(run: &mut ConversationRun, decision: Option<ToolDecision>) -> Vec<BackendEvent> {
        let mut events = Vec::new();
        while let Some(event) = tokio::time::timeout(TIMEOUT, run.next_event())
            .await
            .expect("run stalled")
        {
            let event = event.unwrap();
            if let (BackendEvent::AssistantTurn(s), Some(d)) = (&event, &decision) {
                if s.tool_uses().next().is_some() {
                    run.submit_tool_decision(d.clone()).unwrap();
                }
            }
            events.push(event);
        }
        events
    }

    fn reply_text(events: &[BackendEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                BackendEvent::Stream(StreamDelta::TextDelta { text, .. }) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn parses_arithmetic() {
        assert_eq!(
            parse_arithmetic("What is 15 + 27?"),
            Some(ToolCall { tool: "add_numbers", a: 15, b: 27 })
        );
        assert_eq!(
            parse_arithmetic("-3*4"),
            Some(ToolCall { tool: "multiply_numbers", a: -3, b: 4 })
        );
        assert_eq!(parse_arithmetic("hello"), None);
        assert_eq!(parse_arithmetic("99999999999999999999 + 1"), None);
    }

    #[test]
    fn fragments_rejoin() {
        assert_eq!(fragments("a b c").concat(), "a b c");
        assert_eq!(fragments("a b c").len(), 3);
    }

    #[tokio::test]
    async fn approved_addition() {
        let backend = backend();
        let request = RunRequest::new("What is 15 + 27?", None)
            .with_gated_tools(["add_numbers".to_string()]);
        let mut run = backend.start(request).await.unwrap();
        let events = drain(&mut run, Some(ToolDecision::approve())).await;

        assert_matches!(&events[0], BackendEvent::SystemNotice { subtype, .. } if subtype == "init");
        assert_matches!(
            &events[1],
            BackendEvent::Stream(StreamDelta::BlockStart { kind: BlockKind::ToolUse { name, .. }, .. })
                if name == "add_numbers"
        );
        let json: String = events
            .iter()
            .filter_map(|e| match e {
                BackendEvent::Stream(StreamDelta::InputJsonDelta { partial_json, .. }) => {
                    Some(partial_json.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(json, r#"{"a":15,"b":27}"#);
        assert_eq!(reply_text(&events), "15 + 27 = 42");
        assert_matches!(
            events.last(),
            Some(BackendEvent::FinalResult(s)) if s.total_cost_usd == Some(0.0) && s.num_turns == 2
        );
    }

    #[tokio::test]
    async fn ungated_tool_runs_without_decision() {
        let backend = backend();
        let mut run = backend.start(RunRequest::new("6 * 7", None)).await.unwrap();
        let events = drain(&mut run, None).await;
        assert_eq!(reply_text(&events), "6 × 7 = 42");
    }

    #[tokio::test]
    async fn denied_tool_is_reported() {
        let backend = backend();
        let request =
            RunRequest::new("2 + 2", None).with_gated_tools(["add_numbers".to_string()]);
        let mut run = backend.start(request).await.unwrap();
        let events = drain(&mut run, Some(ToolDecision::deny("User denied permission"))).await;

        assert!(events.iter().any(|e| matches!(
            e,
            BackendEvent::UserTurn(s) if matches!(&s.content[0], ContentSegment::ToolResult { is_error: true, .. })
        )));
        assert_eq!(
            reply_text(&events),
            "I could not run add_numbers: User denied permission"
        );
    }

    #[tokio::test]
    async fn history_accumulates_per_token() {
        let backend = backend();
        let token = Some("abc".to_string());

        let mut first = backend.start(RunRequest::new("hello", token.clone())).await.unwrap();
        let events = drain(&mut first, None).await;
        assert_eq!(reply_text(&events), "Conversation so far: hello");

        let mut second = backend.start(RunRequest::new("again", token)).await.unwrap();
        let events = drain(&mut second, None).await;
        assert_eq!(reply_text(&events), "Conversation so far: hello | again");

        let mut other = backend.start(RunRequest::new("solo", None)).await.unwrap();
        let events = drain(&mut other, None).await;
        assert_eq!(reply_text(&events), "Conversation so far: solo");
    }

    #[tokio::test]
    async fn dropped_run_stops_quietly() {
        let backend = backend();
        let request =
            RunRequest::new("1 + 1", None).with_gated_tools(["add_numbers".to_string()]);
        let run = backend.start(request).await.unwrap();
        drop(run);
        tokio::task::yield_now().await;
    }
}
