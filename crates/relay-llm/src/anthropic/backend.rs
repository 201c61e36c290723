//! Anthropic backend implementing [`ConversationBackend`].
//!
//! Each run streams `POST {base}/v1/messages` responses, forwarding block
//! deltas as they arrive. When the model stops for `tool_use` the run executes
//! the requested tools (waiting on a [`ToolDecision`](relay_core::ToolDecision)
//! for gated ones), sends the results back and streams the next response,
//! until the model ends its turn or `max_turns` round trips are used up.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::StreamExt;
use relay_core::backend::DEFAULT_EVENT_CAPACITY;
use relay_core::pricing::calculate_cost;
use relay_core::{
    BackendError, BackendEvent, ContentSegment, ConversationBackend, ConversationRun,
    DecisionInbox, RunRequest, RunSink, RunSummary, ToolOutput, TurnSnapshot, Usage,
};
use relay_tools::ToolRegistry;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};
use tracing::{debug, error, info, instrument, warn};

use super::stream_handler::{AssistantMessage, StreamState};
use super::types::{
    API_VERSION, AnthropicConfig, AnthropicMessageParam, AnthropicRequest, AnthropicSseEvent,
    AnthropicTool,
};
use crate::sse::{parse_sse_data, parse_sse_lines};
use crate::transcripts::TranscriptStore;

const BACKEND_NAME: &str = "anthropic";

/// Anthropic Messages API backend.
pub struct AnthropicBackend {
    inner: Arc<Inner>,
}

struct Inner {
    config: AnthropicConfig,
    client: reqwest::Client,
    tools: Arc<ToolRegistry>,
    transcripts: TranscriptStore<AnthropicMessageParam>,
}

impl AnthropicBackend {
    /// Create a backend with its own HTTP client.
    pub fn new(config: AnthropicConfig, tools: Arc<ToolRegistry>) -> Self {
        Self::with_client(config, tools, reqwest::Client::new())
    }

    /// Create a backend with a shared HTTP client.
    pub fn with_client(
        config: AnthropicConfig,
        tools: Arc<ToolRegistry>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                client,
                tools,
                transcripts: TranscriptStore::new(),
            }),
        }
    }
}

#[async_trait]
impl ConversationBackend for AnthropicBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn start(&self, request: RunRequest) -> Result<ConversationRun, BackendError> {
        if self.inner.config.api_key.is_empty() {
            return Err(BackendError::Unavailable(
                "no Anthropic API key configured".into(),
            ));
        }
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

/// Push an event, mapping a departed relay to [`BackendError::Closed`].
async fn emit(sink: &RunSink, event: BackendEvent) -> Result<(), BackendError> {
    if sink.emit(event).await {
        Ok(())
    } else {
        Err(BackendError::Closed)
    }
}

/// Content segments as Anthropic content blocks.
fn to_blocks(content: &[ContentSegment]) -> Result<Vec<Value>, BackendError> {
    content
        .iter()
        .map(|segment| serde_json::to_value(segment).map_err(BackendError::from))
        .collect()
}

impl Inner {
    #[instrument(skip_all, fields(
        model = %self.config.model,
        session_id = request.continuation_token.as_deref().unwrap_or("-"),
    ))]
    async fn run(
        &self,
        request: RunRequest,
        sink: &RunSink,
        mut inbox: DecisionInbox,
    ) -> Result<(), BackendError> {
        let started = Instant::now();
        let token = request.continuation_token.as_deref();
        let mut messages = self.transcripts.load(token);
        let resumed = messages.len();
        messages.push(AnthropicMessageParam::user(vec![
            json!({"type": "text", "text": request.prompt}),
        ]));

        emit(
            sink,
            BackendEvent::SystemNotice {
                subtype: "init".into(),
                data: json!({
                    "model": self.config.model,
                    "tools": self.tools.names(),
                    "session_id": token,
                    "resumed_messages": resumed,
                }),
            },
        )
        .await?;

        let mut usage = Usage::default();
        for round in 1..=self.config.max_turns {
            let mut message = self.stream_message(&messages, sink).await?;
            usage.accumulate(&message.usage);
            let discarded = message.discard_unrequested_tool_uses();
            if discarded > 0 {
                warn!(
                    stop_reason = %message.stop_reason,
                    discarded,
                    "dropping tool uses the model did not stop for"
                );
            }

            let snapshot = TurnSnapshot::new(message.content.clone());
            if !snapshot.content.is_empty() {
                emit(sink, BackendEvent::AssistantTurn(snapshot.clone())).await?;
                messages.push(AnthropicMessageParam::assistant(to_blocks(&message.content)?));
            }

            if !message.wants_tools() {
                self.transcripts.save(token, messages);
                let cost = calculate_cost(&self.config.model, &usage);
                info!(rounds = round, cost, "run complete");
                let summary = RunSummary {
                    total_cost_usd: Some(cost),
                    num_turns: round,
                    duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    session_id: request.continuation_token.clone(),
                    is_error: false,
                    usage,
                };
                return emit(sink, BackendEvent::FinalResult(summary)).await;
            }

            let results = self.run_tools(&request, &snapshot, &mut inbox).await;
            emit(sink, BackendEvent::UserTurn(TurnSnapshot::new(results.clone()))).await?;
            messages.push(AnthropicMessageParam::user(to_blocks(&results)?));
        }

        Err(BackendError::MaxTurnsExceeded(self.config.max_turns))
    }

    /// Execute every tool use in `snapshot`, in order.
    async fn run_tools(
        &self,
        request: &RunRequest,
        snapshot: &TurnSnapshot,
        inbox: &mut DecisionInbox,
    ) -> Vec<ContentSegment> {
        let mut results = Vec::new();
        for (id, name, input) in snapshot.tool_uses() {
            let output = if request.requires_approval(name) {
                let decision = inbox.wait(name).await;
                if decision.approved {
                    self.invoke(name, input.clone()).await
                } else {
                    ToolOutput::error(decision.reason())
                }
            } else {
                self.invoke(name, input.clone()).await
            };
            results.push(ContentSegment::ToolResult {
                tool_use_id: id.to_owned(),
                content: output.text,
                is_error: output.is_error,
            });
        }
        results
    }

    async fn invoke(&self, name: &str, input: Value) -> ToolOutput {
        self.tools
            .invoke(name, input)
            .await
            .unwrap_or_else(|e| ToolOutput::error(e.to_string()))
    }

    fn build_headers(&self) -> Result<HeaderMap, BackendError> {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let _ = headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        let _ = headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.config.api_key).map_err(|e| {
                BackendError::Unavailable(format!("invalid API key header: {e}"))
            })?,
        );
        Ok(headers)
    }

    fn build_request(&self, messages: &[AnthropicMessageParam]) -> AnthropicRequest {
        let tools = self
            .tools
            .describe()
            .into_iter()
            .map(|def| AnthropicTool {
                name: def.name,
                description: def.description,
                input_schema: def.input_schema,
            })
            .collect();
        AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            messages: messages.to_vec(),
            system: Some(self.config.system_prompt.clone()).filter(|s| !s.is_empty()),
            tools,
            stream: true,
        }
    }

    /// Send one streaming request and forward its deltas.
    async fn stream_message(
        &self,
        messages: &[AnthropicMessageParam],
        sink: &RunSink,
    ) -> Result<AssistantMessage, BackendError> {
        let request = self.build_request(messages);
        debug!(
            model = %request.model,
            message_count = request.messages.len(),
            tool_count = request.tools.len(),
            "sending Anthropic request"
        );

        let response = self
            .client
            .post(self.config.messages_url())
            .headers(self.build_headers()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::Http {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = parse_api_error(&body, status.as_u16());
            error!(status = status.as_u16(), %message, "Anthropic API error");
            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let mut lines = Box::pin(parse_sse_lines(response.bytes_stream()));
        let mut state = StreamState::new();
        while let Some(line) = lines.next().await {
            let line = line?;
            let Some(event) = parse_sse_data::<AnthropicSseEvent>(&line, BACKEND_NAME) else {
                continue;
            };
            for delta in state.process(event)? {
                emit(sink, BackendEvent::Stream(delta)).await?;
            }
            if state.is_complete() {
                break;
            }
        }

        if !state.is_complete() {
            return Err(BackendError::Stream(
                "stream ended before message_stop".into(),
            ));
        }
        Ok(state.finish())
    }
}

/// Extract the error message from an API error body.
fn parse_api_error(body: &str, status: u16) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| json["error"]["message"].as_str().map(String::from))
        .or_else(|| Some(body.trim().to_owned()).filter(|b| !b.is_empty()))
        .unwrap_or_else(|| format!("HTTP {status}"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
