//! Anthropic SSE stream handler.
//!
//! Converts raw Anthropic SSE events into [`StreamDelta`]s for the relay while
//! a [`StreamState`] accumulates the complete assistant message. Block text and
//! tool arguments are gathered across deltas and committed on
//! `content_block_stop`; `message_stop` marks the message complete.

use relay_core::{BackendError, BlockKind, ContentSegment, StreamDelta, Usage};
use serde_json::Value;
use tracing::{debug, warn};

use super::types::{AnthropicSseEvent, SseContentBlock, SseDelta};

/// Block currently being accumulated.
#[derive(Clone, Debug, PartialEq, Eq)]
enum OpenBlock {
    Text,
    ToolUse { id: String, name: String },
    Unsupported,
}

/// State accumulated across one streamed assistant message.
#[derive(Clone, Debug, Default)]
pub struct StreamState {
    open_block: Option<OpenBlock>,
    accumulated_text: String,
    accumulated_args: String,
    content: Vec<ContentSegment>,
    usage: Usage,
    stop_reason: Option<String>,
    complete: bool,
}

/// A fully streamed assistant message.
#[derive(Clone, Debug, PartialEq)]
pub struct AssistantMessage {
    /// Committed content segments in block order.
    pub content: Vec<ContentSegment>,
    /// Stop reason from `message_delta` (`end_turn` when absent).
    pub stop_reason: String,
    /// Token usage of this request.
    pub usage: Usage,
}

impl AssistantMessage {
    /// Whether the model stopped to have tools run.
    pub fn wants_tools(&self) -> bool {
        self.stop_reason == "tool_use"
            && self
                .content
                .iter()
                .any(|s| matches!(s, ContentSegment::ToolUse { .. }))
    }

    /// Remove tool uses the model did not stop for, returning how many went.
    ///
    /// A message cut off by `max_tokens` can still carry a complete
    /// `tool_use` block. Nothing will run it, so it must not reach the relay
    /// or the transcript.
    pub fn discard_unrequested_tool_uses(&mut self) -> usize {
        if self.stop_reason == "tool_use" {
            return 0;
        }
        let before = self.content.len();
        self.content
            .retain(|s| !matches!(s, ContentSegment::ToolUse { .. }));
        before - self.content.len()
    }
}

impl StreamState {
    /// Fresh state for a new request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `message_stop` has been seen.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Process one SSE event, returning the deltas to forward.
    ///
    /// An `error` event fails the stream.
    pub fn process(&mut self, event: AnthropicSseEvent) -> Result<Vec<StreamDelta>, BackendError> {
        let deltas = match event {
            AnthropicSseEvent::MessageStart { message } => {
                self.usage.input_tokens = message.usage.input_tokens;
                self.usage.cache_creation_tokens = message.usage.cache_creation_input_tokens;
                self.usage.cache_read_tokens = message.usage.cache_read_input_tokens;
                debug!(
                    message_id = message.id.as_deref().unwrap_or("unknown"),
                    input_tokens = self.usage.input_tokens,
                    cache_read = self.usage.cache_read_tokens,
                    "message_start"
                );
                vec![]
            }

            AnthropicSseEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                let (open, kind) = match content_block {
                    SseContentBlock::Text { text } => {
                        self.accumulated_text = text;
                        (OpenBlock::Text, BlockKind::Text)
                    }
                    SseContentBlock::ToolUse { id, name } => {
                        self.accumulated_args.clear();
                        let kind = BlockKind::ToolUse {
                            id: id.clone(),
                            name: name.clone(),
                        };
                        (OpenBlock::ToolUse { id, name }, kind)
                    }
                    SseContentBlock::Unsupported => (
                        OpenBlock::Unsupported,
                        BlockKind::Other {
                            block_type: "unsupported".into(),
                        },
                    ),
                };
                self.open_block = Some(open);
                vec![StreamDelta::BlockStart { index, kind }]
            }

            AnthropicSseEvent::ContentBlockDelta { index, delta } => match delta {
                SseDelta::TextDelta { text } => {
                    self.accumulated_text.push_str(&text);
                    vec![StreamDelta::TextDelta { index, text }]
                }
                SseDelta::InputJsonDelta { partial_json } => {
                    self.accumulated_args.push_str(&partial_json);
                    vec![StreamDelta::InputJsonDelta {
                        index,
                        partial_json,
                    }]
                }
                SseDelta::Unsupported => vec![],
            },

            AnthropicSseEvent::ContentBlockStop { index } => {
                self.commit_block();
                vec![StreamDelta::BlockStop { index }]
            }

            AnthropicSseEvent::MessageDelta { delta, usage } => {
                if delta.stop_reason.is_some() {
                    self.stop_reason = delta.stop_reason;
                }
                if let Some(u) = usage {
                    self.usage.output_tokens = u.output_tokens;
                }
                vec![]
            }

            AnthropicSseEvent::MessageStop => {
                self.complete = true;
                vec![]
            }

            AnthropicSseEvent::Ping => vec![],

            AnthropicSseEvent::Error { error } => {
                warn!(
                    error_type = %error.error_type,
                    message = %error.message,
                    "Anthropic SSE error"
                );
                return Err(BackendError::Stream(format!(
                    "{}: {}",
                    error.error_type, error.message
                )));
            }
        };
        Ok(deltas)
    }

    /// Finalize the open block into a committed segment.
    fn commit_block(&mut self) {
        match self.open_block.take() {
            Some(OpenBlock::Text) => {
                let text = std::mem::take(&mut self.accumulated_text);
                if !text.is_empty() {
                    self.content.push(ContentSegment::Text { text });
                }
            }
            Some(OpenBlock::ToolUse { id, name }) => {
                let args = std::mem::take(&mut self.accumulated_args);
                let input = if args.trim().is_empty() {
                    Value::Object(serde_json::Map::new())
                } else {
                    serde_json::from_str(&args).unwrap_or_else(|e| {
                        warn!(tool_name = %name, error = %e, "unparseable tool arguments");
                        Value::Object(serde_json::Map::new())
                    })
                };
                self.content.push(ContentSegment::ToolUse { id, name, input });
            }
            Some(OpenBlock::Unsupported) | None => {}
        }
    }

    /// Consume the state into the finished message.
    pub fn finish(mut self) -> AssistantMessage {
        self.commit_block();
        AssistantMessage {
            content: self.content,
            stop_reason: self.stop_reason.unwrap_or_else(|| "end_turn".into()),
            usage: self.usage,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn event(value: Value) -> AnthropicSseEvent {
        serde_json::from_value(value).unwrap()
    }

    fn feed(state: &mut StreamState, events: Vec<Value>) -> Vec<StreamDelta> {
        events
            .into_iter()
            .flat_map(|e| state.process(event(e)).unwrap())
            .collect()
    }

    #[test]
    fn text_block_streams_and_accumulates() {
        let mut state = StreamState::new();
        let deltas = feed(
            &mut state,
            vec![
                json!({"type": "message_start", "message": {"usage": {"input_tokens": 12}}}),
                json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hello"}}),
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": " world"}}),
                json!({"type": "content_block_stop", "index": 0}),
                json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 5}}),
                json!({"type": "message_stop"}),
            ],
        );
        assert_eq!(deltas.len(), 4);
        assert_matches!(&deltas[0], StreamDelta::BlockStart { index: 0, kind: BlockKind::Text });
        assert_matches!(&deltas[3], StreamDelta::BlockStop { index: 0 });
        assert!(state.is_complete());

        let message = state.finish();
        assert_eq!(message.content, vec![ContentSegment::text("Hello world")]);
        assert_eq!(message.stop_reason, "end_turn");
        assert_eq!(message.usage.input_tokens, 12);
        assert_eq!(message.usage.output_tokens, 5);
        assert!(!message.wants_tools());
    }

    #[test]
    fn tool_use_block_parses_arguments() {
        let mut state = StreamState::new();
        let deltas = feed(
            &mut state,
            vec![
                json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "toolu_1", "name": "add_numbers", "input": {}}}),
                json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"a\": 15,"}}),
                json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": " \"b\": 27}"}}),
                json!({"type": "content_block_stop", "index": 1}),
                json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}}),
                json!({"type": "message_stop"}),
            ],
        );
        assert_matches!(
            &deltas[0],
            StreamDelta::BlockStart { index: 1, kind: BlockKind::ToolUse { id, name } }
                if id == "toolu_1" && name == "add_numbers"
        );
        assert_matches!(&deltas[1], StreamDelta::InputJsonDelta { index: 1, .. });

        let message = state.finish();
        assert!(message.wants_tools());
        assert_eq!(
            message.content,
            vec![ContentSegment::ToolUse {
                id: "toolu_1".into(),
                name: "add_numbers".into(),
                input: json!({"a": 15, "b": 27}),
            }]
        );
    }

    #[test]
    fn tool_use_cut_off_by_max_tokens_is_discarded() {
        let mut state = StreamState::new();
        let _ = feed(
            &mut state,
            vec![
                json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Let me add"}}),
                json!({"type": "content_block_stop", "index": 0}),
                json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "toolu_1", "name": "add_numbers", "input": {}}}),
                json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"a\": 1, \"b\": 2}"}}),
                json!({"type": "content_block_stop", "index": 1}),
                json!({"type": "message_delta", "delta": {"stop_reason": "max_tokens"}}),
                json!({"type": "message_stop"}),
            ],
        );
        let mut message = state.finish();
        assert!(!message.wants_tools());
        assert_eq!(message.discard_unrequested_tool_uses(), 1);
        assert_eq!(message.content, vec![ContentSegment::text("Let me add")]);
    }

    #[test]
    fn requested_tool_uses_are_kept() {
        let mut message = AssistantMessage {
            content: vec![ContentSegment::ToolUse {
                id: "toolu_1".into(),
                name: "add_numbers".into(),
                input: json!({}),
            }],
            stop_reason: "tool_use".into(),
            usage: Usage::default(),
        };
        assert_eq!(message.discard_unrequested_tool_uses(), 0);
        assert!(message.wants_tools());
    }

    #[test]
    fn tool_use_without_arguments_gets_empty_object() {
        let mut state = StreamState::new();
        let _ = feed(
            &mut state,
            vec![
                json!({"type": "content_block_start", "index": 0, "content_block": {"type": "tool_use", "id": "t", "name": "x"}}),
                json!({"type": "content_block_stop", "index": 0}),
            ],
        );
        let message = state.finish();
        assert_matches!(&message.content[0], ContentSegment::ToolUse { input, .. } if input == &json!({}));
    }

    #[test]
    fn unsupported_blocks_forward_start_stop_only() {
        let mut state = StreamState::new();
        let deltas = feed(
            &mut state,
            vec![
                json!({"type": "content_block_start", "index": 0, "content_block": {"type": "thinking", "thinking": ""}}),
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "thinking_delta", "thinking": "..."}}),
                json!({"type": "content_block_stop", "index": 0}),
            ],
        );
        assert_eq!(deltas.len(), 2);
        assert!(state.finish().content.is_empty());
    }

    #[test]
    fn error_event_fails() {
        let mut state = StreamState::new();
        let result = state.process(event(
            json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}),
        ));
        assert_matches!(result, Err(BackendError::Stream(msg)) if msg == "overloaded_error: Overloaded");
    }

    #[test]
    fn missing_stop_reason_defaults_to_end_turn() {
        assert_eq!(StreamState::new().finish().stop_reason, "end_turn");
    }
}
