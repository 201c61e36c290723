//! Anthropic Messages API types: configuration, request bodies and the raw
//! SSE event structures of streaming responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default base URL for the Anthropic API.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// API version header value.
pub const API_VERSION: &str = "2023-06-01";

/// Configuration for the Anthropic backend.
#[derive(Clone, Debug)]
pub struct AnthropicConfig {
    /// API key sent as `x-api-key`.
    pub api_key: String,
    /// Model ID (e.g. `"claude-sonnet-4-5"`).
    pub model: String,
    /// Maximum output tokens per request.
    pub max_tokens: u32,
    /// Maximum model round trips per run.
    pub max_turns: u32,
    /// System prompt, omitted from requests when empty.
    pub system_prompt: String,
    /// Base URL override.
    pub base_url: Option<String>,
}

impl AnthropicConfig {
    /// Messages endpoint URL.
    pub fn messages_url(&self) -> String {
        let base = self
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        format!("{base}/v1/messages")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request types
// ─────────────────────────────────────────────────────────────────────────────

/// Tool definition for the Anthropic API.
#[derive(Clone, Debug, Serialize)]
pub struct AnthropicTool {
    /// Tool name.
    pub name: String,
    /// Tool description.
    pub description: String,
    /// JSON Schema for input parameters.
    pub input_schema: Value,
}

/// A message in the request transcript.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnthropicMessageParam {
    /// `user` or `assistant`.
    pub role: String,
    /// Content blocks.
    pub content: Vec<Value>,
}

impl AnthropicMessageParam {
    /// A user message from blocks.
    pub fn user(content: Vec<Value>) -> Self {
        Self {
            role: "user".into(),
            content,
        }
    }

    /// An assistant message from blocks.
    pub fn assistant(content: Vec<Value>) -> Self {
        Self {
            role: "assistant".into(),
            content,
        }
    }
}

/// Streaming request body.
#[derive(Clone, Debug, Serialize)]
pub struct AnthropicRequest {
    /// Model ID.
    pub model: String,
    /// Max output tokens.
    pub max_tokens: u32,
    /// Transcript.
    pub messages: Vec<AnthropicMessageParam>,
    /// System prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Tools the model may call.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<AnthropicTool>,
    /// Always `true`.
    pub stream: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// SSE event types (raw API format)
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level Anthropic SSE event.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type")]
pub enum AnthropicSseEvent {
    /// `message_start`: first event, carries input usage.
    #[serde(rename = "message_start")]
    MessageStart {
        /// The message object.
        message: SseMessage,
    },
    /// `content_block_start`: a new content block begins.
    #[serde(rename = "content_block_start")]
    ContentBlockStart {
        /// Block index.
        index: usize,
        /// The content block.
        content_block: SseContentBlock,
    },
    /// `content_block_delta`: incremental content.
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta {
        /// Block index.
        index: usize,
        /// The delta.
        delta: SseDelta,
    },
    /// `content_block_stop`: block finished.
    #[serde(rename = "content_block_stop")]
    ContentBlockStop {
        /// Block index.
        index: usize,
    },
    /// `message_delta`: stop reason and output usage.
    #[serde(rename = "message_delta")]
    MessageDelta {
        /// Delta fields.
        delta: SseMessageDelta,
        /// Usage update.
        #[serde(default)]
        usage: Option<SseUsageDelta>,
    },
    /// `message_stop`: stream complete.
    #[serde(rename = "message_stop")]
    MessageStop,
    /// `ping`: keepalive.
    #[serde(rename = "ping")]
    Ping,
    /// `error`: API error mid-stream.
    #[serde(rename = "error")]
    Error {
        /// Error details.
        error: SseError,
    },
}

/// Message object in `message_start`.
#[derive(Clone, Debug, Deserialize)]
pub struct SseMessage {
    /// Message ID.
    pub id: Option<String>,
    /// Model used.
    pub model: Option<String>,
    /// Usage information.
    #[serde(default)]
    pub usage: SseUsage,
}

/// Token usage in `message_start`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SseUsage {
    /// Input tokens.
    #[serde(default)]
    pub input_tokens: u64,
    /// Output tokens.
    #[serde(default)]
    pub output_tokens: u64,
    /// Cache creation tokens.
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    /// Cache read tokens.
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

/// Content block in `content_block_start`.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type")]
pub enum SseContentBlock {
    /// Text block.
    #[serde(rename = "text")]
    Text {
        /// Initial text (usually empty).
        #[serde(default)]
        text: String,
    },
    /// Tool use block.
    #[serde(rename = "tool_use")]
    ToolUse {
        /// Tool-use ID.
        id: String,
        /// Tool name.
        name: String,
    },
    /// Thinking, redacted thinking, server tools and future block types.
    #[serde(other)]
    Unsupported,
}

/// Delta in `content_block_delta`.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type")]
pub enum SseDelta {
    /// Text fragment.
    #[serde(rename = "text_delta")]
    TextDelta {
        /// Text fragment.
        text: String,
    },
    /// Tool arguments fragment.
    #[serde(rename = "input_json_delta")]
    InputJsonDelta {
        /// Partial JSON string.
        partial_json: String,
    },
    /// Thinking and signature deltas.
    #[serde(other)]
    Unsupported,
}

/// Message-level delta in `message_delta`.
#[derive(Clone, Debug, Deserialize)]
pub struct SseMessageDelta {
    /// Stop reason.
    pub stop_reason: Option<String>,
}

/// Usage delta in `message_delta`.
#[derive(Clone, Debug, Deserialize)]
pub struct SseUsageDelta {
    /// Output tokens.
    #[serde(default)]
    pub output_tokens: u64,
}

/// Error in an SSE `error` event.
#[derive(Clone, Debug, Deserialize)]
pub struct SseError {
    /// Error type.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error message.
    pub message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn config(base_url: Option<&str>) -> AnthropicConfig {
        AnthropicConfig {
            api_key: "sk-test".into(),
            model: "claude-sonnet-4-5".into(),
            max_tokens: 4096,
            max_turns: 10,
            system_prompt: String::new(),
            base_url: base_url.map(String::from),
        }
    }

    #[test]
    fn messages_url() {
        assert_eq!(config(None).messages_url(), "https://api.anthropic.com/v1/messages");
        assert_eq!(
            config(Some("http://127.0.0.1:9000/")).messages_url(),
            "http://127.0.0.1:9000/v1/messages"
        );
    }

    #[test]
    fn deserialize_message_start() {
        let json = r#"{"type":"message_start","message":{"id":"msg_01","model":"claude-sonnet-4-5","usage":{"input_tokens":100,"cache_read_input_tokens":20}}}"#;
        let event: AnthropicSseEvent = serde_json::from_str(json).unwrap();
        assert_matches!(event, AnthropicSseEvent::MessageStart { message } => {
            assert_eq!(message.id.as_deref(), Some("msg_01"));
            assert_eq!(message.usage.input_tokens, 100);
            assert_eq!(message.usage.cache_read_input_tokens, 20);
        });
    }

    #[test]
    fn deserialize_tool_use_start() {
        let json = r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_01","name":"add_numbers","input":{}}}"#;
        let event: AnthropicSseEvent = serde_json::from_str(json).unwrap();
        assert_matches!(
            event,
            AnthropicSseEvent::ContentBlockStart {
                index: 1,
                content_block: SseContentBlock::ToolUse { id, name }
            } if id == "toolu_01" && name == "add_numbers"
        );
    }

    #[test]
    fn deserialize_unknown_block_and_delta() {
        let start = r#"{"type":"content_block_start","index":0,"content_block":{"type":"thinking","thinking":""}}"#;
        let event: AnthropicSseEvent = serde_json::from_str(start).unwrap();
        assert_matches!(
            event,
            AnthropicSseEvent::ContentBlockStart { content_block: SseContentBlock::Unsupported, .. }
        );

        let delta = r#"{"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"hmm"}}"#;
        let event: AnthropicSseEvent = serde_json::from_str(delta).unwrap();
        assert_matches!(
            event,
            AnthropicSseEvent::ContentBlockDelta { delta: SseDelta::Unsupported, .. }
        );
    }

    #[test]
    fn deserialize_message_delta_and_error() {
        let json = r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":42}}"#;
        let event: AnthropicSseEvent = serde_json::from_str(json).unwrap();
        assert_matches!(event, AnthropicSseEvent::MessageDelta { delta, usage } => {
            assert_eq!(delta.stop_reason.as_deref(), Some("tool_use"));
            assert_eq!(usage.unwrap().output_tokens, 42);
        });

        let json = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        let event: AnthropicSseEvent = serde_json::from_str(json).unwrap();
        assert_matches!(event, AnthropicSseEvent::Error { error } if error.error_type == "overloaded_error");
    }

    #[test]
    fn request_omits_empty_optionals() {
        let request = AnthropicRequest {
            model: "claude-sonnet-4-5".into(),
            max_tokens: 1024,
            messages: vec![AnthropicMessageParam::user(vec![json!({"type": "text", "text": "hi"})])],
            system: None,
            tools: vec![],
            stream: true,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("system").is_none());
        assert!(value.get("tools").is_none());
        assert_eq!(value["stream"], true);
        assert_eq!(value["messages"][0]["role"], "user");
    }
}
