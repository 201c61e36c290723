//! Client-facing wire vocabulary.
//!
//! Outbound, every [`WireEvent`] serialises to one small JSON object:
//!
//! ```text
//! { "event": "content_block_start" }
//! { "event": "content_block_stop" }
//! { "result": "<streamed text chunk>" }
//! { "result": "<tool> tool is processing..." }
//! { "result": "<tool> tool executed." }
//! { "type": "tool_permission_request", "tool_name": "..", "input": {..} }
//! { "type": "tool_permission_response", "approved": true }
//! { "result": "Completed. Cost: $<amount>" }
//! { "error": "<message>" }
//! ```
//!
//! Inbound, a client sends either a prompt (`prompt`, with `inputText`
//! accepted as a fallback, plus an optional `session_id` continuation token)
//! or a permission response. [`ClientMessage::parse`] classifies both.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value, json};

use crate::errors::InputError;

/// Suffix of the `tool_pending` result line.
const TOOL_PENDING_SUFFIX: &str = " tool is processing...";
/// Suffix of the `tool_done` result line.
const TOOL_DONE_SUFFIX: &str = " tool executed.";
/// Prefix of the `final_result` line.
const FINAL_RESULT_PREFIX: &str = "Completed. Cost: $";

/// `type` tag of a permission request.
pub const PERMISSION_REQUEST_TYPE: &str = "tool_permission_request";
/// `type` tag of a permission response.
pub const PERMISSION_RESPONSE_TYPE: &str = "tool_permission_response";

/// One unit of the client-facing output vocabulary.
#[derive(Clone, Debug, PartialEq)]
pub enum WireEvent {
    /// A content block opened.
    StreamOpen,
    /// A streamed text chunk.
    StreamText(String),
    /// A content block closed.
    StreamClose,
    /// A tool invocation was observed.
    ToolPending {
        /// Tool name.
        name: String,
    },
    /// A tool invocation produced its result.
    ToolDone {
        /// Tool name (or `Unknown` when the id was never registered).
        name: String,
    },
    /// The relay is waiting for the client to approve a tool.
    PermissionRequest {
        /// Tool awaiting approval.
        tool_name: String,
        /// Tool arguments.
        input: Value,
    },
    /// The client's approval decision.
    PermissionResponse {
        /// Whether the tool may run.
        approved: bool,
    },
    /// End-of-turn summary line.
    FinalResult {
        /// Human-readable `Completed. Cost: $..` summary.
        summary: String,
    },
    /// The Turn failed.
    Error {
        /// Error message.
        message: String,
    },
}

impl WireEvent {
    /// Build the `final_result` event. A missing cost renders as `0`.
    pub fn final_result(total_cost_usd: Option<f64>) -> Self {
        let cost = total_cost_usd.unwrap_or(0.0);
        Self::FinalResult {
            summary: format!("{FINAL_RESULT_PREFIX}{cost}"),
        }
    }

    /// Build an `error` event.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Whether this event ends a Turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FinalResult { .. } | Self::Error { .. })
    }

    /// Short variant name for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StreamOpen => "stream_open",
            Self::StreamText(_) => "stream_text",
            Self::StreamClose => "stream_close",
            Self::ToolPending { .. } => "tool_pending",
            Self::ToolDone { .. } => "tool_done",
            Self::PermissionRequest { .. } => "permission_request",
            Self::PermissionResponse { .. } => "permission_response",
            Self::FinalResult { .. } => "final_result",
            Self::Error { .. } => "error",
        }
    }

    /// The JSON object sent over the wire.
    pub fn to_value(&self) -> Value {
        match self {
            Self::StreamOpen => json!({ "event": "content_block_start" }),
            Self::StreamClose => json!({ "event": "content_block_stop" }),
            Self::StreamText(text) => json!({ "result": text }),
            Self::ToolPending { name } => {
                json!({ "result": format!("{name}{TOOL_PENDING_SUFFIX}") })
            }
            Self::ToolDone { name } => json!({ "result": format!("{name}{TOOL_DONE_SUFFIX}") }),
            Self::PermissionRequest { tool_name, input } => json!({
                "type": PERMISSION_REQUEST_TYPE,
                "tool_name": tool_name,
                "input": input,
            }),
            Self::PermissionResponse { approved } => json!({
                "type": PERMISSION_RESPONSE_TYPE,
                "approved": approved,
            }),
            Self::FinalResult { summary } => json!({ "result": summary }),
            Self::Error { message } => json!({ "error": message }),
        }
    }

    /// Serialise to a compact JSON string.
    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }

    /// Reconstruct a wire event from its JSON form.
    ///
    /// `result` lines are classified by their fixed prefix/suffix, so a
    /// streamed chunk that happens to end in ` tool executed.` reads back as
    /// `ToolDone`. Clients that only render text can ignore the distinction.
    pub fn parse(text: &str) -> Result<Self, InputError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| InputError::Malformed(e.to_string()))?;
        let Value::Object(map) = value else {
            return Err(InputError::Malformed("expected a JSON object".into()));
        };
        Self::from_map(&map)
    }

    fn from_map(map: &Map<String, Value>) -> Result<Self, InputError> {
        if let Some(message) = map.get("error") {
            let message = match message {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Ok(Self::Error { message });
        }

        match map.get("type").and_then(Value::as_str) {
            Some(PERMISSION_REQUEST_TYPE) => {
                let tool_name = map
                    .get("tool_name")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown")
                    .to_string();
                let input = map.get("input").cloned().unwrap_or_else(|| json!({}));
                return Ok(Self::PermissionRequest { tool_name, input });
            }
            Some(PERMISSION_RESPONSE_TYPE) => {
                let approved = map
                    .get("approved")
                    .and_then(Value::as_bool)
                    .ok_or_else(|| InputError::Malformed("approved must be a boolean".into()))?;
                return Ok(Self::PermissionResponse { approved });
            }
            _ => {}
        }

        if let Some(event) = map.get("event").and_then(Value::as_str) {
            return match event {
                "content_block_start" => Ok(Self::StreamOpen),
                "content_block_stop" => Ok(Self::StreamClose),
                other => Err(InputError::Malformed(format!("unknown event: {other}"))),
            };
        }

        if let Some(result) = map.get("result").and_then(Value::as_str) {
            if result.starts_with(FINAL_RESULT_PREFIX) {
                return Ok(Self::FinalResult {
                    summary: result.to_string(),
                });
            }
            if let Some(name) = result.strip_suffix(TOOL_PENDING_SUFFIX) {
                return Ok(Self::ToolPending { name: name.into() });
            }
            if let Some(name) = result.strip_suffix(TOOL_DONE_SUFFIX) {
                return Ok(Self::ToolDone { name: name.into() });
            }
            return Ok(Self::StreamText(result.to_string()));
        }

        Err(InputError::Malformed("unrecognised wire event".into()))
    }
}

impl Serialize for WireEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────────────────

/// A prompt-bearing inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptRequest {
    /// Non-empty prompt text.
    pub prompt: String,
    /// Optional continuation token naming prior backend conversation state.
    pub session_id: Option<String>,
}

impl PromptRequest {
    /// Build a prompt request.
    pub fn new(prompt: impl Into<String>, session_id: Option<String>) -> Self {
        Self {
            prompt: prompt.into(),
            session_id,
        }
    }

    /// The JSON object a client sends for this prompt.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        let _ = map.insert("prompt".into(), Value::String(self.prompt.clone()));
        if let Some(session_id) = &self.session_id {
            let _ = map.insert("session_id".into(), Value::String(session_id.clone()));
        }
        Value::Object(map)
    }
}

/// An inbound client message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientMessage {
    /// A new prompt.
    Prompt(PromptRequest),
    /// A permission decision for the pending gate.
    PermissionResponse {
        /// Whether the tool may run.
        approved: bool,
    },
}

impl ClientMessage {
    /// Classify one inbound text frame.
    ///
    /// A `tool_permission_response` needs a boolean `approved`. Anything else
    /// is treated as a prompt: `prompt` first, `inputText` as a fallback, and
    /// an empty or missing value is [`InputError::MissingPrompt`].
    pub fn parse(text: &str) -> Result<Self, InputError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| InputError::Malformed(e.to_string()))?;
        let Value::Object(map) = value else {
            return Err(InputError::Malformed("expected a JSON object".into()));
        };

        if map.get("type").and_then(Value::as_str) == Some(PERMISSION_RESPONSE_TYPE) {
            let approved = map
                .get("approved")
                .and_then(Value::as_bool)
                .ok_or_else(|| InputError::Malformed("approved must be a boolean".into()))?;
            return Ok(Self::PermissionResponse { approved });
        }

        let prompt = ["prompt", "inputText"]
            .iter()
            .filter_map(|key| map.get(*key).and_then(Value::as_str))
            .find(|p| !p.is_empty())
            .ok_or(InputError::MissingPrompt)?;

        let session_id = map
            .get("session_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self::Prompt(PromptRequest::new(prompt, session_id)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn wire_shapes_snapshot() {
        let events = vec![
            WireEvent::StreamOpen,
            WireEvent::StreamText("Hello".into()),
            WireEvent::StreamClose,
            WireEvent::ToolPending {
                name: "add_numbers".into(),
            },
            WireEvent::ToolDone {
                name: "add_numbers".into(),
            },
            WireEvent::PermissionRequest {
                tool_name: "add_numbers".into(),
                input: json!({"a": 15, "b": 27}),
            },
            WireEvent::PermissionResponse { approved: true },
            WireEvent::final_result(Some(0.0123)),
            WireEvent::error("boom"),
        ];
        let values: Vec<Value> = events.iter().map(WireEvent::to_value).collect();
        insta::with_settings!({ sort_maps => true }, {
        insta::assert_json_snapshot!(values, @r#"
        [
          {
            "event": "content_block_start"
          },
          {
            "result": "Hello"
          },
          {
            "event": "content_block_stop"
          },
          {
            "result": "add_numbers tool is processing..."
          },
          {
            "result": "add_numbers tool executed."
          },
          {
            "input": {
              "a": 15,
              "b": 27
            },
            "tool_name": "add_numbers",
            "type": "tool_permission_request"
          },
          {
            "approved": true,
            "type": "tool_permission_response"
          },
          {
            "result": "Completed. Cost: $0.0123"
          },
          {
            "error": "boom"
          }
        ]
        "#);
        });
    }

    #[test]
    fn final_result_without_cost_is_zero() {
        assert_eq!(
            WireEvent::final_result(None).to_value(),
            json!({"result": "Completed. Cost: $0"})
        );
    }

    #[test]
    fn terminal_variants() {
        assert!(WireEvent::final_result(None).is_terminal());
        assert!(WireEvent::error("x").is_terminal());
        assert!(!WireEvent::StreamOpen.is_terminal());
        assert!(!WireEvent::ToolDone { name: "t".into() }.is_terminal());
    }

    #[test]
    fn serialize_matches_to_value() {
        let event = WireEvent::StreamText("chunk".into());
        assert_eq!(serde_json::to_string(&event).unwrap(), event.to_json());
    }

    #[test]
    fn parse_reads_back_each_shape() {
        let events = vec![
            WireEvent::StreamOpen,
            WireEvent::StreamClose,
            WireEvent::StreamText("The answer is 42".into()),
            WireEvent::ToolPending {
                name: "multiply_numbers".into(),
            },
            WireEvent::ToolDone {
                name: "multiply_numbers".into(),
            },
            WireEvent::PermissionRequest {
                tool_name: "multiply_numbers".into(),
                input: json!({"a": 2, "b": 3}),
            },
            WireEvent::PermissionResponse { approved: false },
            WireEvent::final_result(Some(1.5)),
            WireEvent::error("nope"),
        ];
        for event in events {
            assert_eq!(WireEvent::parse(&event.to_json()).unwrap(), event);
        }
    }

    #[test]
    fn parse_rejects_unknown_shapes() {
        assert_matches!(WireEvent::parse("{}"), Err(InputError::Malformed(_)));
        assert_matches!(WireEvent::parse("[1]"), Err(InputError::Malformed(_)));
        assert_matches!(
            WireEvent::parse(r#"{"event":"mystery"}"#),
            Err(InputError::Malformed(_))
        );
    }

    // ── ClientMessage ───────────────────────────────────────────────

    #[test]
    fn prompt_with_session() {
        let msg = ClientMessage::parse(r#"{"prompt":"hi","session_id":"s-1"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Prompt(PromptRequest::new("hi", Some("s-1".into())))
        );
    }

    #[test]
    fn input_text_fallback() {
        let msg = ClientMessage::parse(r#"{"inputText":"hello"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Prompt(PromptRequest::new("hello", None)));
    }

    #[test]
    fn empty_prompt_falls_back_to_input_text() {
        let msg = ClientMessage::parse(r#"{"prompt":"","inputText":"x"}"#).unwrap();
        assert_matches!(msg, ClientMessage::Prompt(p) if p.prompt == "x");
    }

    #[test]
    fn empty_prompt_is_missing() {
        assert_eq!(
            ClientMessage::parse(r#"{"prompt":""}"#),
            Err(InputError::MissingPrompt)
        );
        assert_eq!(ClientMessage::parse("{}"), Err(InputError::MissingPrompt));
        assert_eq!(
            ClientMessage::parse(r#"{"prompt":42}"#),
            Err(InputError::MissingPrompt)
        );
    }

    #[test]
    fn empty_session_id_is_none() {
        let msg = ClientMessage::parse(r#"{"prompt":"hi","session_id":""}"#).unwrap();
        assert_matches!(msg, ClientMessage::Prompt(p) if p.session_id.is_none());
    }

    #[test]
    fn permission_response() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"tool_permission_response","approved":true}"#),
            Ok(ClientMessage::PermissionResponse { approved: true })
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"tool_permission_response","approved":false}"#),
            Ok(ClientMessage::PermissionResponse { approved: false })
        );
    }

    #[test]
    fn permission_response_requires_bool() {
        assert_matches!(
            ClientMessage::parse(r#"{"type":"tool_permission_response","approved":"yes"}"#),
            Err(InputError::Malformed(_))
        );
    }

    #[test]
    fn malformed_json() {
        assert_matches!(ClientMessage::parse("not json"), Err(InputError::Malformed(_)));
        assert_matches!(ClientMessage::parse("\"str\""), Err(InputError::Malformed(_)));
    }

    #[test]
    fn prompt_request_to_value() {
        let with = PromptRequest::new("p", Some("tok".into())).to_value();
        assert_eq!(with, json!({"prompt": "p", "session_id": "tok"}));
        let without = PromptRequest::new("p", None).to_value();
        assert_eq!(without, json!({"prompt": "p"}));
    }
}
