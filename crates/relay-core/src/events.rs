//! Backend event union.
//!
//! Every conversation backend reports progress as a [`BackendEvent`]. The
//! union is closed so the translator matches it exhaustively: a new backend
//! variant is a compile-time-checked extension.
//!
//! Backends report the same content twice: incrementally as [`StreamDelta`]s
//! and again as a consolidated [`TurnSnapshot`] once the message is complete.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One event from a conversation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendEvent {
    /// Incremental streaming delta for the current assistant message.
    Stream(StreamDelta),
    /// Consolidated user-side message (tool results).
    UserTurn(TurnSnapshot),
    /// Consolidated assistant message (text and tool uses).
    AssistantTurn(TurnSnapshot),
    /// Conversation-internal bookkeeping (init, status). Never forwarded.
    SystemNotice {
        /// Notice subtype, e.g. `init`.
        subtype: String,
        /// Arbitrary payload.
        #[serde(default)]
        data: Value,
    },
    /// End-of-run summary.
    FinalResult(RunSummary),
}

/// What a streamed content block carries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    /// A text span.
    Text,
    /// A tool invocation whose arguments stream as JSON fragments.
    ToolUse {
        /// Tool-use identifier.
        id: String,
        /// Tool name.
        name: String,
    },
    /// Anything else the backend streams (thinking, etc.).
    Other {
        /// Backend-specific block type.
        block_type: String,
    },
}

/// Streaming sub-events within one assistant message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamDelta {
    /// A content block opened.
    BlockStart {
        /// Block index within the message.
        index: usize,
        /// What the block carries.
        kind: BlockKind,
    },
    /// A text fragment for an open text block.
    TextDelta {
        /// Block index.
        index: usize,
        /// Text fragment.
        text: String,
    },
    /// A partial JSON fragment of tool arguments.
    InputJsonDelta {
        /// Block index.
        index: usize,
        /// JSON fragment.
        partial_json: String,
    },
    /// A content block closed.
    BlockStop {
        /// Block index.
        index: usize,
    },
}

/// A consolidated message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnSnapshot {
    /// Ordered content segments.
    pub content: Vec<ContentSegment>,
}

impl TurnSnapshot {
    /// Build a snapshot from segments.
    pub fn new(content: Vec<ContentSegment>) -> Self {
        Self { content }
    }

    /// Tool-use segments in order.
    pub fn tool_uses(&self) -> impl Iterator<Item = (&str, &str, &Value)> {
        self.content.iter().filter_map(|segment| match segment {
            ContentSegment::ToolUse { id, name, input } => {
                Some((id.as_str(), name.as_str(), input))
            }
            _ => None,
        })
    }
}

/// One segment of a consolidated message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentSegment {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// A request to run a named tool.
    ToolUse {
        /// Tool-use identifier, unique within a Turn.
        id: String,
        /// Tool name.
        name: String,
        /// Complete tool arguments.
        input: Value,
    },
    /// The value a tool returned.
    ToolResult {
        /// Identifier of the tool use this answers.
        tool_use_id: String,
        /// Result text.
        content: String,
        /// Whether the tool failed or was declined.
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentSegment {
    /// Shorthand for a text segment.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Token usage accumulated over a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Input tokens (including cache components).
    pub input_tokens: u64,
    /// Output tokens.
    pub output_tokens: u64,
    /// Tokens read from the prompt cache.
    #[serde(default)]
    pub cache_read_tokens: u64,
    /// Tokens written to the prompt cache.
    #[serde(default)]
    pub cache_creation_tokens: u64,
}

impl Usage {
    /// Add another usage sample into this one.
    pub fn accumulate(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
        self.cache_creation_tokens += other.cache_creation_tokens;
    }
}

/// End-of-run summary.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Total cost in USD, if the backend knows it.
    pub total_cost_usd: Option<f64>,
    /// Number of backend round trips.
    pub num_turns: u32,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
    /// Continuation token the run was keyed on.
    pub session_id: Option<String>,
    /// Whether the run ended in an error state.
    pub is_error: bool,
    /// Token usage.
    pub usage: Usage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_uses_filters_segments() {
        let snapshot = TurnSnapshot::new(vec![
            ContentSegment::text("hi"),
            ContentSegment::ToolUse {
                id: "t1".into(),
                name: "add_numbers".into(),
                input: json!({"a": 1, "b": 2}),
            },
        ]);
        let uses: Vec<_> = snapshot.tool_uses().collect();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].0, "t1");
        assert_eq!(uses[0].1, "add_numbers");
    }

    #[test]
    fn usage_accumulates() {
        let mut total = Usage::default();
        total.accumulate(&Usage {
            input_tokens: 10,
            output_tokens: 5,
            cache_read_tokens: 2,
            cache_creation_tokens: 1,
        });
        total.accumulate(&Usage {
            input_tokens: 3,
            output_tokens: 4,
            ..Usage::default()
        });
        assert_eq!(total.input_tokens, 13);
        assert_eq!(total.output_tokens, 9);
        assert_eq!(total.cache_read_tokens, 2);
    }

    #[test]
    fn tool_result_defaults_is_error() {
        let segment: ContentSegment = serde_json::from_value(json!({
            "type": "tool_result",
            "tool_use_id": "t1",
            "content": "3"
        }))
        .unwrap();
        assert_eq!(
            segment,
            ContentSegment::ToolResult {
                tool_use_id: "t1".into(),
                content: "3".into(),
                is_error: false,
            }
        );
    }

    #[test]
    fn backend_event_tagging() {
        let event = BackendEvent::Stream(StreamDelta::BlockStop { index: 0 });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "stream");
        assert_eq!(value["type"], "block_stop");
    }
}
