//! Backend event → wire event translation.
//!
//! Backends report content twice, once as streaming deltas and once as a
//! consolidated snapshot. The translator forwards text from the deltas and
//! takes tool bookkeeping from the snapshots, where the tool-use ids are
//! reliable:
//!
//! | Backend event                         | Wire events                              |
//! |---------------------------------------|------------------------------------------|
//! | `Stream(BlockStart)`                  | `stream_open`                            |
//! | `Stream(TextDelta)`                   | `stream_text`                            |
//! | `Stream(InputJsonDelta)`              | (suppressed)                             |
//! | `Stream(BlockStop)`                   | `stream_close`                           |
//! | `AssistantTurn` text                  | `stream_text` only if nothing was streamed |
//! | `AssistantTurn` tool use              | `tool_pending` (+ approval if gated)     |
//! | `UserTurn` tool result                | `tool_done`                              |
//! | `SystemNotice`                        | (logged)                                 |
//! | `FinalResult`                         | `final_result`, once                     |

use std::collections::HashSet;

use relay_core::{BackendEvent, ContentSegment, StreamDelta, TurnSnapshot, WireEvent};
use serde_json::Value;
use tracing::{debug, warn};

use crate::tracker::ToolCallTracker;

/// One step the Turn driver must take.
#[derive(Clone, Debug, PartialEq)]
pub enum TranslatorOutput {
    /// Send this event to the client.
    Send(WireEvent),
    /// Suspend the Turn until the client decides on this tool.
    AwaitApproval {
        /// Tool awaiting approval.
        tool_name: String,
        /// Tool arguments.
        input: Value,
    },
}

/// Stateful translator for one Turn.
#[derive(Debug)]
pub struct EventTranslator {
    tracker: ToolCallTracker,
    gated_tools: HashSet<String>,
    streamed_text_since_snapshot: bool,
    finished: bool,
}

impl EventTranslator {
    /// Create a translator; tool uses named in `gated_tools` request approval.
    pub fn new(gated_tools: HashSet<String>) -> Self {
        Self {
            tracker: ToolCallTracker::new(),
            gated_tools,
            streamed_text_since_snapshot: false,
            finished: false,
        }
    }

    /// The Turn's tool-call tracker.
    pub fn tracker(&self) -> &ToolCallTracker {
        &self.tracker
    }

    /// Whether `final_result` has been produced.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Translate one backend event into zero or more outputs.
    pub fn translate(&mut self, event: BackendEvent) -> Vec<TranslatorOutput> {
        match event {
            BackendEvent::Stream(delta) => self.translate_delta(delta).into_iter().collect(),
            BackendEvent::AssistantTurn(snapshot) => self.translate_assistant(snapshot),
            BackendEvent::UserTurn(snapshot) => self.translate_user(snapshot),
            BackendEvent::SystemNotice { subtype, data } => {
                debug!(%subtype, %data, "system notice");
                vec![]
            }
            BackendEvent::FinalResult(summary) => {
                if self.finished {
                    warn!("duplicate final result ignored");
                    return vec![];
                }
                if summary.is_error {
                    warn!(num_turns = summary.num_turns, "backend flagged the run as errored");
                }
                self.finished = true;
                self.tracker.clear();
                vec![TranslatorOutput::Send(WireEvent::final_result(
                    summary.total_cost_usd,
                ))]
            }
        }
    }

    fn translate_delta(&mut self, delta: StreamDelta) -> Option<TranslatorOutput> {
        let event = match delta {
            StreamDelta::BlockStart { .. } => WireEvent::StreamOpen,
            StreamDelta::BlockStop { .. } => WireEvent::StreamClose,
            StreamDelta::TextDelta { text, .. } => {
                self.streamed_text_since_snapshot = true;
                WireEvent::StreamText(text)
            }
            StreamDelta::InputJsonDelta { .. } => return None,
        };
        Some(TranslatorOutput::Send(event))
    }

    fn translate_assistant(&mut self, snapshot: TurnSnapshot) -> Vec<TranslatorOutput> {
        let streamed = std::mem::take(&mut self.streamed_text_since_snapshot);
        let mut outputs = Vec::new();
        for segment in snapshot.content {
            match segment {
                ContentSegment::Text { text } => {
                    if !streamed && !text.is_empty() {
                        outputs.push(TranslatorOutput::Send(WireEvent::StreamText(text)));
                    }
                }
                ContentSegment::ToolUse { id, name, input } => {
                    let _ = self.tracker.register(id, name.clone());
                    outputs.push(TranslatorOutput::Send(WireEvent::ToolPending {
                        name: name.clone(),
                    }));
                    if self.gated_tools.contains(&name) {
                        outputs.push(TranslatorOutput::AwaitApproval {
                            tool_name: name,
                            input,
                        });
                    }
                }
                ContentSegment::ToolResult { tool_use_id, .. } => {
                    warn!(%tool_use_id, "tool result inside an assistant message ignored");
                }
            }
        }
        outputs
    }

    fn translate_user(&mut self, snapshot: TurnSnapshot) -> Vec<TranslatorOutput> {
        snapshot
            .content
            .into_iter()
            .filter_map(|segment| match segment {
                ContentSegment::ToolResult { tool_use_id, .. } => {
                    let name = self.tracker.resolve(&tool_use_id).to_owned();
                    Some(TranslatorOutput::Send(WireEvent::ToolDone { name }))
                }
                ContentSegment::Text { .. } | ContentSegment::ToolUse { .. } => None,
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
