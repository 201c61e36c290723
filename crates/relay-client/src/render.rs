//! Terminal rendering of wire events.

use std::io::{self, Write};

use relay_core::WireEvent;
use serde_json::Value;

/// What the session loop does after an event is rendered.
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    /// Keep reading.
    Continue,
    /// Ask the operator, then answer the server.
    AskApproval {
        /// Tool awaiting a decision.
        tool_name: String,
        /// Tool input as requested.
        input: Value,
    },
    /// The Turn is over.
    Finished(TurnOutcome),
}

/// How a Turn ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Final summary line (`Completed. Cost: $...`).
    Completed(String),
    /// Server-reported error.
    Failed(String),
}

/// Write `event` to `out` and decide the next step.
pub fn render(event: &WireEvent, out: &mut dyn Write) -> io::Result<Step> {
    let step = match event {
        WireEvent::StreamOpen | WireEvent::PermissionResponse { .. } => Step::Continue,
        WireEvent::StreamClose => {
            writeln!(out)?;
            Step::Continue
        }
        WireEvent::StreamText(text) => {
            write!(out, "{text}")?;
            Step::Continue
        }
        WireEvent::ToolPending { name } => {
            writeln!(out, "{name} tool is processing...")?;
            Step::Continue
        }
        WireEvent::ToolDone { name } => {
            writeln!(out, "{name} tool executed.")?;
            Step::Continue
        }
        WireEvent::PermissionRequest { tool_name, input } => Step::AskApproval {
            tool_name: tool_name.clone(),
            input: input.clone(),
        },
        WireEvent::FinalResult { summary } => {
            writeln!(out, "{summary}")?;
            Step::Finished(TurnOutcome::Completed(summary.clone()))
        }
        WireEvent::Error { message } => {
            writeln!(out, "Error: {message}")?;
            Step::Finished(TurnOutcome::Failed(message.clone()))
        }
    };
    out.flush()?;
    Ok(step)
}
