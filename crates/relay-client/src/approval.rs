//! Operator decisions for tool permission requests.
//!
//! Decisions may block on a terminal, so the session asks them on the
//! blocking pool and every prompt must be `Send`.

use std::io::{self, BufRead, Write};

use serde_json::Value;

/// Answers one permission request.
#[cfg_attr(test, mockall::automock)]
pub trait ApprovalPrompt: Send {
    /// Whether `tool_name` may run with `input`.
    fn decide(&mut self, tool_name: &str, input: &Value) -> bool;
}

/// Same answer for every request (`--auto-approve` / `--auto-deny`).
#[derive(Clone, Copy, Debug)]
pub struct AutoPrompt {
    approve: bool,
}

impl AutoPrompt {
    /// Always answer `approve`.
    pub fn new(approve: bool) -> Self {
        Self { approve }
    }
}

impl ApprovalPrompt for AutoPrompt {
    fn decide(&mut self, tool_name: &str, _input: &Value) -> bool {
        tracing::debug!(tool_name, approve = self.approve, "auto decision");
        self.approve
    }
}

/// Asks the operator on a terminal until they answer `y` or `n`.
///
/// End of input counts as a denial.
pub struct TerminalPrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    /// Prompt over `input`/`output`.
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, tool_name: &str, input: &Value) -> io::Result<bool> {
        let pretty = serde_json::to_string_pretty(input).unwrap_or_else(|_| input.to_string());
        writeln!(self.output, "\nTool permission requested: {tool_name}")?;
        writeln!(self.output, "Input: {pretty}")?;

        let mut line = String::new();
        loop {
            write!(self.output, "Approve? (y/n) ")?;
            self.output.flush()?;
            line.clear();
            if self.input.read_line(&mut line)? == 0 {
                writeln!(self.output)?;
                return Ok(false);
            }
            match line.trim().to_ascii_lowercase().as_str() {
                "y" => return Ok(true),
                "n" => return Ok(false),
                _ => writeln!(self.output, "Please answer y or n.")?,
            }
        }
    }

    /// Ask once; an unreadable terminal denies.
    fn answer(&mut self, tool_name: &str, input: &Value) -> bool {
        self.ask(tool_name, input).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not read a decision, denying");
            false
        })
    }
}

impl<R: BufRead + Send, W: Write + Send> ApprovalPrompt for TerminalPrompt<R, W> {
    fn decide(&mut self, tool_name: &str, input: &Value) -> bool {
        self.answer(tool_name, input)
    }
}

/// [`TerminalPrompt`] over the process stdin and stdout.
///
/// Stdin is locked only while a decision is being read, so the REPL can
/// read prompts between Turns.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdioPrompt;

impl ApprovalPrompt for StdioPrompt {
    fn decide(&mut self, tool_name: &str, input: &Value) -> bool {
        TerminalPrompt::new(io::stdin().lock(), io::stdout()).answer(tool_name, input)
    }
}
