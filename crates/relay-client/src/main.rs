//! # relay-client
//!
//! Interactive WebSocket client for the relay. Sends a prompt with a
//! continuation token, streams the reply to stdout and asks the operator
//! before gated tools run.

#![deny(unsafe_code)]

mod approval;
mod render;
mod session;

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result, bail};
use clap::Parser;

use crate::approval::{ApprovalPrompt, AutoPrompt, StdioPrompt};
use crate::render::TurnOutcome;
use crate::session::run_prompt;

/// Relay client.
#[derive(Parser, Debug)]
#[command(name = "relay-client", about = "Talk to a relay server")]
struct Cli {
    /// WebSocket endpoint.
    #[arg(long, default_value = "ws://localhost:8080/ws")]
    url: String,

    /// Continuation token; a fresh one is generated when omitted.
    #[arg(long)]
    session_id: Option<String>,

    /// Keep reading prompts from stdin, one connection per prompt.
    #[arg(long)]
    repl: bool,

    /// Approve every tool without asking.
    #[arg(long, conflicts_with = "auto_deny")]
    auto_approve: bool,

    /// Deny every tool without asking.
    #[arg(long)]
    auto_deny: bool,

    /// Prompt to send.
    prompt: Option<String>,
}

impl Cli {
    fn session_id(&self) -> String {
        self.session_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    fn approver(&self) -> Box<dyn ApprovalPrompt> {
        if self.auto_approve {
            Box::new(AutoPrompt::new(true))
        } else if self.auto_deny {
            Box::new(AutoPrompt::new(false))
        } else {
            Box::new(StdioPrompt)
        }
    }
}

/// Read the next non-empty prompt line, or `None` at end of input or `exit`.
fn next_prompt(input: &mut impl BufRead, output: &mut impl Write) -> io::Result<Option<String>> {
    let mut line = String::new();
    loop {
        write!(output, "> ")?;
        output.flush()?;
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        match line.trim() {
            "" => {}
            "exit" | "quit" => return Ok(None),
            prompt => return Ok(Some(prompt.to_string())),
        }
    }
}

/// Run one prompt.
async fn send(args: &Cli, prompt: &str, session_id: &str) -> Result<TurnOutcome> {
    run_prompt(&args.url, prompt, session_id, args.approver(), &mut io::stdout()).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    relay_core::logging::init_subscriber("warn", false);

    let session_id = args.session_id();
    println!("Session: {session_id}");

    match (&args.prompt, args.repl) {
        (Some(prompt), false) => {
            if let TurnOutcome::Failed(message) = send(&args, prompt, &session_id).await? {
                bail!("turn failed: {message}");
            }
            return Ok(());
        }
        (Some(prompt), true) => {
            if let Err(e) = send(&args, prompt, &session_id).await {
                eprintln!("{e:#}");
            }
        }
        (None, true) => {}
        (None, false) => bail!("a prompt is required unless --repl is given"),
    }

    loop {
        let next = {
            let mut stdin = io::stdin().lock();
            next_prompt(&mut stdin, &mut io::stdout()).context("Failed to read prompt")?
        };
        let Some(prompt) = next else { break };
        if let Err(e) = send(&args, &prompt, &session_id).await {
            eprintln!("{e:#}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["relay-client", "hello"]);
        assert_eq!(cli.url, "ws://localhost:8080/ws");
        assert_eq!(cli.prompt.as_deref(), Some("hello"));
        assert!(!cli.repl);
        assert!(!cli.auto_approve && !cli.auto_deny);
    }

    #[test]
    fn cli_keeps_given_session_id() {
        let cli = Cli::parse_from(["relay-client", "--session-id", "abc", "hi"]);
        assert_eq!(cli.session_id(), "abc");
    }

    #[test]
    fn cli_generates_uuid_session_id() {
        let cli = Cli::parse_from(["relay-client", "hi"]);
        let id = cli.session_id();
        assert!(uuid::Uuid::parse_str(&id).is_ok());
        assert_ne!(id, cli.session_id());
    }

    #[test]
    fn cli_auto_flags_conflict() {
        assert!(Cli::try_parse_from(["relay-client", "--auto-approve", "--auto-deny", "x"]).is_err());
    }

    #[test]
    fn cli_repl_without_prompt() {
        let cli = Cli::parse_from(["relay-client", "--repl"]);
        assert!(cli.repl);
        assert!(cli.prompt.is_none());
    }

    #[test]
    fn next_prompt_skips_blank_lines() {
        let mut input = Cursor::new("\n  \nwhat is 2+2?\n");
        let mut output = Vec::new();
        let prompt = next_prompt(&mut input, &mut output).unwrap();
        assert_eq!(prompt.as_deref(), Some("what is 2+2?"));
    }

    #[test]
    fn next_prompt_stops_on_exit_or_eof() {
        let mut output = Vec::new();
        assert_eq!(next_prompt(&mut Cursor::new("exit\n"), &mut output).unwrap(), None);
        assert_eq!(next_prompt(&mut Cursor::new(""), &mut output).unwrap(), None);
    }
}
