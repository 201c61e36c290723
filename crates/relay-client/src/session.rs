//! One Turn over one WebSocket connection.

use std::io::Write;

use anyhow::{Context, Result, bail};
use futures::{SinkExt, StreamExt};
use relay_core::{PromptRequest, WireEvent};
use serde_json::{Value, json};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, instrument, warn};

use crate::approval::ApprovalPrompt;
use crate::render::{Step, TurnOutcome, render};

/// Connect to `url`, send `prompt` under `session_id`, and render events
/// until the terminal one.
///
/// Permission requests are answered through `approver` on the blocking pool,
/// so a prompt waiting on the terminal does not stall the runtime. The
/// connection is closed once the Turn ends.
#[instrument(skip_all, fields(url = %url, session_id = %session_id))]
pub async fn run_prompt(
    url: &str,
    prompt: &str,
    session_id: &str,
    mut approver: Box<dyn ApprovalPrompt>,
    out: &mut dyn Write,
) -> Result<TurnOutcome> {
    let (mut ws, _) = connect_async(url)
        .await
        .with_context(|| format!("Failed to connect to {url}"))?;
    debug!("connected");

    let request = PromptRequest::new(prompt, Some(session_id.to_string()));
    ws.send(Message::Text(request.to_value().to_string().into()))
        .await
        .context("Failed to send prompt")?;

    while let Some(frame) = ws.next().await {
        let frame = frame.context("Connection error")?;
        let text = match frame {
            Message::Text(text) => text.to_string(),
            Message::Close(_) => break,
            _ => continue,
        };
        let event = match WireEvent::parse(&text) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "unreadable event skipped");
                continue;
            }
        };

        match render(&event, out)? {
            Step::Continue => {}
            Step::AskApproval { tool_name, input } => {
                let (returned, approved) = decide(approver, tool_name, input).await?;
                approver = returned;
                let reply = json!({"type": "tool_permission_response", "approved": approved});
                ws.send(Message::Text(reply.to_string().into()))
                    .await
                    .context("Failed to send permission response")?;
            }
            Step::Finished(outcome) => {
                let _ = ws.close(None).await;
                return Ok(outcome);
            }
        }
    }

    bail!("connection closed before the turn finished")
}

/// Ask `approver` on the blocking pool and hand it back with its answer.
async fn decide(
    mut approver: Box<dyn ApprovalPrompt>,
    tool_name: String,
    input: Value,
) -> Result<(Box<dyn ApprovalPrompt>, bool)> {
    tokio::task::spawn_blocking(move || {
        let approved = approver.decide(&tool_name, &input);
        (approver, approved)
    })
    .await
    .context("approval prompt panicked")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::{AutoPrompt, MockApprovalPrompt};
    use relay_llm::EchoBackend;
    use relay_runtime::{PermissionPolicy, RelayContext};
    use relay_server::{RelayServer, ServerConfig};
    use std::sync::{Arc, mpsc};
    use std::time::Duration;

    async fn boot() -> (String, RelayServer) {
        let backend = EchoBackend::new(Arc::new(relay_tools::builtin_registry()));
        let ctx = RelayContext::new(Arc::new(backend), PermissionPolicy::default());
        let server = RelayServer::new(ServerConfig::default(), ctx);
        let (addr, _handle) = server.listen().await.unwrap();
        (format!("ws://{addr}/ws"), server)
    }

    #[tokio::test]
    async fn approved_addition_prints_answer() {
        let (url, _server) = boot().await;
        let mut approver = MockApprovalPrompt::new();
        let _ = approver
            .expect_decide()
            .withf(|tool_name, _| tool_name == "add_numbers")
            .times(1)
            .return_const(true);

        let mut out = Vec::new();
        let outcome = run_prompt(&url, "What is 15+27?", "client-add", Box::new(approver), &mut out)
            .await
            .unwrap();

        assert_eq!(outcome, TurnOutcome::Completed("Completed. Cost: $0".into()));
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("add_numbers tool is processing..."));
        assert!(text.contains("15 + 27 = 42"));
    }

    #[tokio::test]
    async fn denial_is_reported_in_text() {
        let (url, _server) = boot().await;
        let mut out = Vec::new();
        let outcome = run_prompt(
            &url,
            "6 * 7",
            "client-deny",
            Box::new(AutoPrompt::new(false)),
            &mut out,
        )
        .await
        .unwrap();

        assert!(matches!(outcome, TurnOutcome::Completed(_)));
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("User denied permission to use multiply_numbers"));
        assert!(!text.contains("= 42"));
    }

    #[tokio::test]
    async fn plain_prompt_needs_no_decision() {
        let (url, _server) = boot().await;
        let silent = || {
            let mut approver = MockApprovalPrompt::new();
            let _ = approver.expect_decide().never();
            Box::new(approver)
        };

        let mut out = Vec::new();
        let _ = run_prompt(&url, "hello", "client-plain", silent(), &mut out)
            .await
            .unwrap();
        let _ = run_prompt(&url, "again", "client-plain", silent(), &mut out)
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Conversation so far: hello | again"));
    }

    /// Blocks its thread until released from elsewhere.
    struct HeldPrompt {
        release: mpsc::Receiver<bool>,
    }

    impl ApprovalPrompt for HeldPrompt {
        fn decide(&mut self, _tool_name: &str, _input: &Value) -> bool {
            self.release
                .recv_timeout(Duration::from_secs(5))
                .unwrap_or(false)
        }
    }

    #[tokio::test]
    async fn blocking_decision_leaves_runtime_running() {
        // Server, client and releaser all share this single-threaded runtime;
        // the release only arrives if the decision is off the runtime thread.
        let (url, _server) = boot().await;
        let (release_tx, release) = mpsc::channel();
        let _releaser = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = release_tx.send(true);
        });

        let mut out = Vec::new();
        let outcome = run_prompt(
            &url,
            "What is 15+27?",
            "client-held",
            Box::new(HeldPrompt { release }),
            &mut out,
        )
        .await
        .unwrap();

        assert!(matches!(outcome, TurnOutcome::Completed(_)));
        assert!(String::from_utf8(out).unwrap().contains("15 + 27 = 42"));
    }

    #[tokio::test]
    async fn unreachable_server_is_an_error() {
        let mut out = Vec::new();
        let err = run_prompt(
            "ws://127.0.0.1:1/ws",
            "hello",
            "client-none",
            Box::new(AutoPrompt::new(true)),
            &mut out,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Failed to connect"));
    }
}
