//! # relay-agent
//!
//! Relay server binary. Loads settings, picks the conversation backend and
//! starts the HTTP/WebSocket server.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use relay_core::ConversationBackend;
use relay_llm::{AnthropicBackend, AnthropicConfig, EchoBackend};
use relay_runtime::{PermissionPolicy, RelayContext};
use relay_server::{RelayServer, ServerConfig};
use relay_settings::{AgentSettings, BackendKind, PermissionSettings, RelaySettings};

/// Environment variable holding the Anthropic API key.
const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Relay server.
#[derive(Parser, Debug)]
#[command(name = "relay-agent", about = "Agent relay server")]
struct Cli {
    /// Settings file (defaults to `~/.relay/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Host to bind (overrides settings if specified).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings if specified).
    #[arg(long)]
    port: Option<u16>,

    /// Conversation backend: `anthropic` or `echo`.
    #[arg(long, value_parser = parse_backend)]
    backend: Option<BackendKind>,

    /// Keep WebSocket connections open across Turns.
    #[arg(long)]
    multi_turn: bool,
}

fn parse_backend(value: &str) -> std::result::Result<BackendKind, String> {
    BackendKind::parse(value).ok_or_else(|| format!("unknown backend '{value}'"))
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings.
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(backend) = self.backend {
            settings.agent.backend = backend;
        }
        if self.multi_turn {
            settings.server.multi_turn = true;
        }
    }
}

/// Build the configured backend over the built-in tools.
fn build_backend(
    agent: &AgentSettings,
    api_key: Option<String>,
) -> Arc<dyn ConversationBackend> {
    let tools = Arc::new(relay_tools::builtin_registry());
    match agent.backend {
        BackendKind::Echo => Arc::new(EchoBackend::new(tools)),
        BackendKind::Anthropic => {
            let api_key = api_key.unwrap_or_else(|| {
                tracing::warn!("{API_KEY_ENV} is not set; Anthropic requests will be rejected");
                String::new()
            });
            let config = AnthropicConfig {
                api_key,
                model: agent.model.clone(),
                max_tokens: agent.max_tokens,
                max_turns: agent.max_turns,
                system_prompt: agent.system_prompt.clone(),
                base_url: agent.base_url.clone(),
            };
            Arc::new(AnthropicBackend::new(config, tools))
        }
    }
}

fn permission_policy(settings: &PermissionSettings) -> PermissionPolicy {
    PermissionPolicy::new(
        settings.approval_required.iter().cloned(),
        Duration::from_secs(settings.timeout_secs),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Settings come first: the log level lives there
    let mut settings = match &args.settings {
        Some(path) => relay_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => relay_settings::load_settings().context("Failed to load settings")?,
    };
    args.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    relay_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);

    let backend = build_backend(&settings.agent, std::env::var(API_KEY_ENV).ok());
    let policy = permission_policy(&settings.permissions);
    tracing::info!(
        backend = backend.name(),
        gated = ?settings.permissions.approval_required,
        timeout_secs = settings.permissions.timeout_secs,
        "backend ready"
    );
    let ctx = RelayContext::new(backend, policy);

    let metrics = relay_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;
    let server = RelayServer::new(ServerConfig::from(&settings.server), ctx).with_metrics(metrics);

    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;
    tracing::info!("Relay listening on ws://{addr}/ws");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown().graceful_shutdown(None).await;
    let _ = handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_leave_settings_alone() {
        let cli = Cli::parse_from(["relay-agent"]);
        let mut settings = RelaySettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.agent.backend, BackendKind::Anthropic);
        assert!(!settings.server.multi_turn);
    }

    #[test]
    fn cli_overrides_settings() {
        let cli = Cli::parse_from([
            "relay-agent",
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
            "--backend",
            "echo",
            "--multi-turn",
        ]);
        let mut settings = RelaySettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.agent.backend, BackendKind::Echo);
        assert!(settings.server.multi_turn);
    }

    #[test]
    fn cli_backend_is_case_insensitive() {
        let cli = Cli::parse_from(["relay-agent", "--backend", "ECHO"]);
        assert_eq!(cli.backend, Some(BackendKind::Echo));
    }

    #[test]
    fn cli_rejects_unknown_backend() {
        assert!(Cli::try_parse_from(["relay-agent", "--backend", "gpt"]).is_err());
    }

    #[test]
    fn cli_settings_path() {
        let cli = Cli::parse_from(["relay-agent", "--settings", "/tmp/relay.json"]);
        assert_eq!(cli.settings, Some(PathBuf::from("/tmp/relay.json")));
    }

    #[test]
    fn echo_backend_selected() {
        let agent = AgentSettings {
            backend: BackendKind::Echo,
            ..AgentSettings::default()
        };
        assert_eq!(build_backend(&agent, None).name(), "echo");
    }

    #[test]
    fn anthropic_backend_without_key_still_builds() {
        let backend = build_backend(&AgentSettings::default(), None);
        assert_eq!(backend.name(), "anthropic");
    }

    #[test]
    fn policy_mirrors_permission_settings() {
        let settings = PermissionSettings {
            approval_required: vec!["add_numbers".into()],
            timeout_secs: 5,
        };
        let policy = permission_policy(&settings);
        assert!(policy.requires_approval("add_numbers"));
        assert!(!policy.requires_approval("multiply_numbers"));
        assert_eq!(policy.timeout, Duration::from_secs(5));
    }

    #[test]
    fn settings_file_feeds_cli_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 7000}, "agent": {"backend": "echo"}}"#)
            .unwrap();

        let cli = Cli::parse_from(["relay-agent", "--port", "7001"]);
        let mut settings = relay_settings::load_settings_from_path(&path).unwrap();
        cli.apply(&mut settings);
        assert_eq!(settings.server.port, 7001);
        assert_eq!(settings.agent.backend, BackendKind::Echo);
    }
}
