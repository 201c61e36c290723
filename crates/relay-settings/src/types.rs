//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so partial
//! JSON is accepted and missing fields take their compiled default.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the relay.
///
/// ```json
/// {
///   "server": { "port": 9090, "multiTurn": true },
///   "permissions": { "approvalRequired": ["add_numbers"] }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Network and transport settings.
    pub server: ServerSettings,
    /// Conversation backend settings.
    pub agent: AgentSettings,
    /// Tool approval settings.
    pub permissions: PermissionSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.permissions.timeout_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "permissions.timeoutSecs must be greater than 0".into(),
            ));
        }
        if self.agent.max_turns == 0 {
            return Err(SettingsError::InvalidValue(
                "agent.maxTurns must be greater than 0".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxConnections must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Server network and transport settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Keep a WebSocket open after the terminal event and accept another prompt.
    pub multi_turn: bool,
    /// Interval between server Ping frames, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Disconnect a client silent for this long, in seconds.
    pub heartbeat_timeout_secs: u64,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 64,
            multi_turn: false,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 60,
            max_message_size: 1024 * 1024,
        }
    }
}

/// Which conversation backend drives each Turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Anthropic Messages API.
    #[default]
    Anthropic,
    /// Offline echo backend.
    Echo,
}

impl BackendKind {
    /// Parse a backend name (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "anthropic" => Some(Self::Anthropic),
            "echo" => Some(Self::Echo),
            _ => None,
        }
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::Echo => "echo",
        }
    }
}

/// Default system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. \
You can use the add_numbers and multiply_numbers tools for arithmetic. \
Always be helpful, clear, and precise in your responses. \
When using tools, explain what you're doing.";

/// Conversation backend settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSettings {
    /// Backend implementation.
    pub backend: BackendKind,
    /// Model identifier.
    pub model: String,
    /// Maximum model round trips per Turn.
    pub max_turns: u32,
    /// Max output tokens per model request.
    pub max_tokens: u32,
    /// System prompt.
    pub system_prompt: String,
    /// API base URL override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Anthropic,
            model: "claude-sonnet-4-5".to_string(),
            max_turns: 10,
            max_tokens: 4096,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            base_url: None,
        }
    }
}

/// Tool approval settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PermissionSettings {
    /// Tools that require client approval before they execute.
    pub approval_required: Vec<String>,
    /// How long to wait for a decision, in seconds.
    pub timeout_secs: u64,
}

impl Default for PermissionSettings {
    fn default() -> Self {
        Self {
            approval_required: vec!["add_numbers".to_string(), "multiply_numbers".to_string()],
            timeout_secs: 30,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = RelaySettings::default();
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8080);
        assert!(!settings.server.multi_turn);
        assert_eq!(settings.agent.backend, BackendKind::Anthropic);
        assert_eq!(settings.agent.model, "claude-sonnet-4-5");
        assert_eq!(settings.agent.max_turns, 10);
        assert_eq!(settings.permissions.timeout_secs, 30);
        assert_eq!(
            settings.permissions.approval_required,
            vec!["add_numbers", "multiply_numbers"]
        );
        assert_eq!(settings.logging.level, "info");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(RelaySettings::default()).unwrap();
        assert_eq!(json["server"]["maxConnections"], 64);
        assert_eq!(json["server"]["multiTurn"], false);
        assert_eq!(json["permissions"]["timeoutSecs"], 30);
        assert_eq!(json["agent"]["maxTurns"], 10);
        assert!(json["agent"].get("baseUrl").is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: RelaySettings =
            serde_json::from_str(r#"{"server": {"port": 9000}}"#).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.permissions.timeout_secs, 30);
    }

    #[test]
    fn backend_kind_serde() {
        assert_eq!(serde_json::to_string(&BackendKind::Echo).unwrap(), "\"echo\"");
        let back: BackendKind = serde_json::from_str("\"anthropic\"").unwrap();
        assert_eq!(back, BackendKind::Anthropic);
    }

    #[test]
    fn backend_kind_parse() {
        assert_eq!(BackendKind::parse("ECHO"), Some(BackendKind::Echo));
        assert_eq!(BackendKind::parse("anthropic"), Some(BackendKind::Anthropic));
        assert_eq!(BackendKind::parse("openai"), None);
        assert_eq!(BackendKind::Echo.as_str(), "echo");
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut settings = RelaySettings::default();
        settings.permissions.timeout_secs = 0;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidValue(msg)) if msg.contains("timeoutSecs")
        ));
    }

    #[test]
    fn validate_rejects_zero_max_turns() {
        let mut settings = RelaySettings::default();
        settings.agent.max_turns = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn default_system_prompt_names_tools() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("add_numbers"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("multiply_numbers"));
    }
}
