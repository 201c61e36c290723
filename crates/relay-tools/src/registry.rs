//! Tool registry: static table of the tools backends may call.
//!
//! Maps tool names to their [`RelayTool`] implementations. Populated once at
//! startup and shared read-only (behind an `Arc`) by every Turn.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use relay_core::tools::{ToolDefinition, ToolOutput};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::errors::ToolError;
use crate::traits::RelayTool;

/// Central registry mapping tool names to their implementations.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn RelayTool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Overwrites any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn RelayTool>) {
        debug!(tool_name = tool.name(), "tool registered");
        let _ = self.tools.insert(tool.name().to_owned(), tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn RelayTool>> {
        self.tools.get(name).cloned()
    }

    /// Tool schemas for the model, sorted by name.
    pub fn describe(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Run the named tool.
    ///
    /// Validation and execution failures are folded into an error
    /// [`ToolOutput`] so the model sees them as a tool result. Only an
    /// unknown name is returned as `Err`.
    #[instrument(skip_all, fields(tool_name = name))]
    pub async fn invoke(&self, name: &str, args: Value) -> Result<ToolOutput, ToolError> {
        let Some(tool) = self.get(name) else {
            warn!("tool not registered");
            return Err(ToolError::NotFound { name: name.into() });
        };

        let start = Instant::now();
        let output = match tool.execute(args).await {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "tool execution failed");
                ToolOutput::error(e.to_string())
            }
        };
        let outcome = if output.is_error { "error" } else { "ok" };
        counter!("tool_invocations_total", "tool" => name.to_owned(), "outcome" => outcome)
            .increment(1);
        histogram!("tool_duration_seconds", "tool" => name.to_owned())
            .record(start.elapsed().as_secs_f64());
        debug!(is_error = output.is_error, "tool executed");
        Ok(output)
    }

    /// Return all tool names, sorted alphabetically.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Whether a tool with the given name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
