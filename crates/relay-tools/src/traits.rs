//! The [`RelayTool`] trait every registered tool implements.

use async_trait::async_trait;
use relay_core::tools::{ToolDefinition, ToolOutput};
use serde_json::Value;

use crate::errors::ToolError;

/// A named tool with a JSON-schema'd input.
#[async_trait]
pub trait RelayTool: Send + Sync {
    /// Tool name, the exact string sent to/from the model.
    fn name(&self) -> &str;

    /// Schema advertised to the model.
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with JSON arguments.
    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError>;
}
