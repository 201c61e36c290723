//! Built-in arithmetic tools: `add_numbers` and `multiply_numbers`.
//!
//! Both take `{"a": int, "b": int}` and answer with a one-line equation.

use async_trait::async_trait;
use relay_core::tools::{ToolDefinition, ToolOutput};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::errors::ToolError;
use crate::traits::RelayTool;

/// Arguments shared by both tools.
#[derive(Debug, Deserialize)]
struct Operands {
    a: i64,
    b: i64,
}

fn parse_operands(params: Value) -> Result<Operands, ToolError> {
    serde_json::from_value(params)
        .map_err(|e| ToolError::validation(format!("expected integer arguments a and b: {e}")))
}

fn operands_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "a": { "type": "integer" },
            "b": { "type": "integer" }
        },
        "required": ["a", "b"]
    })
}

/// Adds two integers.
pub struct AddNumbersTool;

#[async_trait]
impl RelayTool for AddNumbersTool {
    fn name(&self) -> &str {
        "add_numbers"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().into(),
            description: "Add two numbers together".into(),
            input_schema: operands_schema(),
        }
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let Operands { a, b } = parse_operands(params)?;
        let sum = a.checked_add(b).ok_or_else(|| ToolError::Execution {
            message: format!("{a} + {b} overflows"),
        })?;
        Ok(ToolOutput::text(format!("{a} + {b} = {sum}")))
    }
}

/// Multiplies two integers.
pub struct MultiplyNumbersTool;

#[async_trait]
impl RelayTool for MultiplyNumbersTool {
    fn name(&self) -> &str {
        "multiply_numbers"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().into(),
            description: "Multiply two numbers together".into(),
            input_schema: operands_schema(),
        }
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let Operands { a, b } = parse_operands(params)?;
        let product = a.checked_mul(b).ok_or_else(|| ToolError::Execution {
            message: format!("{a} × {b} overflows"),
        })?;
        Ok(ToolOutput::text(format!("{a} × {b} = {product}")))
    }
}
