//! Tool error types.

use thiserror::Error;

/// Errors that can occur during tool lookup or execution.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Parameter validation failed.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// Tool not found in registry.
    #[error("tool not found: {name}")]
    NotFound {
        /// The tool name that was not found.
        name: String,
    },

    /// The tool ran but could not produce a result.
    #[error("execution failed: {message}")]
    Execution {
        /// Description of the failure.
        message: String,
    },
}

impl ToolError {
    /// Shorthand for a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display() {
        let err = ToolError::validation("missing required parameter");
        assert_eq!(err.to_string(), "validation error: missing required parameter");
    }

    #[test]
    fn not_found_display() {
        let err = ToolError::NotFound {
            name: "Bash".into(),
        };
        assert_eq!(err.to_string(), "tool not found: Bash");
    }

    #[test]
    fn execution_display() {
        let err = ToolError::Execution {
            message: "overflow".into(),
        };
        assert_eq!(err.to_string(), "execution failed: overflow");
    }
}
