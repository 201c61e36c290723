//! # relay-tools
//!
//! Tool trait, registry, and the built-in tools the relay exposes to its
//! backends.
//!
//! The registry is static after startup: backends call [`ToolRegistry::invoke`]
//! while running a conversation, the relay itself never does.

#![deny(unsafe_code)]

pub mod errors;
pub mod math;
pub mod registry;
pub mod traits;

use std::sync::Arc;

pub use errors::ToolError;
pub use registry::ToolRegistry;
pub use traits::RelayTool;

/// Build a registry holding the built-in tools.
pub fn builtin_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(math::AddNumbersTool));
    registry.register(Arc::new(math::MultiplyNumbersTool));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_has_math_tools() {
        let registry = builtin_registry();
        assert_eq!(registry.names(), vec!["add_numbers", "multiply_numbers"]);
    }
}
