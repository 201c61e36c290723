//! Tool-call tracker: pairs tool results with the tool that produced them.
//!
//! One tracker lives for exactly one Turn. Identifiers are registered when a
//! tool use is observed and looked up when the matching result arrives.

use std::collections::HashMap;

use relay_core::RelayError;
use tracing::warn;

/// Name reported for a tool result whose identifier was never registered.
pub const UNKNOWN_TOOL: &str = "Unknown";

/// Tool-use identifier → tool name, scoped to one Turn.
#[derive(Debug, Default)]
pub struct ToolCallTracker {
    calls: HashMap<String, String>,
}

impl ToolCallTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `id` invokes `name`.
    ///
    /// A duplicate id overwrites the stale entry and returns it.
    pub fn register(&mut self, id: impl Into<String>, name: impl Into<String>) -> Option<String> {
        let id = id.into();
        let previous = self.calls.insert(id.clone(), name.into());
        if let Some(stale) = &previous {
            warn!(tool_use_id = %id, stale_name = %stale, "duplicate tool-use id registered");
        }
        previous
    }

    /// Name registered for `id`, or [`UNKNOWN_TOOL`].
    pub fn resolve(&self, id: &str) -> &str {
        if let Some(name) = self.calls.get(id) {
            name
        } else {
            let violation =
                RelayError::ProtocolViolation(format!("tool result for unregistered id {id}"));
            warn!(error = %violation, "unmatched tool result");
            UNKNOWN_TOOL
        }
    }

    /// Number of registered invocations.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Forget every registration.
    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_resolve() {
        let mut tracker = ToolCallTracker::new();
        assert!(tracker.register("toolu_1", "add_numbers").is_none());
        assert_eq!(tracker.resolve("toolu_1"), "add_numbers");
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn unknown_id_resolves_to_sentinel() {
        let tracker = ToolCallTracker::new();
        assert_eq!(tracker.resolve("toolu_missing"), UNKNOWN_TOOL);
    }

    #[test]
    fn duplicate_id_overwrites() {
        let mut tracker = ToolCallTracker::new();
        let _ = tracker.register("t", "add_numbers");
        let stale = tracker.register("t", "multiply_numbers");
        assert_eq!(stale.as_deref(), Some("add_numbers"));
        assert_eq!(tracker.resolve("t"), "multiply_numbers");
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn clear_forgets_everything() {
        let mut tracker = ToolCallTracker::new();
        let _ = tracker.register("t", "add_numbers");
        tracker.clear();
        assert!(tracker.is_empty());
        assert_eq!(tracker.resolve("t"), UNKNOWN_TOOL);
    }
}
