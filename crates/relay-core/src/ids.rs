//! Branded ID newtypes.
//!
//! IDs minted by the relay are UUID v7 (time-ordered) with a short prefix so
//! they are recognisable in logs. Continuation tokens are client-supplied and
//! stay plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID (prefixed UUID v7).
            #[must_use]
            pub fn new() -> Self {
                Self(format!(concat!($prefix, "_{}"), Uuid::now_v7().simple()))
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

branded_id!(
    /// Identifies one prompt-to-terminal-result cycle.
    TurnId,
    "turn"
);

branded_id!(
    /// Identifies one client transport connection.
    ConnectionId,
    "conn"
);

/// Generate a tool-use identifier in the Anthropic `toolu_` style.
#[must_use]
pub fn new_tool_use_id() -> String {
    format!("toolu_{}", Uuid::now_v7().simple())
}
