//! Anthropic Messages API backend.

pub mod backend;
pub mod stream_handler;
pub mod types;

pub use backend::AnthropicBackend;
pub use types::AnthropicConfig;
