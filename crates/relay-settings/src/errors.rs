//! Settings errors.

use thiserror::Error;

/// Why settings could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read relay settings: {0}")]
    Io(#[from] std::io::Error),

    /// The settings file is not valid JSON, or does not fit the schema.
    #[error("malformed relay settings: {0}")]
    Json(#[from] serde_json::Error),

    /// A value parsed but is unusable, e.g. a zero permission timeout.
    #[error("invalid relay setting: {0}")]
    InvalidValue(String),
}

/// Result alias for settings loading.
pub type Result<T> = std::result::Result<T, SettingsError>;
