//! In-memory conversation memory keyed by continuation token.
//!
//! A run loads the transcript for its token, appends to a private copy and
//! saves it back when it finishes cleanly. Runs without a token start fresh
//! and are never stored.

use std::collections::HashMap;

use parking_lot::Mutex;

/// Transcripts of `M` messages per continuation token.
pub struct TranscriptStore<M> {
    entries: Mutex<HashMap<String, Vec<M>>>,
}

impl<M: Clone> TranscriptStore<M> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Copy of the transcript for `token`, empty when unknown or `None`.
    pub fn load(&self, token: Option<&str>) -> Vec<M> {
        token
            .and_then(|t| self.entries.lock().get(t).cloned())
            .unwrap_or_default()
    }

    /// Replace the transcript for `token`. No-op without a token.
    pub fn save(&self, token: Option<&str>, messages: Vec<M>) {
        if let Some(token) = token {
            let _ = self.entries.lock().insert(token.to_owned(), messages);
        }
    }

    /// Number of stored conversations.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no conversation is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<M: Clone> Default for TranscriptStore<M> {
    fn default() -> Self {
        Self::new()
    }
}
