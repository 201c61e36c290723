//! # SSE Parser
//!
//! Server-Sent Events line parser for backend HTTP streams. Handles:
//! - Line buffering across chunk boundaries
//! - `data: ` prefix extraction
//! - `[DONE]` marker filtering
//! - A trailing line without a newline when the body ends

use bytes::{Bytes, BytesMut};
use futures::Stream;
use relay_core::BackendError;
use tokio_stream::StreamExt;
use tracing::warn;

/// Parse SSE lines from a byte stream and yield the `data:` payloads.
///
/// A transport error is yielded once as `Err` and ends the stream.
pub fn parse_sse_lines<S>(byte_stream: S) -> impl Stream<Item = Result<String, BackendError>> + Send
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + Unpin + 'static,
{
    futures::stream::unfold(
        (byte_stream, BytesMut::with_capacity(8192), false),
        |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }

            loop {
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let mut line_bytes = buffer.split_to(newline_pos + 1);
                    line_bytes.truncate(line_bytes.len() - 1);
                    if line_bytes.last() == Some(&b'\r') {
                        line_bytes.truncate(line_bytes.len() - 1);
                    }

                    let Ok(line) = std::str::from_utf8(&line_bytes) else {
                        continue;
                    };

                    if let Some(data) = extract_sse_data(line) {
                        return Some((Ok(data), (stream, buffer, false)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        warn!("SSE stream read error: {e}");
                        let err = BackendError::Http {
                            message: e.to_string(),
                        };
                        return Some((Err(err), (stream, buffer, true)));
                    }
                    None => {
                        if buffer.is_empty() {
                            return None;
                        }
                        let line = std::str::from_utf8(&buffer).ok()?.trim().to_owned();
                        buffer.clear();
                        return extract_sse_data(&line).map(|data| (Ok(data), (stream, buffer, true)));
                    }
                }
            }
        },
    )
}

/// Extract the data payload from an SSE line.
///
/// Returns `None` for comments, empty lines, other fields and `[DONE]`.
pub(crate) fn extract_sse_data(line: &str) -> Option<String> {
    let trimmed = line.trim();

    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }

    let data = trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))?
        .trim();

    if data.is_empty() || data == "[DONE]" {
        return None;
    }

    Some(data.to_string())
}

/// Parse JSON from an SSE data string, logging and skipping failures.
pub fn parse_sse_data<T: serde::de::DeserializeOwned>(data: &str, backend: &str) -> Option<T> {
    match serde_json::from_str(data) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            let preview: String = data.chars().take(100).collect();
            warn!(backend, error = %e, data_preview = %preview, "failed to parse SSE data");
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
