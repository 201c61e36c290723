//! `/ping` endpoint.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"Healthy"` while the server is serving.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// When the server started.
    pub started_at: DateTime<Utc>,
    /// Open WebSocket connections.
    pub connections: usize,
    /// Turns in flight across all transports.
    pub active_turns: usize,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    started_at: DateTime<Utc>,
    connections: usize,
    active_turns: usize,
) -> HealthResponse {
    HealthResponse {
        status: "Healthy",
        uptime_secs: start_time.elapsed().as_secs(),
        started_at,
        connections,
        active_turns,
    }
}
