//! # relay-server
//!
//! Axum surface for the relay.
//!
//! - `GET /ws`: persistent duplex session with heartbeat and a connection limit
//! - `POST /invocations`: request/stream session over server-sent events
//! - `GET /ping` and `GET /metrics`: health and Prometheus text
//! - Graceful shutdown via `CancellationToken` + `TaskTracker`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use server::{AppState, RelayServer};
pub use shutdown::ShutdownCoordinator;
