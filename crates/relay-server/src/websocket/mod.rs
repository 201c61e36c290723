//! WebSocket transport: connection limit, heartbeat, and the session loop.

pub mod connection;
pub mod session;

pub use connection::{ConnectionPermit, ConnectionTracker, Liveness};
pub use session::{SessionOptions, run_ws_session};
