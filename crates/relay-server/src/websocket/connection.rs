//! WebSocket connection bookkeeping: the connection limit and per-client
//! liveness.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use metrics::{counter, gauge};
use parking_lot::Mutex;
use relay_core::ConnectionId;
use tracing::debug;

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};

/// Counts open connections against a fixed limit.
#[derive(Debug)]
pub struct ConnectionTracker {
    active: AtomicUsize,
    max: usize,
}

impl ConnectionTracker {
    /// Tracker allowing at most `max` concurrent connections.
    pub fn new(max: usize) -> Self {
        Self {
            active: AtomicUsize::new(0),
            max,
        }
    }

    /// Open connections.
    pub fn count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Connection limit.
    pub fn max(&self) -> usize {
        self.max
    }

    /// Reserve a slot, or `None` at the limit.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionPermit> {
        let mut current = self.active.load(Ordering::Acquire);
        loop {
            if current >= self.max {
                return None;
            }
            match self.active.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        let id = ConnectionId::new();
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        debug!(connection_id = %id, active = current + 1, "connection slot acquired");
        Some(ConnectionPermit {
            id,
            tracker: Arc::clone(self),
            opened_at: Instant::now(),
        })
    }
}

/// One reserved connection slot. Released on drop.
#[derive(Debug)]
pub struct ConnectionPermit {
    id: ConnectionId,
    tracker: Arc<ConnectionTracker>,
    opened_at: Instant,
}

impl ConnectionPermit {
    /// Connection id.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// How long the connection has been open.
    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        let _ = self.tracker.active.fetch_sub(1, Ordering::AcqRel);
        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    }
}

/// Last time anything arrived from the client.
#[derive(Debug)]
pub struct Liveness {
    last_seen: Mutex<Instant>,
}

impl Liveness {
    /// Start the clock now.
    pub fn new() -> Self {
        Self {
            last_seen: Mutex::new(Instant::now()),
        }
    }

    /// Record client activity (any frame, including Pong).
    pub fn mark_alive(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the last client activity.
    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permits_respect_limit() {
        let tracker = Arc::new(ConnectionTracker::new(2));
        let a = tracker.try_acquire().unwrap();
        let b = tracker.try_acquire().unwrap();
        assert!(tracker.try_acquire().is_none());
        assert_eq!(tracker.count(), 2);
        assert_ne!(a.id(), b.id());

        drop(a);
        assert_eq!(tracker.count(), 1);
        assert!(tracker.try_acquire().is_some());
    }

    #[test]
    fn zero_limit_refuses_everything() {
        let tracker = Arc::new(ConnectionTracker::new(0));
        assert!(tracker.try_acquire().is_none());
        assert_eq!(tracker.max(), 0);
    }

    #[test]
    fn liveness_resets_on_activity() {
        let liveness = Liveness::new();
        std::thread::sleep(Duration::from_millis(20));
        assert!(liveness.idle_for() >= Duration::from_millis(20));
        liveness.mark_alive();
        assert!(liveness.idle_for() < Duration::from_millis(20));
    }
}
