//! Process-wide relay context.
//!
//! Built once at startup and cloned into every connection. It is the only
//! state Turns share, and nothing in it is mutated per Turn except the
//! active-turn gauge.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use relay_core::ConversationBackend;
use tracing::warn;

use crate::turn::{TURN_DURATION_SECONDS, TURNS_ACTIVE, TURNS_TOTAL, TurnStatus};

/// Default wait budget for a permission decision.
pub const DEFAULT_PERMISSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default outbound buffer between a Turn and its transport.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Which tools need approval, and how long to wait for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionPolicy {
    /// Tool names that must be approved before they run.
    pub approval_required: HashSet<String>,
    /// Wait budget for one decision.
    pub timeout: Duration,
}

impl PermissionPolicy {
    /// Build a policy from tool names and a timeout.
    pub fn new(approval_required: impl IntoIterator<Item = String>, timeout: Duration) -> Self {
        Self {
            approval_required: approval_required.into_iter().collect(),
            timeout,
        }
    }

    /// A policy that gates nothing.
    pub fn open() -> Self {
        Self::new([], DEFAULT_PERMISSION_TIMEOUT)
    }

    /// Whether `tool_name` must be approved.
    pub fn requires_approval(&self, tool_name: &str) -> bool {
        self.approval_required.contains(tool_name)
    }
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        Self::new(
            ["add_numbers".to_string(), "multiply_numbers".to_string()],
            DEFAULT_PERMISSION_TIMEOUT,
        )
    }
}

/// Shared context handed to every Turn.
#[derive(Clone)]
pub struct RelayContext {
    /// The conversation backend.
    pub backend: Arc<dyn ConversationBackend>,
    /// Approval policy.
    pub permissions: PermissionPolicy,
    /// Outbound buffer size for transports built on this context.
    pub channel_capacity: usize,
    active_turns: Arc<AtomicUsize>,
}

impl RelayContext {
    /// Create a context around `backend`.
    pub fn new(backend: Arc<dyn ConversationBackend>, permissions: PermissionPolicy) -> Self {
        Self {
            backend,
            permissions,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            active_turns: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Override the outbound buffer size.
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Turns currently in flight across all connections.
    pub fn active_turns(&self) -> usize {
        self.active_turns.load(Ordering::Relaxed)
    }

    /// Count a Turn as active until the returned guard drops.
    pub(crate) fn enter_turn(&self) -> ActiveTurnGuard {
        let _ = self.active_turns.fetch_add(1, Ordering::Relaxed);
        gauge!(TURNS_ACTIVE).increment(1.0);
        ActiveTurnGuard {
            counter: Arc::clone(&self.active_turns),
            started: Instant::now(),
            finished: false,
        }
    }
}

impl fmt::Debug for RelayContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayContext")
            .field("backend", &self.backend.name())
            .field("permissions", &self.permissions)
            .field("channel_capacity", &self.channel_capacity)
            .field("active_turns", &self.active_turns())
            .finish()
    }
}

/// Keeps a Turn counted as active and records its outcome.
///
/// The active count and `turns_active` gauge are released on drop, so a Turn
/// whose future is cancelled mid-flight is still accounted for. A guard
/// dropped without [`finish`](Self::finish) counts the Turn as errored.
pub(crate) struct ActiveTurnGuard {
    counter: Arc<AtomicUsize>,
    started: Instant,
    finished: bool,
}

impl ActiveTurnGuard {
    /// Time since the Turn was entered.
    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Record the Turn's terminal status and release it.
    pub(crate) fn finish(mut self, status: TurnStatus) {
        self.record(status);
    }

    fn record(&mut self, status: TurnStatus) {
        self.finished = true;
        counter!(TURNS_TOTAL, "status" => status.as_str()).increment(1);
        histogram!(TURN_DURATION_SECONDS).record(self.started.elapsed().as_secs_f64());
    }
}

impl Drop for ActiveTurnGuard {
    fn drop(&mut self) {
        if !self.finished {
            warn!("turn dropped before it finished");
            self.record(TurnStatus::Errored);
        }
        let _ = self.counter.fetch_sub(1, Ordering::Relaxed);
        gauge!(TURNS_ACTIVE).decrement(1.0);
    }
}
