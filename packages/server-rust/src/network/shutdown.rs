//! Graceful shutdown controller with in-flight connection tracking.
//!
//! Server state lives in an `ArcSwap` so readers never lock. In-flight
//! connections are counted by RAII guards; the last guard to drop while the
//! server drains wakes whoever waits in [`ShutdownController::wait_for_drain`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::Notify;

/// Server lifecycle state.
///
/// State machine: Starting -> Ready -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Bound or binding, not yet accepting.
    Starting,
    /// Accepting connections.
    Ready,
    /// No longer accepting; waiting for in-flight connections.
    Draining,
    /// Every in-flight connection finished.
    Stopped,
}

#[derive(Debug, Default)]
struct InFlight {
    count: AtomicU64,
    idle: Notify,
}

/// Coordinates shutdown between the accept loop and connection tasks.
#[derive(Debug)]
pub struct ShutdownController {
    in_flight: Arc<InFlight>,
    state: ArcSwap<ServerState>,
}

impl ShutdownController {
    /// Creates a controller in the `Starting` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            in_flight: Arc::default(),
            state: ArcSwap::from_pointee(ServerState::Starting),
        }
    }

    pub fn set_ready(&self) {
        self.state.store(Arc::new(ServerState::Ready));
    }

    #[must_use]
    pub fn state(&self) -> ServerState {
        **self.state.load()
    }

    /// Moves to `Draining`. Connections already accepted run to completion.
    pub fn trigger_shutdown(&self) {
        self.state.store(Arc::new(ServerState::Draining));
    }

    /// Counts one in-flight connection until the guard drops, even on panic.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.count.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.count.load(Ordering::Acquire)
    }

    /// Waits up to `timeout` for every in-flight connection to finish.
    ///
    /// Returns `true` and moves to `Stopped` on success; returns `false` and
    /// stays `Draining` on timeout.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let drained = tokio::time::timeout(timeout, async {
            loop {
                let idle = self.in_flight.idle.notified();
                tokio::pin!(idle);
                idle.as_mut().enable();
                if self.in_flight_count() == 0 {
                    return;
                }
                idle.await;
            }
        })
        .await
        .is_ok();

        if drained {
            self.state.store(Arc::new(ServerState::Stopped));
        }
        drained
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight count on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.in_flight.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.in_flight.idle.notify_waiters();
        }
    }
}
