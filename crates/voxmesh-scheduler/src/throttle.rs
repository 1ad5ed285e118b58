//! Rate limiting for queue reprioritization as the focus point moves.

use std::time::{Duration, Instant};

use voxmesh_config::FocusConfig;

/// Coalesces reprioritization requests so the queue is rebuilt at most once
/// per `interval`.
///
/// The host calls [`request`](Self::request) whenever the focus moves and
/// [`poll`](Self::poll) from its event loop; when `poll` returns `true` it
/// calls `MeshingScheduler::reprioritize_dirty`. The first request fires on
/// the next poll; requests inside the interval collapse into one trailing
/// fire once the interval has passed.
#[derive(Clone, Debug)]
pub struct ReprioritizeThrottle {
    interval: Duration,
    last_fired: Option<Instant>,
    pending: bool,
}

impl ReprioritizeThrottle {
    /// Creates a throttle allowing one fire per `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: None,
            pending: false,
        }
    }

    /// Creates a throttle from the focus config section.
    pub fn from_config(config: &FocusConfig) -> Self {
        Self::new(Duration::from_millis(config.reprioritize_interval_ms))
    }

    /// Minimum time between fires.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Records that the priority basis changed.
    pub fn request(&mut self) {
        self.pending = true;
    }

    /// Whether a request is waiting to fire.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Returns `true` if a pending request should fire at `now`.
    pub fn poll(&mut self, now: Instant) -> bool {
        if !self.pending {
            return false;
        }
        let ready = self
            .last_fired
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if ready {
            self.pending = false;
            self.last_fired = Some(now);
        }
        ready
    }

    /// Drops any pending request.
    pub fn cancel(&mut self) {
        self.pending = false;
    }
}
