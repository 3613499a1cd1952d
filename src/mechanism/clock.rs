//! Time sources for measuring mechanism latency.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source shared by the experimenter and its completion handles.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
///
/// Clones share the same offset, so a handle given to a mechanism observes
/// every `advance` made by the driver.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset_nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_nanos: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn advance(&self, delta: Duration) {
        self.offset_nanos
            .fetch_add(delta.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Move to `offset` past the origin. Never moves backwards.
    pub fn set_offset(&self, offset: Duration) {
        self.offset_nanos
            .fetch_max(offset.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn offset(&self) -> Duration {
        Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }

    pub fn now(&self) -> Instant {
        self.origin + self.offset()
    }

    /// Instant at `offset` past the origin
    pub fn at(&self, offset: Duration) -> Instant {
        self.origin + offset
    }

    pub fn since_origin(&self, instant: Instant) -> Duration {
        instant.saturating_duration_since(self.origin)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        ManualClock::now(self)
    }
}
