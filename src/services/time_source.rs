//! Time source abstraction for testable time operations
//!
//! Production code uses [`RealTimeSource`]; tests drive the clock by hand
//! with [`TestTimeSource`] so debounce behaviour can be checked without
//! sleeping.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Source of monotonic time
pub trait TimeSource: Send + Sync {
    /// Current instant
    fn now(&self) -> Instant;

    /// Time elapsed since `earlier` (saturating at zero)
    fn elapsed_since(&self, earlier: Instant) -> Duration {
        self.now().saturating_duration_since(earlier)
    }
}

/// Shared, cloneable time source handle
pub type SharedTimeSource = Arc<dyn TimeSource>;

/// Wall-clock time source backed by [`Instant::now`]
#[derive(Debug, Default, Clone, Copy)]
pub struct RealTimeSource;

impl RealTimeSource {
    pub fn shared() -> SharedTimeSource {
        Arc::new(RealTimeSource)
    }
}

impl TimeSource for RealTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests
#[derive(Debug)]
pub struct TestTimeSource {
    base: Instant,
    offset: Mutex<Duration>,
}

impl TestTimeSource {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn shared() -> Arc<TestTimeSource> {
        Arc::new(Self::new())
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for TestTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for TestTimeSource {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.base + offset
    }
}
