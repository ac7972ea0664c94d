//! Time source abstraction for supporting both real and simulated time.
//!
//! Scheduling components never call `Utc::now()` directly; they go through
//! the global time source so tests can pin the clock. Engine functions take
//! the instant as a parameter and stay pure.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Global time source instance, defaults to RealTimeSource
static TIME_SOURCE: OnceCell<Arc<dyn TimeSource>> = OnceCell::new();

/// Trait for abstracting time operations
pub trait TimeSource: Send + Sync {
    /// Get the current instant
    fn now_utc(&self) -> DateTime<Utc>;

    /// Check if this is a simulated time source
    fn is_simulated(&self) -> bool {
        false
    }
}

/// Real-time implementation that uses the system clock
pub struct RealTimeSource;

impl TimeSource for RealTimeSource {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Simulated time source pinned to a fixed instant, for tests.
pub struct FixedTimeSource {
    instant: DateTime<Utc>,
}

impl FixedTimeSource {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self { instant }
    }
}

impl TimeSource for FixedTimeSource {
    fn now_utc(&self) -> DateTime<Utc> {
        self.instant
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

/// Initialize the global time source (call once at startup)
pub fn init_time_source(source: Arc<dyn TimeSource>) {
    TIME_SOURCE.set(source).ok();
}

/// Check if the time source has been initialized
pub fn is_initialized() -> bool {
    TIME_SOURCE.get().is_some()
}

/// Get the current instant from the global time source
pub fn now_utc() -> DateTime<Utc> {
    TIME_SOURCE
        .get_or_init(|| Arc::new(RealTimeSource))
        .now_utc()
}

/// Check if we're running against simulated time
pub fn is_simulated() -> bool {
    TIME_SOURCE
        .get_or_init(|| Arc::new(RealTimeSource))
        .is_simulated()
}
