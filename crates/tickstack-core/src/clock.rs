//! Clock abstraction for determinism.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Abstraction over system time for deterministic behavior.
///
/// The scheduler paces frames through [`Clock::sleep`], so a test clock can
/// simulate whole frames without blocking.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;

    /// Suspends the calling thread for `duration`.
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Returns the non-negative distance between two instants.
///
/// Wall-clock adjustments can move `later` before `earlier`; such spans are
/// clamped to zero.
#[must_use]
pub fn elapsed_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> Duration {
    (later - earlier).to_std().unwrap_or_default()
}
