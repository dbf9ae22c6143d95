//! Time source for cooldown decisions.
//!
//! Cooldowns are computed from millisecond timestamps. Production code
//! reads the wall clock through [`SystemClock`]; tests drive time by hand
//! with [`ManualClock`] so boundary cases are exact.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

/// A source of "now" in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds.
    fn now_millis(&self) -> u64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        // Pre-epoch clocks are treated as the epoch.
        u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading `start_millis`.
    pub const fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    /// Jump to an absolute time.
    pub fn set_millis(&self, millis: u64) {
        self.now.store(millis, Ordering::Release);
    }

    /// Move forward by `millis`, saturating at `u64::MAX`.
    pub fn advance_millis(&self, millis: u64) {
        let _ = self
            .now
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |t| {
                Some(t.saturating_add(millis))
            });
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }
}
