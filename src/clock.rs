//! Time source used by every lease, queue, and limiter decision.
//!
//! Production code reads wall time through [`SystemClock`]; tests drive
//! [`ManualClock`] forward explicitly so TTLs and windows can be crossed
//! without sleeping.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;

use crate::schedule::{local_parts, resolve_timezone, LocalParts};

/// Shared, thread-safe clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// Source of the current instant, in Unix epoch milliseconds.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time in Unix epoch milliseconds.
    fn now_ms(&self) -> i64;

    /// Break an instant into calendar fields for a named IANA timezone.
    ///
    /// The offset is computed for that exact instant, so DST transitions are
    /// reflected. Unknown zone names fall back to UTC.
    fn to_local_parts(&self, timestamp_ms: i64, tz_name: &str) -> LocalParts {
        local_parts(timestamp_ms, resolve_timezone(tz_name))
    }
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance_ms(secs * 1000);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Convenience constructor for the default wall clock.
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_when_advanced() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance_secs(2);
        assert_eq!(clock.now_ms(), 3_000);
        clock.set(10);
        assert_eq!(clock.now_ms(), 10);
    }

    #[test]
    fn local_parts_default_uses_named_zone() {
        let clock = ManualClock::new(0);
        // 2024-01-01T00:00:00Z is 2023-12-31 19:00 in New York (UTC-5).
        let parts = clock.to_local_parts(1_704_067_200_000, "America/New_York");
        assert_eq!((parts.year, parts.month, parts.day), (2023, 12, 31));
        assert_eq!(parts.hour, 19);
        assert_eq!(parts.utc_offset_ms, -5 * 3_600_000);
    }
}
