//! Fixed-window counter for one domain.

use serde::Serialize;

/// Length of one rate-limit window.
pub const WINDOW_MS: i64 = 60_000;

/// Persisted limiter state for a single hostname.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainRateState {
    pub domain: String,
    pub max_per_minute: u32,
    /// Start of the current window, Unix epoch ms.
    pub window_start: i64,
    pub sent_in_window: u32,
}

impl DomainRateState {
    pub fn new(domain: String, max_per_minute: u32, now_ms: i64) -> Self {
        Self {
            domain,
            max_per_minute,
            window_start: now_ms,
            sent_in_window: 0,
        }
    }

    /// Whether the window that started at `window_start` is over.
    pub fn window_expired(&self, now_ms: i64) -> bool {
        now_ms - self.window_start >= WINDOW_MS
    }

    /// Requests still allowed in the current window.
    pub fn remaining(&self, now_ms: i64) -> u32 {
        if self.window_expired(now_ms) {
            self.max_per_minute
        } else {
            self.max_per_minute.saturating_sub(self.sent_in_window)
        }
    }

    /// Try to take one request slot, rolling the window over first if due.
    pub fn try_admit(&mut self, now_ms: i64) -> bool {
        if self.window_expired(now_ms) {
            self.window_start = now_ms;
            self.sent_in_window = 0;
        }
        if self.sent_in_window >= self.max_per_minute {
            return false;
        }
        self.sent_in_window += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_cap_then_denies() {
        let mut state = DomainRateState::new("example.com".into(), 2, 0);
        assert!(state.try_admit(0));
        assert!(state.try_admit(10));
        assert!(!state.try_admit(20));
        assert_eq!(state.sent_in_window, 2);
        assert_eq!(state.remaining(20), 0);
    }

    #[test]
    fn window_rolls_over_at_sixty_seconds() {
        let mut state = DomainRateState::new("example.com".into(), 1, 1_000);
        assert!(state.try_admit(1_000));
        assert!(!state.try_admit(1_000 + WINDOW_MS - 1));
        assert!(state.try_admit(1_000 + WINDOW_MS));
        assert_eq!(state.window_start, 1_000 + WINDOW_MS);
        assert_eq!(state.sent_in_window, 1);
    }

    #[test]
    fn zero_cap_never_admits() {
        let mut state = DomainRateState::new("example.com".into(), 0, 0);
        assert!(!state.try_admit(0));
        assert!(!state.try_admit(WINDOW_MS * 5));
    }
}
