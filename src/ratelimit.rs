//! Per-sender flood control and the daily inbound counter.
//!
//! Both live in process memory only and start empty on every restart.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::NaiveDate;

/// Messages allowed per sender inside one window.
pub const LIMIT: u32 = 15;
pub const WINDOW: Duration = Duration::from_secs(60);

/// Sent once to a sender who crosses the limit.
pub const WARNING: &str = "⚠️ You are sending too many messages. Please wait a minute.";

/// Expired windows are swept once the map grows past this.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    /// First message over the limit: warn, then drop it.
    Warn,
    Drop,
}

struct Window {
    count: u32,
    expiry: Instant,
}

pub struct RateLimiter {
    windows: Mutex<HashMap<i64, Window>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self { windows: Mutex::new(HashMap::new()) }
    }

    pub fn check(&self, sender_id: i64) -> Verdict {
        self.check_at(sender_id, Instant::now())
    }

    /// Count one message from `sender_id` arriving at `now`.
    pub fn check_at(&self, sender_id: i64, now: Instant) -> Verdict {
        let mut windows = self.windows.lock().expect("rate limiter lock poisoned");

        if windows.len() > PRUNE_THRESHOLD {
            windows.retain(|_, w| now <= w.expiry);
        }

        let window = windows
            .entry(sender_id)
            .or_insert(Window { count: 0, expiry: now + WINDOW });

        if now > window.expiry {
            *window = Window { count: 0, expiry: now + WINDOW };
        }
        window.count += 1;

        match window.count {
            c if c <= LIMIT => Verdict::Allow,
            c if c == LIMIT + 1 => Verdict::Warn,
            _ => Verdict::Drop,
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.windows.lock().unwrap().len()
    }
}

/// Inbound updates seen on the current local day.
pub struct DailyCounter {
    state: Mutex<(NaiveDate, u64)>,
}

impl DailyCounter {
    pub fn new(today: NaiveDate) -> Self {
        Self { state: Mutex::new((today, 0)) }
    }

    /// Count one update; returns the running total for `today`.
    pub fn record(&self, today: NaiveDate) -> u64 {
        let mut state = self.state.lock().expect("daily counter lock poisoned");
        if state.0 != today {
            *state = (today, 0);
        }
        state.1 += 1;
        state.1
    }

    pub fn get(&self, today: NaiveDate) -> u64 {
        let state = self.state.lock().expect("daily counter lock poisoned");
        if state.0 == today { state.1 } else { 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sixteenth_message_warns_once() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        for i in 0..LIMIT {
            assert_eq!(limiter.check_at(1, start + Duration::from_secs(i as u64)), Verdict::Allow);
        }
        assert_eq!(limiter.check_at(1, start + Duration::from_secs(20)), Verdict::Warn);
        assert_eq!(limiter.check_at(1, start + Duration::from_secs(21)), Verdict::Drop);
        assert_eq!(limiter.check_at(1, start + Duration::from_secs(59)), Verdict::Drop);
    }

    #[test]
    fn test_window_rolls_over() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        for _ in 0..LIMIT + 3 {
            limiter.check_at(1, start);
        }
        // Still inside the window at exactly the expiry
        assert_eq!(limiter.check_at(1, start + WINDOW), Verdict::Drop);
        assert_eq!(limiter.check_at(1, start + WINDOW + Duration::from_millis(1)), Verdict::Allow);
    }

    #[test]
    fn test_senders_are_independent() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        for _ in 0..=LIMIT {
            limiter.check_at(1, now);
        }
        assert_eq!(limiter.check_at(1, now), Verdict::Drop);
        assert_eq!(limiter.check_at(2, now), Verdict::Allow);
    }

    #[test]
    fn test_prunes_expired_windows() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        for id in 0..=PRUNE_THRESHOLD as i64 {
            limiter.check_at(id, start);
        }
        assert_eq!(limiter.tracked(), PRUNE_THRESHOLD + 1);

        limiter.check_at(-1, start + WINDOW * 2);
        assert_eq!(limiter.tracked(), 1);
    }

    #[test]
    fn test_daily_counter_resets_on_new_day() {
        let monday = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        let counter = DailyCounter::new(monday);

        assert_eq!(counter.record(monday), 1);
        assert_eq!(counter.record(monday), 2);
        assert_eq!(counter.get(monday), 2);
        assert_eq!(counter.get(tuesday), 0);
        assert_eq!(counter.record(tuesday), 1);
        assert_eq!(counter.get(monday), 0);
    }
}
