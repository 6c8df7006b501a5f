//! In-process sliding-window rate limiter (C14 §4.13), the fallback path
//! when the Redis-backed limiter is unavailable — ported from the
//! windowing semantics in
//! `original_source/backend/app/utils/rate_limiter.py`: drop timestamps
//! older than the window, compute retry-after from the oldest surviving
//! timestamp, reject once `count >= max`.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub retry_after: Option<Duration>,
}

/// One client's sliding window of call timestamps.
#[derive(Debug, Default)]
pub struct SlidingWindow {
    timestamps: VecDeque<Instant>,
}

impl SlidingWindow {
    pub fn new() -> Self {
        Self { timestamps: VecDeque::new() }
    }

    /// Evaluate and, if allowed, record `now` as a new call. `max` is the
    /// call budget per `window`.
    pub fn check(&mut self, now: Instant, window: Duration, max: u32) -> RateLimitDecision {
        while let Some(front) = self.timestamps.front() {
            if now.duration_since(*front) > window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }

        if self.timestamps.len() as u32 >= max {
            let retry_after = self.timestamps.front().map(|oldest| {
                let elapsed = now.duration_since(*oldest);
                window.saturating_sub(elapsed)
            });
            return RateLimitDecision { allowed: false, remaining: 0, retry_after };
        }

        self.timestamps.push_back(now);
        let remaining = max.saturating_sub(self.timestamps.len() as u32);
        RateLimitDecision { allowed: true, remaining, retry_after: None }
    }

    pub fn remaining(&self, now: Instant, window: Duration, max: u32) -> u32 {
        let in_window = self.timestamps.iter().filter(|t| now.duration_since(**t) <= window).count() as u32;
        max.saturating_sub(in_window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_max_then_rejects() {
        let mut w = SlidingWindow::new();
        let now = Instant::now();
        let window = Duration::from_secs(60);
        for _ in 0..5 {
            assert!(w.check(now, window, 5).allowed);
        }
        let decision = w.check(now, window, 5);
        assert!(!decision.allowed);
        assert!(decision.retry_after.is_some());
    }

    #[test]
    fn expired_timestamps_free_up_budget() {
        let mut w = SlidingWindow::new();
        let window = Duration::from_secs(10);
        let t0 = Instant::now();
        assert!(w.check(t0, window, 1).allowed);
        assert!(!w.check(t0, window, 1).allowed);
        let t1 = t0 + Duration::from_secs(11);
        assert!(w.check(t1, window, 1).allowed);
    }
}
