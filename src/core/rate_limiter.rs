//! Per-connection rate limiting.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Trailing sliding-window limiter: no more than `max_operations` operations
/// in any period of `window`.
///
/// `RateLimiter::new(20, Duration::from_secs(1))` means at most 20
/// operations in any one-second period. Each limiter is owned by exactly one
/// connection and only ever touched from that connection's serial message
/// path, so it needs no locking.
pub struct RateLimiter {
    max_operations: usize,
    window: Duration,
    history: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(max_operations: usize, window: Duration) -> Self {
        Self {
            max_operations,
            window,
            history: VecDeque::with_capacity(max_operations + 1),
        }
    }

    /// Record that the next operation is about to run and report whether it
    /// should be rejected. Only the times of the last `max_operations`
    /// operations are retained: once the history overflows, the evicted
    /// oldest entry still being inside the window means the limit was
    /// exceeded.
    pub fn rate_limited(&mut self) -> bool {
        let now = Instant::now();
        self.history.push_back(now);
        if self.history.len() > self.max_operations {
            if let Some(oldest) = self.history.pop_front() {
                return now.duration_since(oldest) < self.window;
            }
        }
        false
    }

    /// Time since the oldest retained operation, for log context when a
    /// client gets disconnected for flooding.
    pub fn time_since_oldest(&self) -> Duration {
        self.history.front().map(|t| t.elapsed()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit() {
        let mut limiter = RateLimiter::new(5, Duration::from_secs(60));
        for _ in 0..5 {
            assert!(!limiter.rate_limited());
        }
        assert!(limiter.rate_limited());
    }

    #[test]
    fn recovers_after_the_window() {
        let mut limiter = RateLimiter::new(3, Duration::from_millis(50));
        for _ in 0..3 {
            assert!(!limiter.rate_limited());
        }
        std::thread::sleep(Duration::from_millis(60));
        assert!(!limiter.rate_limited());
    }
}
