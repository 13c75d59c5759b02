use std::time::Duration;

use nimbus::core::rate_limiter::RateLimiter;

#[test]
fn test_first_n_operations_pass() {
    let mut limiter = RateLimiter::new(30, Duration::from_secs(1));
    for i in 0..30 {
        assert!(!limiter.rate_limited(), "operation {} should pass", i);
    }
}

#[test]
fn test_operation_n_plus_one_within_window_is_limited() {
    let mut limiter = RateLimiter::new(10, Duration::from_secs(60));
    for _ in 0..10 {
        assert!(!limiter.rate_limited());
    }
    assert!(limiter.rate_limited());
    // Still limited while the burst stays inside the window
    assert!(limiter.rate_limited());
}

#[test]
fn test_operation_n_plus_one_after_window_passes() {
    let mut limiter = RateLimiter::new(5, Duration::from_millis(80));
    for _ in 0..5 {
        assert!(!limiter.rate_limited());
    }
    std::thread::sleep(Duration::from_millis(100));
    assert!(!limiter.rate_limited());
}

#[test]
fn test_steady_rate_below_limit_never_trips() {
    let mut limiter = RateLimiter::new(3, Duration::from_millis(30));
    for _ in 0..9 {
        assert!(!limiter.rate_limited());
        std::thread::sleep(Duration::from_millis(15));
    }
}

#[test]
fn test_time_since_oldest_starts_at_zero() {
    let limiter = RateLimiter::new(3, Duration::from_secs(1));
    assert_eq!(limiter.time_since_oldest(), Duration::ZERO);
}
