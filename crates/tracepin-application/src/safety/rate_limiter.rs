//! Token bucket sampler for probe firings
//!
//! Lazy refill: tokens accumulate between calls without a background task.
//! The bucket holds `max(rate, 1)` tokens and starts full, so a probe always
//! fires at least once before sampling kicks in.
//!
//! A rate of 0 never allows a firing; an infinite rate always does.

use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use tracing::warn;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    /// Tokens per second
    rate: f64,
    capacity: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(per_second: f64) -> Self {
        Self::new_at(per_second, Instant::now())
    }

    fn new_at(per_second: f64, now: Instant) -> Self {
        let rate = if per_second.is_nan() || per_second < 0.0 {
            0.0
        } else {
            per_second
        };
        let capacity = rate.max(1.0);
        Self {
            rate,
            capacity,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: now,
            }),
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    fn lock(&self) -> MutexGuard<'_, Bucket> {
        self.bucket.lock().unwrap_or_else(|e| {
            warn!("Rate limiter lock poisoned, recovering");
            e.into_inner()
        })
    }

    /// Take one token if available
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&self, now: Instant) -> bool {
        if self.rate == 0.0 {
            return false;
        }
        if self.rate.is_infinite() {
            return true;
        }

        let mut bucket = self.lock();
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.capacity);
            bucket.last_refill = now;
        }
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_zero_rate_never_fires() {
        let limiter = RateLimiter::new(0.0);
        assert!(!limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_infinite_rate_always_fires() {
        let limiter = RateLimiter::new(f64::INFINITY);
        assert!((0..10_000).all(|_| limiter.try_acquire()));
    }

    #[test]
    fn test_one_per_second() {
        let start = Instant::now();
        let limiter = RateLimiter::new_at(1.0, start);
        assert!(limiter.try_acquire_at(start));
        assert!(!limiter.try_acquire_at(start + Duration::from_millis(500)));
        assert!(limiter.try_acquire_at(start + Duration::from_millis(1000)));
        assert!(!limiter.try_acquire_at(start + Duration::from_millis(1100)));
    }

    #[test]
    fn test_burst_up_to_rate() {
        let start = Instant::now();
        let limiter = RateLimiter::new_at(5.0, start);
        let allowed = (0..10).filter(|_| limiter.try_acquire_at(start)).count();
        assert_eq!(allowed, 5);
    }

    #[test]
    fn test_fractional_rate_still_fires_once() {
        let start = Instant::now();
        let limiter = RateLimiter::new_at(0.5, start);
        assert!(limiter.try_acquire_at(start));
        assert!(!limiter.try_acquire_at(start + Duration::from_secs(1)));
        assert!(limiter.try_acquire_at(start + Duration::from_secs(2)));
    }

    #[test]
    fn test_negative_rate_treated_as_zero() {
        let limiter = RateLimiter::new(-3.0);
        assert_eq!(limiter.rate(), 0.0);
        assert!(!limiter.try_acquire());
    }
}
