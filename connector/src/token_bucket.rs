//! Token bucket rate limiter
//!
//! Integer arithmetic only. Refill is computed from the nanoseconds elapsed
//! since the last refill and the remainder of the division is carried to the
//! next call, so many short intervals add up to the same number of tokens as
//! one long interval.

use crate::peer::RateLimitConfig;
use std::time::{Duration, Instant};

/// Token bucket
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: u64,
    left: u64,
    refill_count: u64,
    refill_period_nanos: u128,
    /// Undistributed refill, in token-nanoseconds
    carry: u128,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket adding `refill_count` tokens every `refill_period`
    pub fn new(refill_period: Duration, refill_count: u64, capacity: Option<u64>) -> Self {
        Self::new_at(refill_period, refill_count, capacity, Instant::now())
    }

    /// Create a full bucket with an explicit start time
    pub fn new_at(
        refill_period: Duration,
        refill_count: u64,
        capacity: Option<u64>,
        now: Instant,
    ) -> Self {
        let capacity = capacity.unwrap_or(refill_count);
        Self {
            capacity,
            left: capacity,
            refill_count,
            refill_period_nanos: refill_period.as_nanos().max(1),
            carry: 0,
            last_refill: now,
        }
    }

    /// Create from peer rule settings
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            Duration::from_millis(config.refill_period_ms),
            config.refill_count,
            config.capacity,
        )
    }

    /// Take `count` tokens if available
    pub fn take(&mut self, count: u64) -> bool {
        self.take_at(count, Instant::now())
    }

    /// Take `count` tokens as of `now`
    pub fn take_at(&mut self, count: u64, now: Instant) -> bool {
        self.refill(now);
        if self.left < count {
            return false;
        }
        self.left -= count;
        true
    }

    /// Tokens currently available (without refilling)
    pub fn available(&self) -> u64 {
        self.left
    }

    /// Capacity
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_nanos();
        self.last_refill = now.max(self.last_refill);

        let accrued = elapsed
            .saturating_mul(self.refill_count as u128)
            .saturating_add(self.carry);
        let added = accrued / self.refill_period_nanos;
        self.carry = accrued % self.refill_period_nanos;

        let room = (self.capacity - self.left) as u128;
        if added >= room {
            self.left = self.capacity;
            self.carry = 0;
        } else {
            self.left += added as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(start: Instant) -> TokenBucket {
        TokenBucket::new_at(Duration::from_millis(1_000), 10, Some(10), start)
    }

    #[test]
    fn test_half_period_refills_half() {
        let start = Instant::now();
        let mut bucket = bucket(start);
        assert!(bucket.take_at(10, start));
        assert!(!bucket.take_at(1, start));

        let later = start + Duration::from_millis(500);
        assert!(bucket.take_at(5, later));
        assert!(!bucket.take_at(1, later));
    }

    #[test]
    fn test_fractional_refill_is_not_lost() {
        let start = Instant::now();
        let mut bucket = bucket(start);
        assert!(bucket.take_at(10, start));

        // 1 token per 100ms; ten 50ms steps must add five tokens
        let mut now = start;
        for _ in 0..10 {
            now += Duration::from_millis(50);
            bucket.take_at(0, now);
        }
        assert_eq!(bucket.available(), 5);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let start = Instant::now();
        let mut bucket = bucket(start);
        bucket.take_at(0, start + Duration::from_secs(3_600));
        assert_eq!(bucket.available(), 10);
    }

    #[test]
    fn test_failed_take_does_not_consume() {
        let start = Instant::now();
        let mut bucket = bucket(start);
        assert!(!bucket.take_at(11, start));
        assert_eq!(bucket.available(), 10);
    }

    #[test]
    fn test_capacity_defaults_to_refill_count() {
        let bucket = TokenBucket::from_config(&RateLimitConfig {
            refill_period_ms: 1_000,
            refill_count: 7,
            capacity: None,
        });
        assert_eq!(bucket.capacity(), 7);
        assert_eq!(bucket.available(), 7);
    }

    #[test]
    fn test_clock_going_backwards() {
        let start = Instant::now() + Duration::from_secs(10);
        let mut bucket = bucket(start);
        assert!(bucket.take_at(10, start));
        assert!(!bucket.take_at(1, start - Duration::from_secs(5)));
        assert!(bucket.take_at(1, start + Duration::from_millis(100)));
    }
}
