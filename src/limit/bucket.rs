//! Refill-based token bucket

use std::time::{Duration, Instant};

/// Classic token bucket: tokens accrue at `rate` per second up to
/// `capacity`, and each admission consumes its cost. Buckets start full so
/// a fresh credential gets its configured burst immediately.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: f64, rate: f64) -> Self {
        Self::with_instant(capacity, rate, Instant::now())
    }

    /// Create with an explicit starting instant, for deterministic tests
    pub const fn with_instant(capacity: f64, rate: f64, now: Instant) -> Self {
        Self {
            capacity,
            rate,
            tokens: capacity,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Try to consume `cost` tokens. On success returns the remaining
    /// balance; on failure returns how long until the deficit refills.
    pub fn try_acquire(&mut self, cost: f64, now: Instant) -> Result<f64, Duration> {
        self.refill(now);

        if self.tokens >= cost {
            self.tokens -= cost;
            return Ok(self.tokens);
        }

        let deficit = cost - self.tokens;
        if self.rate > 0.0 {
            Err(Duration::from_secs_f64(deficit / self.rate))
        } else {
            Err(Duration::MAX)
        }
    }

    /// Current balance after refilling at `now`
    pub fn available(&mut self, now: Instant) -> f64 {
        self.refill(now);
        self.tokens
    }

    pub const fn capacity(&self) -> f64 {
        self.capacity
    }
}
