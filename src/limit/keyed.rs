//! Per-credential bucket map with idle eviction

use dashmap::DashMap;
use std::time::{Duration, Instant};

use super::bucket::TokenBucket;
use crate::auth::mask_key;

struct Entry {
    bucket: TokenBucket,
    last_access: Instant,
}

/// A family of token buckets partitioned by credential.
///
/// Each credential gets an independent bucket created on first use, so one
/// caller's traffic never affects another's admission decisions. Entries
/// untouched for `ttl` are removed by [`KeyedLimiter::sweep_idle`], which the
/// server runs on an interval.
pub struct KeyedLimiter {
    entries: DashMap<String, Entry>,
    capacity: f64,
    rate: f64,
    ttl: Duration,
}

impl KeyedLimiter {
    pub fn new(capacity: f64, rate: f64, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            rate,
            ttl,
        }
    }

    /// Try to admit a request costing `cost` for `key`
    pub fn try_acquire(&self, key: &str, cost: f64) -> Result<f64, Duration> {
        self.try_acquire_at(key, cost, Instant::now())
    }

    fn try_acquire_at(&self, key: &str, cost: f64, now: Instant) -> Result<f64, Duration> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry {
                bucket: TokenBucket::with_instant(self.capacity, self.rate, now),
                last_access: now,
            });
        entry.last_access = now;
        entry.bucket.try_acquire(cost, now)
    }

    /// Remaining balance for a key without consuming anything.
    /// Untracked keys report their would-be starting capacity.
    pub fn remaining(&self, key: &str) -> f64 {
        match self.entries.get_mut(key) {
            Some(mut entry) => entry.bucket.available(Instant::now()),
            None => self.capacity,
        }
    }

    /// Whether a key currently has a tracked bucket
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of tracked credentials
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop state for a key; it restarts with a full bucket on next use
    pub fn reset(&self, key: &str) {
        if self.entries.remove(key).is_some() {
            tracing::info!(key = %mask_key(key), "Reset rate limit state");
        }
    }

    /// Remove entries idle for longer than the TTL, returning how many
    pub fn sweep_idle(&self) -> usize {
        self.sweep_idle_at(Instant::now())
    }

    fn sweep_idle_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.duration_since(entry.last_access) <= self.ttl);
        before - self.entries.len()
    }
}
