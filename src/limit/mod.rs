//! Per-credential admission control

mod bucket;
mod estimate;
mod keyed;

use std::time::Duration;

use crate::config::LimitsConfig;

pub use bucket::TokenBucket;
pub use estimate::estimate_tokens;
pub use keyed::KeyedLimiter;

/// Which limit rejected a request, with a refill-based retry hint
#[derive(Debug, thiserror::Error)]
pub enum LimitExceeded {
    #[error("request rate limit exceeded")]
    Requests { retry_after: Duration },

    #[error("token limit exceeded")]
    Tokens { retry_after: Duration },
}

impl LimitExceeded {
    pub fn retry_after(&self) -> Duration {
        match self {
            LimitExceeded::Requests { retry_after } => *retry_after,
            LimitExceeded::Tokens { retry_after } => *retry_after,
        }
    }
}

/// The two per-credential limiters the gateway enforces: request rate
/// (1 per request) and estimated model tokens.
pub struct RateLimits {
    requests: KeyedLimiter,
    tokens: KeyedLimiter,
}

impl RateLimits {
    pub fn from_config(limits: &LimitsConfig) -> Self {
        let ttl = Duration::from_secs(limits.idle_ttl_seconds);
        Self {
            requests: KeyedLimiter::new(limits.burst as f64, limits.requests_per_second, ttl),
            tokens: KeyedLimiter::new(
                limits.token_burst() as f64,
                limits.tokens_per_second(),
                ttl,
            ),
        }
    }

    /// Admit or reject a request for `key` costing `token_cost` estimated
    /// tokens. The request bucket is checked first; a request rejected
    /// there is not charged against the token bucket.
    pub fn check(&self, key: &str, token_cost: u64) -> Result<(), LimitExceeded> {
        self.requests
            .try_acquire(key, 1.0)
            .map_err(|retry_after| LimitExceeded::Requests { retry_after })?;

        self.tokens
            .try_acquire(key, token_cost as f64)
            .map_err(|retry_after| LimitExceeded::Tokens { retry_after })?;

        Ok(())
    }

    /// Evict credentials idle past the TTL from both limiters
    pub fn sweep_idle(&self) -> usize {
        self.requests.sweep_idle() + self.tokens.sweep_idle()
    }

    /// Number of credentials tracked by the request limiter
    pub fn tracked_credentials(&self) -> usize {
        self.requests.len()
    }
}
