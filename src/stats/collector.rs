//! Usage counters aggregated per credential
//!
//! Counts requests and estimated tokens per credential, broken down by
//! endpoint and model. Snapshots are deep copies, safe to serialize while
//! traffic continues.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;

use crate::auth::mask_key;

/// Aggregated usage for one credential
#[derive(Debug, Clone, Default, Serialize)]
pub struct KeyUsage {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub tokens_consumed: u64,
    pub per_endpoint: HashMap<String, RouteUsage>,
    pub per_model: HashMap<String, RouteUsage>,
}

/// Request and token counts for one endpoint or model
#[derive(Debug, Clone, Default, Serialize)]
pub struct RouteUsage {
    pub requests: u64,
    pub tokens: u64,
}

/// Exported snapshot of all credentials
#[derive(Debug, Clone, Serialize)]
pub struct UsageSnapshot {
    pub generated_at: DateTime<Utc>,
    pub keys: HashMap<String, KeyUsage>,
}

#[derive(Default)]
pub struct UsageCollector {
    metrics: DashMap<String, KeyUsage>,
}

impl UsageCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed request for a credential
    pub fn record(&self, key: &str, endpoint: &str, model: &str, tokens: u64, status: u16) {
        let mut usage = self.metrics.entry(key.to_string()).or_default();

        usage.total_requests += 1;
        if (200..300).contains(&status) {
            usage.successful_requests += 1;
        } else {
            usage.failed_requests += 1;
        }
        usage.tokens_consumed += tokens;

        let endpoint_usage = usage.per_endpoint.entry(endpoint.to_string()).or_default();
        endpoint_usage.requests += 1;
        endpoint_usage.tokens += tokens;

        let model_usage = usage.per_model.entry(model.to_string()).or_default();
        model_usage.requests += 1;
        model_usage.tokens += tokens;
    }

    /// Snapshot all counters, optionally masking the credentials
    pub fn snapshot(&self, mask_keys: bool) -> UsageSnapshot {
        let keys = self
            .metrics
            .iter()
            .map(|entry| {
                let key = if mask_keys {
                    mask_key(entry.key())
                } else {
                    entry.key().clone()
                };
                (key, entry.value().clone())
            })
            .collect();

        UsageSnapshot {
            generated_at: Utc::now(),
            keys,
        }
    }

    /// Usage for a single credential, if it has been seen
    pub fn usage_for(&self, key: &str) -> Option<KeyUsage> {
        self.metrics.get(key).map(|entry| entry.value().clone())
    }

    /// Number of credentials with recorded usage
    pub fn key_count(&self) -> usize {
        self.metrics.len()
    }

    /// Drop all counters
    pub fn reset(&self) {
        self.metrics.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts_success_and_failure() {
        let collector = UsageCollector::new();

        collector.record("sk-a", "/v1/chat/completions", "gpt-3.5-turbo", 10, 200);
        collector.record("sk-a", "/v1/chat/completions", "gpt-3.5-turbo", 20, 429);

        let usage = collector.usage_for("sk-a").unwrap();
        assert_eq!(usage.total_requests, 2);
        assert_eq!(usage.successful_requests, 1);
        assert_eq!(usage.failed_requests, 1);
        assert_eq!(usage.tokens_consumed, 30);
    }

    #[test]
    fn test_breakdowns_accumulate() {
        let collector = UsageCollector::new();

        collector.record("sk-a", "/v1/chat/completions", "gpt-4", 10, 200);
        collector.record("sk-a", "/v1/completions", "gpt-4", 5, 200);

        let usage = collector.usage_for("sk-a").unwrap();
        assert_eq!(usage.per_endpoint.len(), 2);
        assert_eq!(usage.per_endpoint["/v1/completions"].requests, 1);
        assert_eq!(usage.per_model["gpt-4"].requests, 2);
        assert_eq!(usage.per_model["gpt-4"].tokens, 15);
    }

    #[test]
    fn test_keys_tracked_independently() {
        let collector = UsageCollector::new();

        collector.record("sk-a", "/v1/chat/completions", "gpt-4", 10, 200);
        collector.record("sk-b", "/v1/chat/completions", "gpt-4", 99, 200);

        assert_eq!(collector.key_count(), 2);
        assert_eq!(collector.usage_for("sk-a").unwrap().tokens_consumed, 10);
        assert_eq!(collector.usage_for("sk-b").unwrap().tokens_consumed, 99);
    }

    #[test]
    fn test_snapshot_masks_keys() {
        let collector = UsageCollector::new();
        collector.record("sk-demo-key-12345", "/v1/chat/completions", "gpt-4", 10, 200);

        let masked = collector.snapshot(true);
        assert!(masked.keys.contains_key("sk-demo-ke********"));

        let unmasked = collector.snapshot(false);
        assert!(unmasked.keys.contains_key("sk-demo-key-12345"));
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let collector = UsageCollector::new();
        collector.record("sk-a", "/v1/chat/completions", "gpt-4", 10, 200);

        let snapshot = collector.snapshot(false);
        collector.record("sk-a", "/v1/chat/completions", "gpt-4", 10, 200);

        assert_eq!(snapshot.keys["sk-a"].total_requests, 1);
        assert_eq!(collector.usage_for("sk-a").unwrap().total_requests, 2);
    }

    #[test]
    fn test_reset_clears_everything() {
        let collector = UsageCollector::new();
        collector.record("sk-a", "/v1/chat/completions", "gpt-4", 10, 200);

        collector.reset();
        assert_eq!(collector.key_count(), 0);
        assert!(collector.usage_for("sk-a").is_none());
    }
}
