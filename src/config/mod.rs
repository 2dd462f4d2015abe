mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub use loader::load_config;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Client key -> upstream key mapping. Empty means any non-empty
    /// bearer key is accepted and passed through unchanged.
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Proxy server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Upstream API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Full upstream URL (e.g., "https://api.openai.com" or "http://localhost:9999")
    pub url: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_timeout() -> u64 {
    300
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl UpstreamConfig {
    /// Returns the base URL with trailing slash stripped
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Returns true if the URL uses HTTPS
    pub fn is_tls(&self) -> bool {
        self.url.to_lowercase().starts_with("https://")
    }
}

/// Rate-limit thresholds, all enforced per credential
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// Request-bucket refill rate
    #[serde(default = "default_rps")]
    pub requests_per_second: f64,
    /// Request-bucket capacity
    #[serde(default = "default_burst")]
    pub burst: u32,
    /// Token-bucket refill, configured per minute
    #[serde(default = "default_tpm")]
    pub model_tokens_per_minute: u64,
    /// Seconds of inactivity before a credential's buckets are evicted
    #[serde(default = "default_idle_ttl")]
    pub idle_ttl_seconds: u64,
}

fn default_rps() -> f64 {
    10.0
}

fn default_burst() -> u32 {
    20
}

fn default_tpm() -> u64 {
    60_000
}

fn default_idle_ttl() -> u64 {
    3600
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rps(),
            burst: default_burst(),
            model_tokens_per_minute: default_tpm(),
            idle_ttl_seconds: default_idle_ttl(),
        }
    }
}

impl LimitsConfig {
    /// Token-bucket refill rate in tokens per second
    pub fn tokens_per_second(&self) -> f64 {
        self.model_tokens_per_minute as f64 / 60.0
    }

    /// Token-bucket capacity: roughly ten seconds worth of the minute
    /// limit, never below 100 so small configs still admit one request.
    pub fn token_burst(&self) -> u64 {
        (self.model_tokens_per_minute / 6).max(100)
    }
}

/// Request validation configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ValidationConfig {
    /// Maximum accepted request body size in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Usage metrics endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    /// Require a valid client key to read /metrics
    #[serde(default)]
    pub auth_required: bool,
    /// Mask credentials in the exported snapshot
    #[serde(default = "default_mask_keys")]
    pub mask_keys: bool,
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_mask_keys() -> bool {
    true
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            auth_required: false,
            mask_keys: default_mask_keys(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde defaults can't express
    pub fn validate(&self) -> Result<(), ConfigError> {
        let parsed = url::Url::parse(&self.upstream.url)
            .map_err(|e| ConfigError::Validation(format!("invalid upstream url: {}", e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "upstream url must be http or https, got {}",
                parsed.scheme()
            )));
        }
        if !(self.limits.requests_per_second > 0.0) {
            return Err(ConfigError::Validation(
                "limits.requests_per_second must be positive".to_string(),
            ));
        }
        if self.limits.burst == 0 {
            return Err(ConfigError::Validation(
                "limits.burst must be at least 1".to_string(),
            ));
        }
        if self.limits.model_tokens_per_minute == 0 {
            return Err(ConfigError::Validation(
                "limits.model_tokens_per_minute must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}
