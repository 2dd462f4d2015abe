//! Nexus: rate-limiting reverse proxy for OpenAI-compatible API traffic
//!
//! Features:
//! - Per-credential request and token-throughput limiting (token bucket)
//! - Client-to-upstream API key mapping
//! - Verbatim passthrough of upstream responses
//! - Per-credential usage metrics

pub mod auth;
pub mod config;
pub mod limit;
pub mod proxy;
pub mod stats;

pub use config::AppConfig;
pub use proxy::{build_router, run_server, ProxyState};
