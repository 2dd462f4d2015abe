//! Main gateway server

use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::error::GatewayError;
use super::handler::ProxyHandler;
use crate::auth::{extract_bearer, KeyManager};
use crate::config::AppConfig;
use crate::limit::RateLimits;
use crate::stats::UsageCollector;

/// How often idle credentials are evicted from the limiters
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Shared state for the gateway
#[derive(Clone)]
pub struct ProxyState {
    pub config: Arc<AppConfig>,
    pub http_client: reqwest::Client,
    pub key_manager: Arc<KeyManager>,
    pub limits: Arc<RateLimits>,
    pub usage: Arc<UsageCollector>,
}

impl ProxyState {
    pub fn new(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.upstream.timeout_seconds))
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self {
            key_manager: Arc::new(KeyManager::new(config.api_keys.clone())),
            limits: Arc::new(RateLimits::from_config(&config.limits)),
            usage: Arc::new(UsageCollector::new()),
            config: Arc::new(config),
            http_client,
        })
    }
}

/// Build the gateway router
pub fn build_router(state: ProxyState) -> Router {
    let mut router = Router::new().route("/health", get(health_handler));

    if state.config.metrics.enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .fallback(proxy_handler)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the gateway server until shutdown
pub async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = ProxyState::new(config)?;

    // Background eviction of idle credentials
    let limits = state.limits.clone();
    let sweeper = tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        interval.tick().await; // first tick is immediate
        loop {
            interval.tick().await;
            let removed = limits.sweep_idle();
            if removed > 0 {
                tracing::debug!(removed, "Evicted idle rate limiter entries");
            }
        }
    });

    let addr: SocketAddr = format!(
        "{}:{}",
        state.config.server.host, state.config.server.port
    )
    .parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Nexus gateway listening on {}", addr);
    tracing::info!("Forwarding to {}", state.config.upstream.base_url());

    let app = build_router(state);
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sweeper.abort();
    tracing::info!("Graceful shutdown completed");

    Ok(result?)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}

/// Liveness probe, independent of limiter and upstream state
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Per-credential usage snapshot
async fn metrics_handler(State(state): State<ProxyState>, headers: HeaderMap) -> Response {
    if state.config.metrics.auth_required {
        let key = match extract_bearer(&headers) {
            Some(key) => key,
            None => return GatewayError::MissingKey.into_response(),
        };
        if !state.key_manager.validate_client_key(key) {
            return GatewayError::InvalidKey.into_response();
        }
    }

    let snapshot = state.usage.snapshot(state.config.metrics.mask_keys);
    Json(snapshot).into_response()
}

/// Catch-all: everything that isn't a gateway endpoint is proxied
async fn proxy_handler(State(state): State<ProxyState>, req: axum::extract::Request) -> Response {
    ProxyHandler::new(state).handle(req).await
}
