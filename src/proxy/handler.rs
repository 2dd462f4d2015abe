//! Request/response handler for the gateway
//!
//! Each proxied request walks the same pipeline: validate the body,
//! authenticate the credential, charge the per-credential limiters, then
//! forward to the upstream and relay the response verbatim.

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request},
    response::{IntoResponse, Response},
};
use std::time::Instant;
use uuid::Uuid;

use super::error::GatewayError;
use super::server::ProxyState;
use crate::auth::{extract_bearer, mask_key};
use crate::limit::estimate_tokens;

/// Proxy request handler
pub struct ProxyHandler {
    state: ProxyState,
}

impl ProxyHandler {
    pub fn new(state: ProxyState) -> Self {
        Self { state }
    }

    /// Handle an incoming request
    pub async fn handle(&self, req: Request<Body>) -> Response {
        let start = Instant::now();
        let request_id = Uuid::new_v4();
        let method = req.method().clone();
        let uri = req.uri().clone();
        let path = uri.path().to_string();
        let query = uri.query().map(str::to_string);
        let headers = req.headers().clone();

        tracing::debug!(
            request_id = %request_id,
            method = %method,
            path = %path,
            query = ?query,
            "Processing request"
        );

        // Reject oversized bodies before buffering when the length is declared
        let max_body = self.state.config.validation.max_body_bytes;
        if let Some(length) = content_length(&headers) {
            if length > max_body {
                tracing::warn!(
                    request_id = %request_id,
                    content_length = length,
                    max_body,
                    "Rejecting oversized request body"
                );
                return GatewayError::BodyTooLarge.into_response();
            }
        }

        // Buffer the body; a length-limit failure here means an undeclared
        // (e.g. chunked) body crossed the maximum mid-read
        let body_bytes = match to_bytes(req.into_body(), max_body).await {
            Ok(bytes) => bytes,
            Err(e) if is_length_limit(&e) => {
                tracing::warn!(request_id = %request_id, max_body, "Rejecting oversized request body");
                return GatewayError::BodyTooLarge.into_response();
            }
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "Failed to read request body");
                return GatewayError::BodyRead(e.to_string()).into_response();
            }
        };

        // Validation runs before authentication so malformed requests are
        // rejected without touching key state
        let request_json = match validate_request(&method, &path, &headers, &body_bytes) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(request_id = %request_id, path = %path, error = %e, "Request validation failed");
                return e.into_response();
            }
        };

        // Authenticate and resolve the key forwarded to the upstream
        let client_key = match extract_bearer(&headers) {
            Some(key) => key,
            None => {
                tracing::warn!(request_id = %request_id, path = %path, "Missing API key in request");
                return GatewayError::MissingKey.into_response();
            }
        };
        let masked = mask_key(client_key);

        if !self.state.key_manager.validate_client_key(client_key) {
            tracing::warn!(request_id = %request_id, path = %path, client_key = %masked, "Invalid client API key");
            return GatewayError::InvalidKey.into_response();
        }
        let upstream_key = match self.state.key_manager.upstream_key(client_key) {
            Ok(key) => key.to_string(),
            Err(e) => {
                tracing::error!(request_id = %request_id, client_key = %masked, error = %e, "Failed to resolve upstream API key");
                return GatewayError::InvalidKey.into_response();
            }
        };

        let model = request_json
            .as_ref()
            .and_then(|j| j.get("model"))
            .and_then(|m| m.as_str())
            .unwrap_or("unknown")
            .to_string();
        let token_cost = estimate_tokens(&body_bytes);

        // Admission, then forwarding
        let outcome = match self.state.limits.check(client_key, token_cost) {
            Err(exceeded) => {
                tracing::warn!(
                    request_id = %request_id,
                    client_key = %masked,
                    tokens_needed = token_cost,
                    error = %exceeded,
                    "Request rejected by rate limiter"
                );
                Err(GatewayError::RateLimited(exceeded))
            }
            Ok(()) => {
                self.forward(
                    &method,
                    &path,
                    query.as_deref(),
                    &headers,
                    &upstream_key,
                    body_bytes.clone(),
                )
                .await
            }
        };

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(request_id = %request_id, client_key = %masked, error = %e, "Gateway error");
                e.into_response()
            }
        };

        let status = response.status();
        self.state
            .usage
            .record(client_key, &path, &model, token_cost, status.as_u16());

        tracing::info!(
            request_id = %request_id,
            client_key = %masked,
            method = %method,
            path = %path,
            status = status.as_u16(),
            tokens = token_cost,
            duration_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );

        response
    }

    /// Relay an admitted request to the upstream and pass the response back
    async fn forward(
        &self,
        method: &Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        upstream_key: &str,
        body: axum::body::Bytes,
    ) -> Result<Response, GatewayError> {
        let base = self.state.config.upstream.base_url();
        let upstream_url = match query {
            Some(q) => format!("{}{}?{}", base, path, q),
            None => format!("{}{}", base, path),
        };

        tracing::debug!(upstream_url = %upstream_url, "Building upstream request");

        let mut upstream_req = self.state.http_client.request(method.clone(), &upstream_url);

        // Copy headers, skipping hop-by-hop headers, those reqwest sets
        // itself, and the client's Authorization, which is replaced with the
        // resolved upstream key
        for (name, value) in headers.iter() {
            if name == header::HOST
                || name == header::CONTENT_LENGTH
                || name == header::AUTHORIZATION
                || is_hop_by_hop(name)
            {
                continue;
            }
            upstream_req = upstream_req.header(name, value);
        }
        upstream_req = upstream_req.header(header::AUTHORIZATION, format!("Bearer {}", upstream_key));
        upstream_req = upstream_req.body(body);

        let upstream_response = upstream_req.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::UpstreamUnavailable(e.to_string())
            } else {
                GatewayError::UpstreamUnreachable(e.to_string())
            }
        })?;

        let status = upstream_response.status();
        let response_headers = upstream_response.headers().clone();

        tracing::debug!(status = %status, "Received response from upstream");

        let response_body = upstream_response
            .bytes()
            .await
            .map_err(|e| GatewayError::UpstreamUnreachable(e.to_string()))?;

        if status.is_client_error() || status.is_server_error() {
            tracing::warn!(
                status = %status,
                body_preview = %String::from_utf8_lossy(&response_body[..response_body.len().min(200)]),
                "Upstream returned error response"
            );
        }

        // Pass the upstream response through verbatim, minus hop-by-hop
        // headers and Content-Length, which axum recomputes from the body
        let mut builder = Response::builder().status(status);
        for (name, value) in response_headers.iter() {
            if name == header::CONTENT_LENGTH || is_hop_by_hop(name) {
                continue;
            }
            builder = builder.header(name, value);
        }

        builder
            .body(Body::from(response_body))
            .map_err(|e| GatewayError::UpstreamUnreachable(e.to_string()))
    }
}

/// Declared body length, when the client sent one
fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// Whether a body-read failure was the length limit tripping rather than a
/// transport error
fn is_length_limit(err: &axum::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        if inner.is::<http_body_util::LengthLimitError>() {
            return true;
        }
        source = inner.source();
    }
    false
}

/// Hop-by-hop headers are connection-scoped and must not cross the proxy
fn is_hop_by_hop(name: &header::HeaderName) -> bool {
    name == header::CONNECTION
        || name == header::PROXY_AUTHENTICATE
        || name == header::PROXY_AUTHORIZATION
        || name == header::TE
        || name == header::TRAILER
        || name == header::TRANSFER_ENCODING
        || name == header::UPGRADE
        || name.as_str() == "keep-alive"
}

/// Validate an incoming request body before it costs anything.
///
/// Returns the parsed JSON body when there is one, so later stages don't
/// parse twice. GET/HEAD/OPTIONS requests skip body validation entirely.
fn validate_request(
    method: &Method,
    path: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Option<serde_json::Value>, GatewayError> {
    if method == Method::GET || method == Method::HEAD || method == Method::OPTIONS {
        return Ok(None);
    }

    if method == Method::POST || method == Method::PUT || method == Method::PATCH {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if content_type.is_empty() {
            return Err(GatewayError::Validation(
                "Content-Type header is required".to_string(),
            ));
        }
        if !content_type.starts_with("application/json") {
            return Err(GatewayError::Validation(
                "Content-Type must be application/json".to_string(),
            ));
        }
    }

    if body.is_empty() {
        return Ok(None);
    }

    let json: serde_json::Value = serde_json::from_slice(body).map_err(|_| {
        GatewayError::Validation("Invalid JSON in request body".to_string())
    })?;

    for field in required_fields(path) {
        if json.get(field).is_none() {
            return Err(GatewayError::Validation(format!(
                "Missing required field: {}",
                field
            )));
        }
    }

    Ok(Some(json))
}

/// Required body fields per endpoint
fn required_fields(path: &str) -> &'static [&'static str] {
    match path {
        "/v1/chat/completions" => &["model", "messages"],
        "/v1/completions" => &["model", "prompt"],
        "/v1/embeddings" => &["model", "input"],
        _ => &[],
    }
}
