//! Gateway-origin errors and their wire representation
//!
//! Every error the gateway itself produces is rendered as an OpenAI-style
//! error envelope: `{"error": {"message", "type", "code"}}`. Upstream
//! responses, including upstream errors, are passed through untouched and
//! never reach this type.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::limit::LimitExceeded;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Missing API key")]
    MissingKey,

    #[error("Invalid API key")]
    InvalidKey,

    #[error("{0}")]
    Validation(String),

    #[error("Request body too large")]
    BodyTooLarge,

    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    #[error(transparent)]
    RateLimited(#[from] LimitExceeded),

    #[error("Failed to connect to upstream: {0}")]
    UpstreamUnreachable(String),

    #[error("Upstream did not respond in time: {0}")]
    UpstreamUnavailable(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MissingKey | GatewayError::InvalidKey => StatusCode::UNAUTHORIZED,
            GatewayError::Validation(_) | GatewayError::BodyRead(_) => StatusCode::BAD_REQUEST,
            GatewayError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            GatewayError::MissingKey
            | GatewayError::InvalidKey
            | GatewayError::Validation(_)
            | GatewayError::BodyRead(_)
            | GatewayError::BodyTooLarge => "invalid_request_error",
            GatewayError::RateLimited(_) => "rate_limit_error",
            GatewayError::UpstreamUnreachable(_) | GatewayError::UpstreamUnavailable(_) => {
                "upstream_error"
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            GatewayError::MissingKey => "missing_api_key",
            GatewayError::InvalidKey => "invalid_api_key",
            GatewayError::Validation(_) => "invalid_request",
            GatewayError::BodyRead(_) => "invalid_body",
            GatewayError::BodyTooLarge => "body_too_large",
            GatewayError::RateLimited(LimitExceeded::Requests { .. }) => "rate_limit_exceeded",
            GatewayError::RateLimited(LimitExceeded::Tokens { .. }) => "token_limit_exceeded",
            GatewayError::UpstreamUnreachable(_) => "upstream_unreachable",
            GatewayError::UpstreamUnavailable(_) => "upstream_unavailable",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    #[serde(rename = "type")]
    error_type: &'static str,
    code: &'static str,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let envelope = ErrorEnvelope {
            error: ErrorBody {
                message: self.to_string(),
                error_type: self.error_type(),
                code: self.code(),
            },
        };

        let mut response = (self.status(), Json(envelope)).into_response();

        if let GatewayError::RateLimited(ref exceeded) = self {
            let secs = exceeded.retry_after().as_secs_f64().ceil().max(1.0) as u64;
            if let Ok(value) = header::HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        assert_eq!(GatewayError::MissingKey.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            GatewayError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::BodyTooLarge.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            GatewayError::UpstreamUnreachable("refused".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::UpstreamUnavailable("timed out".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_rate_limited_maps_to_429() {
        let err = GatewayError::RateLimited(LimitExceeded::Requests {
            retry_after: Duration::from_secs(2),
        });
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.error_type(), "rate_limit_error");
        assert_eq!(err.code(), "rate_limit_exceeded");
    }

    #[test]
    fn test_retry_after_header_set() {
        let err = GatewayError::RateLimited(LimitExceeded::Tokens {
            retry_after: Duration::from_secs_f64(1.2),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            // 1.2s rounds up
            "2"
        );
    }

    #[test]
    fn test_token_and_request_limits_distinguished() {
        let requests = GatewayError::RateLimited(LimitExceeded::Requests {
            retry_after: Duration::from_secs(1),
        });
        let tokens = GatewayError::RateLimited(LimitExceeded::Tokens {
            retry_after: Duration::from_secs(1),
        });
        assert_ne!(requests.code(), tokens.code());
    }
}
