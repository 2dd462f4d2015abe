//! Credential handling: bearer extraction and client-to-upstream key mapping

use axum::http::HeaderMap;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AuthError {
    #[error("invalid client API key")]
    UnknownClientKey,

    #[error("no upstream API key configured for client key")]
    NoUpstreamKey,
}

/// Validates client keys and resolves the upstream key to forward with.
///
/// When no keys are configured, any non-empty bearer key is accepted and
/// passed through to the upstream unchanged.
#[derive(Debug, Clone, Default)]
pub struct KeyManager {
    api_keys: HashMap<String, String>,
}

impl KeyManager {
    pub fn new(api_keys: HashMap<String, String>) -> Self {
        Self { api_keys }
    }

    /// Returns true if key management is configured
    pub fn is_configured(&self) -> bool {
        !self.api_keys.is_empty()
    }

    /// Check whether a client key is acceptable
    pub fn validate_client_key(&self, client_key: &str) -> bool {
        if !self.is_configured() {
            return !client_key.trim().is_empty();
        }
        self.api_keys.contains_key(client_key)
    }

    /// Resolve the upstream key for a client key. In passthrough mode the
    /// client key itself is returned, so the borrow spans both inputs.
    pub fn upstream_key<'a>(&'a self, client_key: &'a str) -> Result<&'a str, AuthError> {
        if !self.is_configured() {
            return Ok(client_key);
        }

        let upstream = self
            .api_keys
            .get(client_key)
            .ok_or(AuthError::UnknownClientKey)?;

        if upstream.is_empty() {
            return Err(AuthError::NoUpstreamKey);
        }

        Ok(upstream)
    }
}

/// Extract the bearer credential from the Authorization header.
///
/// Accepts both `Bearer <key>` and a bare key. Returns None for missing or
/// empty values.
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let key = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

/// Mask a credential for logging: keep a short prefix, blank the rest
pub fn mask_key(key: &str) -> String {
    mask_sensitive(key, 10)
}

fn mask_sensitive(s: &str, prefix_len: usize) -> String {
    if s.is_empty() {
        return String::new();
    }

    let (prefix, value) = match s.strip_prefix("Bearer ") {
        Some(rest) => ("Bearer ", rest),
        None => ("", s),
    };

    if value.len() <= prefix_len {
        return format!("{}{}", prefix, value);
    }

    format!("{}{}{}", prefix, &value[..prefix_len], "********")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::AUTHORIZATION;

    fn configured_manager() -> KeyManager {
        let mut keys = HashMap::new();
        keys.insert("sk-client-1".to_string(), "sk-upstream-1".to_string());
        keys.insert("sk-client-2".to_string(), "".to_string());
        KeyManager::new(keys)
    }

    #[test]
    fn test_unconfigured_accepts_any_nonempty_key() {
        let manager = KeyManager::default();
        assert!(!manager.is_configured());
        assert!(manager.validate_client_key("sk-anything"));
        assert!(!manager.validate_client_key(""));
        assert!(!manager.validate_client_key("   "));
        assert_eq!(manager.upstream_key("sk-anything"), Ok("sk-anything"));
    }

    #[test]
    fn test_configured_rejects_unknown_key() {
        let manager = configured_manager();
        assert!(manager.is_configured());
        assert!(manager.validate_client_key("sk-client-1"));
        assert!(!manager.validate_client_key("sk-unknown"));
        assert_eq!(
            manager.upstream_key("sk-unknown"),
            Err(AuthError::UnknownClientKey)
        );
    }

    #[test]
    fn test_passthrough_key_borrows_from_caller() {
        let manager = KeyManager::default();
        let key = String::from("sk-caller-owned");
        let resolved = manager.upstream_key(&key).unwrap();
        let again = manager.upstream_key("sk-other").unwrap();
        assert_eq!(resolved, "sk-caller-owned");
        assert_eq!(again, "sk-other");
    }

    #[test]
    fn test_configured_maps_to_upstream_key() {
        let manager = configured_manager();
        assert_eq!(manager.upstream_key("sk-client-1"), Ok("sk-upstream-1"));
    }

    #[test]
    fn test_empty_upstream_key_is_an_error() {
        let manager = configured_manager();
        assert_eq!(
            manager.upstream_key("sk-client-2"),
            Err(AuthError::NoUpstreamKey)
        );
    }

    #[test]
    fn test_extract_bearer_strips_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer sk-test-key".parse().unwrap());
        assert_eq!(extract_bearer(&headers), Some("sk-test-key"));
    }

    #[test]
    fn test_extract_bearer_accepts_bare_key() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "sk-test-key".parse().unwrap());
        assert_eq!(extract_bearer(&headers), Some("sk-test-key"));
    }

    #[test]
    fn test_extract_bearer_missing_or_empty() {
        let headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer    ".parse().unwrap());
        assert_eq!(extract_bearer(&headers), None);
    }

    #[test]
    fn test_mask_key_keeps_prefix_only() {
        assert_eq!(mask_key("sk-demo-key-12345"), "sk-demo-ke********");
        assert_eq!(mask_key("short"), "short");
        assert_eq!(mask_key(""), "");
    }

    #[test]
    fn test_mask_key_preserves_bearer_prefix() {
        assert_eq!(
            mask_key("Bearer sk-demo-key-12345"),
            "Bearer sk-demo-ke********"
        );
    }
}
