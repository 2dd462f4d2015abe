use std::path::Path;

use super::{AppConfig, ConfigError};

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ConfigError::NotFound(path.display().to_string()));
    }

    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_yaml::from_str(&content)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_config() {
        let result = load_config("/nonexistent/config.yaml");
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_config_invalid_yaml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "invalid: yaml: content: [").unwrap();

        let result = load_config(&path);
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_valid() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");

        let config_content = r#"
server:
  port: 8080
  host: "0.0.0.0"

upstream:
  url: "http://localhost:9999"
  timeout_seconds: 30

limits:
  requests_per_second: 5
  burst: 10
  model_tokens_per_minute: 6000

api_keys:
  sk-client-1: sk-upstream-1

metrics:
  enabled: true
  auth_required: false
"#;
        std::fs::write(&path, config_content).unwrap();

        let result = load_config(&path);
        assert!(result.is_ok());

        let config = result.unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.upstream.url, "http://localhost:9999");
        assert_eq!(config.upstream.timeout_seconds, 30);
        assert_eq!(config.limits.requests_per_second, 5.0);
        assert_eq!(config.limits.burst, 10);
        assert_eq!(
            config.api_keys.get("sk-client-1").map(String::as_str),
            Some("sk-upstream-1")
        );
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_load_config_minimal_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");

        let config_content = r#"
server:
  port: 8080
  host: "127.0.0.1"

upstream:
  url: "http://localhost:9999"
"#;
        std::fs::write(&path, config_content).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.upstream.timeout_seconds, 300);
        assert_eq!(config.limits.requests_per_second, 10.0);
        assert!(config.api_keys.is_empty());
        assert_eq!(config.validation.max_body_bytes, 10 * 1024 * 1024);
        assert!(config.metrics.mask_keys);
    }

    #[test]
    fn test_from_file_runs_validation() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");

        let config_content = r#"
server:
  port: 8080
  host: "127.0.0.1"

upstream:
  url: "ftp://example.com"
"#;
        std::fs::write(&path, config_content).unwrap();

        let result = AppConfig::from_file(&path);
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }
}
