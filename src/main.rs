//! nexus: rate-limiting reverse proxy for OpenAI-compatible API traffic
//!
//! A gateway that sits in front of an OpenAI-compatible API and provides:
//! - Per-credential request and token-throughput limiting
//! - Client-to-upstream API key mapping
//! - Per-credential usage metrics

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use nexus::{config::AppConfig, run_server};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Parser)]
#[command(name = "nexus")]
#[command(version)]
#[command(about = "Rate-limiting reverse proxy for OpenAI-compatible API traffic")]
#[command(long_about = "
nexus is a reverse proxy for OpenAI-compatible APIs that provides:
  - Per-credential request-rate and token-throughput limits
  - Client-to-upstream API key mapping
  - Per-credential usage metrics

Example usage:
  nexus run --config config.yaml
  nexus check-config
  nexus test-upstream
")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    /// Set logging level (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway
    Run {
        /// Override listen port
        #[arg(short, long)]
        port: Option<u16>,
        /// Override upstream URL (e.g., "http://localhost:9999")
        #[arg(long)]
        upstream_url: Option<String>,
    },

    /// Validate configuration file
    CheckConfig,

    /// Test connection to the upstream API
    TestUpstream,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level_filter = if let Some(level) = cli.log_level {
        level.to_string()
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
            .to_string()
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&level_filter))
        .init();

    match cli.command {
        Commands::Run { port, upstream_url } => {
            run_gateway(cli.config, port, upstream_url).await?;
        }
        Commands::CheckConfig => {
            check_config(cli.config)?;
        }
        Commands::TestUpstream => {
            test_upstream(cli.config).await?;
        }
    }

    Ok(())
}

/// Run the gateway
async fn run_gateway(
    config_path: PathBuf,
    port_override: Option<u16>,
    upstream_url_override: Option<String>,
) -> anyhow::Result<()> {
    let mut config = load_config_or_exit(&config_path);

    // Apply CLI overrides
    if let Some(port) = port_override {
        config.server.port = port;
    }
    if let Some(url) = upstream_url_override {
        config.upstream.url = url;
        config
            .validate()
            .context("upstream URL override failed validation")?;
    }

    tracing::info!("Loaded configuration from {:?}", config_path);

    if config.api_keys.is_empty() {
        tracing::warn!("No api_keys configured; accepting any non-empty bearer key");
    } else {
        tracing::info!(keys = config.api_keys.len(), "API key mapping configured");
    }

    run_server(config)
        .await
        .map_err(|e| anyhow::anyhow!("server error: {}", e))
}

/// Validate configuration file
fn check_config(config_path: PathBuf) -> anyhow::Result<()> {
    match AppConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration file is valid\n");
            println!("Server:");
            println!("  Listen: {}:{}", config.server.host, config.server.port);
            println!("\nUpstream:");
            println!("  URL: {}", config.upstream.url);
            println!(
                "  TLS: {}",
                if config.upstream.is_tls() { "enabled" } else { "disabled" }
            );
            println!("  Timeout: {}s", config.upstream.timeout_seconds);
            println!("\nLimits (per credential):");
            println!("  Requests/sec: {}", config.limits.requests_per_second);
            println!("  Burst: {}", config.limits.burst);
            println!(
                "  Model tokens/min: {} (burst {})",
                config.limits.model_tokens_per_minute,
                config.limits.token_burst()
            );
            println!("  Idle TTL: {}s", config.limits.idle_ttl_seconds);
            println!("\nAuth:");
            println!("  Configured keys: {}", config.api_keys.len());
            println!("\nMetrics:");
            println!("  Enabled: {}", config.metrics.enabled);
            println!("  Auth required: {}", config.metrics.auth_required);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Test connection to the upstream
async fn test_upstream(config_path: PathBuf) -> anyhow::Result<()> {
    let config = load_config_or_exit(&config_path);
    let base_url = config.upstream.base_url();
    let health_url = format!("{}/health", base_url);

    println!("Testing connection to upstream: {}", health_url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()?;

    match client.get(&health_url).send().await {
        Ok(resp) => {
            if resp.status().is_success() {
                println!("✓ Upstream is reachable");
                println!("  Status: {}", resp.status());
                if let Ok(body) = resp.text().await {
                    println!("  Response: {}", body.trim());
                }
            } else {
                println!("✗ Upstream returned error status: {}", resp.status());
            }
        }
        Err(e) => {
            println!("✗ Failed to connect to upstream: {}", e);
            std::process::exit(1);
        }
    }

    let models_url = format!("{}/v1/models", base_url);
    println!("\nTesting /v1/models endpoint: {}", models_url);

    match client.get(&models_url).send().await {
        Ok(resp) => {
            if resp.status().is_success() {
                println!("✓ /v1/models endpoint available");
                if let Ok(json) = resp.json::<serde_json::Value>().await {
                    if let Some(data) = json.get("data").and_then(|d| d.as_array()) {
                        println!("  Available models: {}", data.len());
                        for model in data.iter().take(5) {
                            if let Some(id) = model.get("id").and_then(|i| i.as_str()) {
                                println!("    - {}", id);
                            }
                        }
                    }
                }
            } else {
                println!("  /v1/models returned: {}", resp.status());
            }
        }
        Err(e) => {
            println!("  /v1/models error: {}", e);
        }
    }

    Ok(())
}

/// Load configuration or exit with error
fn load_config_or_exit(config_path: &PathBuf) -> AppConfig {
    match AppConfig::from_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            eprintln!("\nMake sure you have a config.yaml file.");
            eprintln!("You can copy config.yaml.default and modify it:");
            eprintln!("  cp config.yaml.default config.yaml");
            std::process::exit(1);
        }
    }
}
