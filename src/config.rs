//! Gateway configuration.
//!
//! Defaults can be overridden by an optional JSON config file, then by
//! environment variables (`BIND_ADDR`, `REDIS_URL`, `LOG_LEVEL`,
//! `METRICS_USERNAME`/`METRICS_PASSWORD`), then by CLI flags in `main.rs`.
//! The loaded config is injected into the app state once at startup; nothing
//! reads configuration globally after that.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{GatewayError, Result};
use crate::limiter::Strategy;
use crate::metrics::health::HealthThresholds;

/// Wire format served by `GET /metrics` when no `format` query param is
/// given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricsFormat {
    Json,
    Prometheus,
}

/// Credentials gating the metrics endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server bind address
    pub bind_addr: SocketAddr,

    /// Redis connection URL; empty selects the in-memory counter store
    pub redis_url: String,

    /// Log filter used when RUST_LOG is unset
    pub log_level: String,

    /// Budget applied when no path override matches
    pub default_strategy: Strategy,

    /// Per-path budget overrides (exact or prefix match)
    pub strategies: HashMap<String, Strategy>,

    /// Health-check thresholds
    pub health: HealthThresholds,

    /// Default exporter for GET /metrics
    pub metrics_format: MetricsFormat,

    /// Optional basic-auth gate on GET /metrics
    pub metrics_auth: Option<BasicAuth>,

    /// Client IPs rejected outright with 403
    pub blocked_ips: Vec<String>,

    /// Maximum accepted request body size in bytes
    pub max_body_bytes: usize,

    /// Interval of the background gauge-refresh task
    #[serde(with = "humantime_serde")]
    pub stats_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".parse().expect("valid default addr"),
            redis_url: String::new(),
            log_level: "info".to_string(),
            default_strategy: Strategy::default(),
            strategies: HashMap::new(),
            health: HealthThresholds::default(),
            metrics_format: MetricsFormat::Json,
            metrics_auth: None,
            blocked_ips: Vec::new(),
            max_body_bytes: 1024 * 1024,
            stats_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Loads configuration from an optional JSON file, then applies
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    GatewayError::Internal(format!("failed to read {}: {}", path.display(), e))
                })?;
                serde_json::from_str(&raw).map_err(|e| {
                    GatewayError::Internal(format!("invalid config {}: {}", path.display(), e))
                })?
            }
            None => Config::default(),
        };

        if let Ok(addr) = std::env::var("BIND_ADDR") {
            config.bind_addr = addr
                .parse()
                .map_err(|e| GatewayError::Internal(format!("invalid BIND_ADDR: {}", e)))?;
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            config.redis_url = url;
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }
        // Both halves of the credential pair are required to arm the gate.
        if let (Ok(username), Ok(password)) = (
            std::env::var("METRICS_USERNAME"),
            std::env::var("METRICS_PASSWORD"),
        ) {
            config.metrics_auth = Some(BasicAuth { username, password });
        }

        Ok(config)
    }
}
