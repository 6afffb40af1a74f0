//! HTTP handlers: admin rate-limit operations, metrics exposition, health.

use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use crate::config::{Config, MetricsFormat};
use crate::error::{GatewayError, Result};
use crate::limiter::{StrategyTable, TieredLimiter};
use crate::metrics::export::prometheus_text;
use crate::metrics::health::evaluate;
use crate::metrics::summary::dashboard;
use crate::metrics::MetricsRegistry;
use crate::store::MemoryCounterStore;

/// Application state built once at startup and injected into every handler
/// and middleware through axum `State`. No component reaches for globals.
pub struct AppState {
    pub config: Config,
    pub limiter: TieredLimiter,
    pub strategies: StrategyTable,
    pub metrics: MetricsRegistry,
    /// Set when the in-memory store backs the limiter; feeds the
    /// `rate_limit_active_keys` gauge. Redis tracks its own keyspace.
    pub local_store: Option<MemoryCounterStore>,
}

#[derive(Debug, Deserialize)]
pub struct ApiKeyQuery {
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub format: Option<String>,
}

fn require_api_key(query: &ApiKeyQuery) -> Result<&str> {
    match query.api_key.as_deref() {
        Some(key) if !key.is_empty() => Ok(key),
        _ => Err(GatewayError::Validation(
            "missing required parameter: api_key".to_string(),
        )),
    }
}

/// GET /admin/rate-limit/usage?api_key=<id>
pub async fn rate_limit_usage(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ApiKeyQuery>,
) -> Result<impl IntoResponse> {
    let api_key = require_api_key(&query)?;
    let usage = state.limiter.usage(api_key).await?;

    Ok(Json(json!({
        "api_key": api_key,
        "minute": usage.minute,
        "daily": usage.daily,
        "burst": usage.burst,
    })))
}

/// GET /admin/rate-limit/reset?api_key=<id>
pub async fn rate_limit_reset(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ApiKeyQuery>,
) -> Result<impl IntoResponse> {
    let api_key = require_api_key(&query)?;
    state.limiter.reset(api_key).await?;

    Ok(Json(json!({
        "message": "reset successful",
        "api_key": api_key,
    })))
}

fn check_basic_auth(config: &Config, headers: &HeaderMap) -> Result<()> {
    let Some(auth) = &config.metrics_auth else {
        return Ok(());
    };

    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Basic "))
        .and_then(|encoded| BASE64.decode(encoded).ok())
        .and_then(|decoded| String::from_utf8(decoded).ok());

    match provided {
        Some(credentials) if credentials == format!("{}:{}", auth.username, auth.password) => {
            Ok(())
        }
        _ => Err(GatewayError::Unauthorized),
    }
}

/// GET /metrics — JSON metric map or Prometheus text, selected by the
/// `format` query param with the configured exporter as default. Optionally
/// gated by basic auth.
pub async fn metrics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MetricsQuery>,
    headers: HeaderMap,
) -> Result<Response> {
    check_basic_auth(&state.config, &headers)?;

    let format = match query.format.as_deref() {
        Some("prometheus") => MetricsFormat::Prometheus,
        Some("json") => MetricsFormat::Json,
        Some(other) => {
            return Err(GatewayError::Validation(format!(
                "unknown metrics format: {}",
                other
            )))
        }
        None => state.config.metrics_format,
    };

    let snapshot = state.metrics.snapshot().await;
    let response = match format {
        MetricsFormat::Prometheus => prometheus_text(&snapshot).into_response(),
        MetricsFormat::Json => Json(snapshot).into_response(),
    };

    Ok(response)
}

/// GET /admin/dashboard — aggregate counters and averages for dashboards.
pub async fn dashboard_summary(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.metrics.snapshot().await;
    Json(dashboard(&snapshot))
}

/// GET /health — threshold evaluation over current metrics. Always 200; a
/// breach is reported in the body, not as an HTTP error.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.metrics.snapshot().await;
    Json(evaluate(&snapshot, &state.config.health))
}

/// Terminal handler standing in for the proxied upstream: every admitted
/// request ends here.
pub async fn gateway_handler(request: Request) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "path": request.uri().path(),
    }))
}
