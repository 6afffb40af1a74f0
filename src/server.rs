//! Router assembly and server lifecycle.
//!
//! The middleware stack is layered to execute in the fixed chain order:
//! security headers / CORS outermost, then metrics, tracing, IP filter,
//! rate limiting (gateway routes only), logging, and finally the terminal
//! handler. Admin, metrics, and health routes sit outside the rate limiter.

use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::{middleware, Router};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::handlers::{
    dashboard_summary, gateway_handler, health, metrics, rate_limit_reset, rate_limit_usage,
    AppState,
};
use crate::limiter::{StrategyTable, TieredLimiter};
use crate::metrics::MetricsRegistry;
use crate::middleware::{
    ip_filter_middleware, logging_middleware, metrics_middleware, rate_limit_middleware,
    security_headers_middleware, tracing_middleware,
};
use crate::store::{CounterStore, MemoryCounterStore, RedisCounterStore};

/// Builds the shared application state: counter store (Redis when a URL is
/// configured, in-memory otherwise), limiter, strategy table, and metrics
/// registry.
pub async fn build_state(config: Config) -> Result<Arc<AppState>> {
    let mut local_store = None;
    let store: Arc<dyn CounterStore> = if config.redis_url.is_empty() {
        let memory = MemoryCounterStore::new();
        local_store = Some(memory.clone());
        Arc::new(memory)
    } else {
        Arc::new(RedisCounterStore::connect(&config.redis_url).await?)
    };

    let mut strategies = StrategyTable::new(config.default_strategy);
    for (path, strategy) in &config.strategies {
        strategies.insert(path.clone(), *strategy);
    }

    Ok(Arc::new(AppState {
        limiter: TieredLimiter::new(store),
        strategies,
        metrics: MetricsRegistry::new(),
        local_store,
        config,
    }))
}

/// Assembles the full router around the given state.
pub fn create_app(state: Arc<AppState>) -> Router {
    let gateway: Router<Arc<AppState>> = Router::new()
        .fallback(gateway_handler)
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    let ops = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/admin/dashboard", get(dashboard_summary))
        .route("/admin/rate-limit/usage", get(rate_limit_usage))
        .route("/admin/rate-limit/reset", get(rate_limit_reset));

    let max_body_bytes = state.config.max_body_bytes;

    ops.merge(gateway)
        // Innermost so it wraps the routes directly; oversized bodies are
        // rejected with 413 before the handler runs.
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(security_headers_middleware))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    metrics_middleware,
                ))
                .layer(middleware::from_fn(tracing_middleware))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    ip_filter_middleware,
                )),
        )
        .with_state(state)
}

pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    pub async fn new(config: Config) -> Result<Self> {
        let state = build_state(config).await?;
        Ok(Self { state })
    }

    pub async fn run(self) -> Result<()> {
        let bind_addr = self.state.config.bind_addr;
        let app = create_app(self.state.clone());

        self.spawn_stats_task();

        let listener = tokio::net::TcpListener::bind(bind_addr)
            .await
            .map_err(|e| crate::error::GatewayError::Internal(format!("bind failed: {}", e)))?;

        info!("Gateway listening on {}", bind_addr);
        info!("Health check available at /health");
        info!("Metrics available at /metrics");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| crate::error::GatewayError::Internal(format!("server error: {}", e)))?;

        Ok(())
    }

    /// Periodically refreshes process-level gauges.
    fn spawn_stats_task(&self) {
        let state = self.state.clone();
        let started = Instant::now();
        let interval = state.config.stats_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                record_runtime_stats(&state, started).await;
            }
        });
    }
}

/// Writes the process gauges: uptime and, when the in-memory store is in
/// play, the number of live rate-limit counters.
async fn record_runtime_stats(state: &AppState, started: Instant) {
    state
        .metrics
        .set_gauge("gateway_uptime_seconds", started.elapsed().as_secs_f64(), &[])
        .await;

    if let Some(store) = &state.local_store {
        state
            .metrics
            .set_gauge("rate_limit_active_keys", store.len().await as f64, &[])
            .await;
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::Strategy;

    #[tokio::test]
    async fn test_runtime_stats_gauge_counts_live_keys() {
        let state = build_state(Config::default()).await.unwrap();
        state
            .limiter
            .admit("k1", Strategy { rate: 10, daily: 100, burst: 5 })
            .await
            .unwrap();

        record_runtime_stats(&state, Instant::now()).await;

        let snapshot = state.metrics.snapshot().await;
        assert!(snapshot.contains_key("gateway_uptime_seconds"));
        // One admission charges the minute, daily, and burst counters.
        assert_eq!(snapshot["rate_limit_active_keys"].value, 3.0);
    }
}
