//! Gateway middleware chain.
//!
//! Stages execute in a fixed order around the terminal handler:
//! metrics (timer) → tracing (request id) → IP filter → rate limit →
//! logging. A stage may short-circuit by writing a response without calling
//! `next`; counters already charged are never rolled back.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::info;
use uuid::Uuid;

use crate::handlers::AppState;
use crate::limiter::ANONYMOUS_IDENTIFIER;

/// Records request count, error count, and duration around the rest of the
/// chain. Runs first so rejected requests are counted too.
pub async fn metrics_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    state.metrics.record_request(&method, &path).await;

    let response = next.run(request).await;

    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        state.metrics.record_error(&method, &path, status.as_u16()).await;
    }
    state
        .metrics
        .record_duration(&method, &path, start.elapsed().as_secs_f64())
        .await;

    response
}

/// Attaches a request id for correlation and echoes it on the response.
pub async fn tracing_middleware(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("X-Request-Id", value);
    }
    response
}

/// Rejects requests from configured client IPs with 403.
pub async fn ip_filter_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let client_ip = get_client_ip(&request);

    if state.config.blocked_ips.iter().any(|ip| ip == &client_ip) {
        info!(
            target: "gatekeeper::middleware",
            client_ip = %client_ip,
            "Blocked client rejected"
        );
        return StatusCode::FORBIDDEN.into_response();
    }

    next.run(request).await
}

/// Admission stage: resolves the strategy for the request path and charges
/// the three-tier limiter. Short-circuits with 429 on rejection; a counter
/// backend failure surfaces as 503 (fail closed).
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let identifier = request
        .headers()
        .get("X-API-Key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or(ANONYMOUS_IDENTIFIER)
        .to_string();

    let strategy = state.strategies.resolve(request.uri().path());

    if let Err(err) = state.limiter.admit(&identifier, strategy).await {
        return err.into_response();
    }

    next.run(request).await
}

/// Request/response logging with client IP extraction.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client_ip = get_client_ip(&request);

    info!(
        target: "gatekeeper::middleware",
        method = %method,
        uri = %uri,
        client_ip = %client_ip,
        "Incoming request"
    );

    let response = next.run(request).await;

    let status = response.status();
    info!(
        target: "gatekeeper::middleware",
        method = %method,
        uri = %uri,
        status = %status,
        "Request completed"
    );

    response
}

/// Helmet-style response headers applied to every route.
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("X-XSS-Protection", HeaderValue::from_static("1; mode=block"));
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    response
}

fn get_client_ip(request: &Request) -> String {
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                return first_ip.trim().to_string();
            }
        }
    }

    if let Some(real_ip) = request.headers().get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return ip_str.to_string();
        }
    }

    if let Some(addr) = request.extensions().get::<SocketAddr>() {
        addr.ip().to_string()
    } else {
        "unknown".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::HeaderValue;

    fn bare_request() -> Request {
        Request::new(Body::empty())
    }

    #[test]
    fn test_client_ip_first_forwarded_hop_wins() {
        let mut request = bare_request();
        request.headers_mut().insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 198.51.100.7 , 70.41.3.18"),
        );
        request
            .headers_mut()
            .insert("x-real-ip", HeaderValue::from_static("203.0.113.9"));

        // The forwarded chain takes precedence and the first hop is trimmed.
        assert_eq!(get_client_ip(&request), "198.51.100.7");
    }

    #[test]
    fn test_client_ip_real_ip_without_forwarded_chain() {
        let mut request = bare_request();
        request
            .headers_mut()
            .insert("x-real-ip", HeaderValue::from_static("203.0.113.9"));

        assert_eq!(get_client_ip(&request), "203.0.113.9");
    }

    #[test]
    fn test_client_ip_from_socket_addr_extension() {
        let mut request = bare_request();
        request
            .extensions_mut()
            .insert(SocketAddr::from(([10, 1, 2, 3], 41000)));

        assert_eq!(get_client_ip(&request), "10.1.2.3");
    }

    #[test]
    fn test_client_ip_unknown_without_any_source() {
        assert_eq!(get_client_ip(&bare_request()), "unknown");
    }
}
