use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Error taxonomy for the admission layer.
///
/// `Store` covers counter-backend failures and maps to 503: a request whose
/// limit state cannot be determined is rejected, never admitted (fail closed).
/// `RateLimited` is the expected admission outcome, not a fault. No variant
/// triggers a retry inside this layer.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("counter store error: {0}")]
    Store(String),

    #[error("Rate limit exceeded for {window} window")]
    RateLimited { window: &'static str, limit: u32 },

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<redis::RedisError> for GatewayError {
    fn from(err: redis::RedisError) -> Self {
        GatewayError::Store(err.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            GatewayError::RateLimited { limit, .. } => json!({
                "error": {
                    "code": status.as_u16(),
                    "message": self.to_string(),
                    "limit": limit,
                }
            }),
            _ => json!({
                "error": {
                    "code": status.as_u16(),
                    "message": self.to_string(),
                }
            }),
        };

        let mut response = (status, Json(body)).into_response();

        if let GatewayError::RateLimited { limit, .. } = &self {
            if let Ok(value) = HeaderValue::from_str(&limit.to_string()) {
                response.headers_mut().insert("X-RateLimit-Limit", value);
            }
            response
                .headers_mut()
                .insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
        }

        response
    }
}
