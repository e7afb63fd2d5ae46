//! Error types for the middleware crate

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, MiddlewareError>;

#[derive(Debug, thiserror::Error)]
pub enum MiddlewareError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Block status lookup failed: {0}")]
    Store(String),

    #[error("Account is blocked")]
    Blocked,
}

impl IntoResponse for MiddlewareError {
    fn into_response(self) -> Response {
        let status = match &self {
            MiddlewareError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            MiddlewareError::Blocked => StatusCode::FORBIDDEN,
            MiddlewareError::Config(_) | MiddlewareError::Store(_) => {
                tracing::error!("Middleware error: {:?}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string(),
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}
