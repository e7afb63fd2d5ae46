//! Error types for tracewire services

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Service-level failures.
///
/// Each variant maps to a stable type name (see [`ServiceError::type_name`]) that the
/// error classifier uses to decide whether a failure deserves the critical alert path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Payment processing error: {0}")]
    PaymentProcessing(String),

    #[error("Critical business error: {0}")]
    CriticalBusiness(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Authentication(_) => 401,
            Self::Authorization(_) => 403,
            Self::NotFound(_) => 404,
            Self::RateLimited(_) => 429,
            Self::PaymentProcessing(_) => 402,
            Self::Connection(_) | Self::Network(_) => 503,
            Self::Timeout(_) => 504,
            _ => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Connection(_) => "CONNECTION_ERROR",
            Self::Authentication(_) => "AUTHENTICATION_ERROR",
            Self::Authorization(_) => "AUTHORIZATION_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Network(_) => "NETWORK_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::PaymentProcessing(_) => "PAYMENT_PROCESSING_ERROR",
            Self::CriticalBusiness(_) => "CRITICAL_BUSINESS_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::RateLimited(_) => "RATE_LIMITED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Type name reported to telemetry and used for critical-type matching.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Config(_) => "ConfigError",
            Self::Connection(_) => "ConnectionError",
            Self::Authentication(_) => "AuthenticationError",
            Self::Authorization(_) => "AuthorizationError",
            Self::Validation(_) => "ValidationError",
            Self::Timeout(_) => "TimeoutError",
            Self::Network(_) => "NetworkError",
            Self::Database(_) => "DatabaseError",
            Self::PaymentProcessing(_) => "PaymentProcessingError",
            Self::CriticalBusiness(_) => "CriticalBusinessError",
            Self::NotFound(_) => "NotFoundError",
            Self::RateLimited(_) => "RateLimitError",
            Self::Internal(_) => "InternalError",
        }
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Validation(err.to_string())
    }
}
