//! Critical-failure classification

use crate::config::{BusinessImpact, Severity, TraceConfig};
use crate::failure::FailureInfo;

/// Structured error types that always take the critical alert path.
pub const CRITICAL_ERROR_TYPES: [&str; 8] = [
    "ConnectionError",
    "AuthenticationError",
    "AuthorizationError",
    "ValidationError",
    "TimeoutError",
    "NetworkError",
    "PaymentProcessingError",
    "CriticalBusinessError",
];

/// Lowercase message fragments that mark a failure as critical.
pub const CRITICAL_MESSAGE_PATTERNS: [&str; 10] = [
    "connection failed",
    "authentication failed",
    "authorization failed",
    "timeout",
    "network error",
    "database error",
    "critical",
    "fatal",
    "payment failed",
    "transaction failed",
];

pub fn is_critical(failure: &FailureInfo, config: &TraceConfig) -> bool {
    if config.severity == Severity::Critical || config.business_impact == BusinessImpact::Critical {
        return true;
    }

    if failure
        .type_name
        .as_deref()
        .is_some_and(|name| CRITICAL_ERROR_TYPES.contains(&name))
    {
        return true;
    }

    let message = failure.message.to_lowercase();
    if CRITICAL_MESSAGE_PATTERNS.iter().any(|p| message.contains(p)) {
        return true;
    }

    failure.critical || failure.severity.as_deref() == Some("critical")
}
