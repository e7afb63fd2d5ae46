//! Notification provider trait

use async_trait::async_trait;

use crate::payload::AlertPayload;

/// Result of provider operations
pub type AlertResult<T> = Result<T, AlertError>;

/// Provider errors. Returning one of these from a send call counts as a rejected delivery.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// Outcome of a send call that completed without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The provider answered but signalled that delivery failed.
    Failed(String),
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered)
    }
}

/// Trait that all notification backends must implement
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    /// Provider identifier used in dispatch reports
    fn provider_name(&self) -> &str;

    /// Whether the provider has what it needs to send (e.g. a webhook URL)
    fn is_configured(&self) -> bool;

    async fn send_error_alert(&self, alert: &AlertPayload) -> AlertResult<Delivery>;

    async fn send_critical_error_alert(&self, alert: &AlertPayload) -> AlertResult<Delivery>;

    async fn send_batch_error_alerts(&self, alerts: &[AlertPayload]) -> AlertResult<Delivery>;
}
