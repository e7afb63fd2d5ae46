//! Alert dispatcher
//!
//! Broadcasts an alert to every configured provider at once and waits for all of them,
//! whatever each one does. A provider that fails is neither retried nor disabled; the
//! `is_configured` check is the only gate.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::join_all;
use futures_util::FutureExt;
use tracewire_core::AlertingConfig;
use tracing::{debug, info, warn};

use crate::payload::AlertPayload;
use crate::provider::{AlertError, AlertResult, Delivery, NotificationProvider};
use crate::providers::{DiscordProvider, SlackProvider, TeamsProvider};

/// Which send method a dispatch targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertKind {
    Error,
    Critical,
    Batch,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertKind::Error => write!(f, "error"),
            AlertKind::Critical => write!(f, "critical"),
            AlertKind::Batch => write!(f, "batch"),
        }
    }
}

/// An alert borrowed for the duration of one dispatch.
#[derive(Debug, Clone, Copy)]
pub enum Alert<'a> {
    Error(&'a AlertPayload),
    Critical(&'a AlertPayload),
    Batch(&'a [AlertPayload]),
}

impl Alert<'_> {
    pub fn kind(&self) -> AlertKind {
        match self {
            Alert::Error(_) => AlertKind::Error,
            Alert::Critical(_) => AlertKind::Critical,
            Alert::Batch(_) => AlertKind::Batch,
        }
    }
}

/// Why a provider did not deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchFailure {
    /// The send call completed but reported a failed delivery.
    Reported(String),
    /// The send call itself errored or panicked.
    Rejected(String),
}

impl fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchFailure::Reported(reason) => write!(f, "reported failure: {}", reason),
            DispatchFailure::Rejected(reason) => write!(f, "rejected: {}", reason),
        }
    }
}

/// Aggregate outcome of one dispatch.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub kind: AlertKind,
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, DispatchFailure)>,
    /// No provider was configured, nothing was sent.
    pub skipped: bool,
}

impl DispatchReport {
    fn skipped(kind: AlertKind) -> Self {
        Self {
            kind,
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped: true,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    /// `"<succeeded>/<total>"`
    pub fn summary(&self) -> String {
        format!("{}/{}", self.success_count(), self.total())
    }
}

type ReportObserver = Arc<dyn Fn(&DispatchReport) + Send + Sync>;

pub struct AlertDispatcher {
    providers: Vec<Arc<dyn NotificationProvider>>,
    observers: Vec<ReportObserver>,
}

impl AlertDispatcher {
    pub fn new(providers: Vec<Arc<dyn NotificationProvider>>) -> Self {
        Self {
            providers,
            observers: Vec::new(),
        }
    }

    pub fn builder() -> AlertDispatcherBuilder {
        AlertDispatcherBuilder::default()
    }

    /// Build the built-in registry (Slack, Discord, Teams) from configuration.
    pub fn from_config(config: &AlertingConfig) -> AlertResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AlertError::Configuration(e.to_string()))?;

        Ok(Self::builder()
            .provider(Arc::new(SlackProvider::from_config(config, http_client.clone())))
            .provider(Arc::new(DiscordProvider::from_config(config, http_client.clone())))
            .provider(Arc::new(TeamsProvider::from_config(config, http_client)))
            .build())
    }

    pub fn providers(&self) -> &[Arc<dyn NotificationProvider>] {
        &self.providers
    }

    pub fn configured_providers(&self) -> Vec<Arc<dyn NotificationProvider>> {
        self.providers
            .iter()
            .filter(|p| p.is_configured())
            .cloned()
            .collect()
    }

    pub async fn send_error_alert(&self, alert: &AlertPayload) {
        self.dispatch(Alert::Error(alert)).await;
    }

    pub async fn send_critical_error_alert(&self, alert: &AlertPayload) {
        self.dispatch(Alert::Critical(alert)).await;
    }

    pub async fn send_batch_error_alerts(&self, alerts: &[AlertPayload]) {
        self.dispatch(Alert::Batch(alerts)).await;
    }

    /// Deliver `alert` to every configured provider. Never fails; the outcome is logged
    /// and handed to the registered report observers.
    pub async fn dispatch(&self, alert: Alert<'_>) {
        let kind = alert.kind();

        if let Alert::Batch(alerts) = alert {
            if alerts.is_empty() {
                debug!("Empty alert batch, nothing to dispatch");
                return;
            }
        }

        let configured = self.configured_providers();
        if configured.is_empty() {
            warn!(kind = %kind, "Alert dispatch skipped, no providers configured");
            self.notify(&DispatchReport::skipped(kind));
            return;
        }

        let sends = configured.iter().map(|provider| {
            let provider = Arc::clone(provider);
            async move {
                let name = provider.provider_name().to_string();
                let send = async {
                    match alert {
                        Alert::Error(payload) => provider.send_error_alert(payload).await,
                        Alert::Critical(payload) => provider.send_critical_error_alert(payload).await,
                        Alert::Batch(payloads) => provider.send_batch_error_alerts(payloads).await,
                    }
                };
                let outcome = AssertUnwindSafe(send).catch_unwind().await;
                (name, outcome)
            }
        });

        let mut report = DispatchReport {
            kind,
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped: false,
        };

        for (name, outcome) in join_all(sends).await {
            match outcome {
                Ok(Ok(Delivery::Delivered)) => report.succeeded.push(name),
                Ok(Ok(Delivery::Failed(reason))) => {
                    report.failed.push((name, DispatchFailure::Reported(reason)))
                }
                Ok(Err(e)) => report.failed.push((name, DispatchFailure::Rejected(e.to_string()))),
                Err(panic) => report
                    .failed
                    .push((name, DispatchFailure::Rejected(panic_message(panic.as_ref())))),
            }
        }

        for (provider, failure) in &report.failed {
            warn!(provider = %provider, kind = %kind, failure = %failure, "Alert provider failed");
        }

        info!(
            kind = %kind,
            succeeded = ?report.succeeded,
            failed = report.failed.len(),
            summary = %report.summary(),
            "Alert dispatch completed"
        );

        self.notify(&report);
    }

    fn notify(&self, report: &DispatchReport) {
        for observer in &self.observers {
            observer(report);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}

#[derive(Default)]
pub struct AlertDispatcherBuilder {
    providers: Vec<Arc<dyn NotificationProvider>>,
    observers: Vec<ReportObserver>,
}

impl AlertDispatcherBuilder {
    pub fn provider(mut self, provider: Arc<dyn NotificationProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Register a callback that receives every dispatch report.
    pub fn on_report<F>(mut self, observer: F) -> Self
    where
        F: Fn(&DispatchReport) + Send + Sync + 'static,
    {
        self.observers.push(Arc::new(observer));
        self
    }

    pub fn build(self) -> AlertDispatcher {
        AlertDispatcher {
            providers: self.providers,
            observers: self.observers,
        }
    }
}
