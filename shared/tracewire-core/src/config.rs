//! Alerting configuration loaded from the environment

use crate::error::{Result, ServiceError};
use std::env;
use std::time::Duration;

/// A single webhook-backed notification endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderEndpoint {
    pub webhook_url: Option<String>,
    /// Channel override (Slack only).
    pub channel: Option<String>,
}

impl ProviderEndpoint {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: Some(webhook_url.into()),
            channel: None,
        }
    }

    pub fn is_set(&self) -> bool {
        self.webhook_url
            .as_deref()
            .map(|url| !url.trim().is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct AlertingConfig {
    pub service_name: String,
    pub environment: String,
    pub enabled: bool,
    pub slack: ProviderEndpoint,
    pub discord: ProviderEndpoint,
    pub teams: ProviderEndpoint,
    pub request_timeout: Duration,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            service_name: "tracewire-service".to_string(),
            environment: "development".to_string(),
            enabled: true,
            slack: ProviderEndpoint::default(),
            discord: ProviderEndpoint::default(),
            teams: ProviderEndpoint::default(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl AlertingConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let timeout_secs = match lookup("ALERT_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|e| ServiceError::Config(format!("Invalid ALERT_TIMEOUT_SECS: {}", e)))?,
            None => defaults.request_timeout.as_secs(),
        };

        Ok(Self {
            service_name: lookup("SERVICE_NAME").unwrap_or(defaults.service_name),
            environment: lookup("ENVIRONMENT").unwrap_or(defaults.environment),
            enabled: lookup("ALERTS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
            slack: ProviderEndpoint {
                webhook_url: lookup("SLACK_WEBHOOK_URL"),
                channel: lookup("SLACK_CHANNEL"),
            },
            discord: ProviderEndpoint {
                webhook_url: lookup("DISCORD_WEBHOOK_URL"),
                channel: None,
            },
            teams: ProviderEndpoint {
                webhook_url: lookup("TEAMS_WEBHOOK_URL"),
                channel: None,
            },
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}
