//! Discord webhook provider

use async_trait::async_trait;
use serde_json::{json, Value};
use tracewire_core::{AlertingConfig, ProviderEndpoint};

use super::{batch_headline, facts, headline, post_json, truncate, MAX_BATCH_ITEMS, MAX_MESSAGE_CHARS};
use crate::payload::AlertPayload;
use crate::provider::{AlertError, AlertResult, Delivery, NotificationProvider};

const COLOR_ERROR: u32 = 0xF0_A0_20;
const COLOR_CRITICAL: u32 = 0xE0_1E_5A;

pub struct DiscordProvider {
    endpoint: ProviderEndpoint,
    environment: String,
    enabled: bool,
    http_client: reqwest::Client,
}

impl DiscordProvider {
    pub fn new(endpoint: ProviderEndpoint, environment: String, http_client: reqwest::Client) -> Self {
        Self {
            endpoint,
            environment,
            enabled: true,
            http_client,
        }
    }

    pub fn from_config(config: &AlertingConfig, http_client: reqwest::Client) -> Self {
        Self {
            endpoint: config.discord.clone(),
            environment: config.environment.clone(),
            enabled: config.enabled,
            http_client,
        }
    }

    fn embed(&self, alert: &AlertPayload, critical: bool) -> Value {
        let fields: Vec<_> = facts(alert)
            .into_iter()
            .map(|(name, value)| json!({ "name": name, "value": truncate(&value, 1024), "inline": true }))
            .collect();

        json!({
            "title": headline(alert, critical),
            "description": format!("```{}```", truncate(&alert.error.message, MAX_MESSAGE_CHARS)),
            "color": if critical { COLOR_CRITICAL } else { COLOR_ERROR },
            "fields": fields,
            "timestamp": alert.timestamp.to_rfc3339(),
            "footer": { "text": format!("Environment: {}", self.environment) }
        })
    }

    fn alert_message(&self, alert: &AlertPayload, critical: bool) -> Value {
        json!({
            "username": "Tracewire",
            "content": if critical { Value::from("@here") } else { Value::Null },
            "embeds": [self.embed(alert, critical)]
        })
    }

    fn batch_message(&self, alerts: &[AlertPayload]) -> Value {
        // Discord accepts at most 10 embeds per message.
        let embeds: Vec<_> = alerts
            .iter()
            .take(MAX_BATCH_ITEMS)
            .map(|alert| self.embed(alert, false))
            .collect();

        let mut content = batch_headline(alerts);
        if alerts.len() > MAX_BATCH_ITEMS {
            content.push_str(&format!(" (showing first {})", MAX_BATCH_ITEMS));
        }

        json!({ "username": "Tracewire", "content": content, "embeds": embeds })
    }

    async fn post(&self, message: &Value) -> AlertResult<Delivery> {
        let url = self
            .endpoint
            .webhook_url
            .as_deref()
            .ok_or_else(|| AlertError::NotConfigured("discord".into()))?;
        post_json(&self.http_client, url, message).await
    }
}

#[async_trait]
impl NotificationProvider for DiscordProvider {
    fn provider_name(&self) -> &str {
        "discord"
    }

    fn is_configured(&self) -> bool {
        self.enabled && self.endpoint.is_set()
    }

    async fn send_error_alert(&self, alert: &AlertPayload) -> AlertResult<Delivery> {
        self.post(&self.alert_message(alert, false)).await
    }

    async fn send_critical_error_alert(&self, alert: &AlertPayload) -> AlertResult<Delivery> {
        self.post(&self.alert_message(alert, true)).await
    }

    async fn send_batch_error_alerts(&self, alerts: &[AlertPayload]) -> AlertResult<Delivery> {
        self.post(&self.batch_message(alerts)).await
    }
}
