//! Microsoft Teams webhook provider (MessageCard)

use async_trait::async_trait;
use serde_json::{json, Value};
use tracewire_core::{AlertingConfig, ProviderEndpoint};

use super::{batch_headline, facts, headline, post_json, truncate, MAX_BATCH_ITEMS, MAX_MESSAGE_CHARS};
use crate::payload::AlertPayload;
use crate::provider::{AlertError, AlertResult, Delivery, NotificationProvider};

pub struct TeamsProvider {
    endpoint: ProviderEndpoint,
    environment: String,
    enabled: bool,
    http_client: reqwest::Client,
}

impl TeamsProvider {
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
            endpoint: config.teams.clone(),
            environment: config.environment.clone(),
            enabled: config.enabled,
            http_client,
        }
    }

    fn section(&self, alert: &AlertPayload, critical: bool) -> Value {
        let mut facts: Vec<_> = facts(alert)
            .into_iter()
            .map(|(name, value)| json!({ "name": name, "value": value }))
            .collect();
        facts.push(json!({ "name": "Environment", "value": self.environment }));
        facts.push(json!({ "name": "Time", "value": alert.timestamp.to_rfc3339() }));

        json!({
            "activityTitle": headline(alert, critical),
            "activitySubtitle": truncate(&alert.error.message, MAX_MESSAGE_CHARS),
            "facts": facts,
            "markdown": true
        })
    }

    fn card(summary: String, theme_color: &str, sections: Vec<Value>) -> Value {
        json!({
            "@type": "MessageCard",
            "@context": "http://schema.org/extensions",
            "themeColor": theme_color,
            "summary": summary,
            "sections": sections
        })
    }

    fn alert_message(&self, alert: &AlertPayload, critical: bool) -> Value {
        let color = if critical { "E81123" } else { "FF8C00" };
        Self::card(headline(alert, critical), color, vec![self.section(alert, critical)])
    }

    fn batch_message(&self, alerts: &[AlertPayload]) -> Value {
        let sections = alerts
            .iter()
            .take(MAX_BATCH_ITEMS)
            .map(|alert| self.section(alert, false))
            .collect();
        Self::card(batch_headline(alerts), "FF8C00", sections)
    }

    async fn post(&self, message: &Value) -> AlertResult<Delivery> {
        let url = self
            .endpoint
            .webhook_url
            .as_deref()
            .ok_or_else(|| AlertError::NotConfigured("teams".into()))?;
        post_json(&self.http_client, url, message).await
    }
}

#[async_trait]
impl NotificationProvider for TeamsProvider {
    fn provider_name(&self) -> &str {
        "teams"
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
