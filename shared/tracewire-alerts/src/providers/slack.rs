//! Slack incoming-webhook provider

use async_trait::async_trait;
use serde_json::{json, Value};
use tracewire_core::{AlertingConfig, ProviderEndpoint};

use super::{batch_headline, facts, headline, post_json, truncate, MAX_BATCH_ITEMS, MAX_MESSAGE_CHARS};
use crate::payload::AlertPayload;
use crate::provider::{AlertError, AlertResult, Delivery, NotificationProvider};

pub struct SlackProvider {
    endpoint: ProviderEndpoint,
    environment: String,
    enabled: bool,
    http_client: reqwest::Client,
}

impl SlackProvider {
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
            endpoint: config.slack.clone(),
            environment: config.environment.clone(),
            enabled: config.enabled,
            http_client,
        }
    }

    fn alert_message(&self, alert: &AlertPayload, critical: bool) -> Value {
        let title = headline(alert, critical);
        let fields: Vec<_> = facts(alert)
            .into_iter()
            .take(10)
            .map(|(name, value)| json!({ "type": "mrkdwn", "text": format!("*{}:*\n{}", name, value) }))
            .collect();

        let text = if critical {
            format!("<!channel> {}", title)
        } else {
            title.clone()
        };

        self.with_channel(json!({
            "text": text,
            "blocks": [
                { "type": "header", "text": { "type": "plain_text", "text": title } },
                {
                    "type": "section",
                    "text": {
                        "type": "mrkdwn",
                        "text": format!("*Error:* `{}`", truncate(&alert.error.message, MAX_MESSAGE_CHARS))
                    }
                },
                { "type": "section", "fields": fields },
                {
                    "type": "context",
                    "elements": [{
                        "type": "mrkdwn",
                        "text": format!("Environment: {} | {}", self.environment, alert.timestamp.to_rfc3339())
                    }]
                }
            ]
        }))
    }

    fn batch_message(&self, alerts: &[AlertPayload]) -> Value {
        let title = batch_headline(alerts);
        let mut blocks = vec![json!({ "type": "header", "text": { "type": "plain_text", "text": title } })];

        for alert in alerts.iter().take(MAX_BATCH_ITEMS) {
            blocks.push(json!({
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!(
                        "*{}.{}* ({})\n`{}`",
                        alert.service_name,
                        alert.operation_name,
                        alert.error.error_type,
                        truncate(&alert.error.message, 200)
                    )
                }
            }));
        }

        if alerts.len() > MAX_BATCH_ITEMS {
            blocks.push(json!({
                "type": "context",
                "elements": [{ "type": "mrkdwn", "text": format!("...and {} more", alerts.len() - MAX_BATCH_ITEMS) }]
            }));
        }

        self.with_channel(json!({ "text": title, "blocks": blocks }))
    }

    fn with_channel(&self, mut message: Value) -> Value {
        if let (Some(channel), Some(map)) = (&self.endpoint.channel, message.as_object_mut()) {
            map.insert("channel".to_string(), json!(channel));
        }
        message
    }

    async fn post(&self, message: &Value) -> AlertResult<Delivery> {
        let url = self
            .endpoint
            .webhook_url
            .as_deref()
            .ok_or_else(|| AlertError::NotConfigured("slack".into()))?;
        post_json(&self.http_client, url, message).await
    }
}

#[async_trait]
impl NotificationProvider for SlackProvider {
    fn provider_name(&self) -> &str {
        "slack"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::ErrorDetails;

    fn provider(channel: Option<&str>) -> SlackProvider {
        let endpoint = ProviderEndpoint {
            webhook_url: Some("https://hooks.slack.test/abc".into()),
            channel: channel.map(str::to_string),
        };
        SlackProvider::new(endpoint, "staging".into(), reqwest::Client::new())
    }

    #[test]
    fn test_critical_message_mentions_channel() {
        let alert = AlertPayload::new(ErrorDetails::new("db down", "ConnectionError"), "Svc", "op");
        let message = provider(Some("#alerts")).alert_message(&alert, true);

        assert!(message["text"].as_str().unwrap().starts_with("<!channel>"));
        assert_eq!(message["channel"], "#alerts");
        assert_eq!(message["blocks"][0]["text"]["text"], "CRITICAL ERROR in Svc.op");
    }

    #[test]
    fn test_batch_message_caps_items() {
        let alerts: Vec<_> = (0..12)
            .map(|i| AlertPayload::new(ErrorDetails::new(format!("e{}", i), "Error"), "Svc", "op"))
            .collect();
        let message = provider(None).batch_message(&alerts);
        let blocks = message["blocks"].as_array().unwrap();

        // header + 10 items + overflow note
        assert_eq!(blocks.len(), 12);
        assert!(message.get("channel").is_none());
    }
}
