//! Built-in webhook providers

pub mod discord;
pub mod slack;
pub mod teams;

pub use discord::DiscordProvider;
pub use slack::SlackProvider;
pub use teams::TeamsProvider;

use serde_json::Value;

use crate::payload::AlertPayload;
use crate::provider::{AlertError, AlertResult, Delivery};

/// Longest error message embedded in a chat message.
pub(crate) const MAX_MESSAGE_CHARS: usize = 1000;
/// Most alerts listed individually in one batch message.
pub(crate) const MAX_BATCH_ITEMS: usize = 10;

/// POST `body` to a webhook. Transport failures reject; non-2xx answers are reported failures.
pub(crate) async fn post_json(
    http_client: &reqwest::Client,
    url: &str,
    body: &Value,
) -> AlertResult<Delivery> {
    let response = http_client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| AlertError::Network(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        Ok(Delivery::Delivered)
    } else {
        let text = response.text().await.unwrap_or_default();
        Ok(Delivery::Failed(format!("HTTP {}: {}", status.as_u16(), text)))
    }
}

pub(crate) fn headline(alert: &AlertPayload, critical: bool) -> String {
    let prefix = if critical { "CRITICAL ERROR" } else { "Error" };
    format!("{} in {}.{}", prefix, alert.service_name, alert.operation_name)
}

pub(crate) fn batch_headline(alerts: &[AlertPayload]) -> String {
    let services: std::collections::BTreeSet<&str> =
        alerts.iter().map(|a| a.service_name.as_str()).collect();
    format!(
        "{} errors across {}",
        alerts.len(),
        services.into_iter().collect::<Vec<_>>().join(", ")
    )
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}

/// Name/value facts rendered by every provider, in display order.
pub(crate) fn facts(alert: &AlertPayload) -> Vec<(&'static str, String)> {
    let mut facts = vec![
        ("Service", alert.service_name.clone()),
        ("Operation", alert.operation_name.clone()),
        ("Error Type", alert.error.error_type.clone()),
    ];

    if let Some(severity) = alert.context_str("severity") {
        facts.push(("Severity", severity.to_string()));
    }
    if let Some(impact) = alert.context_str("businessImpact") {
        facts.push(("Business Impact", impact.to_string()));
    }
    if let Some(user) = &alert.user_id {
        facts.push(("User", user.clone()));
    }
    if let Some(company) = &alert.company_id {
        facts.push(("Company", company.clone()));
    }
    if let (Some(method), Some(url)) = (&alert.http_method, &alert.http_url) {
        facts.push(("Request", format!("{} {}", method, url)));
    }
    if !alert.trace_id.is_empty() {
        facts.push(("Trace ID", alert.trace_id.clone()));
    }
    if !alert.span_id.is_empty() {
        facts.push(("Span ID", alert.span_id.clone()));
    }
    facts
}
