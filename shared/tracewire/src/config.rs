//! Per-operation trace configuration

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::body::{BodyCaptureConfig, DEFAULT_BODY_DEPTH};

pub const DEFAULT_MAX_BODY_SIZE: usize = 1000;

pub const DEFAULT_SENSITIVE_FIELDS: [&str; 5] = ["password", "token", "secret", "key", "authorization"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusinessImpact {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl BusinessImpact {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessImpact::Low => "low",
            BusinessImpact::Medium => "medium",
            BusinessImpact::High => "high",
            BusinessImpact::Critical => "critical",
        }
    }
}

impl fmt::Display for BusinessImpact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-facing options. Every field is optional; unset fields take the defaults of
/// [`TraceConfig::new`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TraceOptions {
    pub alert_on_error: Option<bool>,
    pub alert_on_critical_error: Option<bool>,
    pub severity: Option<Severity>,
    pub business_impact: Option<BusinessImpact>,
    pub user_affected: Option<bool>,
    pub custom_context: Option<Map<String, Value>>,
    pub span_name: Option<String>,
    pub include_args: Option<bool>,
    pub include_user_context: Option<bool>,
    pub include_http_context: Option<bool>,
    pub include_request_body: Option<bool>,
    pub include_response_body: Option<bool>,
    pub include_error_body: Option<bool>,
    pub max_body_size: Option<usize>,
    pub sensitive_fields: Option<Vec<String>>,
}

impl TraceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn business_impact(mut self, impact: BusinessImpact) -> Self {
        self.business_impact = Some(impact);
        self
    }

    pub fn user_affected(mut self, affected: bool) -> Self {
        self.user_affected = Some(affected);
        self
    }

    pub fn span_name(mut self, name: impl Into<String>) -> Self {
        self.span_name = Some(name.into());
        self
    }

    pub fn alert_on_error(mut self, enabled: bool) -> Self {
        self.alert_on_error = Some(enabled);
        self
    }

    pub fn alert_on_critical_error(mut self, enabled: bool) -> Self {
        self.alert_on_critical_error = Some(enabled);
        self
    }

    pub fn custom(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom_context
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = Some(size);
        self
    }

    pub fn sensitive_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sensitive_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Turn every capture (`args`, user/http context, bodies) on or off at once.
    pub fn capture(mut self, enabled: bool) -> Self {
        self.include_args = Some(enabled);
        self.include_user_context = Some(enabled);
        self.include_http_context = Some(enabled);
        self.include_request_body = Some(enabled);
        self.include_response_body = Some(enabled);
        self.include_error_body = Some(enabled);
        self
    }

    /// Merge over the defaults for the operation `owner.member`.
    pub fn resolve(self, owner: &str, member: &str) -> TraceConfig {
        let defaults = TraceConfig::new(owner, member);
        TraceConfig {
            span_name: self.span_name.unwrap_or(defaults.span_name),
            alert_on_error: self.alert_on_error.unwrap_or(defaults.alert_on_error),
            alert_on_critical_error: self
                .alert_on_critical_error
                .unwrap_or(defaults.alert_on_critical_error),
            severity: self.severity.unwrap_or(defaults.severity),
            business_impact: self.business_impact.unwrap_or(defaults.business_impact),
            user_affected: self.user_affected.unwrap_or(defaults.user_affected),
            custom_context: self.custom_context.unwrap_or(defaults.custom_context),
            include_args: self.include_args.unwrap_or(defaults.include_args),
            include_user_context: self
                .include_user_context
                .unwrap_or(defaults.include_user_context),
            include_http_context: self
                .include_http_context
                .unwrap_or(defaults.include_http_context),
            include_request_body: self
                .include_request_body
                .unwrap_or(defaults.include_request_body),
            include_response_body: self
                .include_response_body
                .unwrap_or(defaults.include_response_body),
            include_error_body: self.include_error_body.unwrap_or(defaults.include_error_body),
            max_body_size: self.max_body_size.unwrap_or(defaults.max_body_size),
            sensitive_fields: self.sensitive_fields.unwrap_or(defaults.sensitive_fields),
            owner: defaults.owner,
            member: defaults.member,
        }
    }
}

/// Resolved, immutable configuration of one wrapped operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceConfig {
    pub owner: String,
    pub member: String,
    pub span_name: String,
    pub alert_on_error: bool,
    pub alert_on_critical_error: bool,
    pub severity: Severity,
    pub business_impact: BusinessImpact,
    pub user_affected: bool,
    pub custom_context: Map<String, Value>,
    pub include_args: bool,
    pub include_user_context: bool,
    pub include_http_context: bool,
    pub include_request_body: bool,
    pub include_response_body: bool,
    pub include_error_body: bool,
    pub max_body_size: usize,
    pub sensitive_fields: Vec<String>,
}

impl TraceConfig {
    pub fn new(owner: impl Into<String>, member: impl Into<String>) -> Self {
        let owner = owner.into();
        let member = member.into();
        Self {
            span_name: format!("{}.{}", owner, member),
            owner,
            member,
            alert_on_error: true,
            alert_on_critical_error: true,
            severity: Severity::Medium,
            business_impact: BusinessImpact::Medium,
            user_affected: false,
            custom_context: Map::new(),
            include_args: true,
            include_user_context: true,
            include_http_context: true,
            include_request_body: true,
            include_response_body: true,
            include_error_body: true,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            sensitive_fields: DEFAULT_SENSITIVE_FIELDS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn body_capture(&self) -> BodyCaptureConfig {
        BodyCaptureConfig {
            max_body_size: self.max_body_size,
            sensitive_fields: self.sensitive_fields.clone(),
            max_depth: DEFAULT_BODY_DEPTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = TraceConfig::new("UserService", "findUser");

        assert_eq!(config.span_name, "UserService.findUser");
        assert!(config.alert_on_error && config.alert_on_critical_error);
        assert_eq!(config.severity, Severity::Medium);
        assert_eq!(config.business_impact, BusinessImpact::Medium);
        assert!(!config.user_affected);
        assert!(config.include_args && config.include_request_body && config.include_error_body);
        assert_eq!(config.max_body_size, 1000);
        assert_eq!(
            config.sensitive_fields,
            vec!["password", "token", "secret", "key", "authorization"]
        );
    }

    #[test]
    fn test_options_override_defaults() {
        let config = TraceOptions::new()
            .severity(Severity::High)
            .span_name("users.lookup")
            .custom("region", "eu")
            .capture(false)
            .resolve("UserService", "findUser");

        assert_eq!(config.span_name, "users.lookup");
        assert_eq!(config.severity, Severity::High);
        assert_eq!(config.business_impact, BusinessImpact::Medium);
        assert_eq!(config.custom_context.get("region"), Some(&json!("eu")));
        assert!(!config.include_args && !config.include_response_body);
        assert_eq!(config.owner, "UserService");
    }

    #[test]
    fn test_options_deserialize_from_json() {
        let options: TraceOptions = serde_json::from_value(json!({
            "severity": "critical",
            "businessImpact": "high",
            "includeRequestBody": false,
            "sensitiveFields": ["ssn"]
        }))
        .unwrap();
        let config = options.resolve("Billing", "charge");

        assert_eq!(config.severity, Severity::Critical);
        assert_eq!(config.business_impact, BusinessImpact::High);
        assert!(!config.include_request_body);
        assert!(config.include_response_body);
        assert_eq!(config.sensitive_fields, vec!["ssn"]);
    }
}
