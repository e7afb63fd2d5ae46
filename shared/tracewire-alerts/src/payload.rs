//! Alert payload shared by every provider

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Snapshot of the failure that triggered an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    pub message: String,
    pub error_type: String,
    pub stack: Option<String>,
}

impl ErrorDetails {
    pub fn new(message: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: error_type.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    pub id: Uuid,
    pub error: ErrorDetails,
    pub trace_id: String,
    pub span_id: String,
    pub service_name: String,
    pub operation_name: String,
    pub user_id: Option<String>,
    pub company_id: Option<String>,
    pub http_method: Option<String>,
    pub http_url: Option<String>,
    pub additional_context: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl AlertPayload {
    pub fn new(
        error: ErrorDetails,
        service_name: impl Into<String>,
        operation_name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            error,
            trace_id: String::new(),
            span_id: String::new(),
            service_name: service_name.into(),
            operation_name: operation_name.into(),
            user_id: None,
            company_id: None,
            http_method: None,
            http_url: None,
            additional_context: Map::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_trace(mut self, trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self.span_id = span_id.into();
        self
    }

    pub fn with_user(mut self, user_id: Option<String>, company_id: Option<String>) -> Self {
        self.user_id = user_id;
        self.company_id = company_id;
        self
    }

    pub fn with_http(mut self, method: Option<String>, url: Option<String>) -> Self {
        self.http_method = method;
        self.http_url = url;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.additional_context.insert(key.into(), value.into());
        self
    }

    /// Look up a string entry of the additional context.
    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.additional_context.get(key).and_then(Value::as_str)
    }
}
