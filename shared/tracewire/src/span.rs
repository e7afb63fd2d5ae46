//! Tracing backend abstraction

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::failure::FailureInfo;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s) => f.write_str(s),
            AttributeValue::Int(n) => write!(f, "{}", n),
            AttributeValue::Float(n) => write!(f, "{}", n),
            AttributeValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        AttributeValue::Int(n)
    }
}

impl From<usize> for AttributeValue {
    fn from(n: usize) -> Self {
        AttributeValue::Int(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl From<f64> for AttributeValue {
    fn from(n: f64) -> Self {
        AttributeValue::Float(n)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

pub type Attributes = BTreeMap<String, AttributeValue>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanEvent {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub attributes: Attributes,
}

impl SpanEvent {
    pub fn now(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timestamp: Utc::now(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusCode {
    Unset,
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpanStatus {
    pub code: StatusCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SpanStatus {
    pub fn unset() -> Self {
        Self {
            code: StatusCode::Unset,
            message: None,
        }
    }

    pub fn ok() -> Self {
        Self {
            code: StatusCode::Ok,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::Error,
            message: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.code == StatusCode::Error
    }
}

/// Hex-encoded identifiers of a span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanIds {
    pub trace_id: String,
    pub span_id: String,
}

/// A tracing backend able to open spans.
pub trait Tracer: Send + Sync {
    fn start_span(&self, name: &str) -> Box<dyn TraceSpan>;
}

/// An open span, exclusively owned by one invocation.
pub trait TraceSpan: Send + Sync {
    fn name(&self) -> &str;

    fn ids(&self) -> SpanIds;

    fn start_time(&self) -> DateTime<Utc>;

    /// Attributes set so far.
    fn attributes(&self) -> &Attributes;

    fn set_attributes(&mut self, attributes: Vec<(String, AttributeValue)>);

    fn set_attribute(&mut self, key: &str, value: AttributeValue) {
        self.set_attributes(vec![(key.to_string(), value)]);
    }

    fn add_event(&mut self, event: &SpanEvent);

    fn set_status(&mut self, status: SpanStatus);

    fn record_exception(&mut self, failure: &FailureInfo);

    fn end(&mut self);

    /// OpenTelemetry context carrying this span, for backends that have one.
    fn otel_context(&self) -> Option<opentelemetry::Context> {
        None
    }
}
