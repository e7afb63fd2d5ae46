//! Request/response/error body capture for span attributes

use serde_json::Value;

use crate::config::{DEFAULT_MAX_BODY_SIZE, DEFAULT_SENSITIVE_FIELDS};
use crate::serializer::{redact_json, to_json, SerializeOptions};
use crate::value::TraceValue;

pub const TRUNCATION_MARKER: &str = "...[TRUNCATED]";

/// Depth limit used while serializing captured bodies.
pub const DEFAULT_BODY_DEPTH: usize = 10;

/// Fields checked, in order, for the payload of a request-like or result object.
pub const PAYLOAD_FIELDS: [&str; 6] = [
    "body",
    "data",
    "payload",
    "requestBody",
    "responseBody",
    "errorBody",
];

/// Presence of any of these marks an argument as an HTTP request.
pub const REQUEST_FIELDS: [&str; 7] = ["body", "params", "query", "headers", "method", "url", "path"];

#[derive(Debug, Clone)]
pub struct BodyCaptureConfig {
    pub max_body_size: usize,
    pub sensitive_fields: Vec<String>,
    pub max_depth: usize,
}

impl Default for BodyCaptureConfig {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            sensitive_fields: DEFAULT_SENSITIVE_FIELDS.iter().map(|s| s.to_string()).collect(),
            max_depth: DEFAULT_BODY_DEPTH,
        }
    }
}

/// Produce a redacted, size-bounded textual body for `candidate`, or `None` when there is
/// nothing worth capturing.
pub fn extract_body(candidate: &TraceValue, config: &BodyCaptureConfig) -> Option<String> {
    if !candidate.is_truthy() {
        return None;
    }

    let payload = select_payload(candidate);
    let text = match &payload {
        TraceValue::String(s) => s.clone(),
        other => {
            let options = SerializeOptions {
                max_depth: Some(config.max_depth),
                redact_fields: config.sensitive_fields.clone(),
            };
            match to_json(other, &options).map(|json| serde_json::to_string(&json)) {
                Ok(Ok(text)) => text,
                _ => other.to_string(),
            }
        }
    };

    let text = redact_text(text, &config.sensitive_fields);
    Some(truncate(text, config.max_body_size))
}

pub fn looks_like_request(value: &TraceValue) -> bool {
    value
        .as_object()
        .is_some_and(|obj| REQUEST_FIELDS.iter().any(|field| obj.contains_key(field)))
}

fn select_payload(candidate: &TraceValue) -> TraceValue {
    if let Some(obj) = candidate.as_object() {
        for field in PAYLOAD_FIELDS {
            if let Some(value) = obj.get(field).filter(TraceValue::is_truthy) {
                return value;
            }
        }
    }
    candidate.clone()
}

// String payloads skip the serializer, so JSON text gets a second redaction pass.
fn redact_text(text: String, fragments: &[String]) -> String {
    if fragments.is_empty() {
        return text;
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(mut json @ (Value::Object(_) | Value::Array(_))) => {
            redact_json(&mut json, fragments);
            serde_json::to_string(&json).unwrap_or(text)
        }
        _ => text,
    }
}

fn truncate(text: String, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text,
    }
}
