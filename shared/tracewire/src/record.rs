//! Span completion records

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use crate::span::{Attributes, SpanEvent, SpanStatus, TraceSpan};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedError {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// One structured record per wrapped invocation. `error` is present exactly when the status
/// is an error.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanRecord {
    pub span_id: String,
    pub trace_id: String,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub attributes: Attributes,
    pub events: Vec<SpanEvent>,
    pub status: SpanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RecordedError>,
    pub duration_ms: f64,
}

impl SpanRecord {
    pub fn new(
        span: &dyn TraceSpan,
        events: Vec<SpanEvent>,
        outcome: Result<(), RecordedError>,
        duration_ms: f64,
    ) -> Self {
        let ids = span.ids();
        let (status, error) = match outcome {
            Ok(()) => (SpanStatus::ok(), None),
            Err(e) => (SpanStatus::error(e.message.clone()), Some(e)),
        };
        Self {
            span_id: ids.span_id,
            trace_id: ids.trace_id,
            name: span.name().to_string(),
            start_time: span.start_time(),
            attributes: span.attributes().clone(),
            events,
            status,
            error,
            duration_ms,
        }
    }
}

/// Destination of completion records.
pub trait SpanRecordSink: Send + Sync {
    fn emit(&self, record: &SpanRecord);
}

/// Writes each record as one structured log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRecordSink;

impl SpanRecordSink for LogRecordSink {
    fn emit(&self, record: &SpanRecord) {
        let payload = serde_json::to_string(record).unwrap_or_default();
        match &record.error {
            Some(e) => error!(
                span = %record.name,
                trace_id = %record.trace_id,
                span_id = %record.span_id,
                duration_ms = record.duration_ms,
                error_type = %e.error_type,
                record = %payload,
                "Span completed with error"
            ),
            None => info!(
                span = %record.name,
                trace_id = %record.trace_id,
                span_id = %record.span_id,
                duration_ms = record.duration_ms,
                record = %payload,
                "Span completed"
            ),
        }
    }
}
