use chrono::{DateTime, Utc};

use crate::failure::FailureInfo;
use crate::span::{AttributeValue, Attributes, SpanEvent, SpanIds, SpanStatus, TraceSpan, Tracer};

const ZERO_TRACE_ID: &str = "00000000000000000000000000000000";
const ZERO_SPAN_ID: &str = "0000000000000000";

/// Discards everything except attributes, which stay readable for context extraction.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn start_span(&self, name: &str) -> Box<dyn TraceSpan> {
        Box::new(NoopSpan {
            name: name.to_string(),
            start_time: Utc::now(),
            attributes: Attributes::new(),
        })
    }
}

struct NoopSpan {
    name: String,
    start_time: DateTime<Utc>,
    attributes: Attributes,
}

impl TraceSpan for NoopSpan {
    fn name(&self) -> &str {
        &self.name
    }

    fn ids(&self) -> SpanIds {
        SpanIds {
            trace_id: ZERO_TRACE_ID.to_string(),
            span_id: ZERO_SPAN_ID.to_string(),
        }
    }

    fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn set_attributes(&mut self, attributes: Vec<(String, AttributeValue)>) {
        self.attributes.extend(attributes);
    }

    fn add_event(&mut self, _event: &SpanEvent) {}

    fn set_status(&mut self, _status: SpanStatus) {}

    fn record_exception(&mut self, _failure: &FailureInfo) {}

    fn end(&mut self) {}
}
