//! OpenTelemetry tracer adapter

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use opentelemetry::global::{self, BoxedTracer};
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer as _};
use opentelemetry::{Context, KeyValue};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::failure::FailureInfo;
use crate::span::{AttributeValue, Attributes, SpanEvent, SpanIds, SpanStatus, StatusCode, TraceSpan, Tracer};

pub const DEFAULT_TRACER_NAME: &str = "tracewire";

/// Opens spans on an OpenTelemetry tracer. Spans are parented on the current `tracing` span,
/// so they nest under whatever `tracing-opentelemetry` is exporting.
pub struct OtelTracer {
    tracer: BoxedTracer,
}

impl OtelTracer {
    /// Tracer named `name` from the globally installed provider.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            tracer: global::tracer(name),
        }
    }

    pub fn from_tracer(tracer: BoxedTracer) -> Self {
        Self { tracer }
    }
}

impl Default for OtelTracer {
    fn default() -> Self {
        Self::new(DEFAULT_TRACER_NAME)
    }
}

impl Tracer for OtelTracer {
    fn start_span(&self, name: &str) -> Box<dyn TraceSpan> {
        let parent = tracing::Span::current().context();
        let span = self
            .tracer
            .span_builder(name.to_string())
            .with_kind(SpanKind::Internal)
            .start_with_context(&self.tracer, &parent);

        Box::new(OtelSpan {
            cx: parent.with_span(span),
            name: name.to_string(),
            start_time: Utc::now(),
            attributes: Attributes::new(),
        })
    }
}

struct OtelSpan {
    cx: Context,
    name: String,
    start_time: DateTime<Utc>,
    attributes: Attributes,
}

fn key_value(key: String, value: AttributeValue) -> KeyValue {
    match value {
        AttributeValue::String(s) => KeyValue::new(key, s),
        AttributeValue::Int(n) => KeyValue::new(key, n),
        AttributeValue::Float(n) => KeyValue::new(key, n),
        AttributeValue::Bool(b) => KeyValue::new(key, b),
    }
}

impl TraceSpan for OtelSpan {
    fn name(&self) -> &str {
        &self.name
    }

    fn ids(&self) -> SpanIds {
        let span = self.cx.span();
        let span_context = span.span_context();
        SpanIds {
            trace_id: span_context.trace_id().to_string(),
            span_id: span_context.span_id().to_string(),
        }
    }

    fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn set_attributes(&mut self, attributes: Vec<(String, AttributeValue)>) {
        let span = self.cx.span();
        for (key, value) in attributes {
            span.set_attribute(key_value(key.clone(), value.clone()));
            self.attributes.insert(key, value);
        }
    }

    fn add_event(&mut self, event: &SpanEvent) {
        let attributes = event
            .attributes
            .iter()
            .map(|(k, v)| key_value(k.clone(), v.clone()))
            .collect();
        self.cx.span().add_event(event.name.clone(), attributes);
    }

    fn set_status(&mut self, status: SpanStatus) {
        let status = match status.code {
            StatusCode::Unset => Status::Unset,
            StatusCode::Ok => Status::Ok,
            StatusCode::Error => Status::Error {
                description: status.message.unwrap_or_default().into(),
            },
        };
        self.cx.span().set_status(status);
    }

    fn record_exception(&mut self, failure: &FailureInfo) {
        let mut attributes = vec![
            KeyValue::new("exception.type", failure.error_type().to_string()),
            KeyValue::new("exception.message", failure.message.clone()),
        ];
        if let Some(stack) = &failure.stack {
            attributes.push(KeyValue::new("exception.stacktrace", stack.clone()));
        }
        self.cx.span().add_event("exception", attributes);
    }

    fn end(&mut self) {
        self.cx.span().end();
    }

    fn otel_context(&self) -> Option<Context> {
        Some(self.cx.clone())
    }
}
