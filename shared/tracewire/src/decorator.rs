//! Operation wrapper: span lifecycle, body capture, classification and alert dispatch
//!
//! ```ignore
//! let find_user = wrap_operation(
//!     |(id,): (String,)| async move { repo.find(&id).await },
//!     TraceConfig::new("UserService", "findUser"),
//!     Arc::new(OtelTracer::default()),
//!     Some(dispatcher),
//! );
//! let user = find_user.call(("u1".to_string(),)).await?;
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt as _;
use opentelemetry::trace::FutureExt as _;
use serde_json::{json, Value};
use tracing::{debug, error, warn};
use tracewire_alerts::{AlertDispatcher, AlertKind, AlertPayload, ErrorDetails};

use crate::body::{extract_body, looks_like_request, BodyCaptureConfig};
use crate::classifier::is_critical;
use crate::config::TraceConfig;
use crate::context::{extract_http_context, extract_user_context};
use crate::failure::{Failure, FailureInfo};
use crate::record::{LogRecordSink, RecordedError, SpanRecord, SpanRecordSink};
use crate::span::{AttributeValue, SpanEvent, SpanStatus, TraceSpan, Tracer};
use crate::value::{TraceArgs, TraceObject, TraceValue, Traceable};

/// Argument fields copied onto the span as `arg.<index>.<field>`.
pub const SAFE_ARG_FIELDS: [&str; 7] = ["id", "type", "status", "name", "code", "userId", "companyId"];

const URL_FIELDS: [&str; 3] = ["url", "originalUrl", "path"];

/// `error.type` recorded when the wrapped operation panics.
pub const PANIC_TYPE: &str = "Panic";

type AttributeList = Vec<(String, AttributeValue)>;

/// Shared tracing services injected into every wrapped operation.
#[derive(Clone)]
pub struct OperationTracer {
    tracer: Arc<dyn Tracer>,
    alerts: Option<Arc<AlertDispatcher>>,
    sink: Arc<dyn SpanRecordSink>,
}

impl OperationTracer {
    pub fn new(tracer: Arc<dyn Tracer>) -> Self {
        Self {
            tracer,
            alerts: None,
            sink: Arc::new(LogRecordSink),
        }
    }

    pub fn with_alerts(mut self, dispatcher: Arc<AlertDispatcher>) -> Self {
        self.alerts = Some(dispatcher);
        self
    }

    pub fn with_record_sink(mut self, sink: Arc<dyn SpanRecordSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn wrap<F>(&self, op: F, config: TraceConfig) -> TracedOperation<F> {
        TracedOperation {
            op,
            config: Arc::new(config),
            tracer: self.clone(),
        }
    }

    /// Run `op(args)` inside a span. The operation's result is returned unchanged.
    pub async fn run<A, T, E, F, Fut>(&self, config: &TraceConfig, args: A, op: F) -> Result<T, E>
    where
        A: TraceArgs,
        T: Traceable,
        E: Failure,
        F: FnOnce(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let capture = config.body_capture();
        let mut span = self.tracer.start_span(&config.span_name);
        let mut events = Vec::new();

        {
            let arg_values = args.trace_args();
            span.set_attributes(baseline_attributes(config, arg_values.len()));
            if config.include_args {
                span.set_attributes(safe_arg_attributes(&arg_values));
            }
            if config.include_user_context {
                span.set_attributes(request_user_attributes(&arg_values));
            }
            if config.include_http_context {
                span.set_attributes(request_http_attributes(&arg_values));
            }
            if config.include_request_body {
                if let Some(body) = arg_values
                    .iter()
                    .filter(|arg| looks_like_request(arg))
                    .find_map(|arg| extract_body(arg, &capture))
                {
                    span.set_attributes(body_attributes("request.body", body));
                }
            }
        }
        record_event(span.as_mut(), &mut events, SpanEvent::now("start"));

        let invoke = async move { op(args).await };
        let settled = match span.otel_context() {
            Some(cx) => AssertUnwindSafe(invoke.with_context(cx)).catch_unwind().await,
            None => AssertUnwindSafe(invoke).catch_unwind().await,
        };
        let result = match settled {
            Ok(result) => result,
            Err(payload) => {
                self.on_panic(config, span, events, payload.as_ref(), started);
                panic::resume_unwind(payload);
            }
        };

        // Only owned data crosses the alert await below.
        let failure = match &result {
            Ok(value) => {
                if config.include_response_body {
                    if let Some(body) = extract_body(&value.to_trace_value(), &capture) {
                        span.set_attributes(body_attributes("response.body", body));
                    }
                }
                None
            }
            Err(err) => Some((err.describe(), err.failure_body())),
        };

        let outcome = match failure {
            None => {
                record_event(span.as_mut(), &mut events, SpanEvent::now("success"));
                span.set_status(SpanStatus::ok());
                Ok(())
            }
            Some((info, body)) => {
                let recorded = self
                    .on_failure(config, span.as_mut(), &mut events, &capture, info, body, started)
                    .await;
                Err(recorded)
            }
        };

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        let record = SpanRecord::new(span.as_ref(), events, outcome, duration_ms);
        self.sink.emit(&record);
        span.end();

        result
    }

    /// Close out a span whose operation panicked. No alert is sent; the panic is resumed by the caller.
    fn on_panic(
        &self,
        config: &TraceConfig,
        mut span: Box<dyn TraceSpan>,
        mut events: Vec<SpanEvent>,
        payload: &(dyn Any + Send),
        started: Instant,
    ) {
        let info = FailureInfo {
            message: panic_message(payload),
            type_name: Some(PANIC_TYPE.to_string()),
            stack: None,
            critical: false,
            severity: None,
        };
        error!(span = %config.span_name, panic = %info.message, "Traced operation panicked");

        span.set_attributes(vec![
            ("error".to_string(), true.into()),
            ("error.type".to_string(), PANIC_TYPE.into()),
            ("error.message".to_string(), info.message.clone().into()),
        ]);
        record_event(
            span.as_mut(),
            &mut events,
            SpanEvent::now("failure").with_attribute("error.type", PANIC_TYPE),
        );
        span.set_status(SpanStatus::error(info.message.clone()));
        span.record_exception(&info);

        let recorded = RecordedError {
            message: info.message,
            error_type: PANIC_TYPE.to_string(),
            stack: None,
        };
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        let record = SpanRecord::new(span.as_ref(), events, Err(recorded), duration_ms);
        self.sink.emit(&record);
        span.end();
    }

    #[allow(clippy::too_many_arguments)]
    async fn on_failure(
        &self,
        config: &TraceConfig,
        span: &mut dyn TraceSpan,
        events: &mut Vec<SpanEvent>,
        capture: &BodyCaptureConfig,
        info: FailureInfo,
        body: TraceValue,
        started: Instant,
    ) -> RecordedError {
        span.set_attributes(vec![
            ("error".to_string(), true.into()),
            ("error.type".to_string(), info.error_type().into()),
            ("error.message".to_string(), info.message.clone().into()),
        ]);
        if config.include_error_body {
            if let Some(text) = extract_body(&body, capture) {
                span.set_attributes(body_attributes("error.body", text));
            }
        }
        record_event(
            span,
            events,
            SpanEvent::now("failure").with_attribute("error.type", info.error_type()),
        );
        span.set_status(SpanStatus::error(info.message.clone()));
        span.record_exception(&info);

        let critical = is_critical(&info, config);
        span.set_attribute("error.critical", critical.into());
        self.alert(config, span, &info, critical, started).await;

        RecordedError {
            message: info.message.clone(),
            error_type: info.error_type().to_string(),
            stack: info.stack,
        }
    }

    async fn alert(
        &self,
        config: &TraceConfig,
        span: &dyn TraceSpan,
        info: &FailureInfo,
        critical: bool,
        started: Instant,
    ) {
        let kind = if critical && config.alert_on_critical_error {
            AlertKind::Critical
        } else if config.alert_on_error {
            AlertKind::Error
        } else {
            debug!(span = %config.span_name, "Alerting disabled for operation");
            return;
        };

        let Some(dispatcher) = &self.alerts else {
            warn!(span = %config.span_name, kind = %kind, "No alert dispatcher configured, alert dropped");
            return;
        };

        let payload = alert_payload(config, span, info, critical, started);
        let send = async {
            match kind {
                AlertKind::Critical => dispatcher.send_critical_error_alert(&payload).await,
                _ => dispatcher.send_error_alert(&payload).await,
            }
        };
        if AssertUnwindSafe(send).catch_unwind().await.is_err() {
            error!(span = %config.span_name, kind = %kind, "Alert dispatch panicked");
        }
    }
}

/// An operation bound to its configuration and tracing services.
pub struct TracedOperation<F> {
    op: F,
    config: Arc<TraceConfig>,
    tracer: OperationTracer,
}

impl<F> TracedOperation<F> {
    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    pub async fn call<A, T, E, Fut>(&self, args: A) -> Result<T, E>
    where
        F: Fn(A) -> Fut,
        A: TraceArgs,
        T: Traceable,
        E: Failure,
        Fut: Future<Output = Result<T, E>>,
    {
        self.tracer.run(&self.config, args, &self.op).await
    }
}

pub fn wrap_operation<F>(
    op: F,
    config: TraceConfig,
    tracer: Arc<dyn Tracer>,
    alerts: Option<Arc<AlertDispatcher>>,
) -> TracedOperation<F> {
    let mut services = OperationTracer::new(tracer);
    services.alerts = alerts;
    services.wrap(op, config)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "operation panicked".to_string()
    }
}

fn record_event(span: &mut dyn TraceSpan, events: &mut Vec<SpanEvent>, event: SpanEvent) {
    span.add_event(&event);
    events.push(event);
}

fn baseline_attributes(config: &TraceConfig, arg_count: usize) -> AttributeList {
    let mut attrs: AttributeList = vec![
        ("code.namespace".into(), config.owner.clone().into()),
        ("code.function".into(), config.member.clone().into()),
        ("operation.args.count".into(), arg_count.into()),
        ("operation.severity".into(), config.severity.as_str().into()),
        ("operation.business_impact".into(), config.business_impact.as_str().into()),
        ("operation.user_affected".into(), config.user_affected.into()),
    ];
    for (key, value) in &config.custom_context {
        attrs.push((format!("custom.{}", key), json_attribute(value)));
    }
    attrs
}

fn json_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::String(s) => AttributeValue::String(s.clone()),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Int(i),
            None => AttributeValue::Float(n.as_f64().unwrap_or_default()),
        },
        other => AttributeValue::String(other.to_string()),
    }
}

fn primitive_attribute(value: &TraceValue) -> Option<AttributeValue> {
    match value {
        TraceValue::String(s) => Some(AttributeValue::String(s.clone())),
        TraceValue::Int(n) => Some(AttributeValue::Int(*n)),
        TraceValue::Float(n) => Some(AttributeValue::Float(*n)),
        TraceValue::Bool(b) => Some(AttributeValue::Bool(*b)),
        _ => None,
    }
}

fn first_primitive(obj: &TraceObject, keys: &[&str]) -> Option<AttributeValue> {
    keys.iter()
        .find_map(|key| obj.get(key).as_ref().and_then(primitive_attribute))
}

fn safe_arg_attributes(args: &[TraceValue]) -> AttributeList {
    let mut attrs = Vec::new();
    for (index, arg) in args.iter().enumerate() {
        let Some(obj) = arg.as_object() else { continue };
        for field in SAFE_ARG_FIELDS {
            if let Some(value) = first_primitive(obj, &[field]) {
                attrs.push((format!("arg.{}.{}", index, field), value));
            }
        }
    }
    attrs
}

fn request_user_attributes(args: &[TraceValue]) -> AttributeList {
    let user = args
        .iter()
        .filter(|arg| looks_like_request(arg))
        .find_map(|arg| arg.as_object()?.get("user"));
    let Some(TraceValue::Object(user)) = user else {
        return Vec::new();
    };

    let mut attrs = Vec::new();
    if let Some(id) = first_primitive(&user, &["id", "userId"]) {
        attrs.push(("user.id".to_string(), id));
    }
    if let Some(company) = first_primitive(&user, &["companyId", "company_id"]) {
        attrs.push(("company.id".to_string(), company));
    }
    attrs
}

fn request_http_attributes(args: &[TraceValue]) -> AttributeList {
    let Some(request) = args
        .iter()
        .find(|arg| looks_like_request(arg))
        .and_then(TraceValue::as_object)
    else {
        return Vec::new();
    };

    let mut attrs = Vec::new();
    if let Some(method) = first_primitive(request, &["method"]) {
        attrs.push(("http.method".to_string(), method));
    }
    if let Some(url) = first_primitive(request, &URL_FIELDS) {
        attrs.push(("http.url".to_string(), url));
    }
    attrs
}

fn body_attributes(prefix: &str, body: String) -> AttributeList {
    let size = body.chars().count();
    vec![
        (prefix.to_string(), body.into()),
        (format!("{}.size", prefix), size.into()),
    ]
}

fn alert_payload(
    config: &TraceConfig,
    span: &dyn TraceSpan,
    info: &FailureInfo,
    critical: bool,
    started: Instant,
) -> AlertPayload {
    let ids = span.ids();
    let user = extract_user_context(span.attributes());
    let http = extract_http_context(span.attributes());

    let mut details = ErrorDetails::new(info.message.clone(), info.error_type());
    if let Some(stack) = &info.stack {
        details = details.with_stack(stack.clone());
    }

    AlertPayload::new(details, config.owner.clone(), config.member.clone())
        .with_trace(ids.trace_id, ids.span_id)
        .with_user(user.user_id, user.company_id)
        .with_http(http.method, http.url)
        .with_context("severity", config.severity.as_str())
        .with_context("businessImpact", config.business_impact.as_str())
        .with_context("userAffected", config.user_affected)
        .with_context("critical", critical)
        .with_context("customContext", Value::Object(config.custom_context.clone()))
        .with_context(
            "spanTiming",
            json!({
                "spanName": config.span_name,
                "startTime": span.start_time().to_rfc3339(),
                "elapsedMs": started.elapsed().as_secs_f64() * 1000.0,
            }),
        )
}
