use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::{json, Value};
use tracewire::{
    wrap_operation, AttributeValue, InMemoryTracer, NoopTracer, OperationTracer, SpanRecord,
    SpanRecordSink, StatusCode, TraceConfig, TraceObject, TraceOptions, TraceValue, PANIC_TYPE,
};
use tracewire_alerts::{AlertDispatcher, AlertPayload, AlertResult, Delivery, NotificationProvider};
use tracewire_core::ServiceError;

#[derive(Clone, Default)]
struct RecordingProvider {
    sent: Arc<Mutex<Vec<(&'static str, AlertPayload)>>>,
}

impl RecordingProvider {
    fn kinds(&self) -> Vec<&'static str> {
        self.sent.lock().unwrap().iter().map(|(kind, _)| *kind).collect()
    }

    fn last_payload(&self) -> Option<AlertPayload> {
        self.sent.lock().unwrap().last().map(|(_, p)| p.clone())
    }
}

#[async_trait]
impl NotificationProvider for RecordingProvider {
    fn provider_name(&self) -> &str {
        "recording"
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn send_error_alert(&self, alert: &AlertPayload) -> AlertResult<Delivery> {
        self.sent.lock().unwrap().push(("error", alert.clone()));
        Ok(Delivery::Delivered)
    }

    async fn send_critical_error_alert(&self, alert: &AlertPayload) -> AlertResult<Delivery> {
        self.sent.lock().unwrap().push(("critical", alert.clone()));
        Ok(Delivery::Delivered)
    }

    async fn send_batch_error_alerts(&self, _alerts: &[AlertPayload]) -> AlertResult<Delivery> {
        Ok(Delivery::Delivered)
    }
}

#[derive(Default)]
struct CollectingSink {
    records: Mutex<Vec<SpanRecord>>,
}

impl SpanRecordSink for CollectingSink {
    fn emit(&self, record: &SpanRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}

struct Harness {
    tracer: InMemoryTracer,
    provider: RecordingProvider,
    sink: Arc<CollectingSink>,
    services: OperationTracer,
}

fn harness() -> Harness {
    let tracer = InMemoryTracer::new();
    let provider = RecordingProvider::default();
    let sink = Arc::new(CollectingSink::default());
    let dispatcher = AlertDispatcher::builder()
        .provider(Arc::new(provider.clone()))
        .build();
    let services = OperationTracer::new(Arc::new(tracer.clone()))
        .with_alerts(Arc::new(dispatcher))
        .with_record_sink(sink.clone());
    Harness {
        tracer,
        provider,
        sink,
        services,
    }
}

async fn find_user(id: String) -> Result<Value, anyhow::Error> {
    if id == "u1" {
        Err(anyhow::anyhow!("User not found: {}", id))
    } else {
        Ok(json!({ "id": id, "name": "Ada" }))
    }
}

async fn call_upstream(_: ()) -> Result<(), ServiceError> {
    Err(ServiceError::Timeout("billing did not answer".into()))
}

#[tokio::test]
async fn test_success_returns_value_and_closes_ok_span() {
    let h = harness();
    let op = h.services.wrap(
        |(id,): (String,)| find_user(id),
        TraceConfig::new("UserService", "findUser"),
    );

    let user = op.call(("u2".to_string(),)).await.unwrap();
    assert_eq!(user, json!({ "id": "u2", "name": "Ada" }));

    let span = h.tracer.span_named("UserService.findUser").unwrap();
    assert_eq!(span.status.code, StatusCode::Ok);
    assert_eq!(span.event_names(), vec!["start", "success"]);
    assert_eq!(span.end_count, 1);
    assert_eq!(span.attribute("code.function"), Some(&AttributeValue::from("findUser")));
    assert_eq!(span.attribute("operation.args.count"), Some(&AttributeValue::Int(1)));
    assert_eq!(
        span.attribute("response.body").and_then(AttributeValue::as_str),
        Some(r#"{"id":"u2","name":"Ada"}"#)
    );

    let records = h.sink.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status.code, StatusCode::Ok);
    assert!(records[0].error.is_none());
    assert!(h.provider.kinds().is_empty());
}

#[tokio::test]
async fn test_find_user_failure_rethrows_and_sends_ordinary_alert() {
    let h = harness();
    let op = h.services.wrap(
        |(id,): (String,)| find_user(id),
        TraceConfig::new("UserService", "findUser"),
    );

    let err = op.call(("u1".to_string(),)).await.unwrap_err();
    assert_eq!(err.to_string(), "User not found: u1");

    assert_eq!(h.provider.kinds(), vec!["error"]);
    let payload = h.provider.last_payload().unwrap();
    assert_eq!(payload.service_name, "UserService");
    assert_eq!(payload.operation_name, "findUser");
    assert_eq!(payload.error.message, "User not found: u1");
    assert_eq!(payload.context_str("severity"), Some("medium"));

    let span = h.tracer.span_named("UserService.findUser").unwrap();
    assert_eq!(span.status.code, StatusCode::Error);
    assert_eq!(span.status.message.as_deref(), Some("User not found: u1"));
    assert_eq!(span.event_names(), vec!["start", "failure"]);
    assert_eq!(span.exceptions.len(), 1);
    assert_eq!(span.end_count, 1);
    assert_eq!(span.attribute("error"), Some(&AttributeValue::Bool(true)));
    assert_eq!(payload.trace_id, span.ids.trace_id);

    let records = h.sink.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status.code, StatusCode::Error);
    assert_eq!(
        records[0].error.as_ref().map(|e| e.message.as_str()),
        Some("User not found: u1")
    );
}

#[tokio::test]
async fn test_critical_type_takes_critical_path() {
    let h = harness();
    let op = h.services.wrap(call_upstream, TraceConfig::new("Billing", "charge"));

    let err = op.call(()).await.unwrap_err();
    assert_eq!(err, ServiceError::Timeout("billing did not answer".into()));
    assert_eq!(h.provider.kinds(), vec!["critical"]);

    let span = h.tracer.span_named("Billing.charge").unwrap();
    assert_eq!(span.attribute("error.type"), Some(&AttributeValue::from("TimeoutError")));
    assert_eq!(span.attribute("error.critical"), Some(&AttributeValue::Bool(true)));
}

#[tokio::test]
async fn test_critical_alerts_disabled_falls_back_to_ordinary() {
    let h = harness();
    let config = TraceOptions::new()
        .alert_on_critical_error(false)
        .resolve("Billing", "charge");
    let op = h.services.wrap(call_upstream, config);

    assert!(op.call(()).await.is_err());
    assert_eq!(h.provider.kinds(), vec!["error"]);
}

#[tokio::test]
async fn test_alerting_disabled_sends_nothing() {
    let h = harness();
    let config = TraceOptions::new()
        .alert_on_error(false)
        .resolve("UserService", "findUser");
    let op = h.services.wrap(|(id,): (String,)| find_user(id), config);

    assert!(op.call(("u1".to_string(),)).await.is_err());
    assert!(h.provider.kinds().is_empty());
    assert_eq!(h.tracer.finished_spans().len(), 1);
}

#[tokio::test]
async fn test_missing_dispatcher_still_returns_error() {
    let tracer = InMemoryTracer::new();
    let op = wrap_operation(
        |(id,): (String,)| find_user(id),
        TraceConfig::new("UserService", "findUser"),
        Arc::new(tracer.clone()),
        None,
    );

    let err = op.call(("u1".to_string(),)).await.unwrap_err();
    assert_eq!(err.to_string(), "User not found: u1");

    let spans = tracer.finished_spans();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].end_count, 1);
    assert_eq!(spans[0].status.code, StatusCode::Error);
}

#[derive(Debug, thiserror::Error)]
#[error("quota exceeded")]
struct QuotaError;

impl tracewire::Failure for QuotaError {}

#[tokio::test]
async fn test_returned_error_is_the_same_value() {
    let h = harness();
    let original = Arc::new(QuotaError);
    let thrown = Arc::clone(&original);
    let op = h.services.wrap(
        move |_: ()| {
            let thrown = Arc::clone(&thrown);
            async move { Err::<(), _>(thrown) }
        },
        TraceConfig::new("Quota", "check"),
    );

    let err = op.call(()).await.unwrap_err();
    assert!(Arc::ptr_eq(&err, &original));

    let span = h.tracer.span_named("Quota.check").unwrap();
    assert_eq!(span.attribute("error.type"), Some(&AttributeValue::from("QuotaError")));
}

async fn login(request: TraceObject) -> Result<Value, anyhow::Error> {
    let _ = request;
    Err(anyhow::anyhow!("invalid credentials"))
}

#[tokio::test]
async fn test_request_capture_is_redacted_and_feeds_alert_context() {
    let h = harness();
    let body = TraceObject::new()
        .with("username", "bob")
        .with("password", "secret123")
        .with("token", "abc");
    let request = TraceObject::new()
        .with("method", "POST")
        .with("url", "/api/login")
        .with("body", body)
        .with("user", TraceObject::new().with("id", "u9").with("companyId", "c3"));

    let op = h.services.wrap(|(req,): (TraceObject,)| login(req), TraceConfig::new("Auth", "login"));
    assert!(op.call((request,)).await.is_err());

    let span = h.tracer.span_named("Auth.login").unwrap();
    let captured: Value = serde_json::from_str(
        span.attribute("request.body").and_then(AttributeValue::as_str).unwrap(),
    )
    .unwrap();
    assert_eq!(
        captured,
        json!({ "username": "bob", "password": "[REDACTED]", "token": "[REDACTED]" })
    );
    assert_eq!(span.attribute("http.method"), Some(&AttributeValue::from("POST")));

    let payload = h.provider.last_payload().unwrap();
    assert_eq!(payload.user_id.as_deref(), Some("u9"));
    assert_eq!(payload.company_id.as_deref(), Some("c3"));
    assert_eq!(payload.http_url.as_deref(), Some("/api/login"));
}

#[tokio::test]
async fn test_cyclic_argument_is_captured_without_hanging() {
    let h = harness();
    let body = TraceObject::new().with("a", 1);
    body.set("self", body.clone());
    let request = TraceObject::new().with("body", body);

    let op = h.services.wrap(
        |(_req,): (TraceObject,)| async { Ok::<_, String>(TraceValue::Null) },
        TraceConfig::new("Loop", "handle"),
    );
    op.call((request,)).await.unwrap();

    let span = h.tracer.span_named("Loop.handle").unwrap();
    assert_eq!(
        span.attribute("request.body").and_then(AttributeValue::as_str),
        Some(r#"{"a":1,"self":"[CIRCULAR_REFERENCE]"}"#)
    );
}

#[tokio::test]
async fn test_concurrent_calls_own_their_spans() {
    let h = harness();
    let op = h.services.wrap(
        |(id,): (String,)| find_user(id),
        TraceConfig::new("UserService", "findUser"),
    );

    let calls = ["a", "b", "u1"].map(|id| op.call((id.to_string(),)));
    let results = futures_util::future::join_all(calls).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
    let spans = h.tracer.finished_spans();
    assert_eq!(spans.len(), 3);
    assert!(spans.iter().all(|s| s.end_count == 1));
    assert_eq!(h.sink.records.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_noop_tracer_passes_results_through() {
    let op = wrap_operation(
        |(id,): (String,)| find_user(id),
        TraceConfig::new("UserService", "findUser"),
        Arc::new(NoopTracer),
        None,
    );

    assert_eq!(op.call(("u5".to_string(),)).await.unwrap()["id"], "u5");
}

async fn explode(_: ()) -> Result<(), String> {
    panic!("boom")
}

#[tokio::test]
async fn test_panicking_operation_closes_span_and_resumes_panic() {
    let h = harness();
    let op = h.services.wrap(explode, TraceConfig::new("Jobs", "run"));

    let outcome = AssertUnwindSafe(op.call(())).catch_unwind().await;
    let payload = outcome.unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom"));

    let spans = h.tracer.spans();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].end_count, 1);
    assert_eq!(spans[0].status.code, StatusCode::Error);
    assert_eq!(spans[0].status.message.as_deref(), Some("boom"));
    assert_eq!(spans[0].event_names(), vec!["start", "failure"]);
    assert_eq!(spans[0].attribute("error.type"), Some(&AttributeValue::from(PANIC_TYPE)));

    let records = h.sink.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status.code, StatusCode::Error);
    assert_eq!(records[0].error.as_ref().map(|e| e.message.as_str()), Some("boom"));
    assert!(h.provider.kinds().is_empty());
}

async fn reject_with_body(_: ()) -> Result<(), Value> {
    Err(json!({ "message": "x", "apiKey": "k-123" }))
}

#[tokio::test]
async fn test_error_body_is_captured_redacted_with_size() {
    let h = harness();
    let op = h.services.wrap(reject_with_body, TraceConfig::new("Keys", "rotate"));

    assert!(op.call(()).await.is_err());

    let span = h.tracer.span_named("Keys.rotate").unwrap();
    let body = span.attribute("error.body").and_then(AttributeValue::as_str).unwrap();
    let captured: Value = serde_json::from_str(body).unwrap();
    assert_eq!(captured, json!({ "message": "x", "apiKey": "[REDACTED]" }));
    assert_eq!(
        span.attribute("error.body.size"),
        Some(&AttributeValue::Int(body.chars().count() as i64))
    );
}

#[tokio::test]
async fn test_response_body_size_accompanies_body() {
    let h = harness();
    let op = h.services.wrap(
        |(id,): (String,)| find_user(id),
        TraceConfig::new("UserService", "findUser"),
    );

    op.call(("u2".to_string(),)).await.unwrap();

    let span = h.tracer.span_named("UserService.findUser").unwrap();
    let body = span.attribute("response.body").and_then(AttributeValue::as_str).unwrap();
    assert_eq!(
        span.attribute("response.body.size"),
        Some(&AttributeValue::Int(body.chars().count() as i64))
    );
}

fn login_request() -> TraceObject {
    TraceObject::new()
        .with("id", "req-1")
        .with("method", "POST")
        .with("url", "/api/login")
        .with("body", TraceObject::new().with("username", "bob").with("note", "n".repeat(80)))
        .with("user", TraceObject::new().with("id", "u9").with("companyId", "c3"))
}

async fn echo_request(request: TraceObject) -> Result<TraceObject, Value> {
    Ok(request)
}

async fn reject_request(_request: TraceObject) -> Result<TraceObject, Value> {
    Err(json!({ "message": "denied", "reason": "locked" }))
}

const CAPTURED_KEYS: [&str; 7] = [
    "arg.0.id",
    "user.id",
    "company.id",
    "http.method",
    "http.url",
    "request.body",
    "response.body",
];

#[tokio::test]
async fn test_capture_disabled_skips_every_optional_attribute() {
    let h = harness();
    let config = TraceOptions::new().capture(false).resolve("Auth", "login");
    let ok = h.services.wrap(|(req,): (TraceObject,)| echo_request(req), config);
    let failing = h.services.wrap(
        |(req,): (TraceObject,)| reject_request(req),
        TraceOptions::new().capture(false).span_name("Auth.loginDenied").resolve("Auth", "login"),
    );

    ok.call((login_request(),)).await.unwrap();
    assert!(failing.call((login_request(),)).await.is_err());

    let span = h.tracer.span_named("Auth.login").unwrap();
    for key in CAPTURED_KEYS {
        assert!(span.attribute(key).is_none(), "unexpected attribute {}", key);
    }
    assert_eq!(span.attribute("code.function"), Some(&AttributeValue::from("login")));

    let span = h.tracer.span_named("Auth.loginDenied").unwrap();
    assert!(span.attribute("error.body").is_none());
    assert!(span.attribute("error.body.size").is_none());
    assert_eq!(span.attribute("error"), Some(&AttributeValue::Bool(true)));
}

#[tokio::test]
async fn test_capture_flags_are_independent() {
    let h = harness();
    let mut config = TraceConfig::new("Auth", "login");
    config.include_args = false;
    config.include_http_context = false;
    config.include_response_body = false;
    let op = h.services.wrap(|(req,): (TraceObject,)| echo_request(req), config);

    op.call((login_request(),)).await.unwrap();

    let span = h.tracer.span_named("Auth.login").unwrap();
    assert!(span.attribute("arg.0.id").is_none());
    assert!(span.attribute("http.method").is_none());
    assert!(span.attribute("http.url").is_none());
    assert!(span.attribute("response.body").is_none());
    assert_eq!(span.attribute("user.id"), Some(&AttributeValue::from("u9")));
    assert_eq!(span.attribute("company.id"), Some(&AttributeValue::from("c3")));
    assert!(span.attribute("request.body").is_some());

    let mut config = TraceConfig::new("Auth", "check");
    config.include_user_context = false;
    config.include_request_body = false;
    let op = h.services.wrap(|(req,): (TraceObject,)| echo_request(req), config);

    op.call((login_request(),)).await.unwrap();

    let span = h.tracer.span_named("Auth.check").unwrap();
    assert!(span.attribute("user.id").is_none());
    assert!(span.attribute("company.id").is_none());
    assert!(span.attribute("request.body").is_none());
    assert!(span.attribute("request.body.size").is_none());
    assert_eq!(span.attribute("arg.0.id"), Some(&AttributeValue::from("req-1")));
    assert_eq!(span.attribute("http.method"), Some(&AttributeValue::from("POST")));
    assert!(span.attribute("response.body").is_some());
}

#[tokio::test]
async fn test_max_body_size_truncates_captured_bodies() {
    let h = harness();
    let config = TraceOptions::new().max_body_size(20).resolve("Auth", "login");
    let op = h.services.wrap(|(req,): (TraceObject,)| echo_request(req), config);

    op.call((login_request(),)).await.unwrap();

    let span = h.tracer.span_named("Auth.login").unwrap();
    let body = span.attribute("request.body").and_then(AttributeValue::as_str).unwrap();
    assert!(body.ends_with("...[TRUNCATED]"));
    assert_eq!(body.chars().count(), 20 + "...[TRUNCATED]".len());
    assert!(body.starts_with('{'));
    assert_eq!(
        span.attribute("request.body.size"),
        Some(&AttributeValue::Int(body.chars().count() as i64))
    );
}
