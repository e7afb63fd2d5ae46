//! Recording tracer for tests and local debugging

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::failure::FailureInfo;
use crate::span::{AttributeValue, Attributes, SpanEvent, SpanIds, SpanStatus, TraceSpan, Tracer};

/// Everything a span received, as seen by the backend.
#[derive(Debug, Clone)]
pub struct RecordedSpan {
    pub name: String,
    pub ids: SpanIds,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub attributes: Attributes,
    pub events: Vec<SpanEvent>,
    pub status: SpanStatus,
    pub exceptions: Vec<FailureInfo>,
    pub end_count: usize,
}

impl RecordedSpan {
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    pub fn event_names(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.name.as_str()).collect()
    }
}

type SharedRecord = Arc<Mutex<RecordedSpan>>;

#[derive(Clone, Default)]
pub struct InMemoryTracer {
    spans: Arc<Mutex<Vec<SharedRecord>>>,
    started: Arc<AtomicU64>,
}

impl InMemoryTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// All spans opened so far, in start order.
    pub fn spans(&self) -> Vec<RecordedSpan> {
        self.spans.lock().iter().map(|s| s.lock().clone()).collect()
    }

    pub fn finished_spans(&self) -> Vec<RecordedSpan> {
        self.spans()
            .into_iter()
            .filter(|s| s.end_count > 0)
            .collect()
    }

    pub fn span_named(&self, name: &str) -> Option<RecordedSpan> {
        self.spans().into_iter().find(|s| s.name == name)
    }

    pub fn started_count(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    /// Forget recorded spans. Spans still open keep writing to their own, now detached, records.
    pub fn clear(&self) {
        self.spans.lock().clear();
    }
}

impl Tracer for InMemoryTracer {
    fn start_span(&self, name: &str) -> Box<dyn TraceSpan> {
        self.started.fetch_add(1, Ordering::Relaxed);

        let ids = SpanIds {
            trace_id: Uuid::new_v4().simple().to_string(),
            span_id: Uuid::new_v4().simple().to_string()[..16].to_string(),
        };
        let recorded = RecordedSpan {
            name: name.to_string(),
            ids: ids.clone(),
            start_time: Utc::now(),
            end_time: None,
            attributes: Attributes::new(),
            events: Vec::new(),
            status: SpanStatus::unset(),
            exceptions: Vec::new(),
            end_count: 0,
        };
        let start_time = recorded.start_time;
        let record = Arc::new(Mutex::new(recorded));
        self.spans.lock().push(Arc::clone(&record));

        Box::new(InMemorySpan {
            record,
            name: name.to_string(),
            ids,
            start_time,
            attributes: Attributes::new(),
        })
    }
}

struct InMemorySpan {
    record: SharedRecord,
    name: String,
    ids: SpanIds,
    start_time: DateTime<Utc>,
    attributes: Attributes,
}

impl InMemorySpan {
    fn update(&self, f: impl FnOnce(&mut RecordedSpan)) {
        f(&mut self.record.lock());
    }
}

impl TraceSpan for InMemorySpan {
    fn name(&self) -> &str {
        &self.name
    }

    fn ids(&self) -> SpanIds {
        self.ids.clone()
    }

    fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn set_attributes(&mut self, attributes: Vec<(String, AttributeValue)>) {
        self.attributes.extend(attributes);
        let snapshot = self.attributes.clone();
        self.update(|span| span.attributes = snapshot);
    }

    fn add_event(&mut self, event: &SpanEvent) {
        self.update(|span| span.events.push(event.clone()));
    }

    fn set_status(&mut self, status: SpanStatus) {
        self.update(|span| span.status = status);
    }

    fn record_exception(&mut self, failure: &FailureInfo) {
        self.update(|span| span.exceptions.push(failure.clone()));
    }

    fn end(&mut self) {
        self.update(|span| {
            span.end_count += 1;
            span.end_time = Some(Utc::now());
        });
    }
}
