//! Tracewire
//!
//! Wraps async operations with span instrumentation, safe capture of arguments and bodies,
//! failure classification, and alert dispatch through [`tracewire_alerts`].
//!
//! - [`value`] / [`serializer`]: dynamic capture model and failure-proof JSON rendering
//! - [`body`]: redacted, size-bounded body extraction
//! - [`classifier`]: critical-failure detection
//! - [`span`] / [`tracers`]: backend abstraction with OpenTelemetry, in-memory and no-op tracers
//! - [`decorator`]: the operation wrapper itself

pub mod body;
pub mod classifier;
pub mod config;
pub mod context;
pub mod decorator;
pub mod failure;
pub mod record;
pub mod serializer;
pub mod span;
pub mod tracers;
pub mod value;

pub use body::{extract_body, looks_like_request, BodyCaptureConfig};
pub use classifier::is_critical;
pub use config::{BusinessImpact, Severity, TraceConfig, TraceOptions};
pub use context::{extract_http_context, extract_user_context, HttpContext, UserContext};
pub use decorator::{wrap_operation, OperationTracer, TracedOperation, PANIC_TYPE};
pub use failure::{Failure, FailureInfo};
pub use record::{LogRecordSink, RecordedError, SpanRecord, SpanRecordSink};
pub use serializer::{serialize, SerializeOptions};
pub use span::{AttributeValue, Attributes, SpanEvent, SpanIds, SpanStatus, StatusCode, TraceSpan, Tracer};
pub use tracers::{InMemoryTracer, NoopTracer, OtelTracer, RecordedSpan};
pub use value::{TraceArgs, TraceArray, TraceObject, TraceValue, Traceable};
