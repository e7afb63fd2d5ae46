//! [`Tracer`](crate::span::Tracer) backends

mod memory;
mod noop;
mod otel;

pub use memory::{InMemoryTracer, RecordedSpan};
pub use noop::NoopTracer;
pub use otel::{OtelTracer, DEFAULT_TRACER_NAME};
