//! Uniform description of operation failures

use std::any::type_name;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracewire_core::ServiceError;

use crate::value::{TraceObject, TraceValue};

/// Type reported for failures that carry no type name (strings, plain values).
pub const UNTYPED_FAILURE: &str = "Error";

/// What the wrapper and classifier know about a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureInfo {
    pub message: String,
    pub type_name: Option<String>,
    pub stack: Option<String>,
    pub critical: bool,
    pub severity: Option<String>,
}

impl FailureInfo {
    pub fn error_type(&self) -> &str {
        self.type_name.as_deref().unwrap_or(UNTYPED_FAILURE)
    }
}

/// An error value returned by a wrapped operation.
///
/// Implement with an empty body for custom error types; the short Rust type name is reported.
pub trait Failure: fmt::Display {
    fn failure_type(&self) -> Option<String> {
        Some(short_type_name::<Self>())
    }

    fn is_flagged_critical(&self) -> bool {
        false
    }

    fn severity_hint(&self) -> Option<String> {
        None
    }

    fn stack_trace(&self) -> Option<String> {
        None
    }

    /// Value captured as the error body.
    fn failure_body(&self) -> TraceValue {
        let obj = TraceObject::new().with("message", self.to_string());
        if let Some(name) = self.failure_type() {
            obj.set("name", name);
        }
        obj.into()
    }

    fn describe(&self) -> FailureInfo {
        FailureInfo {
            message: self.to_string(),
            type_name: self.failure_type(),
            stack: self.stack_trace(),
            critical: self.is_flagged_critical(),
            severity: self.severity_hint(),
        }
    }
}

/// `my_crate::errors::QuotaError<T>` → `QuotaError`.
pub fn short_type_name<T: ?Sized>() -> String {
    let full = type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

fn source_chain(error: &(dyn StdError + 'static)) -> Option<String> {
    let mut causes = Vec::new();
    let mut current = error.source();
    while let Some(cause) = current {
        causes.push(format!("Caused by: {}", cause));
        current = cause.source();
    }
    (!causes.is_empty()).then(|| causes.join("\n"))
}

impl Failure for ServiceError {
    fn failure_type(&self) -> Option<String> {
        Some(self.type_name().to_string())
    }

    fn stack_trace(&self) -> Option<String> {
        source_chain(self)
    }

    fn failure_body(&self) -> TraceValue {
        TraceObject::new()
            .with("name", self.type_name())
            .with("code", self.error_code())
            .with("statusCode", i64::from(self.status_code()))
            .with("message", self.to_string())
            .into()
    }
}

impl Failure for anyhow::Error {
    fn failure_type(&self) -> Option<String> {
        match self.downcast_ref::<ServiceError>() {
            Some(inner) => inner.failure_type(),
            None => Some(UNTYPED_FAILURE.to_string()),
        }
    }

    fn stack_trace(&self) -> Option<String> {
        let causes: Vec<String> = self
            .chain()
            .skip(1)
            .map(|cause| format!("Caused by: {}", cause))
            .collect();
        (!causes.is_empty()).then(|| causes.join("\n"))
    }

    fn failure_body(&self) -> TraceValue {
        match self.downcast_ref::<ServiceError>() {
            Some(inner) => inner.failure_body(),
            None => TraceObject::new()
                .with("name", UNTYPED_FAILURE)
                .with("message", self.to_string())
                .into(),
        }
    }
}

impl Failure for Box<dyn StdError + Send + Sync> {
    fn failure_type(&self) -> Option<String> {
        match self.downcast_ref::<ServiceError>() {
            Some(inner) => inner.failure_type(),
            None => Some(UNTYPED_FAILURE.to_string()),
        }
    }

    fn stack_trace(&self) -> Option<String> {
        source_chain(self.as_ref())
    }
}

impl<T: Failure + ?Sized> Failure for Arc<T> {
    fn failure_type(&self) -> Option<String> {
        (**self).failure_type()
    }

    fn is_flagged_critical(&self) -> bool {
        (**self).is_flagged_critical()
    }

    fn severity_hint(&self) -> Option<String> {
        (**self).severity_hint()
    }

    fn stack_trace(&self) -> Option<String> {
        (**self).stack_trace()
    }

    fn failure_body(&self) -> TraceValue {
        (**self).failure_body()
    }
}

impl Failure for String {
    fn failure_type(&self) -> Option<String> {
        None
    }

    fn failure_body(&self) -> TraceValue {
        TraceValue::String(self.clone())
    }
}

impl Failure for &'static str {
    fn failure_type(&self) -> Option<String> {
        None
    }

    fn failure_body(&self) -> TraceValue {
        TraceValue::from(*self)
    }
}

/// Arbitrary structured values; `critical` and `severity` fields are honoured.
impl Failure for Value {
    fn failure_type(&self) -> Option<String> {
        None
    }

    fn is_flagged_critical(&self) -> bool {
        self.get("critical").and_then(Value::as_bool).unwrap_or(false)
    }

    fn severity_hint(&self) -> Option<String> {
        self.get("severity").and_then(Value::as_str).map(str::to_string)
    }

    fn failure_body(&self) -> TraceValue {
        TraceValue::from(self.clone())
    }
}
