//! Dynamic value model for telemetry capture
//!
//! Arguments, results and errors are captured as [`TraceValue`] graphs. Containers are shared
//! and identity-comparable so a graph may reference itself; the serializer relies on that
//! identity to detect cycles.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

/// A lazily evaluated property. Returning `Err` marks the graph as unserializable.
pub type Getter = Arc<dyn Fn() -> Result<TraceValue, String> + Send + Sync>;

#[derive(Clone)]
pub enum TraceValue {
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(DateTime<Utc>),
    Bytes(Bytes),
    Function,
    Symbol(String),
    Array(TraceArray),
    Object(TraceObject),
    Computed(Getter),
}

impl TraceValue {
    /// Capture any `Serialize` value. Serialization failures surface later as an
    /// unserializable graph rather than a panic.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(json) => Self::from(json),
            Err(e) => {
                let reason = e.to_string();
                Self::computed(move || Err(reason.clone()))
            }
        }
    }

    pub fn computed<F>(getter: F) -> Self
    where
        F: Fn() -> Result<TraceValue, String> + Send + Sync + 'static,
    {
        TraceValue::Computed(Arc::new(getter))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            TraceValue::Undefined | TraceValue::Null => false,
            TraceValue::Bool(b) => *b,
            TraceValue::Int(n) => *n != 0,
            TraceValue::Float(f) => *f != 0.0 && !f.is_nan(),
            TraceValue::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn as_object(&self) -> Option<&TraceObject> {
        match self {
            TraceValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TraceValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl Default for TraceValue {
    fn default() -> Self {
        TraceValue::Undefined
    }
}

impl fmt::Debug for TraceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceValue::Undefined => write!(f, "Undefined"),
            TraceValue::Null => write!(f, "Null"),
            TraceValue::Bool(b) => write!(f, "Bool({})", b),
            TraceValue::Int(n) => write!(f, "Int({})", n),
            TraceValue::Float(n) => write!(f, "Float({})", n),
            TraceValue::String(s) => write!(f, "String({:?})", s),
            TraceValue::Date(d) => write!(f, "Date({})", d),
            TraceValue::Bytes(b) => write!(f, "Bytes({})", b.len()),
            TraceValue::Function => write!(f, "Function"),
            TraceValue::Symbol(s) => write!(f, "Symbol({:?})", s),
            // Containers may be cyclic, never recurse here.
            TraceValue::Array(a) => write!(f, "Array(len={})", a.len()),
            TraceValue::Object(o) => {
                write!(f, "Object({}, len={})", o.type_name().unwrap_or("Object"), o.len())
            }
            TraceValue::Computed(_) => write!(f, "Computed"),
        }
    }
}

/// Plain string form, used when a value cannot be captured structurally.
impl fmt::Display for TraceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceValue::Undefined => write!(f, "undefined"),
            TraceValue::Null => write!(f, "null"),
            TraceValue::Bool(b) => write!(f, "{}", b),
            TraceValue::Int(n) => write!(f, "{}", n),
            TraceValue::Float(n) => write!(f, "{}", n),
            TraceValue::String(s) => write!(f, "{}", s),
            TraceValue::Date(d) => write!(f, "{}", d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            TraceValue::Bytes(b) => write!(f, "[BUFFER:{}bytes]", b.len()),
            TraceValue::Function => write!(f, "[FUNCTION]"),
            TraceValue::Symbol(_) => write!(f, "[SYMBOL]"),
            TraceValue::Array(a) => write!(f, "[Array({})]", a.len()),
            TraceValue::Object(o) => write!(f, "[{}]", o.type_name().unwrap_or("Object")),
            TraceValue::Computed(_) => write!(f, "[Computed]"),
        }
    }
}

/// Shared, mutable array.
#[derive(Clone, Default)]
pub struct TraceArray(Arc<RwLock<Vec<TraceValue>>>);

impl TraceArray {
    pub fn new(items: Vec<TraceValue>) -> Self {
        Self(Arc::new(RwLock::new(items)))
    }

    pub fn push(&self, value: impl Into<TraceValue>) {
        self.0.write().push(value.into());
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    /// Snapshot of the current items.
    pub fn items(&self) -> Vec<TraceValue> {
        self.0.read().clone()
    }

    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

struct ObjectInner {
    type_name: Option<String>,
    fields: RwLock<Vec<(String, TraceValue)>>,
}

/// Shared, mutable object with ordered fields and an optional run-time type name.
#[derive(Clone)]
pub struct TraceObject(Arc<ObjectInner>);

impl TraceObject {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// An object tagged with its concrete type name (e.g. `"TcpStream"`).
    pub fn typed(type_name: impl Into<String>) -> Self {
        Self::build(Some(type_name.into()))
    }

    fn build(type_name: Option<String>) -> Self {
        Self(Arc::new(ObjectInner {
            type_name,
            fields: RwLock::new(Vec::new()),
        }))
    }

    pub fn with(self, key: impl Into<String>, value: impl Into<TraceValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Insert or replace a field, keeping first-insertion order.
    pub fn set(&self, key: impl Into<String>, value: impl Into<TraceValue>) {
        let key = key.into();
        let value = value.into();
        let mut fields = self.0.fields.write();
        match fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<TraceValue> {
        self.0
            .fields
            .read()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.fields.read().iter().any(|(k, _)| k == key)
    }

    pub fn type_name(&self) -> Option<&str> {
        self.0.type_name.as_deref()
    }

    pub fn len(&self) -> usize {
        self.0.fields.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.fields.read().is_empty()
    }

    /// Snapshot of the current fields.
    pub fn entries(&self) -> Vec<(String, TraceValue)> {
        self.0.fields.read().clone()
    }

    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl Default for TraceObject {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Value> for TraceValue {
    fn from(json: Value) -> Self {
        match json {
            Value::Null => TraceValue::Null,
            Value::Bool(b) => TraceValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => TraceValue::Int(i),
                None => TraceValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => TraceValue::String(s),
            Value::Array(items) => {
                TraceValue::Array(TraceArray::new(items.into_iter().map(TraceValue::from).collect()))
            }
            Value::Object(map) => {
                let obj = TraceObject::new();
                for (key, value) in map {
                    obj.set(key, TraceValue::from(value));
                }
                TraceValue::Object(obj)
            }
        }
    }
}

impl From<TraceObject> for TraceValue {
    fn from(obj: TraceObject) -> Self {
        TraceValue::Object(obj)
    }
}

impl From<TraceArray> for TraceValue {
    fn from(array: TraceArray) -> Self {
        TraceValue::Array(array)
    }
}

impl From<&str> for TraceValue {
    fn from(s: &str) -> Self {
        TraceValue::String(s.to_string())
    }
}

impl From<String> for TraceValue {
    fn from(s: String) -> Self {
        TraceValue::String(s)
    }
}

impl From<bool> for TraceValue {
    fn from(b: bool) -> Self {
        TraceValue::Bool(b)
    }
}

impl From<i64> for TraceValue {
    fn from(n: i64) -> Self {
        TraceValue::Int(n)
    }
}

impl From<i32> for TraceValue {
    fn from(n: i32) -> Self {
        TraceValue::Int(n.into())
    }
}

impl From<f64> for TraceValue {
    fn from(n: f64) -> Self {
        TraceValue::Float(n)
    }
}

impl From<Bytes> for TraceValue {
    fn from(b: Bytes) -> Self {
        TraceValue::Bytes(b)
    }
}

impl From<DateTime<Utc>> for TraceValue {
    fn from(d: DateTime<Utc>) -> Self {
        TraceValue::Date(d)
    }
}

/// Conversion of Rust values into the capture model.
pub trait Traceable {
    fn to_trace_value(&self) -> TraceValue;
}

impl Traceable for TraceValue {
    fn to_trace_value(&self) -> TraceValue {
        self.clone()
    }
}

impl Traceable for TraceObject {
    fn to_trace_value(&self) -> TraceValue {
        TraceValue::Object(self.clone())
    }
}

impl Traceable for () {
    fn to_trace_value(&self) -> TraceValue {
        TraceValue::Undefined
    }
}

impl Traceable for bool {
    fn to_trace_value(&self) -> TraceValue {
        TraceValue::Bool(*self)
    }
}

macro_rules! traceable_int {
    ($($ty:ty),*) => {
        $(impl Traceable for $ty {
            fn to_trace_value(&self) -> TraceValue {
                TraceValue::Int(i64::from(*self))
            }
        })*
    };
}

traceable_int!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! traceable_wide_int {
    ($($ty:ty),*) => {
        $(impl Traceable for $ty {
            fn to_trace_value(&self) -> TraceValue {
                match i64::try_from(*self) {
                    Ok(n) => TraceValue::Int(n),
                    Err(_) => TraceValue::Float(*self as f64),
                }
            }
        })*
    };
}

traceable_wide_int!(u64, usize, i128, u128);

impl Traceable for f32 {
    fn to_trace_value(&self) -> TraceValue {
        TraceValue::Float(f64::from(*self))
    }
}

impl Traceable for f64 {
    fn to_trace_value(&self) -> TraceValue {
        TraceValue::Float(*self)
    }
}

impl Traceable for str {
    fn to_trace_value(&self) -> TraceValue {
        TraceValue::String(self.to_string())
    }
}

impl Traceable for String {
    fn to_trace_value(&self) -> TraceValue {
        TraceValue::String(self.clone())
    }
}

impl Traceable for DateTime<Utc> {
    fn to_trace_value(&self) -> TraceValue {
        TraceValue::Date(*self)
    }
}

impl Traceable for Bytes {
    fn to_trace_value(&self) -> TraceValue {
        TraceValue::Bytes(self.clone())
    }
}

impl Traceable for Value {
    fn to_trace_value(&self) -> TraceValue {
        TraceValue::from(self.clone())
    }
}

impl<T: Traceable + ?Sized> Traceable for &T {
    fn to_trace_value(&self) -> TraceValue {
        (**self).to_trace_value()
    }
}

impl<T: Traceable + ?Sized> Traceable for Box<T> {
    fn to_trace_value(&self) -> TraceValue {
        (**self).to_trace_value()
    }
}

impl<T: Traceable + ?Sized> Traceable for Arc<T> {
    fn to_trace_value(&self) -> TraceValue {
        (**self).to_trace_value()
    }
}

impl<T: Traceable> Traceable for Option<T> {
    fn to_trace_value(&self) -> TraceValue {
        match self {
            Some(value) => value.to_trace_value(),
            None => TraceValue::Null,
        }
    }
}

impl<T: Traceable> Traceable for [T] {
    fn to_trace_value(&self) -> TraceValue {
        TraceValue::Array(TraceArray::new(self.iter().map(Traceable::to_trace_value).collect()))
    }
}

impl<T: Traceable> Traceable for Vec<T> {
    fn to_trace_value(&self) -> TraceValue {
        self.as_slice().to_trace_value()
    }
}

impl<T: Traceable> Traceable for BTreeMap<String, T> {
    fn to_trace_value(&self) -> TraceValue {
        let obj = TraceObject::new();
        for (key, value) in self {
            obj.set(key.clone(), value.to_trace_value());
        }
        TraceValue::Object(obj)
    }
}

impl<T: Traceable, S> Traceable for HashMap<String, T, S> {
    fn to_trace_value(&self) -> TraceValue {
        let obj = TraceObject::new();
        for (key, value) in self {
            obj.set(key.clone(), value.to_trace_value());
        }
        TraceValue::Object(obj)
    }
}

/// Positional arguments of an operation invocation.
pub trait TraceArgs {
    fn trace_args(&self) -> Vec<TraceValue>;
}

impl TraceArgs for () {
    fn trace_args(&self) -> Vec<TraceValue> {
        Vec::new()
    }
}

impl TraceArgs for Vec<TraceValue> {
    fn trace_args(&self) -> Vec<TraceValue> {
        self.clone()
    }
}

macro_rules! trace_args_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: Traceable),+> TraceArgs for ($($name,)+) {
            fn trace_args(&self) -> Vec<TraceValue> {
                vec![$(self.$idx.to_trace_value()),+]
            }
        }
    };
}

trace_args_tuple!(A: 0);
trace_args_tuple!(A: 0, B: 1);
trace_args_tuple!(A: 0, B: 1, C: 2);
trace_args_tuple!(A: 0, B: 1, C: 2, D: 3);
trace_args_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4);
trace_args_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
