//! Failure-proof conversion of [`TraceValue`] graphs to JSON text

use std::sync::Arc;

use chrono::SecondsFormat;
use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::value::TraceValue;

pub const REDACTED: &str = "[REDACTED]";
pub const CIRCULAR_REFERENCE: &str = "[CIRCULAR_REFERENCE]";
pub const MAX_DEPTH_REACHED: &str = "[MAX_DEPTH_REACHED]";
pub const SKIPPED: &str = "[SKIPPED]";
pub const FUNCTION: &str = "[FUNCTION]";
pub const SYMBOL: &str = "[SYMBOL]";
pub const SERIALIZATION_ERROR: &str = "[OBJECT_SERIALIZATION_ERROR]";

/// Depth ceiling applied when no explicit limit is configured.
pub const HARD_DEPTH_LIMIT: usize = 256;

/// Run-time type names that are never descended into.
pub const UNSAFE_TYPE_NAMES: &[&str] = &[
    "IncomingMessage",
    "ServerResponse",
    "ClientRequest",
    "Socket",
    "TLSSocket",
    "Agent",
    "TcpStream",
    "TcpListener",
    "UdpSocket",
    "UnixStream",
    "Stream",
];

#[derive(Debug, Clone, Default)]
pub struct SerializeOptions {
    pub max_depth: Option<usize>,
    pub redact_fields: Vec<String>,
}

impl SerializeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_redact_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.redact_fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Error)]
#[error("value could not be serialized: {0}")]
pub struct SerializeError(pub String);

/// Serialize `value` to JSON text. Never fails: problems inside the graph become placeholder
/// strings, and an unreadable graph yields [`SERIALIZATION_ERROR`].
pub fn serialize(value: &TraceValue, options: &SerializeOptions) -> String {
    match to_json(value, options) {
        Ok(json) => serde_json::to_string(&json).unwrap_or_else(|_| SERIALIZATION_ERROR.to_string()),
        Err(_) => SERIALIZATION_ERROR.to_string(),
    }
}

/// Structural conversion with placeholders applied. `Undefined` at the root becomes `null`.
pub fn to_json(value: &TraceValue, options: &SerializeOptions) -> Result<Value, SerializeError> {
    let mut walker = Walker::new(options);
    Ok(walker.walk(value, 0)?.unwrap_or(Value::Null))
}

/// Replace the value of every object key matching a fragment, at any depth.
pub fn redact_json(value: &mut Value, fragments: &[String]) {
    let fragments = normalize_fragments(fragments);
    if !fragments.is_empty() {
        redact_in_place(value, &fragments);
    }
}

fn redact_in_place(value: &mut Value, fragments: &[String]) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                if matches_fragment(key, fragments) {
                    *field = Value::String(REDACTED.to_string());
                } else {
                    redact_in_place(field, fragments);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                redact_in_place(item, fragments);
            }
        }
        _ => {}
    }
}

fn normalize_fragments(fragments: &[String]) -> Vec<String> {
    fragments
        .iter()
        .filter(|f| !f.is_empty())
        .map(|f| f.to_lowercase())
        .collect()
}

fn matches_fragment(key: &str, fragments: &[String]) -> bool {
    if fragments.is_empty() {
        return false;
    }
    let key = key.to_lowercase();
    fragments.iter().any(|f| key.contains(f.as_str()))
}

struct Walker {
    fragments: Vec<String>,
    max_depth: usize,
    // Identities of the containers on the current path from the root.
    path: Vec<usize>,
}

impl Walker {
    fn new(options: &SerializeOptions) -> Self {
        Self {
            fragments: normalize_fragments(&options.redact_fields),
            max_depth: options.max_depth.unwrap_or(HARD_DEPTH_LIMIT).min(HARD_DEPTH_LIMIT),
            path: Vec::new(),
        }
    }

    /// `Ok(None)` means the value has no JSON form and is omitted by the parent.
    fn walk(&mut self, value: &TraceValue, depth: usize) -> Result<Option<Value>, SerializeError> {
        let json = match value {
            TraceValue::Undefined => return Ok(None),
            TraceValue::Null => Value::Null,
            TraceValue::Bool(b) => Value::Bool(*b),
            TraceValue::Int(n) => Value::from(*n),
            TraceValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            TraceValue::String(s) => Value::String(s.clone()),
            TraceValue::Date(d) => Value::String(d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            TraceValue::Bytes(b) => placeholder(&format!("[BUFFER:{}bytes]", b.len())),
            TraceValue::Function => placeholder(FUNCTION),
            TraceValue::Symbol(_) => placeholder(SYMBOL),
            TraceValue::Computed(getter) => {
                // Each getter chained behind the first costs one level of depth.
                let mut depth = depth;
                let mut resolved = getter().map_err(SerializeError)?;
                while let TraceValue::Computed(next) = &resolved {
                    depth += 1;
                    if depth > self.max_depth {
                        return Ok(Some(placeholder(MAX_DEPTH_REACHED)));
                    }
                    let next = Arc::clone(next);
                    resolved = next().map_err(SerializeError)?;
                }
                return self.walk(&resolved, depth);
            }
            TraceValue::Array(array) => {
                let id = array.identity();
                if let Some(marker) = self.guard(id, depth) {
                    return Ok(Some(marker));
                }
                self.path.push(id);
                let items = array
                    .items()
                    .iter()
                    .map(|item| Ok(self.walk(item, depth + 1)?.unwrap_or(Value::Null)))
                    .collect::<Result<Vec<_>, SerializeError>>();
                self.path.pop();
                Value::Array(items?)
            }
            TraceValue::Object(obj) => {
                if obj.type_name().is_some_and(|name| UNSAFE_TYPE_NAMES.contains(&name)) {
                    return Ok(Some(placeholder(SKIPPED)));
                }
                let id = obj.identity();
                if let Some(marker) = self.guard(id, depth) {
                    return Ok(Some(marker));
                }
                self.path.push(id);
                let fields = self.walk_fields(obj.entries(), depth);
                self.path.pop();
                Value::Object(fields?)
            }
        };
        Ok(Some(json))
    }

    fn walk_fields(
        &mut self,
        entries: Vec<(String, TraceValue)>,
        depth: usize,
    ) -> Result<Map<String, Value>, SerializeError> {
        let mut map = Map::new();
        for (key, field) in entries {
            if matches_fragment(&key, &self.fragments) {
                map.insert(key, placeholder(REDACTED));
                continue;
            }
            if let Some(json) = self.walk(&field, depth + 1)? {
                map.insert(key, json);
            }
        }
        Ok(map)
    }

    fn guard(&self, id: usize, depth: usize) -> Option<Value> {
        if self.path.contains(&id) {
            Some(placeholder(CIRCULAR_REFERENCE))
        } else if depth > self.max_depth {
            Some(placeholder(MAX_DEPTH_REACHED))
        } else {
            None
        }
    }
}

fn placeholder(text: &str) -> Value {
    Value::String(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{TraceArray, TraceObject};
    use bytes::Bytes;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn plain(value: &TraceValue) -> String {
        serialize(value, &SerializeOptions::default())
    }

    fn parsed(value: &TraceValue, options: &SerializeOptions) -> Value {
        serde_json::from_str(&serialize(value, options)).unwrap()
    }

    #[test]
    fn test_primitives() {
        assert_eq!(plain(&TraceValue::Null), "null");
        assert_eq!(plain(&TraceValue::Undefined), "null");
        assert_eq!(plain(&TraceValue::Int(42)), "42");
        assert_eq!(plain(&TraceValue::Float(f64::INFINITY)), "null");
        assert_eq!(plain(&TraceValue::from("hi")), "\"hi\"");
    }

    #[test]
    fn test_self_reference_is_marked() {
        let obj = TraceObject::new().with("a", 1);
        obj.set("self", obj.clone());

        assert_eq!(plain(&obj.into()), r#"{"a":1,"self":"[CIRCULAR_REFERENCE]"}"#);
    }

    #[test]
    fn test_repeated_sibling_is_not_a_cycle() {
        let shared = TraceObject::new().with("v", 1);
        let root = TraceObject::new().with("x", shared.clone()).with("y", shared);

        assert_eq!(parsed(&root.into(), &SerializeOptions::default()), json!({"x": {"v": 1}, "y": {"v": 1}}));
    }

    #[test]
    fn test_array_cycle() {
        let array = TraceArray::new(vec![TraceValue::Int(1)]);
        array.push(array.clone());

        assert_eq!(plain(&array.into()), r#"[1,"[CIRCULAR_REFERENCE]"]"#);
    }

    #[test]
    fn test_depth_limit() {
        let leaf = TraceObject::new().with("deep", true);
        let mid = TraceObject::new().with("leaf", leaf);
        let root = TraceObject::new().with("mid", mid).with("n", 1);

        let options = SerializeOptions::new().with_max_depth(1);
        assert_eq!(
            parsed(&root.into(), &options),
            json!({"mid": {"leaf": "[MAX_DEPTH_REACHED]"}, "n": 1})
        );
    }

    #[test]
    fn test_depth_zero_still_renders_root() {
        let root = TraceObject::new().with("child", TraceObject::new()).with("n", 1);

        let options = SerializeOptions::new().with_max_depth(0);
        assert_eq!(parsed(&root.into(), &options), json!({"child": "[MAX_DEPTH_REACHED]", "n": 1}));
    }

    #[test]
    fn test_redaction_is_case_insensitive_and_total() {
        let nested = TraceObject::new().with("inner", 1);
        let root = TraceObject::new()
            .with("username", "a")
            .with("Password", "b")
            .with("apiKey", nested)
            .with("accessToken", TraceValue::Undefined);

        let options = SerializeOptions::new().with_redact_fields(["password", "key", "token"]);
        assert_eq!(
            parsed(&root.into(), &options),
            json!({
                "username": "a",
                "Password": "[REDACTED]",
                "apiKey": "[REDACTED]",
                "accessToken": "[REDACTED]"
            })
        );
    }

    #[test]
    fn test_special_values() {
        let stamp = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let root = TraceObject::new()
            .with("buf", Bytes::from_static(b"hello"))
            .with("cb", TraceValue::Function)
            .with("sym", TraceValue::Symbol("s".into()))
            .with("at", stamp)
            .with("conn", TraceObject::typed("TcpStream").with("fd", 3))
            .with("gone", TraceValue::Undefined)
            .with("list", TraceArray::new(vec![TraceValue::Undefined]));

        assert_eq!(
            parsed(&root.into(), &SerializeOptions::default()),
            json!({
                "buf": "[BUFFER:5bytes]",
                "cb": "[FUNCTION]",
                "sym": "[SYMBOL]",
                "at": "2024-01-02T03:04:05.000Z",
                "conn": "[SKIPPED]",
                "list": [null]
            })
        );
    }

    #[test]
    fn test_failing_getter_fails_whole_graph() {
        let root = TraceObject::new()
            .with("ok", 1)
            .with("bad", TraceValue::computed(|| Err("getter threw".to_string())));

        assert_eq!(plain(&root.into()), SERIALIZATION_ERROR);
    }

    #[test]
    fn test_getter_result_is_serialized() {
        let root = TraceObject::new().with("lazy", TraceValue::computed(|| Ok(TraceValue::Int(9))));

        assert_eq!(plain(&root.into()), r#"{"lazy":9}"#);
    }

    fn endless() -> TraceValue {
        TraceValue::computed(|| Ok(endless()))
    }

    #[test]
    fn test_endless_getter_chain_hits_depth_limit() {
        let root = TraceObject::new().with("lazy", endless()).with("n", 1);

        assert_eq!(plain(&root.into()), r#"{"lazy":"[MAX_DEPTH_REACHED]","n":1}"#);
        let options = SerializeOptions::new().with_max_depth(3);
        assert_eq!(serialize(&endless(), &options), r#""[MAX_DEPTH_REACHED]""#);
    }

    #[test]
    fn test_short_getter_chain_resolves() {
        let chained = TraceValue::computed(|| Ok(TraceValue::computed(|| Ok(TraceValue::Int(9)))));
        let root = TraceObject::new().with("lazy", chained);

        assert_eq!(plain(&root.into()), r#"{"lazy":9}"#);
    }

    #[test]
    fn test_output_is_stable_when_reserialized() {
        let root = TraceObject::new()
            .with("b", TraceArray::new(vec![TraceValue::Int(1), TraceValue::from("x")]))
            .with("a", TraceObject::new().with("z", 0.5).with("y", TraceValue::Null));

        let first = plain(&root.into());
        let reparsed: Value = serde_json::from_str(&first).unwrap();
        let second = plain(&TraceValue::from(reparsed));
        assert_eq!(first, second);
    }

    #[test]
    fn test_redact_json_nested() {
        let mut value = json!({"user": {"secretAnswer": "x", "name": "n"}, "items": [{"token": 1}]});
        redact_json(&mut value, &["secret".to_string(), "token".to_string()]);

        assert_eq!(
            value,
            json!({"user": {"secretAnswer": "[REDACTED]", "name": "n"}, "items": [{"token": "[REDACTED]"}]})
        );
    }
}
