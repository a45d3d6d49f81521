//! The Value type - the data that flows between processes and resolvers.
//!
//! Every effect result, process argument, action, state snapshot and
//! context entry is a `Value`. It is a dynamically-typed tree like JSON,
//! extended with two runtime-only leaves: task handles (the result of
//! `fork`) and errors (the first slot of a `safe_call` result).

use std::collections::BTreeMap;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::RuntimeError;
use crate::task::Task;

/// A tree-shaped value passed into and out of processes.
///
/// # Design Notes
///
/// - Uses `BTreeMap` for deterministic ordering (labeled `parallel`/`race`
///   results, context snapshots and logged actions always print the same way)
/// - Uses `i64` for integers
/// - `Task` and `Error` never come from the outside world; they are produced
///   by resolvers and serialize as plain strings
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// Absence of a value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed 64-bit integer.
    Integer(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Ordered sequence of values.
    Array(Vec<Value>),
    /// Key-value map with string keys.
    Map(BTreeMap<String, Value>),
    /// Handle to a task started by `fork`.
    Task(Task),
    /// An error captured as data (see `safe_call`).
    Error(RuntimeError),
}

impl Value {
    /// Create a null value.
    pub fn null() -> Self {
        Value::Null
    }

    /// Create an empty map.
    pub fn map() -> Self {
        Value::Map(BTreeMap::new())
    }

    /// Create an empty array.
    pub fn array() -> Self {
        Value::Array(Vec::new())
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value is a map.
    pub fn is_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    /// Check if this value is an array.
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_task(&self) -> Option<&Task> {
        match self {
            Value::Task(task) => Some(task),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&RuntimeError> {
        match self {
            Value::Error(error) => Some(error),
            _ => None,
        }
    }

    /// Get a field of a map value.
    ///
    /// Returns `None` for missing keys and for non-map values.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Get a mutable reference to a field of a map value.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        match self {
            Value::Map(map) => map.get_mut(key),
            _ => None,
        }
    }

    /// Insert a field, turning a null value into a map first.
    ///
    /// Returns the previous value of the field. Inserting into anything
    /// other than a map or null replaces the value with a fresh map.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        if !self.is_map() {
            *self = Value::map();
        }
        match self {
            Value::Map(map) => map.insert(key.into(), value),
            _ => None,
        }
    }

    /// The `type` field of an action, if it is a non-empty string.
    pub fn action_type(&self) -> Option<&str> {
        self.get("type")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
    }

    /// Shallow-merge the fields of `other` into this map (last writer wins).
    pub fn merge(&mut self, other: BTreeMap<String, Value>) {
        for (key, value) in other {
            self.insert(key, value);
        }
    }

    /// Convert into a `serde_json::Value`.
    ///
    /// Task handles and errors become strings.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
            Value::Task(task) => serializer.serialize_str(&format!("task{}", task.id())),
            Value::Error(error) => serializer.serialize_str(&error.to_string()),
        }
    }
}

// Conversion from common types

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Task> for Value {
    fn from(v: Task) -> Self {
        Value::Task(v)
    }
}

impl From<RuntimeError> for Value {
    fn from(v: RuntimeError) -> Self {
        Value::Error(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}
