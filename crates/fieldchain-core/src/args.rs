//! Declaration arguments and their deterministic cache representation
//!
//! Arguments are fixed when a declaration is written down. Two argument lists that
//! reduce to the same cache representation are treated as the same configuration
//! by the node cache, so the reduction has to be stable across runs and must never
//! let structurally different objects collide.
//!
//! Copyright (c) 2025 Fieldchain Team
//! Licensed under the Apache-2.0 license

use chrono::{DateTime, FixedOffset, Utc};
use serde_json::{json, Map, Number, Value};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// One constructor or call argument of a declaration
#[derive(Clone)]
pub enum Arg {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Arg>),
    /// Ordered key/value pairs
    Map(Vec<(String, Arg)>),
    /// An enumeration case, optionally backed by a scalar
    Enum {
        name: String,
        value: Option<Box<Arg>>,
    },
    DateTime(DateTime<FixedOffset>),
    /// An arbitrary object, compared by identity
    Object {
        class: String,
        handle: Arc<dyn Any + Send + Sync>,
    },
    /// A handle that cannot be serialized, reduced to its type tag
    Resource(String),
}

impl Arg {
    /// An enumeration case without a backing value
    pub fn unit_enum(name: impl Into<String>) -> Self {
        Arg::Enum {
            name: name.into(),
            value: None,
        }
    }

    /// An enumeration case backed by a scalar
    pub fn backed_enum(name: impl Into<String>, value: impl Into<Arg>) -> Self {
        Arg::Enum {
            name: name.into(),
            value: Some(Box::new(value.into())),
        }
    }

    /// Wrap an object so it is keyed by identity rather than by contents
    pub fn object<T: Any + Send + Sync>(class: impl Into<String>, object: Arc<T>) -> Self {
        Arg::Object {
            class: class.into(),
            handle: object,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Arg::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Arg::Int(i) => Some(*i as f64),
            Arg::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Arg::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Convert to a runtime value, e.g. for use as a fallback or replacement
    pub fn to_value(&self) -> Value {
        match self {
            Arg::Null => Value::Null,
            Arg::Bool(b) => Value::Bool(*b),
            Arg::Int(i) => Value::from(*i),
            Arg::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            Arg::Str(s) => Value::String(s.clone()),
            Arg::List(items) => Value::Array(items.iter().map(Arg::to_value).collect()),
            Arg::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect::<Map<String, Value>>(),
            ),
            Arg::Enum { name, value } => match value {
                Some(v) => v.to_value(),
                None => Value::String(name.clone()),
            },
            Arg::DateTime(dt) => Value::String(dt.to_rfc3339()),
            Arg::Object { class, .. } => json!({ "class": class }),
            Arg::Resource(tag) => Value::String(tag.clone()),
        }
    }

    /// Deterministic reduction used to build cache keys
    pub fn cache_repr(&self) -> Value {
        match self {
            Arg::Float(f) if !f.is_finite() => json!({ "$float": f.to_string() }),
            Arg::List(items) => Value::Array(items.iter().map(Arg::cache_repr).collect()),
            Arg::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.cache_repr()))
                    .collect::<Map<String, Value>>(),
            ),
            Arg::Enum { name, value } => json!({
                "$enum": name,
                "value": value.as_ref().map(|v| v.cache_repr()),
            }),
            Arg::DateTime(dt) => json!({
                "$datetime": dt.timestamp_micros(),
                "offset": dt.offset().local_minus_utc(),
            }),
            Arg::Object { class, handle } => json!({
                "$object": class,
                "id": Arc::as_ptr(handle) as *const () as usize,
            }),
            Arg::Resource(tag) => json!({ "$resource": tag }),
            scalar => scalar.to_value(),
        }
    }
}

/// Serialize a whole argument list into one stable key fragment
pub fn cache_key(args: &[Arg]) -> String {
    Value::Array(args.iter().map(Arg::cache_repr).collect()).to_string()
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Object { class, handle } => f
                .debug_struct("Object")
                .field("class", class)
                .field("id", &(Arc::as_ptr(handle) as *const ()))
                .finish(),
            other => write!(f, "{}", other.cache_repr()),
        }
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Str(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Str(s)
    }
}

impl From<bool> for Arg {
    fn from(b: bool) -> Self {
        Arg::Bool(b)
    }
}

impl From<i64> for Arg {
    fn from(i: i64) -> Self {
        Arg::Int(i)
    }
}

impl From<i32> for Arg {
    fn from(i: i32) -> Self {
        Arg::Int(i64::from(i))
    }
}

impl From<f64> for Arg {
    fn from(f: f64) -> Self {
        Arg::Float(f)
    }
}

impl From<Vec<Arg>> for Arg {
    fn from(items: Vec<Arg>) -> Self {
        Arg::List(items)
    }
}

impl From<DateTime<FixedOffset>> for Arg {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        Arg::DateTime(dt)
    }
}

impl From<DateTime<Utc>> for Arg {
    fn from(dt: DateTime<Utc>) -> Self {
        Arg::DateTime(dt.fixed_offset())
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Arg::Null,
            Value::Bool(b) => Arg::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Arg::Int(i),
                None => Arg::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Arg::Str(s),
            Value::Array(items) => Arg::List(items.into_iter().map(Arg::from).collect()),
            Value::Object(map) => Arg::Map(map.into_iter().map(|(k, v)| (k, Arg::from(v))).collect()),
        }
    }
}
