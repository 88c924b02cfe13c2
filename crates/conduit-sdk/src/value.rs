//! BridgeValue - the value tree carried across the script boundary
//!
//! Both directions use the same representation: script arguments arrive as
//! `BridgeValue`s and native results leave as `BridgeValue`s. The script
//! runtime is responsible for mapping these onto its own heap values.
//!
//! # JSON form
//!
//! ```text
//! Null            <-> null
//! Bool(b)         <-> true / false
//! Number(f)       <-> number
//! String(s)       <-> "s"
//! Array(items)    <-> [ ... ]
//! Map(entries)    <-> { ... }
//! Callback(h)     <-> {"$callback": h}
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};

use crate::types::CallbackHandle;

/// JSON key used to encode a callback handle.
pub const CALLBACK_JSON_KEY: &str = "$callback";

/// A value crossing the native/script boundary (deep copy, no shared heap).
#[derive(Debug, Clone, PartialEq, Default)]
pub enum BridgeValue {
    /// Null / undefined
    #[default]
    Null,

    /// Boolean value
    Bool(bool),

    /// Script numbers are IEEE 754 doubles
    Number(f64),

    /// String value
    String(String),

    /// Ordered sequence
    Array(Vec<BridgeValue>),

    /// String-keyed mapping with deterministic key order
    Map(BTreeMap<String, BridgeValue>),

    /// Opaque handle to a script-side function
    Callback(CallbackHandle),
}

impl BridgeValue {
    /// Check if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, BridgeValue::Null)
    }

    /// Get the semantic type name, used in mismatch diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            BridgeValue::Null => "null",
            BridgeValue::Bool(_) => "boolean",
            BridgeValue::Number(_) => "number",
            BridgeValue::String(_) => "string",
            BridgeValue::Array(_) => "sequence",
            BridgeValue::Map(_) => "mapping",
            BridgeValue::Callback(_) => "callback",
        }
    }

    /// Get as bool if this is a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            BridgeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as f64 if this is a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            BridgeValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as i64 if this is a number with no fractional part
    pub fn as_i64(&self) -> Option<i64> {
        let n = self.as_f64()?;
        if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
            Some(n as i64)
        } else {
            None
        }
    }

    /// Get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            BridgeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as array slice
    pub fn as_array(&self) -> Option<&[BridgeValue]> {
        match self {
            BridgeValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Get as map
    pub fn as_map(&self) -> Option<&BTreeMap<String, BridgeValue>> {
        match self {
            BridgeValue::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Get as callback handle
    pub fn as_callback(&self) -> Option<CallbackHandle> {
        match self {
            BridgeValue::Callback(handle) => Some(*handle),
            _ => None,
        }
    }

    /// Look up a key when this is a map
    pub fn get(&self, key: &str) -> Option<&BridgeValue> {
        self.as_map().and_then(|entries| entries.get(key))
    }

    /// Build a map value from `(key, value)` pairs
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, BridgeValue)>,
    {
        BridgeValue::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build the `{code, message}` map used for errors delivered to script
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        BridgeValue::map([
            ("code", BridgeValue::String(code.to_string())),
            ("message", BridgeValue::String(message.into())),
        ])
    }

    /// Convert to JSON; callback handles become `{"$callback": id}`
    pub fn to_json(&self) -> JsonValue {
        match self {
            BridgeValue::Null => JsonValue::Null,
            BridgeValue::Bool(b) => JsonValue::Bool(*b),
            BridgeValue::Number(n) => JsonNumber::from_f64(*n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            BridgeValue::String(s) => JsonValue::String(s.clone()),
            BridgeValue::Array(items) => {
                JsonValue::Array(items.iter().map(BridgeValue::to_json).collect())
            }
            BridgeValue::Map(entries) => JsonValue::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<JsonMap<_, _>>(),
            ),
            BridgeValue::Callback(handle) => {
                let mut obj = JsonMap::new();
                obj.insert(
                    CALLBACK_JSON_KEY.to_string(),
                    JsonValue::Number(handle.as_u64().into()),
                );
                JsonValue::Object(obj)
            }
        }
    }
}

impl From<JsonValue> for BridgeValue {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => BridgeValue::Null,
            JsonValue::Bool(b) => BridgeValue::Bool(b),
            // Non-finite numbers cannot appear in parsed JSON.
            JsonValue::Number(n) => BridgeValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(s) => BridgeValue::String(s),
            JsonValue::Array(items) => {
                BridgeValue::Array(items.into_iter().map(BridgeValue::from).collect())
            }
            JsonValue::Object(obj) => {
                if obj.len() == 1 {
                    if let Some(id) = obj.get(CALLBACK_JSON_KEY).and_then(JsonValue::as_u64) {
                        return BridgeValue::Callback(CallbackHandle::new(id));
                    }
                }
                BridgeValue::Map(
                    obj.into_iter()
                        .map(|(k, v)| (k, BridgeValue::from(v)))
                        .collect(),
                )
            }
        }
    }
}

impl fmt::Display for BridgeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeValue::Null => write!(f, "null"),
            BridgeValue::Bool(b) => write!(f, "{}", b),
            BridgeValue::Number(n) => write!(f, "{}", n),
            BridgeValue::String(s) => write!(f, "\"{}\"", s),
            BridgeValue::Array(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            BridgeValue::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            BridgeValue::Callback(handle) => write!(f, "Callback({})", handle.as_u64()),
        }
    }
}
