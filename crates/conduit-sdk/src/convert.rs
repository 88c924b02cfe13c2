//! Traits for converting between bridge values and Rust types.
//!
//! Implement `FromBridge` to receive a type as an argument and `ToBridge` to
//! return it from a method.
//!
//! # Example
//!
//! ```ignore
//! use conduit_sdk::{BridgeValue, FromBridge, NativeResult, ToBridge};
//!
//! struct Size { width: f64, height: f64 }
//!
//! impl ToBridge for Size {
//!     fn to_bridge(self) -> BridgeValue {
//!         BridgeValue::map([
//!             ("width", self.width.to_bridge()),
//!             ("height", self.height.to_bridge()),
//!         ])
//!     }
//! }
//! ```

use std::collections::BTreeMap;

use crate::error::{NativeError, NativeResult};
use crate::types::CallbackHandle;
use crate::value::BridgeValue;

/// Convert a bridge value into a Rust type.
pub trait FromBridge: Sized {
    /// Convert, returning an error if the type doesn't match
    fn from_bridge(value: &BridgeValue) -> NativeResult<Self>;
}

/// Convert a Rust type into a bridge value.
pub trait ToBridge {
    /// Convert to BridgeValue
    fn to_bridge(self) -> BridgeValue;
}

fn mismatch(expected: &str, value: &BridgeValue) -> NativeError {
    NativeError::TypeMismatch {
        expected: expected.to_string(),
        got: value.type_name().to_string(),
    }
}

impl FromBridge for BridgeValue {
    fn from_bridge(value: &BridgeValue) -> NativeResult<Self> {
        Ok(value.clone())
    }
}

impl FromBridge for bool {
    fn from_bridge(value: &BridgeValue) -> NativeResult<Self> {
        value.as_bool().ok_or_else(|| mismatch("boolean", value))
    }
}

impl FromBridge for f64 {
    fn from_bridge(value: &BridgeValue) -> NativeResult<Self> {
        value.as_f64().ok_or_else(|| mismatch("number", value))
    }
}

impl FromBridge for i64 {
    fn from_bridge(value: &BridgeValue) -> NativeResult<Self> {
        value.as_i64().ok_or_else(|| mismatch("integer", value))
    }
}

impl FromBridge for i32 {
    fn from_bridge(value: &BridgeValue) -> NativeResult<Self> {
        let wide = i64::from_bridge(value)?;
        i32::try_from(wide)
            .map_err(|_| NativeError::ArgumentError(format!("{} out of i32 range", wide)))
    }
}

impl FromBridge for String {
    fn from_bridge(value: &BridgeValue) -> NativeResult<Self> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch("string", value))
    }
}

impl FromBridge for CallbackHandle {
    fn from_bridge(value: &BridgeValue) -> NativeResult<Self> {
        value.as_callback().ok_or_else(|| mismatch("callback", value))
    }
}

impl<T: FromBridge> FromBridge for Option<T> {
    fn from_bridge(value: &BridgeValue) -> NativeResult<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_bridge(value).map(Some)
        }
    }
}

impl<T: FromBridge> FromBridge for Vec<T> {
    fn from_bridge(value: &BridgeValue) -> NativeResult<Self> {
        value
            .as_array()
            .ok_or_else(|| mismatch("sequence", value))?
            .iter()
            .map(T::from_bridge)
            .collect()
    }
}

impl<T: FromBridge> FromBridge for BTreeMap<String, T> {
    fn from_bridge(value: &BridgeValue) -> NativeResult<Self> {
        value
            .as_map()
            .ok_or_else(|| mismatch("mapping", value))?
            .iter()
            .map(|(k, v)| Ok((k.clone(), T::from_bridge(v)?)))
            .collect()
    }
}

impl ToBridge for BridgeValue {
    fn to_bridge(self) -> BridgeValue {
        self
    }
}

impl ToBridge for () {
    fn to_bridge(self) -> BridgeValue {
        BridgeValue::Null
    }
}

impl ToBridge for bool {
    fn to_bridge(self) -> BridgeValue {
        BridgeValue::Bool(self)
    }
}

impl ToBridge for f64 {
    fn to_bridge(self) -> BridgeValue {
        BridgeValue::Number(self)
    }
}

impl ToBridge for i32 {
    fn to_bridge(self) -> BridgeValue {
        BridgeValue::Number(f64::from(self))
    }
}

impl ToBridge for i64 {
    fn to_bridge(self) -> BridgeValue {
        BridgeValue::Number(self as f64)
    }
}

impl ToBridge for u64 {
    fn to_bridge(self) -> BridgeValue {
        BridgeValue::Number(self as f64)
    }
}

impl ToBridge for String {
    fn to_bridge(self) -> BridgeValue {
        BridgeValue::String(self)
    }
}

impl ToBridge for &str {
    fn to_bridge(self) -> BridgeValue {
        BridgeValue::String(self.to_string())
    }
}

impl ToBridge for CallbackHandle {
    fn to_bridge(self) -> BridgeValue {
        BridgeValue::Callback(self)
    }
}

impl<T: ToBridge> ToBridge for Option<T> {
    fn to_bridge(self) -> BridgeValue {
        self.map(ToBridge::to_bridge).unwrap_or(BridgeValue::Null)
    }
}

impl<T: ToBridge> ToBridge for Vec<T> {
    fn to_bridge(self) -> BridgeValue {
        BridgeValue::Array(self.into_iter().map(ToBridge::to_bridge).collect())
    }
}

impl<T: ToBridge> ToBridge for BTreeMap<String, T> {
    fn to_bridge(self) -> BridgeValue {
        BridgeValue::Map(self.into_iter().map(|(k, v)| (k, v.to_bridge())).collect())
    }
}
