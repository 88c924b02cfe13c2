//! Argument marshalling for script → native calls
//!
//! Conversion is table driven: one converter per `ArgType`, bound to each
//! method's signature once at registration. A call then only walks its
//! pre-bound converter list.

use conduit_sdk::{ArgType, BridgeValue, CallbackHandle, MethodArgs, NativeError, NativeResult};
use rustc_hash::FxHashMap;

use crate::registry::BoundMethod;
use crate::{BridgeError, BridgeResult};

/// Converts one raw script value into the native representation of a slot
pub type Converter = fn(&BridgeValue) -> NativeResult<BridgeValue>;

/// Converters keyed by target semantic type
#[derive(Clone)]
pub struct ConverterTable {
    converters: FxHashMap<ArgType, Converter>,
}

impl ConverterTable {
    /// Table with the strict default converter for every type
    pub fn new() -> Self {
        let mut converters: FxHashMap<ArgType, Converter> = FxHashMap::default();
        converters.insert(ArgType::Boolean, convert_boolean);
        converters.insert(ArgType::Number, convert_number);
        converters.insert(ArgType::String, convert_string);
        converters.insert(ArgType::Mapping, convert_mapping);
        converters.insert(ArgType::Sequence, convert_sequence);
        converters.insert(ArgType::Callback, convert_callback);
        converters.insert(ArgType::Any, convert_any);
        Self { converters }
    }

    /// Replace the converter for `ty`
    pub fn register(&mut self, ty: ArgType, converter: Converter) {
        self.converters.insert(ty, converter);
    }

    /// Converter for `ty`
    pub fn get(&self, ty: ArgType) -> Converter {
        self.converters.get(&ty).copied().unwrap_or(convert_any)
    }

    /// Bind a signature to its converter list
    pub fn bind(&self, signature: &[ArgType]) -> Vec<Converter> {
        signature.iter().map(|ty| self.get(*ty)).collect()
    }
}

impl Default for ConverterTable {
    fn default() -> Self {
        Self::new()
    }
}

fn mismatch(expected: ArgType, value: &BridgeValue) -> NativeError {
    NativeError::TypeMismatch {
        expected: expected.name().to_string(),
        got: value.type_name().to_string(),
    }
}

fn strict(expected: ArgType, value: &BridgeValue) -> NativeResult<BridgeValue> {
    if expected.accepts(value) {
        Ok(value.clone())
    } else {
        Err(mismatch(expected, value))
    }
}

fn convert_boolean(value: &BridgeValue) -> NativeResult<BridgeValue> {
    strict(ArgType::Boolean, value)
}

fn convert_number(value: &BridgeValue) -> NativeResult<BridgeValue> {
    strict(ArgType::Number, value)
}

fn convert_string(value: &BridgeValue) -> NativeResult<BridgeValue> {
    strict(ArgType::String, value)
}

fn convert_mapping(value: &BridgeValue) -> NativeResult<BridgeValue> {
    strict(ArgType::Mapping, value)
}

fn convert_sequence(value: &BridgeValue) -> NativeResult<BridgeValue> {
    strict(ArgType::Sequence, value)
}

fn convert_callback(value: &BridgeValue) -> NativeResult<BridgeValue> {
    strict(ArgType::Callback, value)
}

fn convert_any(value: &BridgeValue) -> NativeResult<BridgeValue> {
    Ok(value.clone())
}

/// Marshal raw script arguments against a bound method's signature
pub fn marshal_args(method: &BoundMethod, raw: &[BridgeValue]) -> BridgeResult<MethodArgs> {
    let converters = method.converters();
    if raw.len() != converters.len() {
        return Err(method.mismatch(format!(
            "expected {} arguments, got {}",
            converters.len(),
            raw.len()
        )));
    }

    raw.iter()
        .zip(converters)
        .enumerate()
        .map(|(index, (value, convert))| {
            convert(value).map_err(|e| method.mismatch(format!("argument {}: {}", index, e)))
        })
        .collect::<BridgeResult<Vec<_>>>()
        .map(MethodArgs::new)
}

/// Check the completion handles supplied for a call against its kind
pub fn check_completion_handles(
    method: &BoundMethod,
    handles: &[CallbackHandle],
) -> BridgeResult<()> {
    let expected = method.descriptor().kind().completion_handles();
    if handles.len() != expected {
        return Err(method.mismatch(format!(
            "{} method expects {} completion handles, got {}",
            method.descriptor().kind().name(),
            expected,
            handles.len()
        )));
    }
    Ok(())
}
