//! Error types raised by native module code

use crate::value::BridgeValue;

/// Result type for native thunks and conversions
pub type NativeResult<T> = Result<T, NativeError>;

/// Native module error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NativeError {
    /// Type mismatch during conversion
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected type name
        expected: String,
        /// Actual type name
        got: String,
    },

    /// Invalid argument
    #[error("Argument error: {0}")]
    ArgumentError(String),

    /// Module-level error
    #[error("Module error: {0}")]
    ModuleError(String),

    /// The pending invocation was cancelled by bridge invalidation
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// A responder was dropped without resolving or rejecting
    #[error("Responder for {module}.{method} dropped without a result")]
    ResponderDropped {
        /// Module name
        module: String,
        /// Method name
        method: String,
    },
}

impl NativeError {
    /// Stable error code delivered to script
    pub fn code(&self) -> &'static str {
        match self {
            NativeError::TypeMismatch { .. } => "E_TYPE_MISMATCH",
            NativeError::ArgumentError(_) => "E_INVALID_ARGUMENT",
            NativeError::ModuleError(_) => "E_MODULE",
            NativeError::Cancelled(_) => "E_BRIDGE_INVALIDATED",
            NativeError::ResponderDropped { .. } => "E_RESPONDER_DROPPED",
        }
    }

    /// Render as the `{code, message}` map delivered to script
    pub fn to_script_value(&self) -> BridgeValue {
        BridgeValue::error(self.code(), self.to_string())
    }

    /// Whether this error is a cancellation caused by invalidation
    pub fn is_cancellation(&self) -> bool {
        matches!(self, NativeError::Cancelled(_))
    }
}

impl From<String> for NativeError {
    fn from(s: String) -> Self {
        NativeError::ModuleError(s)
    }
}

impl From<&str> for NativeError {
    fn from(s: &str) -> Self {
        NativeError::ModuleError(s.to_string())
    }
}
