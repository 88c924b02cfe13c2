//! Conduit bridge core
//!
//! This crate provides the native/script bridge including:
//! - Module registry with startup-time method tables
//! - Argument marshalling through a typed converter table
//! - Dispatch queues (script, main, background pool, named serial)
//! - Execution context wrapping the embedded script runtime
//! - Invalidation (one-way teardown) and exception management
//! - The host-facing root surface

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bridge;
pub mod config;
pub mod exceptions;
pub mod host;
pub mod logging;
pub mod queue;
pub mod registry;

pub use bridge::{
    Bridge, BridgeBuilder, BridgeId, ExecutionContext, InvalidationController, InvalidationState,
    Invocation, NativeCall, PendingInvocation, ScriptBundle, BundleSource, ScriptError, ScriptHost,
    ScriptRuntime, ConverterTable,
};
pub use config::BridgeConfig;
pub use exceptions::ExceptionManager;
pub use host::{RootHost, RootHostDelegate, RootHostSetup, SizeFlexibility, SurfaceId};
pub use logging::init_logging;
pub use queue::{DispatchQueue, PoolQueue, SerialQueue};
pub use registry::{BoundMethod, ModuleRegistry, ModuleRegistryBuilder, RegisteredModule};

pub use conduit_sdk as sdk;

use conduit_sdk::{BridgeValue, NativeError};

/// Bridge errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    /// No module registered under this name
    #[error("Unknown module: {0}")]
    UnknownModule(String),

    /// Module exists but has no such method
    #[error("Unknown method: {module}.{method}")]
    UnknownMethod {
        /// Module name
        module: String,
        /// Method name
        method: String,
    },

    /// Arguments or completion handles do not match the declared signature
    #[error("Argument type mismatch in {module}.{method}: {detail}")]
    ArgumentTypeMismatch {
        /// Module name
        module: String,
        /// Method name
        method: String,
        /// What did not match
        detail: String,
    },

    /// A module with this name is already registered
    #[error("Duplicate module name: {0}")]
    DuplicateModuleName(String),

    /// A module declares the same method name twice
    #[error("Duplicate method name: {module}.{method}")]
    DuplicateMethodName {
        /// Module name
        module: String,
        /// Method name
        method: String,
    },

    /// A module was built against a different SDK ABI
    #[error("ABI mismatch for module {module}: bridge is v{expected}, module is v{found}")]
    AbiMismatch {
        /// Module name
        module: String,
        /// Bridge ABI version
        expected: u32,
        /// Module ABI version
        found: u32,
    },

    /// The bridge is invalidating or invalidated
    #[error("Bridge invalidated")]
    BridgeInvalidated,

    /// Fatal exceptions exceeded the configured reload ceiling
    #[error("Reload limit exceeded: {attempts} fatal exceptions, limit {max_attempts}")]
    ReloadLimitExceeded {
        /// Fatal exceptions reported so far
        attempts: usize,
        /// Configured ceiling
        max_attempts: usize,
    },

    /// Script raised a recoverable error
    #[error("Soft script exception: {0}")]
    SoftException(String),

    /// Script raised an unrecoverable error
    #[error("Fatal script exception: {0}")]
    FatalException(String),

    /// A bridge entry point was re-entered from a sync thunk or the script queue
    #[error("Re-entrant bridge call: {0}")]
    ReentrantCall(String),

    /// The target queue no longer accepts work
    #[error("Queue closed: {label}")]
    QueueClosed {
        /// Queue label
        label: String,
    },

    /// A queue thread could not be started
    #[error("Failed to spawn queue {label}: {reason}")]
    QueueSpawn {
        /// Queue label
        label: String,
        /// OS error
        reason: String,
    },

    /// A blocking bridge operation did not finish in time
    #[error("Timed out waiting for {0}")]
    Timeout(String),

    /// A native thunk failed
    #[error(transparent)]
    Native(#[from] NativeError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// Stable error code delivered to script
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::UnknownModule(_) => "E_UNKNOWN_MODULE",
            BridgeError::UnknownMethod { .. } => "E_UNKNOWN_METHOD",
            BridgeError::ArgumentTypeMismatch { .. } => "E_ARGUMENT_TYPE_MISMATCH",
            BridgeError::DuplicateModuleName(_) => "E_DUPLICATE_MODULE",
            BridgeError::DuplicateMethodName { .. } => "E_DUPLICATE_METHOD",
            BridgeError::AbiMismatch { .. } => "E_ABI_MISMATCH",
            BridgeError::BridgeInvalidated => "E_BRIDGE_INVALIDATED",
            BridgeError::ReloadLimitExceeded { .. } => "E_RELOAD_LIMIT_EXCEEDED",
            BridgeError::SoftException(_) => "E_SOFT_EXCEPTION",
            BridgeError::FatalException(_) => "E_FATAL_EXCEPTION",
            BridgeError::ReentrantCall(_) => "E_REENTRANT_CALL",
            BridgeError::QueueClosed { .. } => "E_QUEUE_CLOSED",
            BridgeError::QueueSpawn { .. } => "E_QUEUE_SPAWN",
            BridgeError::Timeout(_) => "E_TIMEOUT",
            BridgeError::Native(err) => err.code(),
            BridgeError::Config(_) => "E_CONFIG",
        }
    }

    /// Render as the `{code, message}` map delivered to script
    pub fn to_script_value(&self) -> BridgeValue {
        BridgeValue::error(self.code(), self.to_string())
    }
}

/// Bridge operation result
pub type BridgeResult<T> = Result<T, BridgeError>;
