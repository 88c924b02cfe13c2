//! Descriptor vocabulary: argument types, call kinds, queues and ids
//!
//! These are the pieces a module author uses to describe a method without
//! depending on any bridge internals.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::BridgeValue;

/// ABI version of this SDK. Modules built against a different version are
/// rejected at registration.
pub const SDK_ABI_VERSION: u32 = 1;

// ============================================================================
// Ids
// ============================================================================

/// Script-owned handle to a function living in the script runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackHandle(u64);

impl CallbackHandle {
    /// Wrap a raw handle value issued by the script runtime
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw handle value
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Bridge-issued id of one pending invocation.
///
/// Issued from a monotonically increasing counter and never reused within
/// one execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u64);

impl CallbackId {
    /// Wrap a raw id
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw id
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Argument types
// ============================================================================

/// Semantic type of one declared argument slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    /// `true` / `false`
    Boolean,
    /// Any script number
    Number,
    /// String
    String,
    /// String-keyed map
    Mapping,
    /// Array
    Sequence,
    /// Opaque script function handle
    Callback,
    /// Passed through unchecked
    Any,
}

impl ArgType {
    /// Name used in diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            ArgType::Boolean => "boolean",
            ArgType::Number => "number",
            ArgType::String => "string",
            ArgType::Mapping => "mapping",
            ArgType::Sequence => "sequence",
            ArgType::Callback => "callback",
            ArgType::Any => "any",
        }
    }

    /// Check whether `value` has this semantic type
    pub fn accepts(&self, value: &BridgeValue) -> bool {
        matches!(
            (self, value),
            (ArgType::Any, _)
                | (ArgType::Boolean, BridgeValue::Bool(_))
                | (ArgType::Number, BridgeValue::Number(_))
                | (ArgType::String, BridgeValue::String(_))
                | (ArgType::Mapping, BridgeValue::Map(_))
                | (ArgType::Sequence, BridgeValue::Array(_))
                | (ArgType::Callback, BridgeValue::Callback(_))
        )
    }

    /// All argument types, in declaration order
    pub fn all() -> &'static [ArgType] {
        &[
            ArgType::Boolean,
            ArgType::Number,
            ArgType::String,
            ArgType::Mapping,
            ArgType::Sequence,
            ArgType::Callback,
            ArgType::Any,
        ]
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Call kinds
// ============================================================================

/// How a method returns to its caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Runs inline on the calling queue and returns a value immediately
    Sync,
    /// Enqueued; no result is delivered
    FireAndForget,
    /// Enqueued; one error-first callback handle receives the result
    Callback,
    /// Enqueued; a `(resolve, reject)` handle pair receives the result
    Promise,
}

impl CallKind {
    /// Whether the call is enqueued rather than run inline
    pub fn is_async(&self) -> bool {
        !matches!(self, CallKind::Sync)
    }

    /// Whether the call creates a pending invocation
    pub fn expects_completion(&self) -> bool {
        matches!(self, CallKind::Callback | CallKind::Promise)
    }

    /// Number of completion handles a caller must supply
    pub fn completion_handles(&self) -> usize {
        match self {
            CallKind::Sync | CallKind::FireAndForget => 0,
            CallKind::Callback => 1,
            CallKind::Promise => 2,
        }
    }

    /// Name used in diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            CallKind::Sync => "sync",
            CallKind::FireAndForget => "async",
            CallKind::Callback => "callback",
            CallKind::Promise => "promise",
        }
    }
}

// ============================================================================
// Queues
// ============================================================================

/// Identifies the native queue a method runs on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueueId {
    /// The host's main/UI queue
    Main,
    /// The shared background pool
    Background,
    /// A dedicated serial queue, created once per distinct label
    Named(String),
}

impl QueueId {
    /// Create a named serial queue id
    pub fn named(label: impl Into<String>) -> Self {
        QueueId::Named(label.into())
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueId::Main => f.write_str("main"),
            QueueId::Background => f.write_str("background"),
            QueueId::Named(label) => f.write_str(label),
        }
    }
}
