//! Conduit SDK - the contract between native modules and the bridge
//!
//! This crate provides the minimal types and traits needed to write a native
//! module without depending on the bridge itself.
//!
//! # Example
//!
//! ```ignore
//! use conduit_sdk::{ArgType, MethodDescriptor, NativeModule, QueueId};
//!
//! struct Alert;
//!
//! impl NativeModule for Alert {
//!     fn name(&self) -> &str {
//!         "Alert"
//!     }
//!
//!     fn methods(&self) -> Vec<MethodDescriptor> {
//!         vec![MethodDescriptor::with_callback(
//!             "show",
//!             vec![ArgType::String, ArgType::String],
//!             |args, responder| {
//!                 // present the dialog, then:
//!                 responder.resolve("ok");
//!             },
//!         )]
//!     }
//!
//!     fn method_queue(&self) -> QueueId {
//!         QueueId::Main
//!     }
//! }
//! ```

#![warn(missing_docs)]

pub mod context;
pub mod convert;
pub mod error;
pub mod exception;
pub mod handler;
pub mod module;
pub mod types;
pub mod value;

pub use context::CompletionSink;
pub use convert::{FromBridge, ToBridge};
pub use error::{NativeError, NativeResult};
pub use exception::{ExceptionRecord, Severity, StackFrame};
pub use handler::{
    AsyncThunk, DeferredThunk, MethodArgs, MethodDescriptor, Responder, SyncThunk,
};
pub use module::{ExceptionsDelegate, Invalidatable, NativeModule};
pub use types::{ArgType, CallKind, CallbackHandle, CallbackId, QueueId, SDK_ABI_VERSION};
pub use value::BridgeValue;
