//! Execution context
//!
//! The execution context wraps the embedded script runtime together with the
//! table of pending invocations. It lives on the script queue thread and is
//! only ever touched there, so neither part needs a lock.

use std::fmt;

use conduit_sdk::{
    BridgeValue, CallbackHandle, CallbackId, NativeError, QueueId, Severity, StackFrame,
};
use rustc_hash::FxHashMap;

use crate::BridgeResult;

// ============================================================================
// Bundles
// ============================================================================

/// Where a script bundle comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleSource {
    /// Fetched by the runtime from a URL or path
    Url(String),
    /// Supplied in memory
    Embedded(Vec<u8>),
}

/// An opaque script bundle. Loading it is the runtime's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptBundle {
    source: BundleSource,
}

impl ScriptBundle {
    /// Bundle fetched from `url`
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            source: BundleSource::Url(url.into()),
        }
    }

    /// Bundle held in memory
    pub fn embedded(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            source: BundleSource::Embedded(bytes.into()),
        }
    }

    /// Bundle source
    pub fn source(&self) -> &BundleSource {
        &self.source
    }

    /// Short description for logs
    pub fn label(&self) -> String {
        match &self.source {
            BundleSource::Url(url) => url.clone(),
            BundleSource::Embedded(bytes) => format!("<embedded {} bytes>", bytes.len()),
        }
    }
}

// ============================================================================
// Script errors
// ============================================================================

/// An error raised by script code
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ScriptError {
    /// Error message
    pub message: String,
    /// Innermost frame first
    pub stack: Vec<StackFrame>,
    /// Uncaught errors are fatal unless the runtime says otherwise
    pub severity: Severity,
}

impl ScriptError {
    /// An uncaught, fatal error
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: Vec::new(),
            severity: Severity::Fatal,
        }
    }

    /// A recoverable error
    pub fn soft(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: Vec::new(),
            severity: Severity::Soft,
        }
    }

    /// Attach a stack trace
    pub fn with_stack(mut self, stack: Vec<StackFrame>) -> Self {
        self.stack = stack;
        self
    }
}

// ============================================================================
// Calls
// ============================================================================

/// A script → native call request
#[derive(Debug, Clone, PartialEq)]
pub struct NativeCall {
    /// Module name
    pub module: String,
    /// Method name
    pub method: String,
    /// Raw arguments, checked against the method signature
    pub args: Vec<BridgeValue>,
    /// Completion handles: one for callback methods, `(resolve, reject)` for
    /// promise methods, none otherwise
    pub callbacks: Vec<CallbackHandle>,
}

impl NativeCall {
    /// A call without completion handles
    pub fn new(module: impl Into<String>, method: impl Into<String>, args: Vec<BridgeValue>) -> Self {
        Self {
            module: module.into(),
            method: method.into(),
            args,
            callbacks: Vec::new(),
        }
    }

    /// Attach completion handles
    pub fn with_callbacks(mut self, callbacks: Vec<CallbackHandle>) -> Self {
        self.callbacks = callbacks;
        self
    }
}

/// How a script → native call was handled
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// A sync method ran inline and returned this value
    Returned(BridgeValue),
    /// The call was enqueued on its native queue. Callback and promise calls
    /// carry the id of their pending invocation.
    Dispatched {
        /// Pending invocation id, if the call expects a completion
        callback_id: Option<CallbackId>,
    },
}

impl Invocation {
    /// The returned value of a sync call
    pub fn returned(&self) -> Option<&BridgeValue> {
        match self {
            Invocation::Returned(value) => Some(value),
            Invocation::Dispatched { .. } => None,
        }
    }

    /// The pending invocation id of a callback or promise call
    pub fn callback_id(&self) -> Option<CallbackId> {
        match self {
            Invocation::Returned(_) => None,
            Invocation::Dispatched { callback_id } => *callback_id,
        }
    }
}

// ============================================================================
// Runtime seam
// ============================================================================

/// What a running script can reach of the bridge
pub trait ScriptHost {
    /// Call a native method
    fn call_native(&mut self, call: NativeCall) -> BridgeResult<Invocation>;

    /// Report an error the script caught or could not handle
    fn report_exception(&mut self, error: &ScriptError);

    /// `[{name, methods: [{name, kind, signature}]}]` for every module
    fn module_config(&self) -> BridgeValue;
}

/// An embedded script engine.
///
/// Every method is called on the script queue thread, one at a time. The
/// `host` argument is only valid for the duration of the call.
pub trait ScriptRuntime: Send {
    /// Evaluate a bundle
    fn load_bundle(&mut self, bundle: &ScriptBundle, host: &mut dyn ScriptHost) -> Result<(), ScriptError>;

    /// Call the global function `module.method`
    fn call_function(
        &mut self,
        module: &str,
        method: &str,
        args: &[BridgeValue],
        host: &mut dyn ScriptHost,
    ) -> Result<BridgeValue, ScriptError>;

    /// Invoke a script function previously handed to native as a handle
    fn invoke_callback(
        &mut self,
        handle: CallbackHandle,
        args: &[BridgeValue],
        host: &mut dyn ScriptHost,
    ) -> Result<(), ScriptError>;

    /// Release engine resources. Called once, right before the runtime is dropped.
    fn teardown(&mut self) {}
}

// ============================================================================
// Pending invocations
// ============================================================================

/// Script-side continuation of a callback or promise call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Error-first callback
    Callback(CallbackHandle),
    /// Resolve/reject pair
    Promise {
        /// Called with `[result]`
        resolve: CallbackHandle,
        /// Called with `[error]`
        reject: CallbackHandle,
    },
}

impl Completion {
    /// Build the completion from the handles of a call. Handle counts are
    /// checked before this point.
    pub(crate) fn from_handles(handles: &[CallbackHandle]) -> Option<Self> {
        match handles {
            [callback] => Some(Completion::Callback(*callback)),
            [resolve, reject] => Some(Completion::Promise {
                resolve: *resolve,
                reject: *reject,
            }),
            _ => None,
        }
    }

    /// The handle to invoke and its arguments for `outcome`
    pub fn arguments(&self, outcome: Result<BridgeValue, NativeError>) -> (CallbackHandle, Vec<BridgeValue>) {
        match (self, outcome) {
            (Completion::Callback(handle), Ok(value)) => (*handle, vec![BridgeValue::Null, value]),
            (Completion::Callback(handle), Err(error)) => (*handle, vec![error.to_script_value()]),
            (Completion::Promise { resolve, .. }, Ok(value)) => (*resolve, vec![value]),
            (Completion::Promise { reject, .. }, Err(error)) => (*reject, vec![error.to_script_value()]),
        }
    }
}

/// A callback or promise call waiting for its result
#[derive(Debug, Clone, PartialEq)]
pub struct PendingInvocation {
    /// Unique id within the execution context
    pub id: CallbackId,
    /// Module name
    pub module: String,
    /// Method name
    pub method: String,
    /// Queue the thunk runs on
    pub queue: QueueId,
    /// Where the result goes
    pub completion: Completion,
}

/// Pending invocations keyed by id, with a counter that never repeats
#[derive(Debug, Default)]
pub struct CallbackTable {
    pending: FxHashMap<CallbackId, PendingInvocation>,
    next_id: u64,
}

impl CallbackTable {
    /// Allocate a fresh id and record the pending invocation
    pub fn allocate(
        &mut self,
        module: &str,
        method: &str,
        queue: &QueueId,
        completion: Completion,
    ) -> CallbackId {
        self.next_id += 1;
        let id = CallbackId::new(self.next_id);
        self.pending.insert(
            id,
            PendingInvocation {
                id,
                module: module.to_string(),
                method: method.to_string(),
                queue: queue.clone(),
                completion,
            },
        );
        id
    }

    /// Remove and return a pending invocation
    pub fn take(&mut self, id: CallbackId) -> Option<PendingInvocation> {
        self.pending.remove(&id)
    }

    /// Look at a pending invocation
    pub fn get(&self, id: CallbackId) -> Option<&PendingInvocation> {
        self.pending.get(&id)
    }

    /// Remove everything, oldest first
    pub fn drain(&mut self) -> Vec<PendingInvocation> {
        let mut drained: Vec<_> = self.pending.drain().map(|(_, p)| p).collect();
        drained.sort_by_key(|p| p.id);
        drained
    }

    /// Number of pending invocations
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

// ============================================================================
// ExecutionContext
// ============================================================================

/// The runtime handle plus its pending-callback table.
///
/// Owned by the script queue thread. The runtime is released exactly once,
/// by [`ExecutionContext::take_runtime`] during teardown.
pub struct ExecutionContext {
    runtime: Option<Box<dyn ScriptRuntime>>,
    callbacks: CallbackTable,
    loaded_bundle: Option<String>,
}

impl ExecutionContext {
    /// Wrap a runtime
    pub fn new(runtime: Box<dyn ScriptRuntime>) -> Self {
        Self {
            runtime: Some(runtime),
            callbacks: CallbackTable::default(),
            loaded_bundle: None,
        }
    }

    /// Whether the runtime has been released
    pub fn is_torn_down(&self) -> bool {
        self.runtime.is_none()
    }

    /// Label of the last bundle loaded successfully
    pub fn loaded_bundle(&self) -> Option<&str> {
        self.loaded_bundle.as_deref()
    }

    /// The pending-callback table
    pub fn callbacks(&self) -> &CallbackTable {
        &self.callbacks
    }

    pub(crate) fn callbacks_mut(&mut self) -> &mut CallbackTable {
        &mut self.callbacks
    }

    pub(crate) fn set_loaded_bundle(&mut self, label: String) {
        self.loaded_bundle = Some(label);
    }

    /// Borrow the runtime and the callback table at the same time
    pub(crate) fn parts(&mut self) -> (Option<&mut (dyn ScriptRuntime + 'static)>, &mut CallbackTable) {
        (self.runtime.as_deref_mut(), &mut self.callbacks)
    }

    pub(crate) fn take_runtime(&mut self) -> Option<Box<dyn ScriptRuntime>> {
        self.runtime.take()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("torn_down", &self.is_torn_down())
            .field("pending", &self.callbacks.len())
            .field("loaded_bundle", &self.loaded_bundle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_ids_are_never_reused() {
        let mut table = CallbackTable::default();
        let completion = Completion::Callback(CallbackHandle::new(7));

        let a = table.allocate("Alert", "show", &QueueId::Main, completion);
        assert!(table.take(a).is_some());
        let b = table.allocate("Alert", "show", &QueueId::Main, completion);

        assert_ne!(a, b);
        assert!(b > a);
        assert!(table.take(a).is_none());
    }

    #[test]
    fn test_drain_is_oldest_first() {
        let mut table = CallbackTable::default();
        let ids: Vec<_> = (0..5)
            .map(|i| {
                table.allocate(
                    "Timer",
                    "wait",
                    &QueueId::Background,
                    Completion::Callback(CallbackHandle::new(i)),
                )
            })
            .collect();

        let drained: Vec<_> = table.drain().into_iter().map(|p| p.id).collect();
        assert_eq!(drained, ids);
        assert!(table.is_empty());
    }

    #[test]
    fn test_callback_completion_is_error_first() {
        let completion = Completion::Callback(CallbackHandle::new(1));

        let (handle, args) = completion.arguments(Ok(BridgeValue::String("OK".into())));
        assert_eq!(handle, CallbackHandle::new(1));
        assert_eq!(args, vec![BridgeValue::Null, BridgeValue::String("OK".into())]);

        let (_, args) = completion.arguments(Err(NativeError::Cancelled("gone".into())));
        assert_eq!(args.len(), 1);
        assert_eq!(
            args[0].get("code").and_then(BridgeValue::as_str),
            Some("E_BRIDGE_INVALIDATED")
        );
    }

    #[test]
    fn test_promise_completion_picks_handle() {
        let completion =
            Completion::from_handles(&[CallbackHandle::new(10), CallbackHandle::new(11)]).unwrap();

        let (handle, args) = completion.arguments(Ok(BridgeValue::Number(1.0)));
        assert_eq!(handle, CallbackHandle::new(10));
        assert_eq!(args, vec![BridgeValue::Number(1.0)]);

        let (handle, _) = completion.arguments(Err(NativeError::ModuleError("no".into())));
        assert_eq!(handle, CallbackHandle::new(11));
    }

    #[test]
    fn test_completion_from_wrong_handle_count() {
        assert!(Completion::from_handles(&[]).is_none());
        assert!(Completion::from_handles(&[CallbackHandle::new(1); 3]).is_none());
    }

    #[test]
    fn test_bundle_label() {
        assert_eq!(ScriptBundle::url("http://localhost/index.bundle").label(), "http://localhost/index.bundle");
        assert_eq!(ScriptBundle::embedded(vec![0u8; 4]).label(), "<embedded 4 bytes>");
    }
}
