//! MethodDescriptor - one callable native operation
//!
//! A descriptor pairs the metadata the bridge needs for lookup, marshalling
//! and dispatch with the thunk that performs the native call. The thunk shape
//! is fixed by the call kind, so a sync method can never be handed a
//! responder and a deferred method can never return a value inline.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::context::CompletionSink;
use crate::convert::{FromBridge, ToBridge};
use crate::error::{NativeError, NativeResult};
use crate::types::{ArgType, CallKind, CallbackId, QueueId};
use crate::value::BridgeValue;

// ============================================================================
// MethodArgs
// ============================================================================

/// Marshalled arguments, already checked against the declared signature.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodArgs {
    values: Vec<BridgeValue>,
}

impl MethodArgs {
    /// Wrap already-marshalled values
    pub fn new(values: Vec<BridgeValue>) -> Self {
        Self { values }
    }

    /// Number of arguments
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if there are no arguments
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw value at `index`
    pub fn value(&self, index: usize) -> Option<&BridgeValue> {
        self.values.get(index)
    }

    /// Typed value at `index`
    pub fn get<T: FromBridge>(&self, index: usize) -> NativeResult<T> {
        let value = self.values.get(index).ok_or_else(|| {
            NativeError::ArgumentError(format!(
                "argument {} missing ({} supplied)",
                index,
                self.values.len()
            ))
        })?;
        T::from_bridge(value)
    }

    /// Borrow all values
    pub fn as_slice(&self) -> &[BridgeValue] {
        &self.values
    }

    /// Take ownership of all values
    pub fn into_vec(self) -> Vec<BridgeValue> {
        self.values
    }
}

// ============================================================================
// Responder
// ============================================================================

/// One-shot completion handle for a callback or promise method.
///
/// Exactly one outcome is delivered per responder: `resolve`, `reject`,
/// `settle`, or, when dropped unused, a `ResponderDropped` rejection.
/// The responder can be moved to any thread.
pub struct Responder {
    id: CallbackId,
    module: String,
    method: String,
    sink: Option<Weak<dyn CompletionSink>>,
}

impl Responder {
    /// Create a responder for pending invocation `id`
    pub fn new(
        id: CallbackId,
        module: impl Into<String>,
        method: impl Into<String>,
        sink: Weak<dyn CompletionSink>,
    ) -> Self {
        Self {
            id,
            module: module.into(),
            method: method.into(),
            sink: Some(sink),
        }
    }

    /// Id of the pending invocation this responder completes
    pub fn id(&self) -> CallbackId {
        self.id
    }

    /// Deliver a successful result
    pub fn resolve(mut self, value: impl ToBridge) {
        self.finish(Ok(value.to_bridge()));
    }

    /// Deliver a failure
    pub fn reject(mut self, error: NativeError) {
        self.finish(Err(error));
    }

    /// Deliver either outcome
    pub fn settle<T: ToBridge>(mut self, result: NativeResult<T>) {
        self.finish(result.map(ToBridge::to_bridge));
    }

    fn finish(&mut self, outcome: NativeResult<BridgeValue>) {
        // A bridge that is already gone has nowhere to deliver to.
        if let Some(sink) = self.sink.take().and_then(|weak| weak.upgrade()) {
            sink.complete(self.id, outcome);
        }
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        if self.sink.is_some() {
            let error = NativeError::ResponderDropped {
                module: self.module.clone(),
                method: self.method.clone(),
            };
            self.finish(Err(error));
        }
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("id", &self.id)
            .field("module", &self.module)
            .field("method", &self.method)
            .field("pending", &self.sink.is_some())
            .finish()
    }
}

// ============================================================================
// Thunks
// ============================================================================

/// Thunk of a sync-returning method
pub type SyncThunk = Arc<dyn Fn(&MethodArgs) -> NativeResult<BridgeValue> + Send + Sync>;

/// Thunk of a fire-and-forget method
pub type AsyncThunk = Arc<dyn Fn(&MethodArgs) -> NativeResult<()> + Send + Sync>;

/// Thunk of a callback or promise method
pub type DeferredThunk = Arc<dyn Fn(MethodArgs, Responder) + Send + Sync>;

#[derive(Clone)]
enum Thunk {
    Sync(SyncThunk),
    FireAndForget(AsyncThunk),
    Deferred(DeferredThunk),
}

// ============================================================================
// MethodDescriptor
// ============================================================================

/// Metadata and thunk for one native method.
///
/// Immutable once built. `queue` is `None` when the method runs on its
/// module's queue.
#[derive(Clone)]
pub struct MethodDescriptor {
    name: String,
    signature: Vec<ArgType>,
    kind: CallKind,
    queue: Option<QueueId>,
    thunk: Thunk,
}

impl MethodDescriptor {
    /// A method that runs inline and returns a value to its caller
    pub fn sync<F>(name: impl Into<String>, signature: Vec<ArgType>, f: F) -> Self
    where
        F: Fn(&MethodArgs) -> NativeResult<BridgeValue> + Send + Sync + 'static,
    {
        Self::build(name, signature, CallKind::Sync, Thunk::Sync(Arc::new(f)))
    }

    /// A method that is enqueued and reports nothing back
    pub fn fire_and_forget<F>(name: impl Into<String>, signature: Vec<ArgType>, f: F) -> Self
    where
        F: Fn(&MethodArgs) -> NativeResult<()> + Send + Sync + 'static,
    {
        Self::build(
            name,
            signature,
            CallKind::FireAndForget,
            Thunk::FireAndForget(Arc::new(f)),
        )
    }

    /// A method that answers through one error-first callback
    pub fn with_callback<F>(name: impl Into<String>, signature: Vec<ArgType>, f: F) -> Self
    where
        F: Fn(MethodArgs, Responder) + Send + Sync + 'static,
    {
        Self::build(
            name,
            signature,
            CallKind::Callback,
            Thunk::Deferred(Arc::new(f)),
        )
    }

    /// A method that answers through a `(resolve, reject)` pair
    pub fn promise<F>(name: impl Into<String>, signature: Vec<ArgType>, f: F) -> Self
    where
        F: Fn(MethodArgs, Responder) + Send + Sync + 'static,
    {
        Self::build(name, signature, CallKind::Promise, Thunk::Deferred(Arc::new(f)))
    }

    fn build(name: impl Into<String>, signature: Vec<ArgType>, kind: CallKind, thunk: Thunk) -> Self {
        Self {
            name: name.into(),
            signature,
            kind,
            queue: None,
            thunk,
        }
    }

    /// Pin this method to a specific queue instead of its module's queue
    pub fn on_queue(mut self, queue: QueueId) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Method name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared argument types
    pub fn signature(&self) -> &[ArgType] {
        &self.signature
    }

    /// Call kind
    pub fn kind(&self) -> CallKind {
        self.kind
    }

    /// Declared queue, if any
    pub fn queue(&self) -> Option<&QueueId> {
        self.queue.as_ref()
    }

    /// Run the thunk.
    ///
    /// `responder` must be present exactly for callback and promise
    /// methods. Sync methods return their value; every other kind returns
    /// `Null` once the thunk has been entered.
    pub fn call(&self, args: MethodArgs, responder: Option<Responder>) -> NativeResult<BridgeValue> {
        match (&self.thunk, responder) {
            (Thunk::Sync(f), None) => f(&args),
            (Thunk::FireAndForget(f), None) => f(&args).map(|_| BridgeValue::Null),
            (Thunk::Deferred(f), Some(responder)) => {
                f(args, responder);
                Ok(BridgeValue::Null)
            }
            (Thunk::Deferred(_), None) => Err(NativeError::ArgumentError(format!(
                "{} method `{}` requires a responder",
                self.kind.name(),
                self.name
            ))),
            (_, Some(responder)) => {
                let error = NativeError::ArgumentError(format!(
                    "{} method `{}` does not take a responder",
                    self.kind.name(),
                    self.name
                ));
                responder.reject(error.clone());
                Err(error)
            }
        }
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("kind", &self.kind)
            .field("queue", &self.queue)
            .finish()
    }
}
