//! CompletionSink trait - where deferred results go
//!
//! Defines the interface that the bridge implements. Responders hold a
//! non-owning reference to a sink and push exactly one outcome into it;
//! module code never sees bridge internals.

use crate::error::NativeResult;
use crate::types::CallbackId;
use crate::value::BridgeValue;

/// Receiver of completed asynchronous invocations.
///
/// `complete` may be called from any thread. The implementation is
/// responsible for hopping onto the script queue before touching the
/// pending-invocation table.
pub trait CompletionSink: Send + Sync {
    /// Deliver the outcome of pending invocation `id`
    fn complete(&self, id: CallbackId, outcome: NativeResult<BridgeValue>);
}
