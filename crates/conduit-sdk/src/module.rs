//! NativeModule trait - the registration contract
//!
//! A module exposes a stable name and an ordered list of method descriptors.
//! Optional capabilities are reported through `as_*` accessors, which the
//! bridge queries once at registration and records as flags.

use crate::exception::ExceptionRecord;
use crate::handler::MethodDescriptor;
use crate::types::{QueueId, SDK_ABI_VERSION};

/// A unit of native functionality callable from script
pub trait NativeModule: Send + Sync {
    /// Stable, unique module name
    fn name(&self) -> &str;

    /// Ordered method table. Called once, at registration.
    fn methods(&self) -> Vec<MethodDescriptor>;

    /// Queue for methods that do not declare one
    fn method_queue(&self) -> QueueId {
        QueueId::Background
    }

    /// Force every method of this module onto the main queue
    fn requires_main_queue(&self) -> bool {
        false
    }

    /// SDK ABI this module was compiled against
    fn abi_version(&self) -> u32 {
        SDK_ABI_VERSION
    }

    /// Invalidation capability, if implemented
    fn as_invalidatable(&self) -> Option<&dyn Invalidatable> {
        None
    }

    /// Exceptions-delegate capability, if implemented
    fn as_exceptions_delegate(&self) -> Option<&dyn ExceptionsDelegate> {
        None
    }
}

/// Teardown capability.
///
/// `invalidate` is called at most once per bridge, on the module's queue.
/// Implementations should still tolerate repeated calls.
pub trait Invalidatable: Send + Sync {
    /// Release resources and stop producing results
    fn invalidate(&self);
}

/// Receiver of script exceptions forwarded by the exception manager
pub trait ExceptionsDelegate: Send + Sync {
    /// A recoverable script error
    fn handle_soft_exception(&self, record: &ExceptionRecord);

    /// An unrecoverable script error; the host decides whether to reload
    fn handle_fatal_exception(&self, record: &ExceptionRecord);

    /// Whether `update_exception` is implemented
    fn supports_update(&self) -> bool {
        false
    }

    /// Amend a previously reported record with the same `exception_id`
    fn update_exception(&self, _record: &ExceptionRecord) {}

    /// Called once when fatal reports exceed the reload ceiling
    fn reload_limit_exceeded(&self, _attempts: usize, _max_attempts: usize) {}
}
