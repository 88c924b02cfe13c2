//! Script exception management
//!
//! The [`ExceptionManager`] receives uncaught script errors, forwards them to
//! exception delegates and counts fatal reports against the reload ceiling.
//! It is shared by `Arc` and outlives individual bridges, so the count spans
//! reloads.
//!
//! Script reaches the manager through the built-in `ExceptionsManager`
//! module that every bridge registers.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use conduit_sdk::{
    ArgType, BridgeValue, ExceptionRecord, ExceptionsDelegate, MethodArgs, MethodDescriptor,
    NativeModule, NativeResult, QueueId, Severity, StackFrame,
};
use log::{error, warn};
use parking_lot::RwLock;

use crate::bridge::{BridgeId, ScriptError};
use crate::{BridgeConfig, BridgeError, BridgeResult};

/// Name the built-in module is registered under
pub const EXCEPTIONS_MODULE_NAME: &str = "ExceptionsManager";

/// Routes script exceptions to delegates and enforces the reload ceiling
pub struct ExceptionManager {
    max_reload_attempts: usize,
    host_delegate: Option<Arc<dyn ExceptionsDelegate>>,
    module_delegates: RwLock<Vec<(BridgeId, Vec<Arc<dyn NativeModule>>)>>,
    fatal_count: AtomicUsize,
    limit_signalled: AtomicBool,
    next_exception_id: AtomicU64,
}

impl ExceptionManager {
    /// Create a manager allowing `max_reload_attempts` fatal reports before
    /// the limit is signalled
    pub fn new(max_reload_attempts: usize, host_delegate: Option<Arc<dyn ExceptionsDelegate>>) -> Self {
        Self {
            max_reload_attempts,
            host_delegate,
            module_delegates: RwLock::new(Vec::new()),
            fatal_count: AtomicUsize::new(0),
            limit_signalled: AtomicBool::new(false),
            next_exception_id: AtomicU64::new(1),
        }
    }

    /// Create a manager with the ceiling from `config`
    pub fn from_config(config: &BridgeConfig, host_delegate: Option<Arc<dyn ExceptionsDelegate>>) -> Self {
        Self::new(config.max_reload_attempts, host_delegate)
    }

    /// Report an exception.
    ///
    /// Soft reports are forwarded and always succeed. Fatal reports are
    /// forwarded and counted; the one that pushes the count past the ceiling
    /// also returns `ReloadLimitExceeded` and notifies delegates. Later fatal
    /// reports are still forwarded but do not signal again.
    pub fn report_exception(
        &self,
        message: impl Into<String>,
        stack: Vec<StackFrame>,
        severity: Severity,
        exception_id: u64,
    ) -> BridgeResult<()> {
        let record = ExceptionRecord {
            message: message.into(),
            stack,
            severity,
            exception_id,
        };

        match severity {
            Severity::Soft => {
                warn!(
                    "event=script_exception severity=soft id={} message={}",
                    record.exception_id, record.message
                );
                self.for_each_delegate(|d| d.handle_soft_exception(&record));
                Ok(())
            }
            Severity::Fatal => {
                let attempts = self.fatal_count.fetch_add(1, Ordering::AcqRel) + 1;
                error!(
                    "event=script_exception severity=fatal id={} attempts={} max={} message={}",
                    record.exception_id, attempts, self.max_reload_attempts, record.message
                );
                self.for_each_delegate(|d| d.handle_fatal_exception(&record));

                if attempts > self.max_reload_attempts
                    && !self.limit_signalled.swap(true, Ordering::AcqRel)
                {
                    error!(
                        "event=reload_limit_exceeded attempts={} max={}",
                        attempts, self.max_reload_attempts
                    );
                    self.for_each_delegate(|d| {
                        d.reload_limit_exceeded(attempts, self.max_reload_attempts)
                    });
                    return Err(BridgeError::ReloadLimitExceeded {
                        attempts,
                        max_attempts: self.max_reload_attempts,
                    });
                }
                Ok(())
            }
        }
    }

    /// Report an error raised while the bridge was running script, assigning
    /// it a fresh exception id
    pub fn report_script_error(&self, error: &ScriptError) -> BridgeResult<()> {
        let id = self.next_exception_id.fetch_add(1, Ordering::Relaxed);
        self.report_exception(error.message.clone(), error.stack.clone(), error.severity, id)
    }

    /// Amend a previously reported exception on delegates that support it
    pub fn update_exception(&self, exception_id: u64, message: impl Into<String>, stack: Vec<StackFrame>) {
        let record = ExceptionRecord {
            message: message.into(),
            stack,
            severity: Severity::Soft,
            exception_id,
        };
        self.for_each_delegate(|d| {
            if d.supports_update() {
                d.update_exception(&record);
            }
        });
    }

    /// Fatal reports so far
    pub fn fatal_count(&self) -> usize {
        self.fatal_count.load(Ordering::Acquire)
    }

    /// Configured ceiling
    pub fn max_reload_attempts(&self) -> usize {
        self.max_reload_attempts
    }

    /// Whether `ReloadLimitExceeded` has been signalled
    pub fn limit_exceeded(&self) -> bool {
        self.limit_signalled.load(Ordering::Acquire)
    }

    /// Clear the fatal count and re-arm the limit signal
    pub fn reset_reload_attempts(&self) {
        self.fatal_count.store(0, Ordering::Release);
        self.limit_signalled.store(false, Ordering::Release);
    }

    pub(crate) fn attach_module_delegates(&self, bridge: BridgeId, modules: Vec<Arc<dyn NativeModule>>) {
        if modules.is_empty() {
            return;
        }
        self.module_delegates.write().push((bridge, modules));
    }

    pub(crate) fn detach_module_delegates(&self, bridge: BridgeId) {
        self.module_delegates.write().retain(|(id, _)| *id != bridge);
    }

    fn for_each_delegate(&self, mut f: impl FnMut(&dyn ExceptionsDelegate)) {
        if let Some(delegate) = &self.host_delegate {
            f(delegate.as_ref());
        }

        // Snapshot first so a delegate may report again without deadlocking.
        let modules: Vec<Arc<dyn NativeModule>> = self
            .module_delegates
            .read()
            .iter()
            .flat_map(|(_, modules)| modules.iter().cloned())
            .collect();
        for module in &modules {
            if let Some(delegate) = module.as_exceptions_delegate() {
                f(delegate);
            }
        }
    }
}

impl fmt::Debug for ExceptionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionManager")
            .field("max_reload_attempts", &self.max_reload_attempts)
            .field("fatal_count", &self.fatal_count())
            .field("limit_exceeded", &self.limit_exceeded())
            .finish()
    }
}

/// The `ExceptionsManager` module script reports through
pub(crate) struct ExceptionsModule {
    manager: Arc<ExceptionManager>,
    abi_version: u32,
}

impl ExceptionsModule {
    /// Built in, so always on the ABI of the bridge registering it
    pub(crate) fn new(manager: Arc<ExceptionManager>, abi_version: u32) -> Self {
        Self {
            manager,
            abi_version,
        }
    }
}

/// `(message, stack, exceptionId)`
fn report_args(args: &MethodArgs) -> NativeResult<(String, Vec<StackFrame>, u64)> {
    let message: String = args.get(0)?;
    let stack = args
        .value(1)
        .and_then(BridgeValue::as_array)
        .unwrap_or_default()
        .iter()
        .map(StackFrame::from_script_value)
        .collect();
    let id: i64 = args.get(2)?;
    Ok((message, stack, id.max(0) as u64))
}

impl NativeModule for ExceptionsModule {
    fn name(&self) -> &str {
        EXCEPTIONS_MODULE_NAME
    }

    fn methods(&self) -> Vec<MethodDescriptor> {
        let signature = vec![ArgType::String, ArgType::Sequence, ArgType::Number];

        let soft = self.manager.clone();
        let fatal = self.manager.clone();
        let update = self.manager.clone();
        vec![
            MethodDescriptor::fire_and_forget("reportSoftException", signature.clone(), move |args| {
                let (message, stack, id) = report_args(args)?;
                // Soft reports cannot fail.
                let _ = soft.report_exception(message, stack, Severity::Soft, id);
                Ok(())
            }),
            MethodDescriptor::fire_and_forget("reportFatalException", signature.clone(), move |args| {
                let (message, stack, id) = report_args(args)?;
                // The limit signal has already been logged and delivered to delegates.
                let _ = fatal.report_exception(message, stack, Severity::Fatal, id);
                Ok(())
            }),
            MethodDescriptor::fire_and_forget("updateExceptionMessage", signature, move |args| {
                let (message, stack, id) = report_args(args)?;
                update.update_exception(id, message, stack);
                Ok(())
            }),
        ]
    }

    fn method_queue(&self) -> QueueId {
        QueueId::named("exceptions")
    }

    fn abi_version(&self) -> u32 {
        self.abi_version
    }
}
