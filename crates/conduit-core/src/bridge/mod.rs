//! The bridge
//!
//! A [`Bridge`] owns one execution context (on its script queue), one frozen
//! module registry and the native queues the registry's methods run on.
//!
//! Script → native: resolve, marshal, allocate a pending invocation for
//! callback/promise kinds, then run sync methods inline and enqueue the rest.
//! Native → script: every call hops onto the script queue, so script code
//! never runs concurrently with itself.
//!
//! # Invariants
//! - Nothing is delivered across the boundary once invalidation has begun,
//!   except the cancellation of pending invocations.
//! - Every pending invocation is completed exactly once.
//! - Sync thunks cannot re-enter the bridge.

mod context;
mod lifecycle;
pub mod marshal;

pub use context::{
    BundleSource, CallbackTable, Completion, ExecutionContext, Invocation, NativeCall,
    PendingInvocation, ScriptBundle, ScriptError, ScriptHost, ScriptRuntime,
};
pub use lifecycle::{InvalidationController, InvalidationState, TeardownTicket};
pub use marshal::{Converter, ConverterTable};

use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use conduit_sdk::{
    BridgeValue, CallKind, CallbackHandle, CallbackId, CompletionSink, NativeError, NativeModule,
    NativeResult, QueueId, Responder, Severity,
};
use crossbeam::channel;
use log::{debug, error, info, warn};

use crate::exceptions::{ExceptionManager, ExceptionsModule};
use crate::queue::{panic_message, DispatchQueue, PoolQueue, QueueSet, SerialQueue, StatefulQueue};
use crate::registry::{BoundMethod, ModuleRegistry};
use crate::{BridgeConfig, BridgeError, BridgeResult};

/// Unique identifier for a bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BridgeId(u64);

impl BridgeId {
    /// Create a new unique bridge ID
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        BridgeId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for BridgeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BridgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Re-entrancy guard
// ============================================================================

thread_local! {
    static IN_SYNC_THUNK: Cell<bool> = const { Cell::new(false) };
}

struct SyncThunkScope {
    previous: bool,
}

impl SyncThunkScope {
    fn enter() -> Self {
        let previous = IN_SYNC_THUNK.with(|flag| flag.replace(true));
        Self { previous }
    }
}

impl Drop for SyncThunkScope {
    fn drop(&mut self) {
        IN_SYNC_THUNK.with(|flag| flag.set(self.previous));
    }
}

fn check_reentry(operation: &str) -> BridgeResult<()> {
    if IN_SYNC_THUNK.with(Cell::get) {
        return Err(BridgeError::ReentrantCall(format!(
            "{} called from inside a sync native method",
            operation
        )));
    }
    Ok(())
}

// ============================================================================
// Shared state
// ============================================================================

struct BridgeShared {
    id: BridgeId,
    config: BridgeConfig,
    registry: Arc<ModuleRegistry>,
    queues: QueueSet,
    script: StatefulQueue<ExecutionContext>,
    lifecycle: Arc<InvalidationController>,
    exceptions: Arc<ExceptionManager>,
    this: Weak<BridgeShared>,
}

/// `ScriptHost` handed to the runtime while a script-queue job runs
struct HostBinding<'a> {
    shared: &'a Arc<BridgeShared>,
    callbacks: &'a mut CallbackTable,
}

impl ScriptHost for HostBinding<'_> {
    fn call_native(&mut self, call: NativeCall) -> BridgeResult<Invocation> {
        check_reentry("call_native")?;
        self.shared.handle_native_call(self.callbacks, call)
    }

    fn report_exception(&mut self, error: &ScriptError) {
        // A limit signal has already been logged and delivered to delegates.
        let _ = self.shared.exceptions.report_script_error(error);
    }

    fn module_config(&self) -> BridgeValue {
        self.shared.registry.describe()
    }
}

impl BridgeShared {
    /// Steps 1–5 of a script → native call. Runs on the script queue.
    fn handle_native_call(
        &self,
        callbacks: &mut CallbackTable,
        call: NativeCall,
    ) -> BridgeResult<Invocation> {
        let method = self.registry.resolve(&call.module, &call.method)?.clone();
        let args = marshal::marshal_args(&method, &call.args)?;
        marshal::check_completion_handles(&method, &call.callbacks)?;
        self.lifecycle.check_active()?;

        let kind = method.descriptor().kind();
        debug!(
            "event=native_call bridge={} module={} method={} kind={} queue={}",
            self.id,
            method.module(),
            method.name(),
            kind.name(),
            method.queue()
        );

        match kind {
            CallKind::Sync => {
                let _scope = SyncThunkScope::enter();
                let outcome =
                    panic::catch_unwind(AssertUnwindSafe(|| method.descriptor().call(args, None)));
                match outcome {
                    Ok(result) => result.map(Invocation::Returned).map_err(BridgeError::Native),
                    Err(payload) => {
                        let reason = panic_message(payload.as_ref());
                        error!(
                            "event=native_call_panicked bridge={} module={} method={} reason={}",
                            self.id,
                            method.module(),
                            method.name(),
                            reason
                        );
                        Err(BridgeError::Native(NativeError::ModuleError(format!(
                            "{}.{} panicked: {}",
                            method.module(),
                            method.name(),
                            reason
                        ))))
                    }
                }
            }
            CallKind::FireAndForget => {
                let lifecycle = self.lifecycle.clone();
                let bridge = self.id;
                let job_method = method.clone();
                self.dispatch_native(&method, move || {
                    if !lifecycle.is_active() {
                        debug!(
                            "event=native_call_skipped bridge={} module={} method={}",
                            bridge,
                            job_method.module(),
                            job_method.name()
                        );
                        return;
                    }
                    if let Err(e) = job_method.descriptor().call(args, None) {
                        error!(
                            "event=native_call_failed bridge={} module={} method={} error={}",
                            bridge,
                            job_method.module(),
                            job_method.name(),
                            e
                        );
                    }
                })?;
                Ok(Invocation::Dispatched { callback_id: None })
            }
            CallKind::Callback | CallKind::Promise => {
                let completion = Completion::from_handles(&call.callbacks).ok_or_else(|| {
                    method.mismatch(format!("{} completion handles", call.callbacks.len()))
                })?;
                let id = callbacks.allocate(method.module(), method.name(), method.queue(), completion);
                let sink: Weak<dyn CompletionSink> = self.this.clone();
                let responder = Responder::new(id, method.module(), method.name(), sink);

                let lifecycle = self.lifecycle.clone();
                let job_method = method.clone();
                let dispatched = self.dispatch_native(&method, move || {
                    if !lifecycle.is_active() {
                        // The pending entry is cancelled by teardown; the
                        // responder's drop-time rejection is ignored.
                        return;
                    }
                    if let Err(e) = job_method.descriptor().call(args, Some(responder)) {
                        debug!(
                            "event=native_call_rejected module={} method={} error={}",
                            job_method.module(),
                            job_method.name(),
                            e
                        );
                    }
                });

                if let Err(e) = dispatched {
                    callbacks.take(id);
                    return Err(e);
                }
                Ok(Invocation::Dispatched {
                    callback_id: Some(id),
                })
            }
        }
    }

    fn dispatch_native<F>(&self, method: &BoundMethod, job: F) -> BridgeResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let queue = self
            .queues
            .get(method.queue())
            .ok_or_else(|| BridgeError::QueueClosed {
                label: method.queue().to_string(),
            })?;
        queue.dispatch(Box::new(job))
    }

    /// Enqueue a job on the script queue
    fn on_script<F>(self: &Arc<Self>, job: F) -> BridgeResult<()>
    where
        F: FnOnce(&Arc<BridgeShared>, &mut ExecutionContext) + Send + 'static,
    {
        let shared = self.clone();
        self.script
            .dispatch_with(move |ctx| job(&shared, ctx))
            .map_err(|_| BridgeError::BridgeInvalidated)
    }

    /// Run `f` against the runtime with a host binding, reporting any script
    /// error as an exception
    fn with_runtime<R>(
        self: &Arc<Self>,
        ctx: &mut ExecutionContext,
        what: &str,
        f: impl FnOnce(&mut dyn ScriptRuntime, &mut dyn ScriptHost) -> Result<R, ScriptError>,
    ) -> BridgeResult<R> {
        let (runtime, callbacks) = ctx.parts();
        let runtime = runtime.ok_or(BridgeError::BridgeInvalidated)?;
        let mut host = HostBinding {
            shared: self,
            callbacks,
        };
        f(runtime, &mut host).map_err(|e| {
            warn!(
                "event=script_error bridge={} during={} severity={} message={}",
                self.id, what, e.severity, e.message
            );
            // A limit signal has already been logged and delivered to delegates.
            let _ = self.exceptions.report_script_error(&e);
            match e.severity {
                Severity::Fatal => BridgeError::FatalException(e.message),
                Severity::Soft => BridgeError::SoftException(e.message),
            }
        })
    }

    /// Deliver a completion. Runs on the script queue.
    fn deliver(self: &Arc<Self>, ctx: &mut ExecutionContext, id: CallbackId, outcome: NativeResult<BridgeValue>) {
        if !self.lifecycle.is_active() {
            // Left in the table for teardown to cancel.
            return;
        }
        let Some(pending) = ctx.callbacks_mut().take(id) else {
            warn!(
                "event=completion_ignored bridge={} callback_id={} reason=unknown_or_completed",
                self.id, id
            );
            return;
        };

        debug!(
            "event=completion bridge={} callback_id={} module={} method={} ok={}",
            self.id,
            id,
            pending.module,
            pending.method,
            outcome.is_ok()
        );
        let (handle, args) = pending.completion.arguments(outcome);
        let _ = self.with_runtime(ctx, "invoke_callback", |runtime, host| {
            runtime.invoke_callback(handle, &args, host)
        });
    }

    fn load_bundle(self: &Arc<Self>, bundle: ScriptBundle) -> BridgeResult<()> {
        self.on_script(move |shared, ctx| {
            if !shared.lifecycle.is_active() {
                return;
            }
            let label = bundle.label();
            let loaded = shared.with_runtime(ctx, "load_bundle", |runtime, host| {
                runtime.load_bundle(&bundle, host)
            });
            if loaded.is_ok() {
                info!("event=bundle_loaded bridge={} bundle={}", shared.id, label);
                ctx.set_loaded_bundle(label);
            }
        })
    }

    /// `Active → Invalidating` plus the teardown fan-out. Returns whether
    /// this call started the teardown.
    fn begin_invalidation(self: &Arc<Self>) -> bool {
        let weak = self.this.clone();
        let Some(ticket) = self.lifecycle.begin(move || {
            if let Some(shared) = weak.upgrade() {
                shared.finish_invalidation();
            }
        }) else {
            return false;
        };

        info!("event=bridge_invalidating bridge={}", self.id);

        for module in self.registry.invalidatable() {
            let step = ticket.fork();
            let instance = module.module().clone();
            let name = module.name().to_string();
            let bridge = self.id;
            let notify = move || {
                if let Some(target) = instance.as_invalidatable() {
                    target.invalidate();
                }
                debug!("event=module_invalidated bridge={} module={}", bridge, name);
                drop(step);
            };

            match self.queues.get(module.queue()) {
                Some(queue) if queue.is_current() => notify(),
                Some(queue) => {
                    if let Err(e) = queue.dispatch(Box::new(notify)) {
                        warn!(
                            "event=module_invalidate_skipped bridge={} module={} error={}",
                            self.id,
                            module.name(),
                            e
                        );
                    }
                }
                None => notify(),
            }
        }

        let step = ticket.fork();
        let teardown = self.on_script(move |shared, ctx| {
            shared.teardown_context(ctx);
            drop(step);
        });
        if teardown.is_err() {
            warn!("event=context_teardown_skipped bridge={} reason=script_queue_closed", self.id);
        }

        drop(ticket);
        true
    }

    /// Cancel every pending invocation and release the runtime. Runs on the
    /// script queue.
    fn teardown_context(self: &Arc<Self>, ctx: &mut ExecutionContext) {
        let pending = ctx.callbacks_mut().drain();
        let cancelled = pending.len();
        for invocation in pending {
            let error = NativeError::Cancelled(format!(
                "{}.{} cancelled by bridge invalidation",
                invocation.module, invocation.method
            ));
            let (handle, args) = invocation.completion.arguments(Err(error));
            let _ = self.with_runtime(ctx, "cancel_pending", |runtime, host| {
                runtime.invoke_callback(handle, &args, host)
            });
        }

        if let Some(mut runtime) = ctx.take_runtime() {
            runtime.teardown();
        }
        info!(
            "event=context_torn_down bridge={} cancelled={}",
            self.id, cancelled
        );
    }

    fn finish_invalidation(&self) {
        self.exceptions.detach_module_delegates(self.id);
        // A bridge thread must not join its siblings: one of them may be
        // blocked on this thread. Sealed queues are joined when dropped.
        if self.script.is_current() || self.queues.is_current() {
            self.queues.seal_all();
            self.script.seal();
        } else {
            self.queues.close_all();
            self.script.close();
        }
        info!("event=bridge_invalidated bridge={}", self.id);
    }

    /// Run a script-queue job and wait for its result
    fn block_on_script<R, F>(self: &Arc<Self>, operation: &str, job: F) -> BridgeResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&Arc<BridgeShared>, &mut ExecutionContext) -> BridgeResult<R> + Send + 'static,
    {
        if self.script.is_current() {
            return Err(BridgeError::ReentrantCall(format!(
                "{} called from the script queue",
                operation
            )));
        }

        let (tx, rx) = channel::bounded(1);
        self.on_script(move |shared, ctx| {
            let _ = tx.send(job(shared, ctx));
        })?;

        match rx.recv_timeout(self.config.shutdown_timeout()) {
            Ok(result) => result,
            Err(channel::RecvTimeoutError::Timeout) => Err(BridgeError::Timeout(operation.to_string())),
            // The job was dropped unrun because the queue closed underneath it,
            // or it panicked on the script queue.
            Err(channel::RecvTimeoutError::Disconnected) if !self.lifecycle.is_active() => {
                Err(BridgeError::BridgeInvalidated)
            }
            Err(channel::RecvTimeoutError::Disconnected) => Err(BridgeError::Native(
                NativeError::ModuleError(format!("{} panicked on the script queue", operation)),
            )),
        }
    }

    fn check_open(&self, operation: &str) -> BridgeResult<()> {
        check_reentry(operation)?;
        self.lifecycle.check_active().map_err(|e| {
            warn!(
                "event=call_refused bridge={} operation={} state={}",
                self.id,
                operation,
                self.lifecycle.state()
            );
            e
        })
    }
}

impl CompletionSink for BridgeShared {
    fn complete(&self, id: CallbackId, outcome: NativeResult<BridgeValue>) {
        if !self.lifecycle.is_active() {
            debug!(
                "event=completion_ignored bridge={} callback_id={} reason=invalidated",
                self.id, id
            );
            return;
        }
        let Some(shared) = self.this.upgrade() else {
            return;
        };
        let scheduled = shared.on_script(move |shared, ctx| shared.deliver(ctx, id, outcome));
        if scheduled.is_err() {
            debug!(
                "event=completion_ignored bridge={} callback_id={} reason=script_queue_closed",
                self.id, id
            );
        }
    }
}

// ============================================================================
// Bridge
// ============================================================================

/// The native/script bridge
///
/// Dropping the bridge starts invalidation without waiting for it.
pub struct Bridge {
    shared: Arc<BridgeShared>,
}

impl Bridge {
    /// Start building a bridge around `runtime`
    pub fn builder(runtime: Box<dyn ScriptRuntime>) -> BridgeBuilder {
        BridgeBuilder::new(runtime)
    }

    /// Bridge id
    pub fn id(&self) -> BridgeId {
        self.shared.id
    }

    /// The frozen module registry
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.shared.registry
    }

    /// The exception manager this bridge reports to
    pub fn exception_manager(&self) -> &Arc<ExceptionManager> {
        &self.shared.exceptions
    }

    /// Configuration the bridge was built with
    pub fn config(&self) -> &BridgeConfig {
        &self.shared.config
    }

    /// Lifecycle state
    pub fn state(&self) -> InvalidationState {
        self.shared.lifecycle.state()
    }

    /// Whether the bridge still accepts calls
    pub fn is_valid(&self) -> bool {
        self.shared.lifecycle.is_active()
    }

    /// Call a native method on behalf of script from a non-script thread.
    ///
    /// Blocks until the call has been dispatched, or for sync methods until
    /// the method has returned.
    pub fn invoke_from_script(&self, call: NativeCall) -> BridgeResult<Invocation> {
        self.shared.check_open("invoke_from_script")?;
        self.shared
            .block_on_script("invoke_from_script", move |shared, ctx| {
                shared.handle_native_call(ctx.callbacks_mut(), call)
            })
    }

    /// Complete a pending invocation
    pub fn invoke_script_callback(&self, id: CallbackId, result: NativeResult<BridgeValue>) -> BridgeResult<()> {
        self.shared.check_open("invoke_script_callback")?;
        self.shared
            .on_script(move |shared, ctx| shared.deliver(ctx, id, result))
    }

    /// Call the global script function `module.method` without waiting
    pub fn invoke_global_function(&self, module: &str, method: &str, args: Vec<BridgeValue>) -> BridgeResult<()> {
        self.shared.check_open("invoke_global_function")?;
        let module = module.to_string();
        let method = method.to_string();
        debug!(
            "event=script_call bridge={} module={} method={}",
            self.shared.id, module, method
        );
        self.shared.on_script(move |shared, ctx| {
            if !shared.lifecycle.is_active() {
                return;
            }
            let _ = shared.with_runtime(ctx, "call_function", |runtime, host| {
                runtime.call_function(&module, &method, &args, host)
            });
        })
    }

    /// Call the global script function `module.method` and wait for its value
    pub fn call_global_function(&self, module: &str, method: &str, args: Vec<BridgeValue>) -> BridgeResult<BridgeValue> {
        self.shared.check_open("call_global_function")?;
        let module = module.to_string();
        let method = method.to_string();
        self.shared
            .block_on_script("call_global_function", move |shared, ctx| {
                shared.lifecycle.check_active()?;
                shared.with_runtime(ctx, "call_function", |runtime, host| {
                    runtime.call_function(&module, &method, &args, host)
                })
            })
    }

    /// Invoke a script function handle received as a callback argument
    pub fn call_script_handle(&self, handle: CallbackHandle, args: Vec<BridgeValue>) -> BridgeResult<()> {
        self.shared.check_open("call_script_handle")?;
        self.shared.on_script(move |shared, ctx| {
            if !shared.lifecycle.is_active() {
                return;
            }
            let _ = shared.with_runtime(ctx, "invoke_callback", |runtime, host| {
                runtime.invoke_callback(handle, &args, host)
            });
        })
    }

    /// Number of pending invocations
    pub fn pending_invocations(&self) -> BridgeResult<usize> {
        self.shared.check_open("pending_invocations")?;
        self.shared
            .block_on_script("pending_invocations", |_, ctx| Ok(ctx.callbacks().len()))
    }

    /// Block until every script-queue job enqueued before this call has run.
    ///
    /// Refused once invalidation has begun.
    pub fn flush(&self) -> BridgeResult<()> {
        self.shared.check_open("flush")?;
        self.shared.block_on_script("flush", |_, _| Ok(()))
    }

    /// Start teardown and wait for it to finish.
    ///
    /// Idempotent. Called from the script queue it only starts teardown.
    pub fn invalidate(&self) -> BridgeResult<()> {
        check_reentry("invalidate")?;
        self.shared.begin_invalidation();
        if self.shared.script.is_current() {
            return Ok(());
        }
        if self.shared.lifecycle.wait_invalidated(self.shared.config.shutdown_timeout()) {
            Ok(())
        } else {
            error!(
                "event=invalidate_timeout bridge={} outstanding={}",
                self.shared.id,
                self.shared.lifecycle.outstanding()
            );
            Err(BridgeError::Timeout("bridge invalidation".to_string()))
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if self.shared.lifecycle.is_active() {
            self.shared.begin_invalidation();
        }
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("modules", &self.shared.registry.len())
            .finish()
    }
}

// ============================================================================
// BridgeBuilder
// ============================================================================

/// Builder for [`Bridge`]
pub struct BridgeBuilder {
    runtime: Box<dyn ScriptRuntime>,
    config: BridgeConfig,
    bundle: Option<ScriptBundle>,
    modules: Vec<Arc<dyn NativeModule>>,
    main_queue: Option<Arc<dyn DispatchQueue>>,
    exceptions: Option<Arc<ExceptionManager>>,
    converters: ConverterTable,
}

impl BridgeBuilder {
    fn new(runtime: Box<dyn ScriptRuntime>) -> Self {
        Self {
            runtime,
            config: BridgeConfig::default(),
            bundle: None,
            modules: Vec::new(),
            main_queue: None,
            exceptions: None,
            converters: ConverterTable::new(),
        }
    }

    /// Use this configuration
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Load this bundle once the bridge is up
    pub fn bundle(mut self, bundle: ScriptBundle) -> Self {
        self.bundle = Some(bundle);
        self
    }

    /// Register a module
    pub fn module(mut self, module: Arc<dyn NativeModule>) -> Self {
        self.modules.push(module);
        self
    }

    /// Register several modules, in order
    pub fn modules(mut self, modules: impl IntoIterator<Item = Arc<dyn NativeModule>>) -> Self {
        self.modules.extend(modules);
        self
    }

    /// Use a host-owned main queue instead of spawning one
    pub fn main_queue(mut self, queue: Arc<dyn DispatchQueue>) -> Self {
        self.main_queue = Some(queue);
        self
    }

    /// Share an exception manager (kept across reloads)
    pub fn exception_manager(mut self, manager: Arc<ExceptionManager>) -> Self {
        self.exceptions = Some(manager);
        self
    }

    /// Use a custom converter table
    pub fn converters(mut self, converters: ConverterTable) -> Self {
        self.converters = converters;
        self
    }

    /// Register modules, start the queues and enqueue the bundle load
    pub fn build(self) -> BridgeResult<Bridge> {
        let config = self.config;
        config.validate()?;

        let exceptions = self
            .exceptions
            .unwrap_or_else(|| Arc::new(ExceptionManager::from_config(&config, None)));

        let mut registry = ModuleRegistry::builder()
            .abi_version(config.abi_version)
            .converters(self.converters);
        registry.register(Arc::new(ExceptionsModule::new(
            exceptions.clone(),
            config.abi_version,
        )))?;
        for module in self.modules {
            registry.register(module)?;
        }
        let registry = Arc::new(registry.build());

        let (main, owns_main): (Arc<dyn DispatchQueue>, bool) = match self.main_queue {
            Some(queue) => (queue, false),
            None => (Arc::new(SerialQueue::spawn(config.queue_label("main"))?), true),
        };
        let background: Arc<dyn DispatchQueue> = Arc::new(PoolQueue::spawn(
            config.queue_label("background"),
            config.background_threads,
        )?);
        let mut queues = QueueSet::new(main, background, owns_main);
        for queue in registry.queues() {
            if let QueueId::Named(label) = queue {
                queues.ensure_named(&label, &config.queue_prefix)?;
            }
        }

        let script = StatefulQueue::spawn(
            config.queue_label("script"),
            ExecutionContext::new(self.runtime),
        )?;

        let id = BridgeId::new();
        exceptions.attach_module_delegates(id, registry.exceptions_delegates());

        let shared = Arc::new_cyclic(|this| BridgeShared {
            id,
            config,
            registry,
            queues,
            script,
            lifecycle: Arc::new(InvalidationController::new()),
            exceptions,
            this: this.clone(),
        });

        info!(
            "event=bridge_started bridge={} modules={} named_queues={} abi={}",
            id,
            shared.registry.len(),
            shared.queues.named_count(),
            shared.config.abi_version
        );

        if let Some(bundle) = self.bundle {
            shared.load_bundle(bundle)?;
        }

        Ok(Bridge { shared })
    }
}
