//! Shared fixtures: a scripted in-memory runtime and an Alert module

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use conduit_core::sdk::{
    ArgType, BridgeValue, CallbackHandle, Invalidatable, MethodDescriptor, NativeModule, QueueId,
    Responder,
};
use conduit_core::{ScriptBundle, ScriptError, ScriptHost, ScriptRuntime};
use parking_lot::Mutex;

pub const WAIT: Duration = Duration::from_secs(5);

/// Poll `check` until it holds or the wait budget runs out
pub fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    check()
}

/// Everything the scripted runtime observed
#[derive(Debug, Default, Clone)]
pub struct Journal {
    pub bundles: Vec<String>,
    pub calls: Vec<(String, String, Vec<BridgeValue>)>,
    pub callbacks: Vec<(CallbackHandle, Vec<BridgeValue>)>,
    pub teardowns: usize,
}

/// Cloneable view onto a runtime's journal
#[derive(Debug, Default, Clone)]
pub struct Recorder(Arc<Mutex<Journal>>);

impl Recorder {
    pub fn snapshot(&self) -> Journal {
        self.0.lock().clone()
    }

    pub fn callbacks(&self) -> Vec<(CallbackHandle, Vec<BridgeValue>)> {
        self.0.lock().callbacks.clone()
    }

    pub fn callbacks_for(&self, handle: CallbackHandle) -> Vec<Vec<BridgeValue>> {
        self.0
            .lock()
            .callbacks
            .iter()
            .filter(|(h, _)| *h == handle)
            .map(|(_, args)| args.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<(String, String, Vec<BridgeValue>)> {
        self.0.lock().calls.clone()
    }

    pub fn teardowns(&self) -> usize {
        self.0.lock().teardowns
    }

    pub fn wait_for_callbacks(&self, count: usize) -> Vec<(CallbackHandle, Vec<BridgeValue>)> {
        wait_until(|| self.0.lock().callbacks.len() >= count);
        self.callbacks()
    }
}

/// A script function: arguments plus the host, returning a value or a throw
pub type ScriptFn =
    Box<dyn FnMut(&[BridgeValue], &mut dyn ScriptHost) -> Result<BridgeValue, ScriptError> + Send>;

/// In-memory runtime driven by closures registered per `Module.method`
pub struct ScriptedRuntime {
    recorder: Recorder,
    functions: HashMap<String, ScriptFn>,
    on_load: Option<ScriptFn>,
}

impl ScriptedRuntime {
    pub fn new(recorder: &Recorder) -> Self {
        Self {
            recorder: recorder.clone(),
            functions: HashMap::new(),
            on_load: None,
        }
    }

    pub fn function<F>(mut self, name: &str, f: F) -> Self
    where
        F: FnMut(&[BridgeValue], &mut dyn ScriptHost) -> Result<BridgeValue, ScriptError>
            + Send
            + 'static,
    {
        self.functions.insert(name.to_string(), Box::new(f));
        self
    }

    pub fn on_load<F>(mut self, f: F) -> Self
    where
        F: FnMut(&[BridgeValue], &mut dyn ScriptHost) -> Result<BridgeValue, ScriptError>
            + Send
            + 'static,
    {
        self.on_load = Some(Box::new(f));
        self
    }

    pub fn boxed(self) -> Box<dyn ScriptRuntime> {
        Box::new(self)
    }
}

impl ScriptRuntime for ScriptedRuntime {
    fn load_bundle(&mut self, bundle: &ScriptBundle, host: &mut dyn ScriptHost) -> Result<(), ScriptError> {
        self.recorder.0.lock().bundles.push(bundle.label());
        match self.on_load.as_mut() {
            Some(f) => f(&[], host).map(|_| ()),
            None => Ok(()),
        }
    }

    fn call_function(
        &mut self,
        module: &str,
        method: &str,
        args: &[BridgeValue],
        host: &mut dyn ScriptHost,
    ) -> Result<BridgeValue, ScriptError> {
        self.recorder
            .0
            .lock()
            .calls
            .push((module.to_string(), method.to_string(), args.to_vec()));
        match self.functions.get_mut(&format!("{}.{}", module, method)) {
            Some(f) => f(args, host),
            None => Ok(BridgeValue::Null),
        }
    }

    fn invoke_callback(
        &mut self,
        handle: CallbackHandle,
        args: &[BridgeValue],
        _host: &mut dyn ScriptHost,
    ) -> Result<(), ScriptError> {
        self.recorder.0.lock().callbacks.push((handle, args.to_vec()));
        Ok(())
    }

    fn teardown(&mut self) {
        self.recorder.0.lock().teardowns += 1;
    }
}

/// What the Alert module has seen
#[derive(Default)]
pub struct AlertState {
    pub parked: Mutex<Vec<Responder>>,
    pub shown: Mutex<Vec<(String, String)>>,
    pub invalidations: AtomicUsize,
    pub invalidated_on: Mutex<Vec<String>>,
}

impl AlertState {
    /// Press the button on the oldest open alert
    pub fn press(&self, button: &str) -> bool {
        let responder = {
            let mut parked = self.parked.lock();
            if parked.is_empty() {
                return false;
            }
            parked.remove(0)
        };
        responder.resolve(button);
        true
    }

    pub fn shown_count(&self) -> usize {
        self.shown.lock().len()
    }

    pub fn wait_parked(&self, count: usize) -> bool {
        wait_until(|| self.parked.lock().len() >= count)
    }

    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }
}

/// `Alert.show(title, message) -> callback(button)` on the `alert` queue.
///
/// The thunk parks its responder so a test decides when (or whether) the
/// user presses a button.
pub struct AlertModule {
    state: Arc<AlertState>,
}

impl AlertModule {
    pub fn new() -> (Arc<Self>, Arc<AlertState>) {
        let state = Arc::new(AlertState::default());
        (
            Arc::new(Self {
                state: state.clone(),
            }),
            state,
        )
    }
}

impl NativeModule for AlertModule {
    fn name(&self) -> &str {
        "Alert"
    }

    fn methods(&self) -> Vec<MethodDescriptor> {
        let state = self.state.clone();
        vec![MethodDescriptor::with_callback(
            "show",
            vec![ArgType::String, ArgType::String],
            move |args, responder| {
                let title: String = match args.get(0) {
                    Ok(title) => title,
                    Err(e) => return responder.reject(e),
                };
                let message: String = args.get(1).unwrap_or_default();
                state.shown.lock().push((title, message));
                state.parked.lock().push(responder);
            },
        )]
    }

    fn method_queue(&self) -> QueueId {
        QueueId::named("alert")
    }

    fn as_invalidatable(&self) -> Option<&dyn Invalidatable> {
        Some(self)
    }
}

impl Invalidatable for AlertModule {
    fn invalidate(&self) {
        self.state.invalidations.fetch_add(1, Ordering::SeqCst);
        let name = thread::current().name().unwrap_or("<unnamed>").to_string();
        self.state.invalidated_on.lock().push(name);
    }
}

/// Arithmetic and echo methods, one of each call kind
pub struct MathModule;

impl NativeModule for MathModule {
    fn name(&self) -> &str {
        "Math"
    }

    fn methods(&self) -> Vec<MethodDescriptor> {
        vec![
            MethodDescriptor::sync("add", vec![ArgType::Number, ArgType::Number], |args| {
                Ok(BridgeValue::Number(args.get::<f64>(0)? + args.get::<f64>(1)?))
            }),
            MethodDescriptor::with_callback("double", vec![ArgType::Number], |args, responder| {
                responder.settle(args.get::<f64>(0).map(|n| n * 2.0))
            }),
            MethodDescriptor::promise("sqrt", vec![ArgType::Number], |args, responder| {
                let result = args.get::<f64>(0).and_then(|n| {
                    if n < 0.0 {
                        Err(conduit_core::sdk::NativeError::ArgumentError(
                            "negative input".to_string(),
                        ))
                    } else {
                        Ok(n.sqrt())
                    }
                });
                responder.settle(result)
            }),
            MethodDescriptor::with_callback("forget", vec![], |_args, responder| drop(responder)),
        ]
    }
}
