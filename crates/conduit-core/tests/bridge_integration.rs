//! Integration tests for script ↔ native invocation

mod common;

use std::sync::Arc;

use common::{AlertModule, MathModule, Recorder, ScriptedRuntime};
use conduit_core::sdk::{
    ArgType, BridgeValue, CallbackHandle, CallbackId, MethodDescriptor, NativeModule,
    SDK_ABI_VERSION,
};
use conduit_core::{
    Bridge, BridgeConfig, BridgeError, Invocation, NativeCall, ScriptBundle, ScriptError,
};
use parking_lot::Mutex;

fn test_config() -> BridgeConfig {
    BridgeConfig {
        background_threads: 2,
        ..BridgeConfig::default()
    }
}

fn build(runtime: ScriptedRuntime, modules: Vec<Arc<dyn NativeModule>>) -> Bridge {
    Bridge::builder(runtime.boxed())
        .config(test_config())
        .modules(modules)
        .build()
        .unwrap()
}

fn num(n: f64) -> BridgeValue {
    BridgeValue::Number(n)
}

fn text(s: &str) -> BridgeValue {
    BridgeValue::String(s.to_string())
}

fn code_of(value: &BridgeValue) -> Option<&str> {
    value.get("code").and_then(BridgeValue::as_str)
}

#[test]
fn test_sync_result_observed_before_return() {
    let recorder = Recorder::default();
    let bridge = build(ScriptedRuntime::new(&recorder), vec![Arc::new(MathModule)]);

    let outcome = bridge
        .invoke_from_script(NativeCall::new("Math", "add", vec![num(2.0), num(3.0)]))
        .unwrap();

    assert_eq!(outcome, Invocation::Returned(num(5.0)));
    assert_eq!(bridge.pending_invocations().unwrap(), 0);
}

#[test]
fn test_script_code_calls_native() {
    let recorder = Recorder::default();
    let runtime = ScriptedRuntime::new(&recorder).function("App.compute", |args, host| {
        let sum = host
            .call_native(NativeCall::new("Math", "add", args.to_vec()))
            .map_err(|e| ScriptError::fatal(e.to_string()))?;
        Ok(sum.returned().cloned().unwrap_or_default())
    });
    let bridge = build(runtime, vec![Arc::new(MathModule)]);

    let value = bridge
        .call_global_function("App", "compute", vec![num(1.0), num(2.0)])
        .unwrap();
    assert_eq!(value, num(3.0));
}

#[test]
fn test_callback_is_error_first() {
    let recorder = Recorder::default();
    let bridge = build(ScriptedRuntime::new(&recorder), vec![Arc::new(MathModule)]);
    let handle = CallbackHandle::new(1);

    let outcome = bridge
        .invoke_from_script(
            NativeCall::new("Math", "double", vec![num(4.0)]).with_callbacks(vec![handle]),
        )
        .unwrap();
    assert!(outcome.callback_id().is_some());

    let delivered = recorder.wait_for_callbacks(1);
    assert_eq!(delivered, vec![(handle, vec![BridgeValue::Null, num(8.0)])]);

    // What script receives serialises as a plain error-first JSON array.
    let json = BridgeValue::Array(delivered[0].1.clone()).to_json();
    assert_eq!(json, serde_json::json!([null, 8.0]));
    assert_eq!(BridgeValue::from(json), BridgeValue::Array(delivered[0].1.clone()));
}

#[test]
fn test_promise_resolve_and_reject() {
    let recorder = Recorder::default();
    let bridge = build(ScriptedRuntime::new(&recorder), vec![Arc::new(MathModule)]);
    let (resolve, reject) = (CallbackHandle::new(10), CallbackHandle::new(11));

    bridge
        .invoke_from_script(
            NativeCall::new("Math", "sqrt", vec![num(9.0)]).with_callbacks(vec![resolve, reject]),
        )
        .unwrap();
    recorder.wait_for_callbacks(1);
    bridge
        .invoke_from_script(
            NativeCall::new("Math", "sqrt", vec![num(-1.0)]).with_callbacks(vec![resolve, reject]),
        )
        .unwrap();
    recorder.wait_for_callbacks(2);

    assert_eq!(recorder.callbacks_for(resolve), vec![vec![num(3.0)]]);
    let rejected = recorder.callbacks_for(reject);
    assert_eq!(rejected.len(), 1);
    assert_eq!(code_of(&rejected[0][0]), Some("E_INVALID_ARGUMENT"));
}

#[test]
fn test_dropped_responder_rejects() {
    let recorder = Recorder::default();
    let bridge = build(ScriptedRuntime::new(&recorder), vec![Arc::new(MathModule)]);
    let handle = CallbackHandle::new(3);

    bridge
        .invoke_from_script(NativeCall::new("Math", "forget", vec![]).with_callbacks(vec![handle]))
        .unwrap();

    let delivered = recorder.wait_for_callbacks(1);
    assert_eq!(delivered.len(), 1);
    assert_eq!(code_of(&delivered[0].1[0]), Some("E_RESPONDER_DROPPED"));
}

#[test]
fn test_lookup_errors_are_local_to_the_call() {
    let recorder = Recorder::default();
    let (alert, _state) = AlertModule::new();
    let bridge = build(ScriptedRuntime::new(&recorder), vec![alert as Arc<dyn NativeModule>, Arc::new(MathModule)]);

    let err = bridge
        .invoke_from_script(NativeCall::new("Nonexistent", "foo", vec![]))
        .unwrap_err();
    assert_eq!(err, BridgeError::UnknownModule("Nonexistent".into()));

    let err = bridge
        .invoke_from_script(NativeCall::new("Alert", "nonexistentMethod", vec![]))
        .unwrap_err();
    assert_eq!(
        err,
        BridgeError::UnknownMethod {
            module: "Alert".into(),
            method: "nonexistentMethod".into(),
        }
    );

    assert!(bridge.is_valid());
    let outcome = bridge
        .invoke_from_script(NativeCall::new("Math", "add", vec![num(1.0), num(1.0)]))
        .unwrap();
    assert_eq!(outcome.returned(), Some(&num(2.0)));
}

#[test]
fn test_argument_mismatch_creates_nothing_pending() {
    let recorder = Recorder::default();
    let bridge = build(ScriptedRuntime::new(&recorder), vec![Arc::new(MathModule)]);

    let err = bridge
        .invoke_from_script(NativeCall::new("Math", "add", vec![text("a"), num(1.0)]))
        .unwrap_err();
    assert!(matches!(err, BridgeError::ArgumentTypeMismatch { .. }));

    let err = bridge
        .invoke_from_script(NativeCall::new("Math", "double", vec![num(1.0)]))
        .unwrap_err();
    assert!(matches!(err, BridgeError::ArgumentTypeMismatch { .. }));

    let err = bridge
        .invoke_from_script(
            NativeCall::new("Math", "sqrt", vec![num(1.0)]).with_callbacks(vec![CallbackHandle::new(1)]),
        )
        .unwrap_err();
    assert!(matches!(err, BridgeError::ArgumentTypeMismatch { .. }));

    assert_eq!(bridge.pending_invocations().unwrap(), 0);
}

/// A sync method that panics instead of returning
struct Fragile;

impl NativeModule for Fragile {
    fn name(&self) -> &str {
        "Fragile"
    }

    fn methods(&self) -> Vec<MethodDescriptor> {
        vec![MethodDescriptor::sync("explode", vec![], |_| panic!("sensor offline"))]
    }
}

#[test]
fn test_panicking_sync_method_fails_only_the_call() {
    let recorder = Recorder::default();
    let runtime = ScriptedRuntime::new(&recorder).function("App.explode", |_, host| {
        let code = match host.call_native(NativeCall::new("Fragile", "explode", vec![])) {
            Ok(_) => "ok".to_string(),
            Err(e) => e.code().to_string(),
        };
        Ok(BridgeValue::String(code))
    });
    let bridge = build(
        runtime,
        vec![Arc::new(Fragile) as Arc<dyn NativeModule>, Arc::new(MathModule)],
    );

    let err = bridge
        .invoke_from_script(NativeCall::new("Fragile", "explode", vec![]))
        .unwrap_err();
    assert_eq!(err.code(), "E_MODULE");
    assert!(err.to_string().contains("sensor offline"));
    assert!(bridge.is_valid());

    // Script calling the same method sees an ordinary error.
    let value = bridge.call_global_function("App", "explode", vec![]).unwrap();
    assert_eq!(value, text("E_MODULE"));

    let outcome = bridge
        .invoke_from_script(NativeCall::new("Math", "add", vec![num(1.0), num(1.0)]))
        .unwrap();
    assert_eq!(outcome.returned(), Some(&num(2.0)));
}

struct Reentrant {
    bridge: Arc<Mutex<Option<Arc<Bridge>>>>,
}

impl NativeModule for Reentrant {
    fn name(&self) -> &str {
        "Reentrant"
    }

    fn methods(&self) -> Vec<MethodDescriptor> {
        let slot = self.bridge.clone();
        vec![MethodDescriptor::sync("reenter", vec![], move |_| {
            let bridge = slot.lock().clone();
            let code = match bridge {
                Some(bridge) => match bridge.invoke_from_script(NativeCall::new("Reentrant", "reenter", vec![])) {
                    Ok(_) => "ok".to_string(),
                    Err(e) => e.code().to_string(),
                },
                None => "unset".to_string(),
            };
            Ok(BridgeValue::String(code))
        })]
    }
}

#[test]
fn test_sync_thunk_cannot_reenter() {
    let recorder = Recorder::default();
    let slot = Arc::new(Mutex::new(None));
    let bridge = Arc::new(build(
        ScriptedRuntime::new(&recorder),
        vec![Arc::new(Reentrant { bridge: slot.clone() })],
    ));
    *slot.lock() = Some(bridge.clone());

    let outcome = bridge
        .invoke_from_script(NativeCall::new("Reentrant", "reenter", vec![]))
        .unwrap();
    assert_eq!(outcome, Invocation::Returned(text("E_REENTRANT_CALL")));

    slot.lock().take();
}

#[test]
fn test_blocking_call_from_script_queue_is_refused() {
    let recorder = Recorder::default();
    let slot: Arc<Mutex<Option<Arc<Bridge>>>> = Arc::new(Mutex::new(None));
    let inner = slot.clone();
    let runtime = ScriptedRuntime::new(&recorder).function("App.nested", move |_, _| {
        let bridge = inner.lock().clone();
        let result = match bridge {
            Some(bridge) => bridge.invoke_from_script(NativeCall::new("Math", "add", vec![num(1.0), num(1.0)])),
            None => Err(BridgeError::BridgeInvalidated),
        };
        Ok(BridgeValue::String(
            result.err().map(|e| e.code().to_string()).unwrap_or_default(),
        ))
    });
    let bridge = Arc::new(build(runtime, vec![Arc::new(MathModule)]));
    *slot.lock() = Some(bridge.clone());

    let value = bridge.call_global_function("App", "nested", vec![]).unwrap();
    assert_eq!(value, text("E_REENTRANT_CALL"));

    slot.lock().take();
}

#[test]
fn test_script_error_routes_to_exception_manager() {
    let recorder = Recorder::default();
    let runtime = ScriptedRuntime::new(&recorder)
        .function("App.crash", |_, _| Err(ScriptError::fatal("undefined is not a function")));
    let bridge = build(runtime, vec![]);

    let err = bridge.call_global_function("App", "crash", vec![]).unwrap_err();
    assert_eq!(
        err,
        BridgeError::FatalException("undefined is not a function".into())
    );
    assert_eq!(bridge.exception_manager().fatal_count(), 1);

    bridge.invoke_global_function("App", "crash", vec![]).unwrap();
    bridge.flush().unwrap();
    assert_eq!(bridge.exception_manager().fatal_count(), 2);
}

#[test]
fn test_completion_delivered_once() {
    let recorder = Recorder::default();
    let (alert, state) = AlertModule::new();
    let bridge = build(ScriptedRuntime::new(&recorder), vec![alert]);
    let handle = CallbackHandle::new(5);

    let id = bridge
        .invoke_from_script(
            NativeCall::new("Alert", "show", vec![text("Hi"), text("World")]).with_callbacks(vec![handle]),
        )
        .unwrap()
        .callback_id()
        .unwrap();
    assert!(state.wait_parked(1));

    bridge.invoke_script_callback(id, Ok(text("Cancel"))).unwrap();
    bridge.flush().unwrap();
    assert!(state.press("OK"));
    bridge.flush().unwrap();

    assert_eq!(
        recorder.callbacks_for(handle),
        vec![vec![BridgeValue::Null, text("Cancel")]]
    );

    bridge
        .invoke_script_callback(CallbackId::new(999), Ok(BridgeValue::Null))
        .unwrap();
    bridge.flush().unwrap();
    assert_eq!(recorder.callbacks().len(), 1);
}

#[test]
fn test_global_calls_run_in_order() {
    let recorder = Recorder::default();
    let bridge = build(ScriptedRuntime::new(&recorder), vec![]);

    for i in 0..5 {
        bridge
            .invoke_global_function("RCTEventEmitter", "receiveEvent", vec![num(i as f64)])
            .unwrap();
    }
    bridge.flush().unwrap();

    let order: Vec<_> = recorder.calls().into_iter().map(|(_, _, args)| args[0].clone()).collect();
    assert_eq!(order, (0..5).map(|i| num(i as f64)).collect::<Vec<_>>());
}

#[test]
fn test_call_script_handle() {
    let recorder = Recorder::default();
    let bridge = build(ScriptedRuntime::new(&recorder), vec![]);

    bridge
        .call_script_handle(CallbackHandle::new(42), vec![text("tick")])
        .unwrap();
    bridge.flush().unwrap();
    assert_eq!(
        recorder.callbacks(),
        vec![(CallbackHandle::new(42), vec![text("tick")])]
    );
}

#[test]
fn test_bundle_loaded_and_module_config_visible() {
    let recorder = Recorder::default();
    let runtime = ScriptedRuntime::new(&recorder)
        .function("App.modules", |_, host| Ok(host.module_config()));
    let bridge = Bridge::builder(runtime.boxed())
        .config(test_config())
        .bundle(ScriptBundle::url("http://localhost:8081/index.bundle"))
        .module(Arc::new(MathModule))
        .build()
        .unwrap();

    bridge.flush().unwrap();
    assert_eq!(
        recorder.snapshot().bundles,
        vec!["http://localhost:8081/index.bundle".to_string()]
    );

    let config = bridge.call_global_function("App", "modules", vec![]).unwrap();
    let names: Vec<_> = config
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m.get("name").and_then(BridgeValue::as_str))
        .collect();
    assert_eq!(names, vec!["ExceptionsManager", "Math"]);
}

#[test]
fn test_fire_and_forget_dispatches_without_id() {
    let recorder = Recorder::default();
    let bridge = build(ScriptedRuntime::new(&recorder), vec![]);

    let outcome = bridge
        .invoke_from_script(NativeCall::new(
            "ExceptionsManager",
            "reportSoftException",
            vec![text("Warning: key"), BridgeValue::Array(vec![]), num(1.0)],
        ))
        .unwrap();
    assert_eq!(outcome, Invocation::Dispatched { callback_id: None });
}

struct Versioned {
    abi: u32,
}

impl NativeModule for Versioned {
    fn name(&self) -> &str {
        "Versioned"
    }

    fn methods(&self) -> Vec<MethodDescriptor> {
        let abi = self.abi;
        vec![MethodDescriptor::sync("abi", vec![ArgType::Any], move |_| {
            Ok(BridgeValue::Number(abi as f64))
        })]
    }

    fn abi_version(&self) -> u32 {
        self.abi
    }
}

#[test]
fn test_bridges_of_different_abi_coexist() {
    let recorder = Recorder::default();
    let v1 = build(
        ScriptedRuntime::new(&recorder),
        vec![Arc::new(Versioned { abi: SDK_ABI_VERSION })],
    );
    let v2 = Bridge::builder(ScriptedRuntime::new(&recorder).boxed())
        .config(BridgeConfig {
            abi_version: SDK_ABI_VERSION + 1,
            ..test_config()
        })
        .module(Arc::new(Versioned {
            abi: SDK_ABI_VERSION + 1,
        }))
        .build()
        .unwrap();

    let call = NativeCall::new("Versioned", "abi", vec![BridgeValue::Null]);
    assert_eq!(
        v1.invoke_from_script(call.clone()).unwrap().returned(),
        Some(&num(SDK_ABI_VERSION as f64))
    );
    assert_eq!(
        v2.invoke_from_script(call).unwrap().returned(),
        Some(&num((SDK_ABI_VERSION + 1) as f64))
    );

    let err = Bridge::builder(ScriptedRuntime::new(&recorder).boxed())
        .config(BridgeConfig {
            abi_version: SDK_ABI_VERSION + 1,
            ..test_config()
        })
        .module(Arc::new(Versioned { abi: SDK_ABI_VERSION }))
        .build()
        .unwrap_err();
    assert!(matches!(err, BridgeError::AbiMismatch { .. }));
}
