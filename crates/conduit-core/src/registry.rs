//! Module registry
//!
//! Modules are registered through [`ModuleRegistryBuilder`] at bridge
//! construction. `build()` freezes the registry: after that it is read-only
//! and every `resolve` for the same name pair returns the same
//! [`BoundMethod`] (converters and queue are bound once, here).

use std::fmt;
use std::sync::Arc;

use conduit_sdk::{BridgeValue, MethodDescriptor, NativeModule, QueueId, SDK_ABI_VERSION};
use log::debug;
use rustc_hash::FxHashMap;

use crate::bridge::marshal::{Converter, ConverterTable};
use crate::{BridgeError, BridgeResult};

/// A method with its converters and effective queue resolved
pub struct BoundMethod {
    module: String,
    descriptor: Arc<MethodDescriptor>,
    converters: Vec<Converter>,
    queue: QueueId,
}

impl BoundMethod {
    /// Owning module name
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Method name
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// The registered descriptor
    pub fn descriptor(&self) -> &Arc<MethodDescriptor> {
        &self.descriptor
    }

    /// Converters, one per declared argument
    pub fn converters(&self) -> &[Converter] {
        &self.converters
    }

    /// Queue the method runs on
    pub fn queue(&self) -> &QueueId {
        &self.queue
    }

    pub(crate) fn mismatch(&self, detail: String) -> BridgeError {
        BridgeError::ArgumentTypeMismatch {
            module: self.module.clone(),
            method: self.name().to_string(),
            detail,
        }
    }
}

impl fmt::Debug for BoundMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundMethod")
            .field("module", &self.module)
            .field("descriptor", &self.descriptor)
            .field("queue", &self.queue)
            .finish()
    }
}

/// A registered module and what was recorded about it at registration
pub struct RegisteredModule {
    index: usize,
    module: Arc<dyn NativeModule>,
    queue: QueueId,
    methods: Vec<Arc<BoundMethod>>,
    by_name: FxHashMap<String, usize>,
    invalidatable: bool,
    exceptions_delegate: bool,
}

impl RegisteredModule {
    /// Registration order, starting at 0
    pub fn index(&self) -> usize {
        self.index
    }

    /// Module name
    pub fn name(&self) -> &str {
        self.module.name()
    }

    /// The module instance
    pub fn module(&self) -> &Arc<dyn NativeModule> {
        &self.module
    }

    /// Default queue for the module's methods
    pub fn queue(&self) -> &QueueId {
        &self.queue
    }

    /// Bound methods in declaration order
    pub fn methods(&self) -> &[Arc<BoundMethod>] {
        &self.methods
    }

    /// Look up a method by name
    pub fn method(&self, name: &str) -> Option<&Arc<BoundMethod>> {
        self.by_name.get(name).map(|&i| &self.methods[i])
    }

    /// Whether the module implements `Invalidatable`
    pub fn is_invalidatable(&self) -> bool {
        self.invalidatable
    }

    /// Whether the module implements `ExceptionsDelegate`
    pub fn is_exceptions_delegate(&self) -> bool {
        self.exceptions_delegate
    }

    /// Script-facing description: `{name, methods: [{name, kind, signature}]}`
    pub fn describe(&self) -> BridgeValue {
        let methods = self
            .methods
            .iter()
            .map(|m| {
                let d = m.descriptor();
                BridgeValue::map([
                    ("name", BridgeValue::String(d.name().to_string())),
                    ("kind", BridgeValue::String(d.kind().name().to_string())),
                    (
                        "signature",
                        BridgeValue::Array(
                            d.signature()
                                .iter()
                                .map(|t| BridgeValue::String(t.name().to_string()))
                                .collect(),
                        ),
                    ),
                ])
            })
            .collect();
        BridgeValue::map([
            ("name", BridgeValue::String(self.name().to_string())),
            ("methods", BridgeValue::Array(methods)),
        ])
    }
}

impl fmt::Debug for RegisteredModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredModule")
            .field("index", &self.index)
            .field("name", &self.name())
            .field("queue", &self.queue)
            .field("methods", &self.methods.len())
            .field("invalidatable", &self.invalidatable)
            .field("exceptions_delegate", &self.exceptions_delegate)
            .finish()
    }
}

/// Builder for [`ModuleRegistry`]
pub struct ModuleRegistryBuilder {
    abi_version: u32,
    converters: ConverterTable,
    modules: Vec<RegisteredModule>,
    by_name: FxHashMap<String, usize>,
}

impl ModuleRegistryBuilder {
    fn new() -> Self {
        Self {
            abi_version: SDK_ABI_VERSION,
            converters: ConverterTable::new(),
            modules: Vec::new(),
            by_name: FxHashMap::default(),
        }
    }

    /// ABI version modules must match
    pub fn abi_version(mut self, version: u32) -> Self {
        self.abi_version = version;
        self
    }

    /// Converter table used to bind signatures
    pub fn converters(mut self, converters: ConverterTable) -> Self {
        self.converters = converters;
        self
    }

    /// Register a module, returning its registration index.
    ///
    /// Nothing is recorded when registration fails.
    pub fn register(&mut self, module: Arc<dyn NativeModule>) -> BridgeResult<usize> {
        let name = module.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(BridgeError::DuplicateModuleName(name));
        }

        let found = module.abi_version();
        if found != self.abi_version {
            return Err(BridgeError::AbiMismatch {
                module: name,
                expected: self.abi_version,
                found,
            });
        }

        let queue = if module.requires_main_queue() {
            QueueId::Main
        } else {
            module.method_queue()
        };

        let descriptors = module.methods();
        let mut methods = Vec::with_capacity(descriptors.len());
        let mut by_method = FxHashMap::default();
        for descriptor in descriptors {
            let method_name = descriptor.name().to_string();
            if by_method.contains_key(&method_name) {
                return Err(BridgeError::DuplicateMethodName {
                    module: name,
                    method: method_name,
                });
            }

            let effective = if module.requires_main_queue() {
                QueueId::Main
            } else {
                descriptor.queue().cloned().unwrap_or_else(|| queue.clone())
            };

            by_method.insert(method_name, methods.len());
            methods.push(Arc::new(BoundMethod {
                module: name.clone(),
                converters: self.converters.bind(descriptor.signature()),
                queue: effective,
                descriptor: Arc::new(descriptor),
            }));
        }

        let invalidatable = module.as_invalidatable().is_some();
        let exceptions_delegate = module.as_exceptions_delegate().is_some();

        debug!(
            "event=module_registered module={} methods={} queue={} invalidatable={} exceptions_delegate={}",
            name,
            methods.len(),
            queue,
            invalidatable,
            exceptions_delegate
        );

        let index = self.modules.len();
        self.by_name.insert(name, index);
        self.modules.push(RegisteredModule {
            index,
            module,
            queue,
            methods,
            by_name: by_method,
            invalidatable,
            exceptions_delegate,
        });
        Ok(index)
    }

    /// Number of modules registered so far
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if nothing is registered yet
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Freeze the registry
    pub fn build(self) -> ModuleRegistry {
        ModuleRegistry {
            modules: self.modules,
            by_name: self.by_name,
        }
    }
}

/// Immutable name → module → method tables
pub struct ModuleRegistry {
    modules: Vec<RegisteredModule>,
    by_name: FxHashMap<String, usize>,
}

impl ModuleRegistry {
    /// Start building a registry
    pub fn builder() -> ModuleRegistryBuilder {
        ModuleRegistryBuilder::new()
    }

    /// Resolve `(module, method)` to its bound method
    pub fn resolve(&self, module: &str, method: &str) -> BridgeResult<&Arc<BoundMethod>> {
        let registered = self
            .module(module)
            .ok_or_else(|| BridgeError::UnknownModule(module.to_string()))?;
        registered
            .method(method)
            .ok_or_else(|| BridgeError::UnknownMethod {
                module: module.to_string(),
                method: method.to_string(),
            })
    }

    /// Look up a module by name
    pub fn module(&self, name: &str) -> Option<&RegisteredModule> {
        self.by_name.get(name).map(|&i| &self.modules[i])
    }

    /// Modules in registration order
    pub fn modules(&self) -> impl Iterator<Item = &RegisteredModule> {
        self.modules.iter()
    }

    /// Invalidatable modules in registration order
    pub fn invalidatable(&self) -> impl Iterator<Item = &RegisteredModule> {
        self.modules.iter().filter(|m| m.invalidatable)
    }

    /// Modules acting as exception delegates, in registration order
    pub fn exceptions_delegates(&self) -> Vec<Arc<dyn NativeModule>> {
        self.modules
            .iter()
            .filter(|m| m.exceptions_delegate)
            .map(|m| m.module.clone())
            .collect()
    }

    /// Every distinct queue some method runs on, plus the queues
    /// invalidatable modules are notified on
    pub fn queues(&self) -> Vec<QueueId> {
        let mut queues: Vec<QueueId> = Vec::new();
        for module in &self.modules {
            let notified = module.invalidatable.then_some(&module.queue);
            for queue in module.methods.iter().map(|m| m.queue()).chain(notified) {
                if !queues.contains(queue) {
                    queues.push(queue.clone());
                }
            }
        }
        queues
    }

    /// Number of registered modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Script-facing description of every module, in registration order
    pub fn describe(&self) -> BridgeValue {
        BridgeValue::Array(self.modules.iter().map(RegisteredModule::describe).collect())
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.modules.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_sdk::{ArgType, ExceptionRecord, ExceptionsDelegate, Invalidatable};

    struct Fixture {
        name: &'static str,
        methods: Vec<&'static str>,
        queue: QueueId,
        main_only: bool,
        abi: u32,
    }

    impl Fixture {
        fn new(name: &'static str, methods: Vec<&'static str>) -> Self {
            Self {
                name,
                methods,
                queue: QueueId::Background,
                main_only: false,
                abi: SDK_ABI_VERSION,
            }
        }
    }

    impl NativeModule for Fixture {
        fn name(&self) -> &str {
            self.name
        }

        fn methods(&self) -> Vec<MethodDescriptor> {
            self.methods
                .iter()
                .map(|m| MethodDescriptor::fire_and_forget(*m, vec![ArgType::Any], |_| Ok(())))
                .collect()
        }

        fn method_queue(&self) -> QueueId {
            self.queue.clone()
        }

        fn requires_main_queue(&self) -> bool {
            self.main_only
        }

        fn abi_version(&self) -> u32 {
            self.abi
        }
    }

    struct Capable;

    impl NativeModule for Capable {
        fn name(&self) -> &str {
            "Capable"
        }

        fn methods(&self) -> Vec<MethodDescriptor> {
            vec![
                MethodDescriptor::sync("now", vec![], |_| Ok(BridgeValue::Number(1.0))),
                MethodDescriptor::fire_and_forget("ping", vec![], |_| Ok(()))
                    .on_queue(QueueId::named("capable")),
            ]
        }

        fn as_invalidatable(&self) -> Option<&dyn Invalidatable> {
            Some(self)
        }

        fn as_exceptions_delegate(&self) -> Option<&dyn ExceptionsDelegate> {
            Some(self)
        }
    }

    impl Invalidatable for Capable {
        fn invalidate(&self) {}
    }

    impl ExceptionsDelegate for Capable {
        fn handle_soft_exception(&self, _record: &ExceptionRecord) {}
        fn handle_fatal_exception(&self, _record: &ExceptionRecord) {}
    }

    #[test]
    fn test_resolve_is_stable() {
        let mut builder = ModuleRegistry::builder();
        builder
            .register(Arc::new(Fixture::new("Alert", vec!["show", "dismiss"])))
            .unwrap();
        let registry = builder.build();

        let a = registry.resolve("Alert", "show").unwrap();
        let b = registry.resolve("Alert", "show").unwrap();
        assert!(Arc::ptr_eq(a, b));
        assert!(Arc::ptr_eq(a.descriptor(), b.descriptor()));
        assert_eq!(a.module(), "Alert");
    }

    #[test]
    fn test_unknown_module_and_method() {
        let mut builder = ModuleRegistry::builder();
        builder
            .register(Arc::new(Fixture::new("Alert", vec!["show"])))
            .unwrap();
        let registry = builder.build();

        assert_eq!(
            registry.resolve("Nope", "show").unwrap_err(),
            BridgeError::UnknownModule("Nope".into())
        );
        assert_eq!(
            registry.resolve("Alert", "nonexistentMethod").unwrap_err(),
            BridgeError::UnknownMethod {
                module: "Alert".into(),
                method: "nonexistentMethod".into(),
            }
        );
    }

    #[test]
    fn test_duplicate_module_rejected() {
        let mut builder = ModuleRegistry::builder();
        builder.register(Arc::new(Fixture::new("Alert", vec!["show"]))).unwrap();
        let err = builder
            .register(Arc::new(Fixture::new("Alert", vec!["other"])))
            .unwrap_err();

        assert_eq!(err, BridgeError::DuplicateModuleName("Alert".into()));
        assert_eq!(builder.len(), 1);
        let registry = builder.build();
        assert!(registry.resolve("Alert", "other").is_err());
    }

    #[test]
    fn test_duplicate_method_rejected() {
        let mut builder = ModuleRegistry::builder();
        let err = builder
            .register(Arc::new(Fixture::new("Alert", vec!["show", "show"])))
            .unwrap_err();
        assert!(matches!(err, BridgeError::DuplicateMethodName { .. }));
        assert!(builder.is_empty());
    }

    #[test]
    fn test_abi_mismatch_rejected() {
        let mut fixture = Fixture::new("Old", vec!["x"]);
        fixture.abi = SDK_ABI_VERSION + 1;

        let mut builder = ModuleRegistry::builder();
        let err = builder.register(Arc::new(fixture)).unwrap_err();
        assert_eq!(
            err,
            BridgeError::AbiMismatch {
                module: "Old".into(),
                expected: SDK_ABI_VERSION,
                found: SDK_ABI_VERSION + 1,
            }
        );
    }

    #[test]
    fn test_effective_queue() {
        let mut main_only = Fixture::new("Ui", vec!["layout"]);
        main_only.main_only = true;
        main_only.queue = QueueId::named("ignored");

        let mut serial = Fixture::new("Storage", vec!["get"]);
        serial.queue = QueueId::named("storage");

        let mut builder = ModuleRegistry::builder();
        builder.register(Arc::new(main_only)).unwrap();
        builder.register(Arc::new(serial)).unwrap();
        builder.register(Arc::new(Capable)).unwrap();
        let registry = builder.build();

        assert_eq!(registry.resolve("Ui", "layout").unwrap().queue(), &QueueId::Main);
        assert_eq!(
            registry.resolve("Storage", "get").unwrap().queue(),
            &QueueId::named("storage")
        );
        assert_eq!(
            registry.resolve("Capable", "now").unwrap().queue(),
            &QueueId::Background
        );
        assert_eq!(
            registry.resolve("Capable", "ping").unwrap().queue(),
            &QueueId::named("capable")
        );
        assert_eq!(
            registry.queues(),
            vec![
                QueueId::Main,
                QueueId::named("storage"),
                QueueId::Background,
                QueueId::named("capable")
            ]
        );
    }

    #[test]
    fn test_capabilities_recorded_in_order() {
        let mut builder = ModuleRegistry::builder();
        builder.register(Arc::new(Fixture::new("A", vec!["x"]))).unwrap();
        builder.register(Arc::new(Capable)).unwrap();
        let registry = builder.build();

        let names: Vec<_> = registry.modules().map(|m| m.name()).collect();
        assert_eq!(names, vec!["A", "Capable"]);

        let invalidatable: Vec<_> = registry.invalidatable().map(|m| m.index()).collect();
        assert_eq!(invalidatable, vec![1]);
        assert_eq!(registry.exceptions_delegates().len(), 1);
    }

    #[test]
    fn test_describe() {
        let mut builder = ModuleRegistry::builder();
        builder.register(Arc::new(Capable)).unwrap();
        let registry = builder.build();

        let description = registry.describe();
        let module = &description.as_array().unwrap()[0];
        assert_eq!(module.get("name").and_then(BridgeValue::as_str), Some("Capable"));
        let first = &module.get("methods").and_then(BridgeValue::as_array).unwrap()[0];
        assert_eq!(first.get("kind").and_then(BridgeValue::as_str), Some("sync"));
    }
}
