//! Root host surface
//!
//! A [`RootHost`] is what an application embeds: a bundle, the name of the
//! script application to run and its initial properties. It owns the
//! current bridge and rebuilds it on reload, keeping the same
//! [`ExceptionManager`] so the fatal count spans reloads.

use std::fmt;
use std::sync::Arc;

use conduit_sdk::{BridgeValue, ExceptionsDelegate, NativeModule};
use log::{info, warn};
use parking_lot::Mutex;

use crate::bridge::{Bridge, BridgeId, ScriptBundle, ScriptRuntime};
use crate::exceptions::ExceptionManager;
use crate::queue::DispatchQueue;
use crate::{BridgeConfig, BridgeError, BridgeResult};

const APP_REGISTRY: &str = "AppRegistry";

/// Identifies the display surface the application is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(u64);

impl SurfaceId {
    /// Wrap a host-issued surface tag
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw tag
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Which dimensions of the surface follow the content's intrinsic size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SizeFlexibility {
    /// Fixed size
    #[default]
    None,
    /// Width follows content
    Width,
    /// Height follows content
    Height,
    /// Both follow content
    WidthAndHeight,
}

impl SizeFlexibility {
    fn width(self) -> bool {
        matches!(self, SizeFlexibility::Width | SizeFlexibility::WidthAndHeight)
    }

    fn height(self) -> bool {
        matches!(self, SizeFlexibility::Height | SizeFlexibility::WidthAndHeight)
    }
}

/// Notifications from a root host to its embedder
pub trait RootHostDelegate: Send + Sync {
    /// The flexible dimensions of the content changed. Fixed dimensions are
    /// always `None`.
    fn intrinsic_size_changed(&self, width: Option<f64>, height: Option<f64>);

    /// The application drew its first content since the last (re)load
    fn content_did_appear(&self) {}
}

/// Builds a fresh runtime for every bridge
pub type RuntimeFactory = Box<dyn Fn() -> BridgeResult<Box<dyn ScriptRuntime>> + Send + Sync>;

/// Builds fresh module instances for every bridge
pub type ModuleProvider = Box<dyn Fn() -> Vec<Arc<dyn NativeModule>> + Send + Sync>;

/// Everything a root host needs to build bridges
pub struct RootHostSetup {
    runtime_factory: RuntimeFactory,
    module_provider: ModuleProvider,
    main_queue: Option<Arc<dyn DispatchQueue>>,
    exceptions_delegate: Option<Arc<dyn ExceptionsDelegate>>,
    delegate: Option<Arc<dyn RootHostDelegate>>,
    config: BridgeConfig,
}

impl RootHostSetup {
    /// Setup with no modules and the default config
    pub fn new<F>(runtime_factory: F) -> Self
    where
        F: Fn() -> BridgeResult<Box<dyn ScriptRuntime>> + Send + Sync + 'static,
    {
        Self {
            runtime_factory: Box::new(runtime_factory),
            module_provider: Box::new(Vec::<Arc<dyn NativeModule>>::new),
            main_queue: None,
            exceptions_delegate: None,
            delegate: None,
            config: BridgeConfig::default(),
        }
    }

    /// Modules to register on every bridge
    pub fn modules<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> Vec<Arc<dyn NativeModule>> + Send + Sync + 'static,
    {
        self.module_provider = Box::new(provider);
        self
    }

    /// Host-owned main queue
    pub fn main_queue(mut self, queue: Arc<dyn DispatchQueue>) -> Self {
        self.main_queue = Some(queue);
        self
    }

    /// First delegate to receive script exceptions
    pub fn exceptions_delegate(mut self, delegate: Arc<dyn ExceptionsDelegate>) -> Self {
        self.exceptions_delegate = Some(delegate);
        self
    }

    /// Receiver of size and appearance notifications
    pub fn delegate(mut self, delegate: Arc<dyn RootHostDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Bridge configuration
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }
}

struct HostState {
    bridge: Option<Bridge>,
    surface: Option<SurfaceId>,
    properties: BridgeValue,
    flexibility: SizeFlexibility,
    last_size: (Option<f64>, Option<f64>),
    appeared: bool,
    invalidated: bool,
}

/// The embeddable root of one script application
pub struct RootHost {
    bundle: ScriptBundle,
    module_name: String,
    setup: RootHostSetup,
    exceptions: Arc<ExceptionManager>,
    state: Mutex<HostState>,
}

impl RootHost {
    /// Build the first bridge and start loading `bundle`
    pub fn new(
        bundle: ScriptBundle,
        module_name: impl Into<String>,
        initial_properties: BridgeValue,
        setup: RootHostSetup,
    ) -> BridgeResult<Self> {
        let exceptions = Arc::new(ExceptionManager::from_config(
            &setup.config,
            setup.exceptions_delegate.clone(),
        ));
        let host = Self {
            bundle,
            module_name: module_name.into(),
            setup,
            exceptions,
            state: Mutex::new(HostState {
                bridge: None,
                surface: None,
                properties: initial_properties,
                flexibility: SizeFlexibility::None,
                last_size: (None, None),
                appeared: false,
                invalidated: false,
            }),
        };

        let bridge = host.build_bridge()?;
        host.state.lock().bridge = Some(bridge);
        Ok(host)
    }

    fn build_bridge(&self) -> BridgeResult<Bridge> {
        let runtime = (self.setup.runtime_factory)()?;
        let mut builder = Bridge::builder(runtime)
            .config(self.setup.config.clone())
            .bundle(self.bundle.clone())
            .exception_manager(self.exceptions.clone())
            .modules((self.setup.module_provider)());
        if let Some(queue) = &self.setup.main_queue {
            builder = builder.main_queue(queue.clone());
        }
        builder.build()
    }

    fn run_application(&self, bridge: &Bridge, surface: SurfaceId, properties: &BridgeValue) -> BridgeResult<()> {
        info!(
            "event=run_application bridge={} module={} root_tag={}",
            bridge.id(),
            self.module_name,
            surface.as_u64()
        );
        let params = BridgeValue::map([
            ("rootTag", BridgeValue::Number(surface.as_u64() as f64)),
            ("initialProps", properties.clone()),
        ]);
        bridge.invoke_global_function(
            APP_REGISTRY,
            "runApplication",
            vec![BridgeValue::String(self.module_name.clone()), params],
        )
    }

    /// Name of the script application
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// The bundle every bridge loads
    pub fn bundle(&self) -> &ScriptBundle {
        &self.bundle
    }

    /// The exception manager shared by every bridge of this host
    pub fn exception_manager(&self) -> &Arc<ExceptionManager> {
        &self.exceptions
    }

    /// Id of the current bridge
    pub fn bridge_id(&self) -> Option<BridgeId> {
        self.state.lock().bridge.as_ref().map(Bridge::id)
    }

    /// Run `f` against the current bridge
    pub fn with_bridge<R>(&self, f: impl FnOnce(&Bridge) -> R) -> BridgeResult<R> {
        let state = self.state.lock();
        let bridge = state.bridge.as_ref().ok_or(BridgeError::BridgeInvalidated)?;
        Ok(f(bridge))
    }

    /// Surface the application is attached to
    pub fn surface(&self) -> Option<SurfaceId> {
        self.state.lock().surface
    }

    /// Attach to `surface` and run the application there
    pub fn attach(&self, surface: SurfaceId) -> BridgeResult<()> {
        let mut state = self.state.lock();
        let bridge = state.bridge.as_ref().ok_or(BridgeError::BridgeInvalidated)?;

        if let Some(previous) = state.surface {
            if previous == surface {
                return Ok(());
            }
            bridge.invoke_global_function(
                APP_REGISTRY,
                "unmountApplicationComponentAtRootTag",
                vec![BridgeValue::Number(previous.as_u64() as f64)],
            )?;
        }

        self.run_application(bridge, surface, &state.properties)?;
        state.surface = Some(surface);
        Ok(())
    }

    /// Unmount the application from its surface
    pub fn detach(&self) -> BridgeResult<()> {
        let mut state = self.state.lock();
        let Some(surface) = state.surface.take() else {
            return Ok(());
        };
        let bridge = state.bridge.as_ref().ok_or(BridgeError::BridgeInvalidated)?;
        info!(
            "event=unmount_application bridge={} root_tag={}",
            bridge.id(),
            surface.as_u64()
        );
        bridge.invoke_global_function(
            APP_REGISTRY,
            "unmountApplicationComponentAtRootTag",
            vec![BridgeValue::Number(surface.as_u64() as f64)],
        )
    }

    /// Current application properties
    pub fn app_properties(&self) -> BridgeValue {
        self.state.lock().properties.clone()
    }

    /// Replace the application properties, re-running the application when
    /// attached
    pub fn set_app_properties(&self, properties: BridgeValue) -> BridgeResult<()> {
        let mut state = self.state.lock();
        if state.invalidated {
            return Err(BridgeError::BridgeInvalidated);
        }
        state.properties = properties;
        if let (Some(surface), Some(bridge)) = (state.surface, state.bridge.as_ref()) {
            self.run_application(bridge, surface, &state.properties)?;
        }
        Ok(())
    }

    /// Replace the bridge with a fresh one.
    ///
    /// Refused with `ReloadLimitExceeded` once fatal exceptions have passed
    /// the ceiling; call `reset_reload_attempts` on the exception manager to
    /// allow it again.
    pub fn reload(&self) -> BridgeResult<()> {
        if self.exceptions.limit_exceeded() {
            warn!(
                "event=reload_refused module={} attempts={} max={}",
                self.module_name,
                self.exceptions.fatal_count(),
                self.exceptions.max_reload_attempts()
            );
            return Err(BridgeError::ReloadLimitExceeded {
                attempts: self.exceptions.fatal_count(),
                max_attempts: self.exceptions.max_reload_attempts(),
            });
        }

        let mut state = self.state.lock();
        if state.invalidated {
            return Err(BridgeError::BridgeInvalidated);
        }
        if let Some(old) = state.bridge.take() {
            // The old bridge finishes tearing down on its own threads.
            if let Err(e) = old.invalidate() {
                warn!(
                    "event=reload_teardown_incomplete module={} bridge={} error={}",
                    self.module_name,
                    old.id(),
                    e
                );
            }
        }

        let bridge = self.build_bridge()?;
        info!(
            "event=host_reloaded module={} bridge={}",
            self.module_name,
            bridge.id()
        );
        state.appeared = false;
        state.last_size = (None, None);
        if let Some(surface) = state.surface {
            self.run_application(&bridge, surface, &state.properties)?;
        }
        state.bridge = Some(bridge);
        Ok(())
    }

    /// Tear down the bridge for good
    pub fn invalidate(&self) -> BridgeResult<()> {
        let bridge = {
            let mut state = self.state.lock();
            state.invalidated = true;
            state.surface = None;
            state.bridge.take()
        };
        match bridge {
            Some(bridge) => bridge.invalidate(),
            None => Ok(()),
        }
    }

    /// Current size flexibility
    pub fn size_flexibility(&self) -> SizeFlexibility {
        self.state.lock().flexibility
    }

    /// Change which dimensions follow the content
    pub fn set_size_flexibility(&self, flexibility: SizeFlexibility) {
        let mut state = self.state.lock();
        state.flexibility = flexibility;
        state.last_size = (None, None);
    }

    /// Report the content's intrinsic size. The delegate hears about the
    /// flexible dimensions only, and only when they changed.
    pub fn report_intrinsic_size(&self, width: f64, height: f64) {
        let size = {
            let mut state = self.state.lock();
            let size = (
                state.flexibility.width().then_some(width),
                state.flexibility.height().then_some(height),
            );
            if size == (None, None) || size == state.last_size {
                return;
            }
            state.last_size = size;
            size
        };

        if let Some(delegate) = &self.setup.delegate {
            delegate.intrinsic_size_changed(size.0, size.1);
        }
    }

    /// Signal that content appeared; forwarded once per (re)load
    pub fn content_did_appear(&self) {
        let first = {
            let mut state = self.state.lock();
            !std::mem::replace(&mut state.appeared, true)
        };
        if first {
            if let Some(delegate) = &self.setup.delegate {
                delegate.content_did_appear();
            }
        }
    }
}

impl fmt::Debug for RootHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RootHost")
            .field("module_name", &self.module_name)
            .field("bundle", &self.bundle.label())
            .field("bridge", &state.bridge.as_ref().map(Bridge::id))
            .field("surface", &state.surface)
            .field("flexibility", &state.flexibility)
            .finish()
    }
}
