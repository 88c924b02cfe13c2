//! Logging bootstrap.
//!
//! Library code only uses the `log` facade. Hosts that do not install their
//! own logger can call [`init_logging`] once to get a stderr logger.
//!
//! # Invariants
//! - Initialization is idempotent for the same spec.
//! - Re-initialization with a different spec is rejected.
//! - Initialization never panics.

use flexi_logger::{Logger, LoggerHandle};
use log::info;
use once_cell::sync::OnceCell;

use crate::{BridgeError, BridgeResult};

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();

struct LoggingState {
    spec: String,
    _logger: LoggerHandle,
}

/// Initializes the stderr logger with a `flexi_logger` spec such as
/// `"info"` or `"warn, conduit_core::bridge=debug"`.
///
/// # Errors
/// - Returns `Config` when the spec is empty or invalid.
/// - Returns `Config` when logging is already active with another spec.
/// - Returns `Config` when the backend cannot start (for example because a
///   different logger was installed first).
pub fn init_logging(spec: &str) -> BridgeResult<()> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(BridgeError::Config("log spec must not be empty".to_string()));
    }

    let state = LOGGING_STATE.get_or_try_init(|| -> BridgeResult<LoggingState> {
        let logger = Logger::try_with_str(spec)
            .map_err(|e| BridgeError::Config(format!("invalid log spec `{}`: {}", spec, e)))?
            .log_to_stderr()
            .format(flexi_logger::detailed_format)
            .start()
            .map_err(|e| BridgeError::Config(format!("failed to start logger: {}", e)))?;

        info!(
            "event=logging_init module=core status=ok spec={} version={}",
            spec,
            env!("CARGO_PKG_VERSION")
        );

        Ok(LoggingState {
            spec: spec.to_string(),
            _logger: logger,
        })
    })?;

    if state.spec != spec {
        return Err(BridgeError::Config(format!(
            "logging already initialized with `{}`; refusing to switch to `{}`",
            state.spec, spec
        )));
    }
    Ok(())
}

/// Active log spec, or `None` before [`init_logging`] succeeded
pub fn logging_status() -> Option<&'static str> {
    LOGGING_STATE.get().map(|state| state.spec.as_str())
}

/// Default log spec for the current build mode
pub fn default_log_spec() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}
