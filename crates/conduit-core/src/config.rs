//! Bridge configuration
//!
//! Loaded from TOML, every field optional:
//!
//! ```toml
//! abi_version = 1
//! max_reload_attempts = 3
//! background_threads = 4
//! queue_prefix = "conduit"
//! shutdown_timeout_ms = 5000
//! ```

use std::path::Path;
use std::time::Duration;

use conduit_sdk::SDK_ABI_VERSION;
use serde::{Deserialize, Serialize};

use crate::{BridgeError, BridgeResult};

/// Options for constructing a bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// SDK ABI modules must be built against
    pub abi_version: u32,

    /// Fatal exceptions tolerated before `ReloadLimitExceeded` is signalled
    pub max_reload_attempts: usize,

    /// Threads in the background pool
    pub background_threads: usize,

    /// Prefix for queue thread names
    pub queue_prefix: String,

    /// How long `invalidate` and blocking calls wait, in milliseconds
    pub shutdown_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            abi_version: SDK_ABI_VERSION,
            max_reload_attempts: 3,
            background_threads: num_cpus::get().max(1),
            queue_prefix: "conduit".to_string(),
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl BridgeConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> BridgeResult<Self> {
        let config: BridgeConfig =
            toml::from_str(source).map_err(|e| BridgeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: &Path) -> BridgeResult<Self> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> BridgeResult<()> {
        if self.background_threads == 0 {
            return Err(BridgeError::Config(
                "background_threads must be at least 1".to_string(),
            ));
        }
        if self.queue_prefix.trim().is_empty() {
            return Err(BridgeError::Config(
                "queue_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Shutdown timeout as a duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Label for a queue owned by this bridge
    pub fn queue_label(&self, name: &str) -> String {
        format!("{}.{}", self.queue_prefix, name)
    }
}
