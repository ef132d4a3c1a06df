//! Configuration management for the module state layer
//!
//! Handles configuration loading, validation and environment overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::utils::env::env_int;

/// Environment override for `StoreConfig::max_resident_modules`
pub const MAX_RESIDENT_ENV: &str = "BLLVM_MAX_RESIDENT_MODULES";

/// Upper bound accepted for the residency limit
const MAX_RESIDENT_LIMIT: usize = 1 << 20;

/// Backing store behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Hydrated bundles kept in memory before the oldest is evicted (0 = unbounded)
    #[serde(default)]
    pub max_resident_modules: usize,

    /// Start modules added over a store as lazily loaded
    #[serde(default = "default_true")]
    pub lazy_loading: bool,
}

fn default_true() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_resident_modules: 0,
            lazy_loading: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "bllvm_module_state=debug"
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON lines (needs the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

impl StateConfig {
    /// Load configuration from JSON file
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StateConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn to_json_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply environment overrides on top of file values
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(limit) = env_int::<usize>(MAX_RESIDENT_ENV) {
            debug!("{} overrides resident limit: {}", MAX_RESIDENT_ENV, limit);
            self.store.max_resident_modules = limit;
        }
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.store.validate()?;
        if let Some(ref logging) = self.logging {
            if logging.filter.as_deref().is_some_and(|f| f.trim().is_empty()) {
                return Err(anyhow::anyhow!("logging.filter must not be blank when set"));
            }
        }
        Ok(())
    }
}

impl StoreConfig {
    /// Validate store configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_resident_modules > MAX_RESIDENT_LIMIT {
            return Err(anyhow::anyhow!(
                "max_resident_modules must be at most {}, got {}",
                MAX_RESIDENT_LIMIT,
                self.max_resident_modules
            ));
        }
        Ok(())
    }
}
