//! Module state traits and error types
//!
//! Defines the error type shared by every component of the module state
//! layer and the seam to the persistent backing store.

use thiserror::Error;

use crate::module::facets::FacetBundle;
use crate::module::record::ModuleRecord;

/// Backing store that can fully load a module's facet bundle on demand
///
/// Implemented by whatever owns the persisted state (an index file, a
/// database, an in-memory snapshot). The module state layer calls
/// `fully_load` at most once per hydration and never retries.
pub trait BackingStore: Send + Sync {
    /// Load the complete facet bundle for `module`
    ///
    /// Must not call back into getters of `module`; the record is mid-hydration.
    fn fully_load(&self, module: &ModuleRecord) -> anyhow::Result<FacetBundle>;

    /// Whether modules placed in a graph using this store start out lazily loaded
    fn is_lazy_loaded(&self) -> bool {
        true
    }
}

/// Module state errors
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Absent or malformed input; nothing was mutated
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Programming error in the caller (no backing store, not lazily backed, ...)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Backing store failed while hydrating; the module must be abandoned
    #[error("Hydration failed: {0}")]
    HydrationFailed(String),

    #[error("Invalid module manifest: {0}")]
    InvalidManifest(String),

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for ModuleError {
    fn from(e: serde_json::Error) -> Self {
        ModuleError::SerializationError(e.to_string())
    }
}

impl From<toml::de::Error> for ModuleError {
    fn from(e: toml::de::Error) -> Self {
        ModuleError::InvalidManifest(e.to_string())
    }
}

impl From<anyhow::Error> for ModuleError {
    fn from(e: anyhow::Error) -> Self {
        ModuleError::HydrationFailed(format!("{:#}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ModuleError::InvalidArgument("Import must be a dynamic import".to_string());
        assert_eq!(err.to_string(), "Invalid argument: Import must be a dynamic import");

        let err: ModuleError = anyhow::anyhow!("disk gone").context("reading index").into();
        assert!(matches!(err, ModuleError::HydrationFailed(ref msg) if msg.contains("disk gone")));
    }
}
