//! BLLVM Module State - module descriptors, dependency graph and capability wiring
//!
//! This crate holds the in-memory state a module resolver reads and mutates:
//! per-module descriptors with lazily hydrated facets, symmetric dependency
//! edges, a namespace-filterable wiring view over resolved capabilities, and
//! dynamic imports added after resolution.
//!
//! ## Design Principles
//!
//! 1. **No Solving Here**: constraint solving belongs to the resolver
//! 2. **Shared Immutable Sequences**: getters hand out `Arc<[T]>`, setters swap them
//! 3. **Fixed Lock Order**: store lock before record lock, record pairs by id
//! 4. **Fail Fast**: hydration failures surface to the caller, never retried
//!
//! ## Example
//!
//! ```rust
//! use bllvm_module_state::{ModuleGraph, ModuleId, ModuleRecord, StateFlags, Version};
//!
//! let graph = ModuleGraph::new();
//! let app = ModuleRecord::new(ModuleId::next(), "org.example.app", Version::new(1, 0, 0));
//! let lib = ModuleRecord::new(ModuleId::next(), "org.example.lib", Version::new(2, 1, 0));
//! graph.add_module(app.clone()).unwrap();
//! graph.add_module(lib.clone()).unwrap();
//!
//! app.add_dependency(&lib, true);
//! assert_eq!(lib.dependents().len(), 1);
//!
//! assert!(app.wiring().is_none());
//! app.set_state_flag(StateFlags::RESOLVED, true);
//! assert!(app.wiring().unwrap().is_current());
//! ```

pub mod config;
pub mod module;
pub mod utils;

pub use config::{LoggingConfig, StateConfig, StoreConfig};
pub use module::registry::{
    ExportSpec, GenericCapability, GenericRequirement, HostSpec, ImportSpec, ModuleManifest,
    ModuleRequirement, Resolution, Version, VersionRange, WiredCapability, MODULE_NAMESPACE,
    PACKAGE_NAMESPACE,
};
pub use module::{
    BackingStore, FacetBundle, FacetStore, MemoryBackingStore, ModuleError, ModuleGraph, ModuleId,
    ModuleRecord, StateFlags, WiringView,
};
