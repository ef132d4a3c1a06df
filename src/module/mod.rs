//! Module state for the module resolution engine
//!
//! Per-module descriptors and the derived structures a resolver builds over
//! them.
//!
//! ## Architecture
//!
//! - **Records**: `ModuleRecord` holds identity, state bits and the facet bundle
//! - **Hydration**: `FacetStore` fills bundles from a `BackingStore` on first read
//!   and evicts them under a residency limit
//! - **Graph**: symmetric dependency edges between records, owned by `ModuleGraph`
//! - **Wiring**: `WiringView` projects a resolved module's capabilities by namespace
//! - **Dynamic imports**: speculative imports and their resolutions, added after
//!   the module resolved

pub mod dynamic;
pub mod facets;
pub mod flags;
pub mod graph;
pub mod record;
pub mod registry;
pub mod store;
pub mod traits;
pub mod wiring;

pub use facets::FacetBundle;
pub use flags::StateFlags;
pub use graph::ModuleGraph;
pub use record::{ModuleId, ModuleRecord, UserObject};
pub use store::{FacetStore, MemoryBackingStore};
pub use traits::{BackingStore, ModuleError};
pub use wiring::WiringView;
