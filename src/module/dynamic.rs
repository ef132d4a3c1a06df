//! Dynamic import registry
//!
//! Speculative imports added after resolution, plus the bookkeeping for
//! packages that a dynamic import actually wired in. Added imports are never
//! persisted, so every mutation here pins the bundle in memory first.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::module::facets::appended;
use crate::module::record::ModuleRecord;
use crate::module::registry::specs::{ExportSpec, ImportSpec};
use crate::module::traits::ModuleError;
use crate::utils::time::current_timestamp;

impl ModuleRecord {
    /// Register speculative dynamic imports; returns how many were new
    ///
    /// The bundle is hydrated and pinned even if the batch is then rejected.
    /// A batch containing any non-dynamic spec is rejected as a whole.
    pub fn add_dynamic_imports(&self, specs: Vec<ImportSpec>) -> Result<usize, ModuleError> {
        self.set_lazy_loaded(false)?;

        if let Some(bad) = specs.iter().find(|spec| !spec.is_dynamic()) {
            warn!(
                "Rejected dynamic imports for module {}: {} lacks the dynamic resolution directive",
                self, bad.name
            );
            return Err(ModuleError::InvalidArgument(format!(
                "Import {} is not a dynamic import",
                bad.name
            )));
        }

        let owner = self.id();
        let added = self.write_facets(|bundle, _| {
            let mut current: Vec<ImportSpec> = bundle.added_dynamic_imports.to_vec();
            let before = current.len();
            for mut spec in specs {
                if current.iter().any(|existing| existing.same_import(&spec)) {
                    continue;
                }
                spec.owner = Some(owner);
                current.push(spec);
            }
            let added = current.len() - before;
            if added > 0 {
                bundle.added_dynamic_imports = current.into();
            }
            added
        })?;
        if added > 0 {
            debug!("Added {} dynamic imports to module {}", added, self);
        }
        Ok(added)
    }

    pub fn added_dynamic_imports(&self) -> Result<Arc<[ImportSpec]>, ModuleError> {
        self.added_dynamic_imports_snapshot()
    }

    /// Drop every added dynamic import, e.g. when the module content is replaced
    pub fn clear_dynamic_imports(&self) -> Result<(), ModuleError> {
        self.write_facets(|bundle, _| {
            bundle.added_dynamic_imports = Vec::<ImportSpec>::new().into()
        })
    }

    /// Wire in a package a dynamic import resolved to
    ///
    /// Adds a deduplicated edge to `supplier` and appends `export` to the
    /// resolved imports. The append is not deduplicated: a package resolved
    /// twice shows up twice.
    pub fn record_dynamic_resolution(
        &self,
        supplier: &Arc<ModuleRecord>,
        mut export: ExportSpec,
    ) -> Result<(), ModuleError> {
        match export.exporter {
            Some(exporter) if exporter != supplier.id() => {
                return Err(ModuleError::InvalidArgument(format!(
                    "Export {} belongs to module {}, not {}",
                    export.name,
                    exporter,
                    supplier.id()
                )));
            }
            Some(_) => {}
            None => export.exporter = Some(supplier.id()),
        }

        self.set_lazy_loaded(false)?;
        let name = export.name.clone();
        self.write_facets(|bundle, _| {
            bundle.resolved_imports = appended(&bundle.resolved_imports, export);
        })?;
        self.add_dependency(supplier, true);
        debug!("Module {} dynamically wired {} from {}", self, name, supplier);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Dynamic stamps
    // ---------------------------------------------------------------------

    /// Replace the whole stamp map; `None` clears it
    pub fn set_dynamic_stamps(
        &self,
        stamps: Option<HashMap<String, u64>>,
    ) -> Result<(), ModuleError> {
        self.write_facets(|bundle, _| bundle.dynamic_stamps = stamps)
    }

    /// Set one stamp, or remove it with `None`
    pub fn set_dynamic_stamp(
        &self,
        requested: &str,
        stamp: Option<u64>,
    ) -> Result<(), ModuleError> {
        self.write_facets(|bundle, _| match stamp {
            Some(stamp) => {
                bundle
                    .dynamic_stamps
                    .get_or_insert_with(HashMap::new)
                    .insert(requested.to_string(), stamp);
            }
            None => {
                if let Some(stamps) = bundle.dynamic_stamps.as_mut() {
                    stamps.remove(requested);
                }
            }
        })
    }

    /// Stamp `requested` with the current time; returns the stamp
    pub fn stamp_dynamic_now(&self, requested: &str) -> Result<u64, ModuleError> {
        let now = current_timestamp();
        self.set_dynamic_stamp(requested, Some(now))?;
        Ok(now)
    }

    /// Last time `requested` was satisfied dynamically, 0 if never
    pub fn dynamic_stamp(&self, requested: &str) -> Result<u64, ModuleError> {
        Ok(self
            .dynamic_stamps_snapshot()?
            .and_then(|stamps| stamps.get(requested).copied())
            .unwrap_or(0))
    }

    pub fn dynamic_stamps(&self) -> Result<HashMap<String, u64>, ModuleError> {
        Ok(self.dynamic_stamps_snapshot()?.unwrap_or_default())
    }
}
