//! Module dependency graph
//!
//! Bidirectional edge bookkeeping between module records, plus the graph
//! container that owns the records and their backing store.
//!
//! An edge always points from a dependent to the module supplying something
//! it consumes. Both ends are updated while holding both record locks
//! (acquired in the global record order), so `D in S.dependents()` iff
//! `S in D.dependencies()` after every call.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ptr;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

use crate::module::flags::StateFlags;
use crate::module::record::{lock_pair, ModuleId, ModuleRecord};
use crate::module::registry::specs::ExportSpec;
use crate::module::store::FacetStore;
use crate::module::traits::ModuleError;

impl ModuleRecord {
    /// Record that this module consumes from `supplier`
    ///
    /// A self edge is dropped silently. With `dedupe` an existing edge is not
    /// added again; without it duplicates are allowed on both ends, which the
    /// speculative paths rely on. Returns whether an edge was added.
    pub fn add_dependency(&self, supplier: &Arc<ModuleRecord>, dedupe: bool) -> bool {
        if ptr::eq(self, supplier.as_ref()) {
            return false;
        }
        let (mut mine, mut theirs) = lock_pair(self, supplier);
        if dedupe
            && mine
                .dependencies
                .iter()
                .any(|dep| ptr::eq(dep.as_ptr(), supplier.as_ref()))
        {
            return false;
        }
        mine.dependencies.push(Arc::downgrade(supplier));
        theirs.dependents.push(self.handle());
        debug!("Module {} now depends on {}", self, supplier);
        true
    }

    /// Batch form of `add_dependency`; returns how many edges were added
    pub fn add_dependencies(&self, suppliers: &[Arc<ModuleRecord>], dedupe: bool) -> usize {
        suppliers
            .iter()
            .filter(|supplier| self.add_dependency(supplier, dedupe))
            .count()
    }

    /// Remove one edge to `supplier` from both ends; returns whether one existed
    pub fn remove_dependency(&self, supplier: &ModuleRecord) -> bool {
        if ptr::eq(self, supplier) {
            return false;
        }
        let (mut mine, mut theirs) = lock_pair(self, supplier);
        let Some(index) = mine
            .dependencies
            .iter()
            .position(|dep| ptr::eq(dep.as_ptr(), supplier))
        else {
            return false;
        };
        mine.dependencies.remove(index);
        if let Some(index) = theirs
            .dependents
            .iter()
            .position(|dependent| ptr::eq(dependent.as_ptr(), self))
        {
            theirs.dependents.remove(index);
        }
        true
    }

    /// Drop every outgoing edge, on both ends; calling it again is a no-op
    pub fn remove_all_dependencies(&self) {
        loop {
            let supplier = {
                let mut inner = self.inner.lock();
                let Some(last) = inner.dependencies.last() else {
                    break;
                };
                match last.upgrade() {
                    Some(supplier) => supplier,
                    None => {
                        // supplier already dropped, nothing on its end to fix
                        inner.dependencies.pop();
                        continue;
                    }
                }
            };
            self.remove_dependency(&supplier);
        }
    }

    /// Snapshot of the live suppliers this module depends on
    pub fn dependencies(&self) -> Vec<Arc<ModuleRecord>> {
        self.inner
            .lock()
            .dependencies
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Snapshot of the modules depending on this one
    pub fn dependents(&self) -> Vec<Arc<ModuleRecord>> {
        self.inner
            .lock()
            .dependents
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    pub fn has_dependents(&self) -> bool {
        self.inner
            .lock()
            .dependents
            .iter()
            .any(|dependent| dependent.strong_count() > 0)
    }

    /// Dependencies that are independent loading units: self and fragments removed
    pub fn bundle_dependencies(&self) -> Vec<Arc<ModuleRecord>> {
        self.dependencies()
            .into_iter()
            .filter(|dep| !ptr::eq(dep.as_ref(), self) && !dep.is_fragment())
            .collect()
    }
}

/// Container owning module records and, optionally, their backing store
pub struct ModuleGraph {
    me: Weak<ModuleGraph>,
    store: Option<Arc<FacetStore>>,
    modules: RwLock<BTreeMap<ModuleId, Arc<ModuleRecord>>>,
}

impl ModuleGraph {
    /// Graph whose modules are always fully loaded
    pub fn new() -> Arc<Self> {
        Self::build(None)
    }

    /// Graph hydrating its modules from `store`
    pub fn with_store(store: Arc<FacetStore>) -> Arc<Self> {
        Self::build(Some(store))
    }

    fn build(store: Option<Arc<FacetStore>>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            store,
            modules: RwLock::new(BTreeMap::new()),
        })
    }

    pub fn store(&self) -> Option<&Arc<FacetStore>> {
        self.store.as_ref()
    }

    /// Add a module; its LAZY_LOADED bit follows the store
    pub fn add_module(&self, module: Arc<ModuleRecord>) -> Result<(), ModuleError> {
        let mut modules = self.modules.write();
        if modules.contains_key(&module.id()) {
            return Err(ModuleError::InvalidArgument(format!(
                "Module id {} is already in the graph",
                module.id()
            )));
        }
        let lazy = self.store.as_ref().is_some_and(|store| store.is_lazy_loaded());
        module.set_containing_graph(self.me.clone(), lazy);
        debug!("Added module {} (lazy: {})", module, lazy);
        modules.insert(module.id(), module);
        Ok(())
    }

    /// Remove a module, tearing down its edges on both ends
    ///
    /// Edges from dependents to the module are removed too, and any wiring
    /// view is invalidated. The record is detached: if it was never hydrated
    /// its facets are unreachable afterwards.
    pub fn remove_module(&self, id: ModuleId) -> Result<Arc<ModuleRecord>, ModuleError> {
        let module = self
            .modules
            .write()
            .remove(&id)
            .ok_or_else(|| ModuleError::ModuleNotFound(id.to_string()))?;

        module.remove_all_dependencies();
        for dependent in module.dependents() {
            while dependent.remove_dependency(&module) {}
        }
        module.invalidate_wiring();
        if let Some(store) = &self.store {
            store.forget(&module);
        }
        module.set_containing_graph(Weak::new(), false);

        info!("Removed module {}", module);
        Ok(module)
    }

    pub fn module(&self, id: ModuleId) -> Option<Arc<ModuleRecord>> {
        self.modules.read().get(&id).cloned()
    }

    /// All modules in id order
    pub fn modules(&self) -> Vec<Arc<ModuleRecord>> {
        self.modules.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.modules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.read().is_empty()
    }

    /// Mark a module resolved; its wiring view is created on first request
    pub fn resolve_module(&self, id: ModuleId) -> Result<Arc<ModuleRecord>, ModuleError> {
        let module = self
            .module(id)
            .ok_or_else(|| ModuleError::ModuleNotFound(id.to_string()))?;
        module.set_state_flag(StateFlags::RESOLVED, true);
        debug!("Resolved module {}", module);
        Ok(module)
    }

    /// Clear RESOLVED, invalidating the module's wiring view
    pub fn unresolve_module(&self, id: ModuleId) -> Result<Arc<ModuleRecord>, ModuleError> {
        let module = self
            .module(id)
            .ok_or_else(|| ModuleError::ModuleNotFound(id.to_string()))?;
        module.set_state_flag(StateFlags::RESOLVED, false);
        debug!("Unresolved module {}", module);
        Ok(module)
    }

    /// Fragments the resolver attached to `host`
    pub fn fragments_of(&self, host: &ModuleRecord) -> Vec<Arc<ModuleRecord>> {
        self.modules()
            .into_iter()
            .filter(|module| {
                module
                    .host()
                    .is_some_and(|spec| spec.hosts.contains(&host.id()))
            })
            .collect()
    }

    /// Wire a dynamically resolved package into `module`
    ///
    /// The exporter is looked up from the export's back-reference.
    pub fn record_dynamic_resolution(
        &self,
        module: ModuleId,
        export: ExportSpec,
    ) -> Result<(), ModuleError> {
        let importer = self
            .module(module)
            .ok_or_else(|| ModuleError::ModuleNotFound(module.to_string()))?;
        let exporter_id = export.exporter.ok_or_else(|| {
            ModuleError::InvalidArgument(format!("Export {} has no exporting module", export.name))
        })?;
        let exporter = self
            .module(exporter_id)
            .ok_or_else(|| ModuleError::ModuleNotFound(exporter_id.to_string()))?;
        importer.record_dynamic_resolution(&exporter, export)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::registry::specs::HostSpec;
    use crate::module::registry::version::Version;

    fn module(name: &str) -> Arc<ModuleRecord> {
        ModuleRecord::new(ModuleId::next(), name, Version::new(1, 0, 0))
    }

    fn ids(modules: &[Arc<ModuleRecord>]) -> Vec<ModuleId> {
        modules.iter().map(|m| m.id()).collect()
    }

    #[test]
    fn test_add_dependency_symmetric() {
        let m = module("m");
        let n = module("n");
        assert!(m.add_dependency(&n, true));
        assert!(!m.add_dependency(&n, true));

        assert_eq!(ids(&m.dependencies()), vec![n.id()]);
        assert_eq!(ids(&n.dependents()), vec![m.id()]);
        assert!(n.has_dependents());
        assert!(!m.has_dependents());
    }

    #[test]
    fn test_self_edge_dropped() {
        let m = module("m");
        assert!(!m.add_dependency(&m, false));
        assert!(m.dependencies().is_empty());
        assert!(m.dependents().is_empty());
    }

    #[test]
    fn test_duplicates_without_dedupe() {
        let m = module("m");
        let n = module("n");
        m.add_dependency(&n, false);
        m.add_dependency(&n, false);
        assert_eq!(m.dependencies().len(), 2);
        assert_eq!(n.dependents().len(), 2);

        m.remove_all_dependencies();
        assert!(m.dependencies().is_empty());
        assert!(n.dependents().is_empty());
    }

    #[test]
    fn test_bundle_dependencies_skip_fragments() {
        let m = module("m");
        let host = module("host");
        let fragment = module("fragment");
        fragment.set_host(Some(HostSpec::new("host", Default::default())));

        m.add_dependencies(&[host.clone(), fragment.clone()], true);
        assert_eq!(m.dependencies().len(), 2);
        assert_eq!(ids(&m.bundle_dependencies()), vec![host.id()]);
    }

    #[test]
    fn test_remove_module_tears_down_both_directions() {
        let graph = ModuleGraph::new();
        let a = module("a");
        let b = module("b");
        let c = module("c");
        for m in [&a, &b, &c] {
            graph.add_module(Arc::clone(m)).unwrap();
        }
        a.add_dependency(&b, true);
        b.add_dependency(&c, true);

        let removed = graph.remove_module(b.id()).unwrap();
        assert!(removed.dependencies().is_empty());
        assert!(removed.dependents().is_empty());
        assert!(a.dependencies().is_empty());
        assert!(c.dependents().is_empty());
        assert!(removed.containing_graph().is_none());
        assert_eq!(graph.len(), 2);

        assert!(matches!(graph.remove_module(b.id()), Err(ModuleError::ModuleNotFound(_))));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let graph = ModuleGraph::new();
        let a = ModuleRecord::new(ModuleId(900), "a", Version::default());
        let b = ModuleRecord::new(ModuleId(900), "b", Version::default());
        graph.add_module(a).unwrap();
        assert!(matches!(graph.add_module(b), Err(ModuleError::InvalidArgument(_))));
    }

    #[test]
    fn test_fragments_of_host() {
        let graph = ModuleGraph::new();
        let host = module("host");
        let fragment = module("fragment");
        let mut spec = HostSpec::new("host", Default::default());
        spec.hosts.push(host.id());
        fragment.set_host(Some(spec));
        graph.add_module(host.clone()).unwrap();
        graph.add_module(fragment.clone()).unwrap();

        assert_eq!(ids(&host.fragments().unwrap()), vec![fragment.id()]);
        assert!(fragment.fragments().unwrap().is_empty());
    }
}
