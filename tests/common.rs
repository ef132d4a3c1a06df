//! Shared helpers for module state integration tests
#![allow(dead_code)]

use bllvm_module_state::module::facets::FacetBundle;
use bllvm_module_state::{
    BackingStore, ExportSpec, FacetStore, ImportSpec, MemoryBackingStore, ModuleGraph, ModuleId,
    ModuleRecord, StoreConfig, Version,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn module(name: &str) -> Arc<ModuleRecord> {
    ModuleRecord::new(ModuleId::next(), name, Version::new(1, 0, 0))
}

pub fn bundle_for(name: &str) -> FacetBundle {
    FacetBundle {
        location: Some(format!("modules/{}", name)),
        imports: vec![ImportSpec::new(format!("{}.spi", name))].into(),
        exports: vec![ExportSpec::new(format!("{}.api", name), Version::new(1, 0, 0))].into(),
        ..Default::default()
    }
}

/// Backing store that counts loads and can stall inside `fully_load`
pub struct CountingBackingStore {
    inner: MemoryBackingStore,
    loads: AtomicUsize,
    stall: Duration,
}

impl CountingBackingStore {
    pub fn new(stall: Duration) -> Self {
        Self {
            inner: MemoryBackingStore::new(),
            loads: AtomicUsize::new(0),
            stall,
        }
    }

    pub fn insert(&self, id: ModuleId, bundle: FacetBundle) {
        self.inner.insert(id, bundle);
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl BackingStore for CountingBackingStore {
    fn fully_load(&self, module: &ModuleRecord) -> anyhow::Result<FacetBundle> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.stall.is_zero() {
            std::thread::sleep(self.stall);
        }
        self.inner.fully_load(module)
    }
}

/// Graph over a counting store, with `names` persisted and added lazily
pub fn lazy_graph(
    backing: Arc<CountingBackingStore>,
    config: &StoreConfig,
    names: &[&str],
) -> (Arc<ModuleGraph>, Arc<FacetStore>, Vec<Arc<ModuleRecord>>) {
    let store = Arc::new(FacetStore::with_config(backing.clone(), config));
    let graph = ModuleGraph::with_store(store.clone());
    let records = names
        .iter()
        .map(|name| {
            let record = ModuleRecord::lazy(ModuleId::next(), *name, Version::new(1, 0, 0));
            backing.insert(record.id(), bundle_for(name));
            graph.add_module(record.clone()).unwrap();
            record
        })
        .collect();
    (graph, store, records)
}

pub fn ids(modules: &[Arc<ModuleRecord>]) -> Vec<ModuleId> {
    modules.iter().map(|m| m.id()).collect()
}
