//! Lazy facet store
//!
//! Hydrates module facet bundles from a backing store on first read and
//! bounds how many hydrated bundles stay resident.
//!
//! One mutex per store serializes hydration and eviction, so two readers of
//! the same lazily loaded module never both call `fully_load`. Lock order is
//! always store lock, then record lock.

use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error};

use crate::config::StoreConfig;
use crate::module::facets::FacetBundle;
use crate::module::flags::StateFlags;
use crate::module::record::{ModuleId, ModuleRecord};
use crate::module::traits::{BackingStore, ModuleError};

/// Hydrated records ordered by last touch
///
/// With a residency limit a read moves its record to the back; without one
/// the order is hydration order.
#[derive(Default)]
struct Residency {
    order: BTreeMap<u64, (ModuleId, Weak<ModuleRecord>)>,
    ticks: HashMap<ModuleId, u64>,
    next_tick: u64,
}

impl Residency {
    fn len(&self) -> usize {
        self.order.len()
    }

    fn touch(&mut self, record: &ModuleRecord) {
        let tick = self.next_tick;
        self.next_tick += 1;
        if let Some(previous) = self.ticks.insert(record.id(), tick) {
            self.order.remove(&previous);
        }
        self.order.insert(tick, (record.id(), record.handle()));
    }

    fn forget(&mut self, record: &ModuleRecord) {
        let Some(&tick) = self.ticks.get(&record.id()) else {
            return;
        };
        // another record may have reused the id
        if self
            .order
            .get(&tick)
            .is_some_and(|(_, handle)| std::ptr::eq(handle.as_ptr(), record))
        {
            self.ticks.remove(&record.id());
            self.order.remove(&tick);
        }
    }

    fn pop_oldest(&mut self) -> Option<(ModuleId, Weak<ModuleRecord>)> {
        let (_, (id, handle)) = self.order.pop_first()?;
        self.ticks.remove(&id);
        Some((id, handle))
    }
}

/// Hydration front for one backing store
pub struct FacetStore {
    backing: Arc<dyn BackingStore>,
    /// 0 means unbounded
    max_resident: usize,
    lazy_loading: bool,
    state: Mutex<Residency>,
    accessed: AtomicBool,
    loads: AtomicU64,
}

impl FacetStore {
    /// Create a store with unbounded residency
    pub fn new(backing: Arc<dyn BackingStore>) -> Self {
        Self::with_config(backing, &StoreConfig::default())
    }

    pub fn with_config(backing: Arc<dyn BackingStore>, config: &StoreConfig) -> Self {
        Self {
            backing,
            max_resident: config.max_resident_modules,
            lazy_loading: config.lazy_loading,
            state: Mutex::new(Residency::default()),
            accessed: AtomicBool::new(false),
            loads: AtomicU64::new(0),
        }
    }

    /// Whether modules added to a graph over this store start lazily loaded
    pub fn is_lazy_loaded(&self) -> bool {
        self.lazy_loading && self.backing.is_lazy_loaded()
    }

    /// Set when a read found its bundle already hydrated
    pub fn accessed(&self) -> bool {
        self.accessed.load(Ordering::Relaxed)
    }

    pub fn set_accessed(&self, accessed: bool) {
        self.accessed.store(accessed, Ordering::Relaxed);
    }

    /// Number of bundles successfully loaded from the backing store
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn resident_count(&self) -> usize {
        self.state.lock().len()
    }

    /// Bring `record`'s bundle into memory if it is lazily loaded and absent
    ///
    /// A read of an already hydrated record only takes the store lock when a
    /// residency limit needs its recency updated.
    pub fn hydrate(&self, record: &ModuleRecord) -> Result<(), ModuleError> {
        let flags = record.state_flags();
        if !flags.contains(StateFlags::LAZY_LOADED) {
            return Ok(());
        }
        if flags.contains(StateFlags::FULLY_LOADED) && self.max_resident == 0 {
            self.accessed.store(true, Ordering::Relaxed);
            return Ok(());
        }

        let mut state = self.state.lock();
        if record.is_fully_loaded() {
            self.accessed.store(true, Ordering::Relaxed);
            if self.max_resident > 0 {
                state.touch(record);
            }
            return Ok(());
        }

        let bundle = self.backing.fully_load(record).map_err(|e| {
            error!("Failed to hydrate module {}: {:#}", record, e);
            ModuleError::HydrationFailed(format!("module {}: {:#}", record, e))
        })?;
        self.loads.fetch_add(1, Ordering::Relaxed);
        record.install_facets(bundle);
        state.touch(record);
        debug!("Hydrated module {}", record);

        if self.max_resident > 0 {
            while state.len() > self.max_resident {
                let Some((id, handle)) = state.pop_oldest() else {
                    break;
                };
                if let Some(oldest) = handle.upgrade() {
                    if oldest.evict_facets() {
                        debug!("Evicted module {} (resident limit {})", id, self.max_resident);
                    }
                }
            }
        }
        Ok(())
    }

    /// Evict `record`'s bundle; see `ModuleRecord::unload`
    pub fn unload(&self, record: &ModuleRecord) -> Result<bool, ModuleError> {
        let mut state = self.state.lock();
        if !record.is_lazy_loaded() {
            return Err(ModuleError::InvalidState(format!(
                "Module {} is not lazily backed and cannot be unloaded",
                record
            )));
        }
        state.forget(record);
        let evicted = record.evict_facets();
        if evicted {
            debug!("Unloaded module {}", record);
        }
        Ok(evicted)
    }

    /// Evict up to `count` of the least recently touched bundles
    pub fn evict_oldest(&self, count: usize) -> usize {
        let mut state = self.state.lock();
        let mut evicted = 0;
        while evicted < count {
            let Some((_, handle)) = state.pop_oldest() else {
                break;
            };
            if handle.upgrade().is_some_and(|record| record.evict_facets()) {
                evicted += 1;
            }
        }
        evicted
    }

    /// Evict every resident bundle
    pub fn evict_all(&self) -> usize {
        self.evict_oldest(usize::MAX)
    }

    /// Track a released record so eviction can reach it
    pub(crate) fn track(&self, record: &ModuleRecord) {
        if record.state_flags().is_evictable() {
            self.state.lock().touch(record);
        }
    }

    /// Stop tracking a record that is pinned or leaving its graph
    pub(crate) fn forget(&self, record: &ModuleRecord) {
        self.state.lock().forget(record);
    }
}

/// In-memory backing store keyed by module id
#[derive(Default)]
pub struct MemoryBackingStore {
    bundles: RwLock<HashMap<ModuleId, FacetBundle>>,
}

impl MemoryBackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: ModuleId, bundle: FacetBundle) {
        self.bundles.write().insert(id, bundle);
    }

    pub fn remove(&self, id: ModuleId) -> Option<FacetBundle> {
        self.bundles.write().remove(&id)
    }

    /// Persist `record`'s current bundle
    pub fn persist(&self, record: &ModuleRecord) -> Result<(), ModuleError> {
        let bundle = record.facet_bundle()?;
        self.insert(record.id(), bundle);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bundles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.read().is_empty()
    }
}

impl BackingStore for MemoryBackingStore {
    fn fully_load(&self, module: &ModuleRecord) -> anyhow::Result<FacetBundle> {
        self.bundles
            .read()
            .get(&module.id())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No persisted facets for module {}", module.id()))
    }
}
