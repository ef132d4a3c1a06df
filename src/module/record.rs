//! Module record
//!
//! The per-module entity a resolver consults and mutates: identity, state
//! bits, the facet bundle, dependency edges and the installed wiring view.
//!
//! ## Locking
//!
//! Each record owns one mutex guarding its flags, facets, edges and wiring
//! slot. Hydration takes the backing store's lock first and the record lock
//! second, never the reverse, so no method holds the record lock while it
//! calls into the store. Getters copy an `Arc` out under the lock and release
//! it before returning.

use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tracing::debug;

use crate::module::facets::{stamped, FacetBundle};
use crate::module::flags::StateFlags;
use crate::module::graph::ModuleGraph;
use crate::module::registry::specs::{
    namespace_matches, ExportSpec, FragmentAttachment, GenericCapability, GenericRequirement,
    HostSpec, ImportSpec, ModuleCapability, ModuleRequirement, NativeCodeSpec, WiredCapability,
    FRAGMENT_ATTACHMENT_DIRECTIVE, MODULE_NAMESPACE, PACKAGE_NAMESPACE, SINGLETON_DIRECTIVE,
    VERSION_ATTRIBUTE,
};
use crate::module::registry::version::Version;
use crate::module::store::FacetStore;
use crate::module::traits::ModuleError;
use crate::module::wiring::WiringView;

/// Opaque value attached by the embedding runtime
pub type UserObject = Arc<dyn Any + Send + Sync>;

static NEXT_MODULE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable, process-unique module identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(pub u64);

impl ModuleId {
    /// Allocate a fresh id for a module that has never been persisted
    pub fn next() -> Self {
        ModuleId(NEXT_MODULE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State guarded by the record lock
pub(crate) struct RecordInner {
    pub(crate) flags: StateFlags,
    /// Present only for fragments
    pub(crate) host: Option<HostSpec>,
    /// `None` until first set, or while evicted
    pub(crate) facets: Option<FacetBundle>,
    /// Suppliers this module consumes from; the graph owns them, so a cycle
    /// of edges never keeps records alive
    pub(crate) dependencies: Vec<Weak<ModuleRecord>>,
    /// Modules consuming from this one
    pub(crate) dependents: Vec<Weak<ModuleRecord>>,
    pub(crate) wiring: Option<Arc<WiringView>>,
}

/// Per-module descriptor
pub struct ModuleRecord {
    id: ModuleId,
    name: Option<String>,
    version: Version,
    me: Weak<ModuleRecord>,
    pub(crate) inner: Mutex<RecordInner>,
    graph: RwLock<Weak<ModuleGraph>>,
    user_object: RwLock<Option<UserObject>>,
    /// Execution environment chosen by the resolver, -1 when unset
    ee_index: AtomicI64,
}

fn empty_facets() -> &'static FacetBundle {
    static EMPTY: OnceLock<FacetBundle> = OnceLock::new();
    EMPTY.get_or_init(FacetBundle::default)
}

impl ModuleRecord {
    fn build(id: ModuleId, name: Option<String>, version: Version, flags: StateFlags) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            id,
            name,
            version,
            me: me.clone(),
            inner: Mutex::new(RecordInner {
                flags,
                host: None,
                facets: None,
                dependencies: Vec::new(),
                dependents: Vec::new(),
                wiring: None,
            }),
            graph: RwLock::new(Weak::new()),
            user_object: RwLock::new(None),
            ee_index: AtomicI64::new(-1),
        })
    }

    /// Create a freshly declared, fully loaded module
    pub fn new(id: ModuleId, name: impl Into<String>, version: Version) -> Arc<Self> {
        Self::build(id, Some(name.into()), version, StateFlags::default())
    }

    /// Create a module without a name (displayed as `[id]`)
    pub fn unnamed(id: ModuleId) -> Arc<Self> {
        Self::build(id, None, Version::default(), StateFlags::default())
    }

    /// Create a summary whose facets live in a backing store until first read
    pub fn lazy(id: ModuleId, name: impl Into<String>, version: Version) -> Arc<Self> {
        Self::build(id, Some(name.into()), version, StateFlags::lazy())
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub(crate) fn handle(&self) -> Weak<ModuleRecord> {
        self.me.clone()
    }

    /// Key for the global lock order between two records
    fn lock_order_key(&self) -> (ModuleId, usize) {
        (self.id, self as *const ModuleRecord as usize)
    }

    // ---------------------------------------------------------------------
    // State bits
    // ---------------------------------------------------------------------

    pub fn state_flags(&self) -> StateFlags {
        self.inner.lock().flags
    }

    pub fn is_resolved(&self) -> bool {
        self.state_flags().contains(StateFlags::RESOLVED)
    }

    pub fn is_singleton(&self) -> bool {
        self.state_flags().contains(StateFlags::SINGLETON)
    }

    pub fn is_removal_pending(&self) -> bool {
        self.state_flags().contains(StateFlags::REMOVAL_PENDING)
    }

    pub fn has_dynamic_imports(&self) -> bool {
        self.state_flags().contains(StateFlags::HAS_DYNAMIC_IMPORT)
    }

    pub fn attach_fragments(&self) -> bool {
        self.state_flags().contains(StateFlags::ATTACH_FRAGMENTS)
    }

    pub fn dynamic_fragments(&self) -> bool {
        self.state_flags().contains(StateFlags::DYNAMIC_FRAGMENTS)
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.state_flags().contains(StateFlags::FULLY_LOADED)
    }

    pub fn is_lazy_loaded(&self) -> bool {
        self.state_flags().contains(StateFlags::LAZY_LOADED)
    }

    /// Set or clear state bits
    ///
    /// Clearing RESOLVED invalidates the installed wiring view and drops it,
    /// so the next resolution gets a fresh one. Resolved-side facets are left
    /// untouched: between unresolve and the next resolve they still describe
    /// the previous resolution, and callers that care must check
    /// `is_resolved` before trusting them.
    pub fn set_state_flag(&self, flag: StateFlags, on: bool) {
        let mut inner = self.inner.lock();
        if on {
            inner.flags.insert(flag);
        } else {
            inner.flags.remove(flag);
            if flag.contains(StateFlags::RESOLVED) {
                if let Some(wiring) = inner.wiring.take() {
                    wiring.invalidate();
                    debug!("Invalidated wiring of module {}", self);
                }
            }
        }
    }

    /// Pin (`false`) or release (`true`) the bundle to/from its backing store
    ///
    /// Hydrates first so a pinned record never loses data the store holds.
    /// Release only after the current bundle has been persisted: from then on
    /// eviction may drop it.
    pub fn set_lazy_loaded(&self, lazy: bool) -> Result<(), ModuleError> {
        self.load_facets()?;
        self.inner.lock().flags.set(StateFlags::LAZY_LOADED, lazy);
        if let Some(store) = self.store() {
            if lazy {
                store.track(self);
            } else {
                store.forget(self);
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Containing graph and hydration
    // ---------------------------------------------------------------------

    pub fn containing_graph(&self) -> Option<Arc<ModuleGraph>> {
        self.graph.read().upgrade()
    }

    /// Attach to (or detach from, with `Weak::new()`) a graph
    pub(crate) fn set_containing_graph(&self, graph: Weak<ModuleGraph>, lazy: bool) {
        let mut inner = self.inner.lock();
        *self.graph.write() = graph;
        inner.flags.set(StateFlags::LAZY_LOADED, lazy);
    }

    fn store(&self) -> Option<Arc<FacetStore>> {
        self.containing_graph().and_then(|graph| graph.store().cloned())
    }

    /// Make sure the facet bundle is in memory
    ///
    /// Must not be called while holding `self.inner`.
    pub(crate) fn load_facets(&self) -> Result<(), ModuleError> {
        if !self.state_flags().contains(StateFlags::LAZY_LOADED) {
            return Ok(());
        }
        let store = self.store().ok_or_else(|| {
            ModuleError::InvalidState(format!("No valid backing store for module {}", self))
        })?;
        store.hydrate(self)
    }

    /// Install a hydrated bundle; caller holds the store lock
    pub(crate) fn install_facets(&self, mut bundle: FacetBundle) {
        bundle.stamp_owner(self.id);
        let mut inner = self.inner.lock();
        inner.facets = Some(bundle);
        inner.flags.insert(StateFlags::FULLY_LOADED);
    }

    /// Drop the bundle if it may be evicted; caller holds the store lock
    pub(crate) fn evict_facets(&self) -> bool {
        let mut inner = self.inner.lock();
        if !inner.flags.is_evictable() {
            return false;
        }
        inner.flags.remove(StateFlags::FULLY_LOADED);
        inner.facets = None;
        true
    }

    /// Discard the hydrated bundle to relieve memory pressure
    ///
    /// Returns `Ok(false)` when the bundle is not in memory. The next getter
    /// hydrates again.
    pub fn unload(&self) -> Result<bool, ModuleError> {
        let store = self.store().ok_or_else(|| {
            ModuleError::InvalidState(format!("Module {} does not belong to a backing store", self))
        })?;
        store.unload(self)
    }

    /// Run `read` against the bundle, hydrating as needed
    ///
    /// An eviction racing between hydration and the read sends us round again,
    /// so `read` always sees one consistent bundle.
    fn read_facets<R>(&self, read: impl FnOnce(&FacetBundle) -> R) -> Result<R, ModuleError> {
        loop {
            self.load_facets()?;
            let inner = self.inner.lock();
            match inner.facets.as_ref() {
                Some(bundle) => return Ok(read(bundle)),
                None if !inner.flags.needs_hydration() => return Ok(read(empty_facets())),
                None => continue,
            }
        }
    }

    /// Run `write` against the bundle under the record lock, hydrating as needed
    ///
    /// A written bundle no longer matches its backing store, so a lazily
    /// loaded record is pinned in the same critical section: eviction can
    /// never drop the write. `set_lazy_loaded(true)` releases it again once
    /// the caller has persisted the bundle.
    pub(crate) fn write_facets<R>(
        &self,
        write: impl FnOnce(&mut FacetBundle, &mut StateFlags) -> R,
    ) -> Result<R, ModuleError> {
        let (result, pinned) = loop {
            self.load_facets()?;
            let mut guard = self.inner.lock();
            if guard.facets.is_none() && guard.flags.needs_hydration() {
                continue;
            }
            let inner = &mut *guard;
            let bundle = inner.facets.get_or_insert_with(FacetBundle::default);
            let result = write(bundle, &mut inner.flags);
            let pinned = inner.flags.contains(StateFlags::LAZY_LOADED);
            inner.flags.remove(StateFlags::LAZY_LOADED);
            break (result, pinned);
        };
        if pinned {
            if let Some(store) = self.store() {
                store.forget(self);
            }
            debug!("Pinned module {} after a facet write", self);
        }
        Ok(result)
    }

    /// Snapshot of the whole bundle (for persisting)
    pub fn facet_bundle(&self) -> Result<FacetBundle, ModuleError> {
        self.read_facets(FacetBundle::clone)
    }

    // ---------------------------------------------------------------------
    // Declared facets
    // ---------------------------------------------------------------------

    pub fn location(&self) -> Result<Option<String>, ModuleError> {
        self.read_facets(|b| b.location.clone())
    }

    pub fn platform_filter(&self) -> Result<Option<String>, ModuleError> {
        self.read_facets(|b| b.platform_filter.clone())
    }

    pub fn execution_environments(&self) -> Result<Arc<[String]>, ModuleError> {
        self.read_facets(|b| Arc::clone(&b.execution_environments))
    }

    pub fn imports(&self) -> Result<Arc<[ImportSpec]>, ModuleError> {
        self.read_facets(|b| Arc::clone(&b.imports))
    }

    pub fn exports(&self) -> Result<Arc<[ExportSpec]>, ModuleError> {
        self.read_facets(|b| Arc::clone(&b.exports))
    }

    pub fn required_modules(&self) -> Result<Arc<[ModuleRequirement]>, ModuleError> {
        self.read_facets(|b| Arc::clone(&b.required_modules))
    }

    pub fn generic_requirements(&self) -> Result<Arc<[GenericRequirement]>, ModuleError> {
        self.read_facets(|b| Arc::clone(&b.generic_requirements))
    }

    pub fn generic_capabilities(&self) -> Result<Arc<[GenericCapability]>, ModuleError> {
        self.read_facets(|b| Arc::clone(&b.generic_capabilities))
    }

    pub fn native_code(&self) -> Result<Option<NativeCodeSpec>, ModuleError> {
        self.read_facets(|b| b.native_code.clone())
    }

    // ---------------------------------------------------------------------
    // Resolved facets
    // ---------------------------------------------------------------------

    pub fn selected_exports(&self) -> Result<Arc<[ExportSpec]>, ModuleError> {
        self.read_facets(|b| Arc::clone(&b.selected_exports))
    }

    pub fn selected_capabilities(&self) -> Result<Arc<[GenericCapability]>, ModuleError> {
        self.read_facets(|b| Arc::clone(&b.selected_capabilities))
    }

    pub fn substituted_exports(&self) -> Result<Arc<[ExportSpec]>, ModuleError> {
        self.read_facets(|b| Arc::clone(&b.substituted_exports))
    }

    pub fn resolved_modules(&self) -> Result<Arc<[ModuleCapability]>, ModuleError> {
        self.read_facets(|b| Arc::clone(&b.resolved_modules))
    }

    pub fn resolved_imports(&self) -> Result<Arc<[ExportSpec]>, ModuleError> {
        self.read_facets(|b| Arc::clone(&b.resolved_imports))
    }

    pub fn resolved_capabilities(&self) -> Result<Arc<[GenericCapability]>, ModuleError> {
        self.read_facets(|b| Arc::clone(&b.resolved_capabilities))
    }

    pub(crate) fn dynamic_stamps_snapshot(
        &self,
    ) -> Result<Option<HashMap<String, u64>>, ModuleError> {
        self.read_facets(|b| b.dynamic_stamps.clone())
    }

    pub(crate) fn added_dynamic_imports_snapshot(&self) -> Result<Arc<[ImportSpec]>, ModuleError> {
        self.read_facets(|b| Arc::clone(&b.added_dynamic_imports))
    }

    // ---------------------------------------------------------------------
    // Setters
    // ---------------------------------------------------------------------

    pub fn set_location(&self, location: Option<String>) -> Result<(), ModuleError> {
        self.write_facets(|b, _| b.location = location)
    }

    pub fn set_platform_filter(&self, filter: Option<String>) -> Result<(), ModuleError> {
        self.write_facets(|b, _| b.platform_filter = filter)
    }

    pub fn set_execution_environments(&self, environments: Vec<String>) -> Result<(), ModuleError> {
        self.write_facets(|b, _| b.execution_environments = environments.into())
    }

    /// Replace declared imports; any dynamic import sets HAS_DYNAMIC_IMPORT
    pub fn set_imports(&self, imports: Vec<ImportSpec>) -> Result<(), ModuleError> {
        let owner = self.id;
        self.write_facets(|b, flags| {
            if imports.iter().any(ImportSpec::is_dynamic) {
                flags.insert(StateFlags::HAS_DYNAMIC_IMPORT);
            }
            b.imports = stamped(&imports, |spec| spec.owner = Some(owner));
        })
    }

    pub fn set_exports(&self, exports: Vec<ExportSpec>) -> Result<(), ModuleError> {
        let owner = self.id;
        self.write_facets(|b, _| {
            b.exports = stamped(&exports, |spec| spec.exporter = Some(owner))
        })
    }

    pub fn set_required_modules(
        &self,
        requirements: Vec<ModuleRequirement>,
    ) -> Result<(), ModuleError> {
        let owner = self.id;
        self.write_facets(|b, _| {
            b.required_modules = stamped(&requirements, |spec| spec.owner = Some(owner))
        })
    }

    pub fn set_generic_requirements(
        &self,
        requirements: Vec<GenericRequirement>,
    ) -> Result<(), ModuleError> {
        let owner = self.id;
        self.write_facets(|b, _| {
            b.generic_requirements = stamped(&requirements, |spec| spec.owner = Some(owner))
        })
    }

    pub fn set_generic_capabilities(
        &self,
        capabilities: Vec<GenericCapability>,
    ) -> Result<(), ModuleError> {
        let owner = self.id;
        self.write_facets(|b, _| {
            b.generic_capabilities = stamped(&capabilities, |cap| cap.supplier = Some(owner))
        })
    }

    pub fn set_native_code(&self, native_code: Option<NativeCodeSpec>) -> Result<(), ModuleError> {
        let owner = self.id;
        self.write_facets(|b, _| {
            b.native_code = native_code.map(|mut spec| {
                spec.stamp_owner(owner);
                spec
            })
        })
    }

    pub fn set_selected_exports(&self, exports: Vec<ExportSpec>) -> Result<(), ModuleError> {
        let owner = self.id;
        self.write_facets(|b, _| {
            b.selected_exports = stamped(&exports, |spec| spec.exporter = Some(owner))
        })
    }

    pub fn set_selected_capabilities(
        &self,
        capabilities: Vec<GenericCapability>,
    ) -> Result<(), ModuleError> {
        let owner = self.id;
        self.write_facets(|b, _| {
            b.selected_capabilities = stamped(&capabilities, |cap| cap.supplier = Some(owner))
        })
    }

    pub fn set_substituted_exports(&self, exports: Vec<ExportSpec>) -> Result<(), ModuleError> {
        self.write_facets(|b, _| b.substituted_exports = exports.into())
    }

    pub fn set_resolved_modules(&self, modules: Vec<ModuleCapability>) -> Result<(), ModuleError> {
        self.write_facets(|b, _| b.resolved_modules = modules.into())
    }

    pub fn set_resolved_imports(&self, imports: Vec<ExportSpec>) -> Result<(), ModuleError> {
        self.write_facets(|b, _| b.resolved_imports = imports.into())
    }

    pub fn set_resolved_capabilities(
        &self,
        capabilities: Vec<GenericCapability>,
    ) -> Result<(), ModuleError> {
        self.write_facets(|b, _| b.resolved_capabilities = capabilities.into())
    }

    // ---------------------------------------------------------------------
    // Fragments
    // ---------------------------------------------------------------------

    pub fn host(&self) -> Option<HostSpec> {
        self.inner.lock().host.clone()
    }

    /// Declare (or clear) the host this module is a fragment of
    pub fn set_host(&self, host: Option<HostSpec>) {
        self.inner.lock().host = host;
    }

    pub fn is_fragment(&self) -> bool {
        self.inner.lock().host.is_some()
    }

    /// Fragments attached to this host; always empty for a fragment
    pub fn fragments(&self) -> Result<Vec<Arc<ModuleRecord>>, ModuleError> {
        if self.is_fragment() {
            return Ok(Vec::new());
        }
        let graph = self.containing_graph().ok_or_else(|| {
            ModuleError::InvalidState(format!("Module {} does not belong to a graph", self))
        })?;
        Ok(graph.fragments_of(self))
    }

    // ---------------------------------------------------------------------
    // User object and declared metadata
    // ---------------------------------------------------------------------

    pub fn user_object(&self) -> Option<UserObject> {
        self.user_object.read().clone()
    }

    pub fn set_user_object(&self, value: Option<UserObject>) {
        *self.user_object.write() = value;
    }

    /// Index of the execution environment the resolver matched this module against
    pub fn execution_environment_index(&self) -> Option<u32> {
        u32::try_from(self.ee_index.load(Ordering::Acquire)).ok()
    }

    pub fn set_execution_environment_index(&self, index: Option<u32>) {
        let raw = index.map_or(-1, i64::from);
        self.ee_index.store(raw, Ordering::Release);
    }

    /// The capability every module provides in `MODULE_NAMESPACE`
    pub fn module_capability(&self) -> ModuleCapability {
        ModuleCapability {
            module: self.id,
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }

    pub fn declared_directives(&self) -> BTreeMap<String, String> {
        let flags = self.state_flags();
        let attachment = if !flags.contains(StateFlags::ATTACH_FRAGMENTS) {
            FragmentAttachment::Never
        } else if flags.contains(StateFlags::DYNAMIC_FRAGMENTS) {
            FragmentAttachment::Always
        } else {
            FragmentAttachment::ResolveTime
        };

        let mut directives = BTreeMap::new();
        directives.insert(
            FRAGMENT_ATTACHMENT_DIRECTIVE.to_string(),
            attachment.as_str().to_string(),
        );
        if flags.contains(StateFlags::SINGLETON) {
            directives.insert(SINGLETON_DIRECTIVE.to_string(), "true".to_string());
        }
        directives
    }

    pub fn declared_attributes(&self) -> BTreeMap<String, String> {
        let mut attributes = BTreeMap::new();
        if let Some(name) = &self.name {
            attributes.insert(MODULE_NAMESPACE.to_string(), name.clone());
        }
        attributes.insert(VERSION_ATTRIBUTE.to_string(), self.version.to_string());
        attributes
    }

    /// Declared (not resolved) capabilities in `namespace`, `None` for all
    pub fn declared_capabilities(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<WiredCapability>, ModuleError> {
        let mut result = Vec::new();
        if namespace_matches(namespace, MODULE_NAMESPACE) {
            result.push(WiredCapability::Module(self.module_capability()));
        }
        if namespace_matches(namespace, PACKAGE_NAMESPACE) {
            result.extend(self.exports()?.iter().cloned().map(WiredCapability::Package));
        }
        result.extend(
            self.generic_capabilities()?
                .iter()
                .filter(|cap| namespace_matches(namespace, &cap.namespace))
                .cloned()
                .map(WiredCapability::Generic),
        );
        Ok(result)
    }
}

/// Lock two distinct records in the global order, returned as `(a, b)`
pub(crate) fn lock_pair<'a>(
    a: &'a ModuleRecord,
    b: &'a ModuleRecord,
) -> (MutexGuard<'a, RecordInner>, MutexGuard<'a, RecordInner>) {
    debug_assert!(!std::ptr::eq(a, b), "lock_pair called with the same record twice");
    if a.lock_order_key() <= b.lock_order_key() {
        let first = a.inner.lock();
        let second = b.inner.lock();
        (first, second)
    } else {
        let second = b.inner.lock();
        let first = a.inner.lock();
        (first, second)
    }
}

impl fmt::Display for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}_{}", name, self.version),
            None => write!(f, "[{}]", self.id),
        }
    }
}

impl fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Records are keyed by id
impl PartialEq for ModuleRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ModuleRecord {}

impl Hash for ModuleRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
