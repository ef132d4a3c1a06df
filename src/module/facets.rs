//! Facet bundle: every attribute of a module that is hydrated as a group
//!
//! Sequences are immutable shared slices. Readers get a clone of the `Arc`,
//! writers swap in a new slice; nothing is ever mutated in place.

use std::collections::HashMap;
use std::sync::Arc;

use crate::module::record::ModuleId;
use crate::module::registry::specs::{
    ExportSpec, GenericCapability, GenericRequirement, ImportSpec, ModuleCapability,
    ModuleRequirement, NativeCodeSpec,
};

#[derive(Debug, Clone, Default)]
pub struct FacetBundle {
    pub location: Option<String>,
    pub platform_filter: Option<String>,
    pub execution_environments: Arc<[String]>,

    pub imports: Arc<[ImportSpec]>,
    pub exports: Arc<[ExportSpec]>,
    pub required_modules: Arc<[ModuleRequirement]>,
    pub generic_requirements: Arc<[GenericRequirement]>,
    pub generic_capabilities: Arc<[GenericCapability]>,
    pub native_code: Option<NativeCodeSpec>,

    pub selected_exports: Arc<[ExportSpec]>,
    pub selected_capabilities: Arc<[GenericCapability]>,
    pub substituted_exports: Arc<[ExportSpec]>,
    pub resolved_modules: Arc<[ModuleCapability]>,
    pub resolved_imports: Arc<[ExportSpec]>,
    pub resolved_capabilities: Arc<[GenericCapability]>,

    /// Requested capability name -> last time a dynamic import satisfied it
    pub dynamic_stamps: Option<HashMap<String, u64>>,
    /// Never persisted; lost if the bundle is evicted, so adding pins the bundle
    pub added_dynamic_imports: Arc<[ImportSpec]>,
}

/// Copy `items` into a new shared slice, applying `stamp` to each element
pub(crate) fn stamped<T: Clone>(items: &[T], stamp: impl Fn(&mut T)) -> Arc<[T]> {
    items
        .iter()
        .cloned()
        .map(|mut item| {
            stamp(&mut item);
            item
        })
        .collect()
}

/// New shared slice with `item` appended
pub(crate) fn appended<T: Clone>(items: &[T], item: T) -> Arc<[T]> {
    items.iter().cloned().chain(std::iter::once(item)).collect()
}

impl FacetBundle {
    /// Point every owner/exporter/supplier back-reference at `owner`
    ///
    /// Resolved-side facets keep their original suppliers.
    pub fn stamp_owner(&mut self, owner: ModuleId) {
        self.imports = stamped(&self.imports, |spec| spec.owner = Some(owner));
        self.exports = stamped(&self.exports, |spec| spec.exporter = Some(owner));
        self.required_modules = stamped(&self.required_modules, |spec| spec.owner = Some(owner));
        self.generic_requirements =
            stamped(&self.generic_requirements, |spec| spec.owner = Some(owner));
        self.generic_capabilities =
            stamped(&self.generic_capabilities, |cap| cap.supplier = Some(owner));
        self.selected_exports = stamped(&self.selected_exports, |spec| spec.exporter = Some(owner));
        self.selected_capabilities =
            stamped(&self.selected_capabilities, |cap| cap.supplier = Some(owner));
        self.added_dynamic_imports =
            stamped(&self.added_dynamic_imports, |spec| spec.owner = Some(owner));
        if let Some(native) = self.native_code.as_mut() {
            native.stamp_owner(owner);
        }
    }
}

impl NativeCodeSpec {
    pub(crate) fn stamp_owner(&mut self, owner: ModuleId) {
        self.owner = Some(owner);
        for supplier in self.possible_suppliers.iter_mut() {
            supplier.supplier = Some(owner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::registry::version::Version;

    #[test]
    fn test_stamp_owner() {
        let mut bundle = FacetBundle {
            exports: vec![ExportSpec::new("org.example.api", Version::new(1, 0, 0))].into(),
            imports: vec![ImportSpec::new("org.example.spi")].into(),
            resolved_imports: vec![ExportSpec::new("org.other", Version::default())].into(),
            ..Default::default()
        };
        bundle.stamp_owner(ModuleId(3));

        assert_eq!(bundle.exports[0].exporter, Some(ModuleId(3)));
        assert_eq!(bundle.imports[0].owner, Some(ModuleId(3)));
        assert_eq!(bundle.resolved_imports[0].exporter, None);
    }

    #[test]
    fn test_appended_leaves_original() {
        let original: Arc<[u32]> = vec![1, 2].into();
        let grown = appended(&original, 3);
        assert_eq!(&*original, &[1, 2]);
        assert_eq!(&*grown, &[1, 2, 3]);
    }
}
