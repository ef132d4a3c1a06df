//! Capability wiring view tests

mod common;
use common::*;

use bllvm_module_state::module::registry::specs::ModuleCapability;
use bllvm_module_state::{
    ExportSpec, GenericCapability, HostSpec, ModuleGraph, StateFlags, Version, WiredCapability,
    MODULE_NAMESPACE, PACKAGE_NAMESPACE,
};
use std::sync::Arc;

#[test]
fn test_invalidation_then_fresh_view() {
    let m = module("M");
    m.set_state_flag(StateFlags::RESOLVED, true);
    let v = m.wiring().unwrap();
    assert!(v.is_current());

    m.set_state_flag(StateFlags::RESOLVED, false);
    assert!(!v.is_current());
    assert!(m.wiring().is_none());

    m.set_state_flag(StateFlags::RESOLVED, true);
    let fresh = m.wiring().unwrap();
    assert!(!Arc::ptr_eq(&v, &fresh));
    assert!(fresh.is_current());
    assert!(!v.is_current());
}

#[test]
fn test_unusable_view_answers_none_not_empty() {
    let m = module("M");
    m.set_state_flag(StateFlags::RESOLVED, true);
    let v = m.wiring().unwrap();

    // in use but nothing wired: empty, not None
    assert_eq!(v.required_capabilities(Some(PACKAGE_NAMESPACE)).unwrap(), Some(Vec::new()));

    m.set_state_flag(StateFlags::RESOLVED, false);
    assert_eq!(v.required_capabilities(None).unwrap(), None);
    assert_eq!(v.provided_capabilities(None).unwrap(), None);
    assert!(v.fragment_revisions().unwrap().is_none());
}

#[test]
fn test_required_capabilities_by_namespace() {
    let m = module("M");
    let base = module("base");
    let api = module("api");
    m.set_resolved_modules(vec![ModuleCapability {
        module: base.id(),
        name: Some("base".to_string()),
        version: Version::new(1, 0, 0),
    }])
    .unwrap();
    let mut export = ExportSpec::new("org.example.api", Version::new(1, 0, 0));
    export.exporter = Some(api.id());
    m.set_resolved_imports(vec![export]).unwrap();
    let mut ee = GenericCapability::new("bllvm.ee", "jre");
    ee.supplier = Some(base.id());
    m.set_resolved_capabilities(vec![ee]).unwrap();
    m.set_state_flag(StateFlags::RESOLVED, true);

    let v = m.wiring().unwrap();
    assert_eq!(v.required_capabilities(None).unwrap().unwrap().len(), 3);

    let modules = v.required_capabilities(Some(MODULE_NAMESPACE)).unwrap().unwrap();
    assert!(matches!(&modules[..], [WiredCapability::Module(cap)] if cap.module == base.id()));

    let packages = v.required_capabilities(Some(PACKAGE_NAMESPACE)).unwrap().unwrap();
    assert_eq!(packages.len(), 1);
    assert_eq!(packages[0].supplier(), Some(api.id()));

    let generic = v.required_capabilities(Some("bllvm.ee")).unwrap().unwrap();
    assert_eq!(generic[0].namespace(), "bllvm.ee");
}

#[test]
fn test_superseded_view_usable_while_depended_upon() {
    let m = module("M");
    let consumer = module("consumer");
    consumer.add_dependency(&m, true);
    m.set_state_flag(StateFlags::RESOLVED, true);
    let v = m.wiring().unwrap();

    m.set_state_flag(StateFlags::REMOVAL_PENDING, true);
    assert!(!v.is_current());
    assert!(v.is_in_use());
    assert!(v.provided_capabilities(None).unwrap().is_some());
}

#[test]
fn test_fragment_revisions_through_host_view() {
    let graph = ModuleGraph::new();
    let host = module("host");
    let fragment = module("host.nl");
    let mut spec = HostSpec::new("host", Default::default());
    spec.hosts.push(host.id());
    fragment.set_host(Some(spec));
    graph.add_module(host.clone()).unwrap();
    graph.add_module(fragment.clone()).unwrap();
    graph.resolve_module(host.id()).unwrap();
    graph.resolve_module(fragment.id()).unwrap();

    assert!(fragment.wiring().is_none());
    let revisions = host.wiring().unwrap().fragment_revisions().unwrap().unwrap();
    assert_eq!(ids(&revisions), vec![fragment.id()]);
}

#[test]
fn test_user_object_visible_through_view() {
    let m = module("M");
    m.set_user_object(Some(Arc::new(7u32)));
    m.set_state_flag(StateFlags::RESOLVED, true);

    let value = m.wiring().unwrap().user_object().unwrap();
    assert_eq!(value.downcast_ref::<u32>(), Some(&7));
}
