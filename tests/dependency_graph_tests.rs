//! Dependency graph tests

mod common;
use common::*;

use bllvm_module_state::{HostSpec, ModuleError, ModuleGraph, StateFlags};
use std::sync::Arc;
use std::thread;

#[test]
fn test_unresolved_dependency_scenario() {
    let m = module("M");
    let n = module("N");

    assert!(m.add_dependency(&n, true));
    assert_eq!(ids(&n.dependents()), vec![m.id()]);
    assert_eq!(ids(&m.dependencies()), vec![n.id()]);

    // not resolved yet, so there is nothing to query
    assert!(m.wiring().is_none());
    let answer = m.wiring().and_then(|view| view.required_capabilities(None).ok().flatten());
    assert!(answer.is_none());
}

#[test]
fn test_remove_all_dependencies_idempotent() {
    let m = module("M");
    let suppliers: Vec<_> = (0..4).map(|i| module(&format!("S{}", i))).collect();
    m.add_dependencies(&suppliers, true);
    assert_eq!(m.dependencies().len(), 4);

    m.remove_all_dependencies();
    assert!(m.dependencies().is_empty());
    m.remove_all_dependencies();
    assert!(m.dependencies().is_empty());
    assert!(suppliers.iter().all(|s| !s.has_dependents()));
}

#[test]
fn test_self_edge_never_created() {
    let m = module("M");
    assert!(!m.add_dependency(&m, true));
    assert!(!m.add_dependency(&m, false));
    assert!(m.dependencies().is_empty());
    assert!(!m.has_dependents());
}

#[test]
fn test_bundle_dependencies_excludes_fragments() {
    let m = module("M");
    let host = module("host");
    let fragment = module("host.nl");
    fragment.set_host(Some(HostSpec::new("host", Default::default())));

    m.add_dependencies(&[host.clone(), fragment.clone()], true);
    assert_eq!(ids(&m.bundle_dependencies()), vec![host.id()]);
}

#[test]
fn test_remove_module_invalidates_wiring() {
    let graph = ModuleGraph::new();
    let a = module("a");
    let b = module("b");
    graph.add_module(a.clone()).unwrap();
    graph.add_module(b.clone()).unwrap();
    a.add_dependency(&b, true);
    graph.resolve_module(b.id()).unwrap();
    let view = b.wiring().unwrap();

    graph.remove_module(b.id()).unwrap();
    assert!(!view.is_in_use());
    assert!(a.dependencies().is_empty());
    assert!(graph.module(b.id()).is_none());
}

#[test]
fn test_unknown_module_errors() {
    let graph = ModuleGraph::new();
    let ghost = module("ghost");
    assert!(matches!(graph.resolve_module(ghost.id()), Err(ModuleError::ModuleNotFound(_))));
    assert!(matches!(graph.unresolve_module(ghost.id()), Err(ModuleError::ModuleNotFound(_))));
}

#[test]
fn test_concurrent_opposite_edges_stay_symmetric() {
    let modules: Vec<_> = (0..8).map(|i| module(&format!("m{}", i))).collect();

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let modules = modules.clone();
            thread::spawn(move || {
                for round in 0..200 {
                    let a = &modules[(t + round) % modules.len()];
                    let b = &modules[(t * 3 + round + 1) % modules.len()];
                    if round % 5 == 4 {
                        a.remove_all_dependencies();
                    } else {
                        a.add_dependency(b, true);
                        b.add_dependency(a, true);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for d in &modules {
        for s in d.dependencies() {
            assert!(s.dependents().iter().any(|x| Arc::ptr_eq(x, d)));
        }
        for x in d.dependents() {
            assert!(x.dependencies().iter().any(|s| Arc::ptr_eq(s, d)));
        }
    }
}

#[test]
fn test_unresolve_keeps_edges() {
    let graph = ModuleGraph::new();
    let a = module("a");
    let b = module("b");
    graph.add_module(a.clone()).unwrap();
    graph.add_module(b.clone()).unwrap();
    a.add_dependency(&b, true);

    graph.resolve_module(a.id()).unwrap();
    graph.unresolve_module(a.id()).unwrap();
    assert!(!a.state_flags().contains(StateFlags::RESOLVED));
    assert_eq!(ids(&a.dependencies()), vec![b.id()]);
}

#[test]
fn test_cyclic_modules_freed_with_graph() {
    let graph = ModuleGraph::new();
    let a = module("A");
    let b = module("B");
    graph.add_module(a.clone()).unwrap();
    graph.add_module(b.clone()).unwrap();
    assert!(a.add_dependency(&b, true));
    assert!(b.add_dependency(&a, true));
    a.set_state_flag(StateFlags::RESOLVED, true);
    let view = a.wiring().unwrap();

    let (weak_a, weak_b) = (Arc::downgrade(&a), Arc::downgrade(&b));
    drop(graph);
    drop(a);
    drop(b);
    assert!(weak_a.upgrade().is_none());
    assert!(weak_b.upgrade().is_none());
    assert!(view.module().is_none());
}

#[test]
fn test_dropped_supplier_leaves_no_edge() {
    let m = module("M");
    let n = module("N");
    m.add_dependency(&n, true);
    drop(n);

    assert!(m.dependencies().is_empty());
    m.remove_all_dependencies();
    assert!(m.dependencies().is_empty());
}
