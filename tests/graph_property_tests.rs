//! Property tests for dependency edge invariants

mod common;
use common::*;

use bllvm_module_state::ModuleRecord;
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Add { from: usize, to: usize, dedupe: bool },
    RemoveAll { from: usize },
}

fn op(modules: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..modules, 0..modules, any::<bool>())
            .prop_map(|(from, to, dedupe)| Op::Add { from, to, dedupe }),
        1 => (0..modules).prop_map(|from| Op::RemoveAll { from }),
    ]
}

fn count(haystack: &[Arc<ModuleRecord>], needle: &Arc<ModuleRecord>) -> usize {
    haystack.iter().filter(|m| Arc::ptr_eq(m, needle)).count()
}

proptest! {
    #[test]
    fn edges_stay_symmetric(ops in prop::collection::vec(op(6), 0..60)) {
        let modules: Vec<_> = (0..6).map(|i| module(&format!("m{}", i))).collect();
        for op in ops {
            match op {
                Op::Add { from, to, dedupe } => {
                    modules[from].add_dependency(&modules[to], dedupe);
                }
                Op::RemoveAll { from } => modules[from].remove_all_dependencies(),
            }
        }

        for d in &modules {
            for s in &modules {
                prop_assert_eq!(count(&d.dependencies(), s), count(&s.dependents(), d));
            }
            prop_assert_eq!(count(&d.dependencies(), d), 0);
        }
    }

    #[test]
    fn remove_all_is_idempotent(edges in prop::collection::vec((0usize..5, any::<bool>()), 0..20)) {
        let m = module("m");
        let suppliers: Vec<_> = (0..5).map(|i| module(&format!("s{}", i))).collect();
        for (to, dedupe) in edges {
            m.add_dependency(&suppliers[to], dedupe);
        }

        m.remove_all_dependencies();
        prop_assert!(m.dependencies().is_empty());
        m.remove_all_dependencies();
        prop_assert!(m.dependencies().is_empty());
        prop_assert!(suppliers.iter().all(|s| s.dependents().is_empty()));
    }

    #[test]
    fn self_edges_are_dropped(dedupe in any::<bool>(), repeats in 1usize..5) {
        let m = module("m");
        for _ in 0..repeats {
            prop_assert!(!m.add_dependency(&m, dedupe));
        }
        prop_assert!(m.dependencies().is_empty());
        prop_assert!(m.dependents().is_empty());
    }
}
