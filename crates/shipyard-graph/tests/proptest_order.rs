//! Property-based tests for install ordering.
//!
//! - Every release is emitted after all of its requirements
//! - The same input always yields the same queue
//! - Any cycle fails the sort outright

use std::collections::HashMap;

use proptest::prelude::*;
use shipyard_core::Release;
use shipyard_graph::{GraphError, ReleaseGraph};

/// Acyclic release sets: release `i` may only require releases `< i`,
/// then the declaration order is shuffled so edges point every which way.
fn dag_strategy() -> impl Strategy<Value = Vec<Release>> {
    (1usize..14)
        .prop_flat_map(|n| {
            let edges = (0..n)
                .map(|i| proptest::collection::vec(any::<bool>(), i))
                .collect::<Vec<_>>();
            (Just(n), edges)
        })
        .prop_map(|(n, edges)| {
            (0..n)
                .map(|i| {
                    let reqs: Vec<String> = edges[i]
                        .iter()
                        .enumerate()
                        .filter(|(_, on)| **on)
                        .map(|(j, _)| format!("r{j}"))
                        .collect();
                    let mut release = Release::new(&format!("r{i}"), "chart");
                    release.requirements = reqs;
                    release
                })
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}

proptest! {
    #[test]
    fn every_release_follows_its_requirements(releases in dag_strategy()) {
        let queue = ReleaseGraph::build(releases.clone())
            .unwrap()
            .topo_sort_by_kahn()
            .unwrap();
        let names = queue.names();
        prop_assert_eq!(names.len(), releases.len());

        let position: HashMap<&str, usize> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();
        for release in &releases {
            for req in &release.requirements {
                prop_assert!(position[req.as_str()] < position[release.name.as_str()]);
            }
        }
    }

    #[test]
    fn ordering_is_deterministic(releases in dag_strategy()) {
        let first = ReleaseGraph::build(releases.clone()).unwrap().topo_sort_by_kahn().unwrap();
        let second = ReleaseGraph::build(releases).unwrap().topo_sort_by_kahn().unwrap();
        prop_assert_eq!(first.names(), second.names());
    }

    #[test]
    fn cycles_always_fail(releases in dag_strategy(), ring in 1usize..5) {
        let mut releases = releases;
        for i in 0..ring {
            let mut release = Release::new(&format!("ring{i}"), "chart");
            release.requirements = vec![format!("ring{}", (i + 1) % ring)];
            releases.push(release);
        }

        let result = ReleaseGraph::build(releases).unwrap().topo_sort_by_kahn();
        match result {
            Err(GraphError::CycleDetected { releases }) => {
                prop_assert_eq!(releases.len(), ring);
                prop_assert!(releases.iter().all(|r| r.starts_with("ring")));
            }
            other => prop_assert!(false, "expected cycle, got {:?}", other),
        }
    }
}
