//! Release dependency graph.
//!
//! Edge `A -> B` means B is a requirement of A and must be installed
//! first. Internally the graph keeps, for every release, the list of
//! releases that depend on it, which is the direction Kahn's algorithm
//! walks.

use std::collections::{BTreeSet, HashMap, VecDeque};

use tracing::debug;

use shipyard_core::config::duplicate_names;
use shipyard_core::Release;

use crate::error::{GraphError, GraphResult};
use crate::queue::InstallQueue;

#[derive(Debug, Clone)]
pub struct ReleaseGraph {
    /// Releases in declaration order; indices below refer to this vector.
    releases: Vec<Release>,
    /// For each release, the releases that require it.
    dependents: Vec<Vec<usize>>,
    /// Number of distinct requirements of each release.
    in_degree: Vec<usize>,
}

impl ReleaseGraph {
    /// Resolve requirements into edges.
    ///
    /// Fails on duplicate release names and on any requirement that does
    /// not name a release in the same set. Every unresolved requirement is
    /// reported, not just the first.
    pub fn build(releases: Vec<Release>) -> GraphResult<Self> {
        if let Some(dup) = duplicate_names(releases.iter().map(|r| r.name.as_str()))
            .into_iter()
            .next()
        {
            return Err(GraphError::DuplicateRelease(dup));
        }

        let index: HashMap<&str, usize> = releases
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.as_str(), i))
            .collect();

        let mut dependents = vec![Vec::new(); releases.len()];
        let mut in_degree = vec![0; releases.len()];
        let mut missing = Vec::new();

        for (i, release) in releases.iter().enumerate() {
            let mut seen = BTreeSet::new();
            for req in &release.requirements {
                match index.get(req.as_str()) {
                    Some(&dep) => {
                        // Repeated requirement names add a single edge.
                        if seen.insert(dep) {
                            dependents[dep].push(i);
                            in_degree[i] += 1;
                        }
                    }
                    None => missing.push((release.name.clone(), req.clone())),
                }
            }
        }

        if !missing.is_empty() {
            return Err(GraphError::MissingRequirements { missing });
        }

        debug!(releases = releases.len(), "release graph built");
        Ok(Self {
            releases,
            dependents,
            in_degree,
        })
    }

    pub fn len(&self) -> usize {
        self.releases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }

    pub fn releases(&self) -> &[Release] {
        &self.releases
    }

    /// Order releases so each appears after all of its requirements.
    ///
    /// Among releases that become ready at the same time, the one declared
    /// first is emitted first. If the ready set drains before every release
    /// is emitted, the rest form at least one cycle and no order is returned.
    pub fn topo_sort_by_kahn(&self) -> GraphResult<InstallQueue> {
        let mut in_degree = self.in_degree.clone();
        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();
        let mut order = VecDeque::with_capacity(self.releases.len());

        while let Some(next) = ready.pop_first() {
            order.push_back(self.releases[next].clone());
            for &dependent in &self.dependents[next] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() < self.releases.len() {
            let releases = in_degree
                .iter()
                .enumerate()
                .filter(|(_, d)| **d > 0)
                .map(|(i, _)| self.releases[i].name.clone())
                .collect();
            return Err(GraphError::CycleDetected { releases });
        }

        debug!(
            order = ?order.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            "install order resolved"
        );
        Ok(InstallQueue::new(order))
    }
}
