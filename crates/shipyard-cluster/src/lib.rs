//! shipyard-cluster: the installer's view of the cluster.
//!
//! The orchestrator never talks to Kubernetes or Helm directly. It goes
//! through two seams:
//!
//! - **[`ObjectStore`]**: namespaces, volumes, claims, workload readiness,
//!   job cleanup
//! - **[`ChartClient`]**: the package manager's upgrade-or-install
//!
//! Production adapters shell out to `kubectl` ([`KubectlStore`]) and
//! `helm` ([`HelmClient`]). [`MemoryStore`] is an in-process object store
//! for tests and rehearsals.
//!
//! Both adapters also implement the ledger's `ConfigMapClient`, so task
//! records can live in the cluster next to the objects they describe.
//!
//! Probes distinguish "absent" from "could not tell": a missing object is
//! `Ok(None)`, anything else is an error the caller must not paper over.

pub mod error;
pub mod helm;
pub mod kubectl;
pub mod memory;
pub mod models;
mod process;

use std::future::Future;
use std::pin::Pin;

use shipyard_core::Values;

pub use error::{ClusterError, ClusterResult};
pub use helm::HelmClient;
pub use kubectl::KubectlStore;
pub use memory::MemoryStore;
pub use models::*;

/// Boxed future alias used by the object-safe cluster traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Cluster object operations the installer depends on.
pub trait ObjectStore: Send + Sync {
    /// Create `namespace` unless it exists. Returns true if it was created.
    fn ensure_namespace<'a>(&'a self, namespace: &'a str) -> BoxFuture<'a, ClusterResult<bool>>;

    /// Look up a cluster-scoped volume by name.
    fn get_volume<'a>(&'a self, name: &'a str) -> BoxFuture<'a, ClusterResult<Option<VolumeObject>>>;

    fn create_volume<'a>(&'a self, volume: &'a VolumeObject) -> BoxFuture<'a, ClusterResult<()>>;

    /// Look up a namespaced claim by name.
    fn get_claim<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, ClusterResult<Option<ClaimObject>>>;

    fn create_claim<'a>(
        &'a self,
        namespace: &'a str,
        claim: &'a ClaimObject,
    ) -> BoxFuture<'a, ClusterResult<()>>;

    /// Whether every pod of an installed release reports ready.
    fn release_ready<'a>(
        &'a self,
        namespace: &'a str,
        release_name: &'a str,
    ) -> BoxFuture<'a, ClusterResult<bool>>;

    /// Delete completed jobs left behind by hooks. Returns how many went.
    fn clean_jobs<'a>(&'a self, namespace: &'a str) -> BoxFuture<'a, ClusterResult<usize>>;
}

/// The package manager's upgrade-or-install operation.
pub trait ChartClient: Send + Sync {
    fn upgrade<'a>(
        &'a self,
        args: &'a ChartArgs,
        values: &'a Values,
    ) -> BoxFuture<'a, ClusterResult<ReleaseResult>>;
}
