//! Storage kinds the provisioner knows how to create.

use std::collections::BTreeMap;

use shipyard_cluster::{
    BoxFuture, ClaimObject, ClaimObjectSpec, ClusterResult, HostPathSource, NfsSource, ObjectMeta,
    ObjectStore, ResourceRequests, VolumeObject, VolumeObjectSpec,
};
use shipyard_core::{PersistenceSpec, Quantity, VolumeSource};
use shipyard_ledger::TaskKind;

/// Kind-specific half of check-or-create.
pub trait StorageKind: Send + Sync {
    type Object: Send + Sync;

    /// Ledger kind; keeps volume and claim records apart.
    const TASK_KIND: TaskKind;

    /// Name to try first, before any collision suffix.
    fn desired_name(&self, spec: &PersistenceSpec) -> String;

    /// Desired cluster object named `ref_name`.
    fn build(&self, spec: &PersistenceSpec, capacity: &Quantity, ref_name: &str) -> Self::Object;

    /// Whether an object named `name` already exists.
    fn probe<'a>(
        &'a self,
        store: &'a dyn ObjectStore,
        namespace: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, ClusterResult<bool>>;

    fn submit<'a>(
        &'a self,
        store: &'a dyn ObjectStore,
        namespace: &'a str,
        object: &'a Self::Object,
    ) -> BoxFuture<'a, ClusterResult<()>>;
}

fn access_modes(spec: &PersistenceSpec) -> Vec<String> {
    spec.effective_access_modes()
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn storage(capacity: &Quantity) -> BTreeMap<String, String> {
    BTreeMap::from([("storage".to_string(), capacity.as_str().to_string())])
}

// ── Volume ────────────────────────────────────────────────────────

/// Cluster-scoped persistent volume.
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeKind;

impl StorageKind for VolumeKind {
    type Object = VolumeObject;
    const TASK_KIND: TaskKind = TaskKind::Volume;

    fn desired_name(&self, spec: &PersistenceSpec) -> String {
        spec.ref_volume.clone().unwrap_or_else(|| spec.name.clone())
    }

    fn build(&self, spec: &PersistenceSpec, capacity: &Quantity, ref_name: &str) -> VolumeObject {
        let (host_path, nfs) = match &spec.source {
            Some(VolumeSource::HostPath { path }) => {
                (Some(HostPathSource { path: path.clone() }), None)
            }
            Some(VolumeSource::Nfs { server, path }) => (
                None,
                Some(NfsSource {
                    server: server.clone(),
                    path: path.clone(),
                }),
            ),
            None => (None, None),
        };
        VolumeObject::new(
            ObjectMeta {
                name: ref_name.to_string(),
                namespace: None,
                labels: spec.labels.clone(),
            },
            VolumeObjectSpec {
                access_modes: access_modes(spec),
                capacity: storage(capacity),
                storage_class_name: spec.storage_class.clone(),
                mount_options: spec.mount_options.clone(),
                host_path,
                nfs,
            },
        )
    }

    fn probe<'a>(
        &'a self,
        store: &'a dyn ObjectStore,
        _namespace: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, ClusterResult<bool>> {
        Box::pin(async move { Ok(store.get_volume(name).await?.is_some()) })
    }

    fn submit<'a>(
        &'a self,
        store: &'a dyn ObjectStore,
        _namespace: &'a str,
        object: &'a VolumeObject,
    ) -> BoxFuture<'a, ClusterResult<()>> {
        store.create_volume(object)
    }
}

// ── Claim ─────────────────────────────────────────────────────────

/// Namespaced claim bound to a specific volume.
#[derive(Debug, Clone, Default)]
pub struct ClaimKind {
    volume_ref: String,
}

impl ClaimKind {
    /// Claims built by this kind bind to the volume named `volume_ref`.
    pub fn bound_to(volume_ref: &str) -> Self {
        Self {
            volume_ref: volume_ref.to_string(),
        }
    }
}

impl StorageKind for ClaimKind {
    type Object = ClaimObject;
    const TASK_KIND: TaskKind = TaskKind::VolumeClaim;

    fn desired_name(&self, spec: &PersistenceSpec) -> String {
        spec.ref_claim.clone().unwrap_or_else(|| spec.name.clone())
    }

    fn build(&self, spec: &PersistenceSpec, capacity: &Quantity, ref_name: &str) -> ClaimObject {
        ClaimObject::new(
            ObjectMeta {
                name: ref_name.to_string(),
                namespace: Some(spec.namespace.clone()),
                labels: spec.labels.clone(),
            },
            ClaimObjectSpec {
                access_modes: access_modes(spec),
                resources: ResourceRequests {
                    requests: storage(capacity),
                },
                volume_name: Some(self.volume_ref.clone()),
                // Empty class binds statically instead of provisioning anew.
                storage_class_name: Some(spec.storage_class.clone().unwrap_or_default()),
            },
        )
    }

    fn probe<'a>(
        &'a self,
        store: &'a dyn ObjectStore,
        namespace: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, ClusterResult<bool>> {
        Box::pin(async move { Ok(store.get_claim(namespace, name).await?.is_some()) })
    }

    fn submit<'a>(
        &'a self,
        store: &'a dyn ObjectStore,
        namespace: &'a str,
        object: &'a ClaimObject,
    ) -> BoxFuture<'a, ClusterResult<()>> {
        store.create_claim(namespace, object)
    }
}
