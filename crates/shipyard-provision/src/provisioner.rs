//! Ledger-guarded check-or-create for storage objects.

use std::sync::Arc;

use tracing::{debug, info, warn};

use shipyard_cluster::ObjectStore;
use shipyard_core::PersistenceSpec;
use shipyard_executor::ExecutorHandle;
use shipyard_ledger::{Ledger, TaskGuard, TaskKind, TaskRecord, TaskStatus};

use crate::error::{ProvisionError, ProvisionResult};
use crate::kinds::{ClaimKind, StorageKind, VolumeKind};
use crate::suffix::{random_suffix, SuffixFn};

/// Upper bound on name candidates tried per object.
pub const MAX_NAME_ATTEMPTS: usize = 64;

pub struct Provisioner<K: StorageKind> {
    kind: K,
    store: Arc<dyn ObjectStore>,
    ledger: Arc<dyn Ledger>,
    suffix: SuffixFn,
}

impl<K: StorageKind> Provisioner<K> {
    pub fn new(kind: K, store: Arc<dyn ObjectStore>, ledger: Arc<dyn Ledger>) -> Self {
        Self {
            kind,
            store,
            ledger,
            suffix: Arc::new(random_suffix),
        }
    }

    pub fn with_suffix(mut self, suffix: SuffixFn) -> Self {
        self.suffix = suffix;
        self
    }

    /// Ensure the object for `spec` exists and return its cluster name.
    ///
    /// `spec.namespace` must already be resolved. A Succeeded ledger record
    /// short-circuits with its recorded name and no cluster calls. Name
    /// collisions are resolved by suffixing; probe and submit failures are
    /// recorded as Failed before they propagate.
    pub async fn check_or_create(&self, spec: &PersistenceSpec) -> ProvisionResult<String> {
        let capacity = spec.validate()?;
        let kind = K::TASK_KIND;
        let namespace = spec.namespace.as_str();

        if let Some(record) = self.ledger.get(namespace, kind, &spec.name)? {
            if record.status == TaskStatus::Succeeded {
                info!(%kind, name = %spec.name, ref_name = %record.ref_name, "already provisioned, skipping");
                return Ok(record.ref_name);
            }
            debug!(%kind, name = %spec.name, status = %record.status, "retrying unfinished task");
        }

        let desired = self.kind.desired_name(spec);
        let mut guard = TaskGuard::begin(
            self.ledger.as_ref(),
            TaskRecord::pending(namespace, kind, &spec.name).with_ref_name(&desired),
        )?;

        let ref_name = match self.free_name(namespace, &desired).await {
            Ok(name) => name,
            Err(e) => {
                guard.fail(e.to_string())?;
                return Err(e);
            }
        };
        guard.set_ref_name(&ref_name);

        let object = self.kind.build(spec, &capacity, &ref_name);
        if let Err(source) = self.kind.submit(self.store.as_ref(), namespace, &object).await {
            guard.fail(source.to_string())?;
            return Err(ProvisionError::Cluster {
                kind,
                name: spec.name.clone(),
                source,
            });
        }

        guard.succeed()?;
        info!(%kind, name = %spec.name, %ref_name, capacity = %capacity, "provisioned");
        Ok(ref_name)
    }

    async fn free_name(&self, namespace: &str, desired: &str) -> ProvisionResult<String> {
        let kind = K::TASK_KIND;
        let mut candidate = desired.to_string();
        for _ in 0..MAX_NAME_ATTEMPTS {
            let taken = self
                .kind
                .probe(self.store.as_ref(), namespace, &candidate)
                .await
                .map_err(|source| ProvisionError::Cluster {
                    kind,
                    name: desired.to_string(),
                    source,
                })?;
            if !taken {
                return Ok(candidate);
            }
            let next = format!("{desired}-{}", (self.suffix)());
            warn!(%kind, taken = %candidate, trying = %next, "name already in use");
            candidate = next;
        }
        Err(ProvisionError::NamesExhausted {
            kind,
            name: desired.to_string(),
            attempts: MAX_NAME_ATTEMPTS,
        })
    }
}

/// Cluster names finally used for one persistence spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceRefs {
    pub volume: String,
    pub claim: String,
}

/// Prepare the directory, then the volume, then the claim bound to it.
///
/// `spec.namespace` must already be resolved. The directory is skipped
/// when the volume is already recorded as provisioned, as is the case
/// for a resumed run.
pub async fn provision_persistence(
    spec: &PersistenceSpec,
    store: Arc<dyn ObjectStore>,
    ledger: Arc<dyn Ledger>,
    executor: Option<&ExecutorHandle>,
    suffix: Option<SuffixFn>,
) -> ProvisionResult<PersistenceRefs> {
    spec.validate()?;

    if let (Some(dir), Some(exec)) = (&spec.dir, executor) {
        if !ledger.succeeded(&spec.namespace, TaskKind::Volume, &spec.name)? {
            exec.make_dir(dir).await.map_err(|source| ProvisionError::Dir {
                name: spec.name.clone(),
                source,
            })?;
        }
    }

    let mut volumes = Provisioner::new(VolumeKind, Arc::clone(&store), Arc::clone(&ledger));
    if let Some(f) = &suffix {
        volumes = volumes.with_suffix(Arc::clone(f));
    }
    let volume = volumes.check_or_create(spec).await?;

    let mut claims = Provisioner::new(ClaimKind::bound_to(&volume), store, ledger);
    if let Some(f) = suffix {
        claims = claims.with_suffix(f);
    }
    let claim = claims.check_or_create(spec).await?;

    Ok(PersistenceRefs { volume, claim })
}
