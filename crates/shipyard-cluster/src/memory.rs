//! In-process `ObjectStore` for tests and rehearsal runs.
//!
//! Objects live in maps behind a mutex. Failure knobs let callers drive
//! the error paths of the provisioner and orchestrator.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use shipyard_ledger::{ConfigData, ConfigMapClient, LedgerError, LedgerResult};
use tracing::debug;

use crate::error::{ClusterError, ClusterResult};
use crate::models::{ClaimObject, VolumeObject};
use crate::{BoxFuture, ObjectStore};

#[derive(Default)]
struct State {
    namespaces: BTreeSet<String>,
    created_namespaces: Vec<String>,
    namespace_error: Option<String>,
    config_maps: BTreeMap<(String, String), ConfigData>,
    volumes: BTreeMap<String, VolumeObject>,
    claims: BTreeMap<(String, String), ClaimObject>,
    readiness: BTreeMap<(String, String), bool>,
    never_ready: bool,
    completed_jobs: BTreeMap<String, usize>,
    create_error: Option<String>,
    probe_error: Option<String>,
    writes: usize,
    lookups: usize,
    ready_probes: usize,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed an existing namespace.
    pub fn insert_namespace(&self, namespace: &str) {
        self.lock().namespaces.insert(namespace.to_string());
    }

    pub fn namespaces(&self) -> BTreeSet<String> {
        self.lock().namespaces.clone()
    }

    /// Namespaces the store created, in order.
    pub fn created_namespaces(&self) -> Vec<String> {
        self.lock().created_namespaces.clone()
    }

    /// Make every subsequent namespace check fail with `message`.
    pub fn fail_namespaces(&self, message: &str) {
        self.lock().namespace_error = Some(message.to_string());
    }

    /// Seed an existing volume, as if created outside the installer.
    pub fn insert_volume(&self, volume: VolumeObject) {
        self.lock().volumes.insert(volume.name().to_string(), volume);
    }

    pub fn insert_claim(&self, namespace: &str, claim: ClaimObject) {
        self.lock()
            .claims
            .insert((namespace.to_string(), claim.name().to_string()), claim);
    }

    /// Override readiness for one release. Unlisted releases are ready
    /// unless [`MemoryStore::never_ready`] was set.
    pub fn set_ready(&self, namespace: &str, release_name: &str, ready: bool) {
        self.lock()
            .readiness
            .insert((namespace.to_string(), release_name.to_string()), ready);
    }

    pub fn never_ready(&self) {
        self.lock().never_ready = true;
    }

    pub fn add_completed_jobs(&self, namespace: &str, count: usize) {
        *self
            .lock()
            .completed_jobs
            .entry(namespace.to_string())
            .or_default() += count;
    }

    /// Make every subsequent create fail with `message`.
    pub fn fail_creates(&self, message: &str) {
        self.lock().create_error = Some(message.to_string());
    }

    /// Make every subsequent volume or claim probe fail with `message`.
    pub fn fail_probes(&self, message: &str) {
        self.lock().probe_error = Some(message.to_string());
    }

    pub fn volume_names(&self) -> BTreeSet<String> {
        self.lock().volumes.keys().cloned().collect()
    }

    pub fn claim(&self, namespace: &str, name: &str) -> Option<ClaimObject> {
        self.lock()
            .claims
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn volume(&self, name: &str) -> Option<VolumeObject> {
        self.lock().volumes.get(name).cloned()
    }

    /// Number of create calls that reached the store, failed ones included.
    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    /// Number of volume and claim probes, failed ones included.
    pub fn lookups(&self) -> usize {
        self.lock().lookups
    }

    pub fn ready_probes(&self) -> usize {
        self.lock().ready_probes
    }

    pub fn completed_jobs(&self, namespace: &str) -> usize {
        self.lock()
            .completed_jobs
            .get(namespace)
            .copied()
            .unwrap_or(0)
    }

    fn check_probe(state: &mut State) -> ClusterResult<()> {
        state.lookups += 1;
        match &state.probe_error {
            Some(msg) => Err(ClusterError::Rejected(msg.clone())),
            None => Ok(()),
        }
    }

    fn check_create(state: &mut State) -> ClusterResult<()> {
        state.writes += 1;
        match &state.create_error {
            Some(msg) => Err(ClusterError::Rejected(msg.clone())),
            None => Ok(()),
        }
    }
}

impl ObjectStore for MemoryStore {
    fn ensure_namespace<'a>(&'a self, namespace: &'a str) -> BoxFuture<'a, ClusterResult<bool>> {
        let result = {
            let mut state = self.lock();
            match &state.namespace_error {
                Some(msg) => Err(ClusterError::Rejected(msg.clone())),
                None => {
                    let created = state.namespaces.insert(namespace.to_string());
                    if created {
                        state.created_namespaces.push(namespace.to_string());
                    }
                    Ok(created)
                }
            }
        };
        debug!(%namespace, ok = result.is_ok(), "memory store ensure namespace");
        Box::pin(async move { result })
    }

    fn get_volume<'a>(&'a self, name: &'a str) -> BoxFuture<'a, ClusterResult<Option<VolumeObject>>> {
        let result = {
            let mut state = self.lock();
            Self::check_probe(&mut state).map(|()| state.volumes.get(name).cloned())
        };
        Box::pin(async move { result })
    }

    fn create_volume<'a>(&'a self, volume: &'a VolumeObject) -> BoxFuture<'a, ClusterResult<()>> {
        let result = {
            let mut state = self.lock();
            Self::check_create(&mut state).and_then(|()| {
                if state.volumes.contains_key(volume.name()) {
                    return Err(ClusterError::Rejected(format!(
                        "volume {} already exists",
                        volume.name()
                    )));
                }
                state
                    .volumes
                    .insert(volume.name().to_string(), volume.clone());
                Ok(())
            })
        };
        debug!(volume = %volume.name(), ok = result.is_ok(), "memory store create volume");
        Box::pin(async move { result })
    }

    fn get_claim<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, ClusterResult<Option<ClaimObject>>> {
        let result = {
            let mut state = self.lock();
            Self::check_probe(&mut state).map(|()| {
                state
                    .claims
                    .get(&(namespace.to_string(), name.to_string()))
                    .cloned()
            })
        };
        Box::pin(async move { result })
    }

    fn create_claim<'a>(
        &'a self,
        namespace: &'a str,
        claim: &'a ClaimObject,
    ) -> BoxFuture<'a, ClusterResult<()>> {
        let result = {
            let mut state = self.lock();
            Self::check_create(&mut state).and_then(|()| {
                let key = (namespace.to_string(), claim.name().to_string());
                if state.claims.contains_key(&key) {
                    return Err(ClusterError::Rejected(format!(
                        "claim {} already exists",
                        claim.name()
                    )));
                }
                state.claims.insert(key, claim.clone());
                Ok(())
            })
        };
        debug!(claim = %claim.name(), %namespace, ok = result.is_ok(), "memory store create claim");
        Box::pin(async move { result })
    }

    fn release_ready<'a>(
        &'a self,
        namespace: &'a str,
        release_name: &'a str,
    ) -> BoxFuture<'a, ClusterResult<bool>> {
        let ready = {
            let mut state = self.lock();
            state.ready_probes += 1;
            state
                .readiness
                .get(&(namespace.to_string(), release_name.to_string()))
                .copied()
                .unwrap_or(!state.never_ready)
        };
        Box::pin(async move { Ok(ready) })
    }

    fn clean_jobs<'a>(&'a self, namespace: &'a str) -> BoxFuture<'a, ClusterResult<usize>> {
        let removed = self.lock().completed_jobs.remove(namespace).unwrap_or(0);
        Box::pin(async move { Ok(removed) })
    }
}

impl ConfigMapClient for MemoryStore {
    fn read_config_map(&self, namespace: &str, name: &str) -> LedgerResult<Option<ConfigData>> {
        let state = self.lock();
        if let Some(msg) = &state.probe_error {
            return Err(LedgerError::Read(msg.clone()));
        }
        Ok(state
            .config_maps
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    fn write_config_map(&self, namespace: &str, name: &str, data: &ConfigData) -> LedgerResult<()> {
        let mut state = self.lock();
        if let Some(msg) = &state.create_error {
            return Err(LedgerError::Write(msg.clone()));
        }
        state
            .config_maps
            .insert((namespace.to_string(), name.to_string()), data.clone());
        Ok(())
    }
}
