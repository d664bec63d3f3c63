//! `ObjectStore` backed by the `kubectl` binary.
//!
//! Objects are read with `get -o json` and created by piping a JSON
//! manifest into `create -f -`. A `NotFound` on stderr is the only
//! failure mapped to "absent".

use std::future::Future;
use std::path::PathBuf;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use shipyard_ledger::{ConfigData, ConfigMapClient, LedgerError, LedgerResult};

use crate::error::{ClusterError, ClusterResult};
use crate::models::{ClaimObject, ConfigMapObject, VolumeObject};
use crate::process::{command_line, run_tool, run_tool_blocking};
use crate::{BoxFuture, ObjectStore};

/// Field manager recorded for server-side applies.
const FIELD_MANAGER: &str = "shipyard";

/// Label the chart tooling stamps on every pod of a release.
pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";

#[derive(Debug, Clone)]
pub struct KubectlStore {
    binary: PathBuf,
    context: Option<String>,
    instance_label: String,
}

impl Default for KubectlStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KubectlStore {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("kubectl"),
            context: None,
            instance_label: INSTANCE_LABEL.to_string(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Pin every call to a kubeconfig context.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_instance_label(mut self, label: impl Into<String>) -> Self {
        self.instance_label = label.into();
        self
    }

    fn args(&self, rest: &[&str]) -> Vec<String> {
        let mut args = Vec::with_capacity(rest.len() + 2);
        if let Some(ctx) = &self.context {
            args.push("--context".to_string());
            args.push(ctx.clone());
        }
        args.extend(rest.iter().map(|s| s.to_string()));
        args
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        rest: &[&str],
        what: &'static str,
    ) -> ClusterResult<Option<T>> {
        let args = self.args(rest);
        let out = run_tool(&self.binary, &args, None).await?;
        if !out.success && is_not_found(&out.stderr) {
            return Ok(None);
        }
        let out = out.check(&command_line(&self.binary, &args))?;
        let value = serde_json::from_str(&out.stdout)
            .map_err(|source| ClusterError::Decode { what, source })?;
        Ok(Some(value))
    }

    async fn create(&self, manifest: Vec<u8>, namespace: Option<&str>) -> ClusterResult<()> {
        let mut rest = vec!["create", "-f", "-"];
        if let Some(ns) = namespace {
            rest.extend(["--namespace", ns]);
        }
        let args = self.args(&rest);
        run_tool(&self.binary, &args, Some(&manifest))
            .await?
            .check(&command_line(&self.binary, &args))?;
        Ok(())
    }

    fn read_config_map_blocking(
        &self,
        namespace: &str,
        name: &str,
    ) -> ClusterResult<Option<ConfigMapObject>> {
        let args = self.args(&["get", "configmap", name, "--namespace", namespace, "-o", "json"]);
        let out = run_tool_blocking(&self.binary, &args, None)?;
        if !out.success && is_not_found(&out.stderr) {
            return Ok(None);
        }
        let out = out.check(&command_line(&self.binary, &args))?;
        let object = serde_json::from_str(&out.stdout).map_err(|source| ClusterError::Decode {
            what: "config map",
            source,
        })?;
        Ok(Some(object))
    }

    /// Server-side apply keeps no last-applied copy, so the object can
    /// use its full size budget, and keys dropped from `data` are removed.
    fn apply_config_map_blocking(&self, object: &ConfigMapObject) -> ClusterResult<()> {
        let manifest = encode(object)?;
        let args = self.args(&[
            "apply",
            "--server-side",
            "--force-conflicts",
            "--field-manager",
            FIELD_MANAGER,
            "-f",
            "-",
        ]);
        run_tool_blocking(&self.binary, &args, Some(&manifest))?
            .check(&command_line(&self.binary, &args))?;
        Ok(())
    }

    fn boxed<'a, T, F>(fut: F) -> BoxFuture<'a, T>
    where
        F: Future<Output = T> + Send + 'a,
    {
        Box::pin(fut)
    }
}

/// Only the API server's own NotFound status means "absent". Client-side
/// failures that happen to say "not found" (missing auth plugin, unknown
/// context) are real errors.
fn is_not_found(stderr: &str) -> bool {
    stderr.contains("Error from server (NotFound)")
}

/// Another writer created the object between our lookup and create.
fn is_already_exists(stderr: &str) -> bool {
    stderr.contains("Error from server (AlreadyExists)")
}

fn encode<T: serde::Serialize>(value: &T) -> ClusterResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|source| ClusterError::Decode {
        what: "manifest",
        source,
    })
}

impl ObjectStore for KubectlStore {
    fn ensure_namespace<'a>(&'a self, namespace: &'a str) -> BoxFuture<'a, ClusterResult<bool>> {
        Self::boxed(async move {
            let existing: Option<serde_json::Value> = self
                .get_json(&["get", "namespace", namespace, "-o", "json"], "namespace")
                .await?;
            if existing.is_some() {
                debug!(%namespace, "namespace exists");
                return Ok(false);
            }
            let args = self.args(&["create", "namespace", namespace]);
            let out = run_tool(&self.binary, &args, None).await?;
            if !out.success && is_already_exists(&out.stderr) {
                return Ok(false);
            }
            out.check(&command_line(&self.binary, &args))?;
            info!(%namespace, "namespace created");
            Ok(true)
        })
    }

    fn get_volume<'a>(&'a self, name: &'a str) -> BoxFuture<'a, ClusterResult<Option<VolumeObject>>> {
        Self::boxed(async move {
            self.get_json(&["get", "pv", name, "-o", "json"], "volume")
                .await
        })
    }

    fn create_volume<'a>(&'a self, volume: &'a VolumeObject) -> BoxFuture<'a, ClusterResult<()>> {
        Self::boxed(async move {
            self.create(encode(volume)?, None).await?;
            info!(volume = %volume.name(), "volume created");
            Ok(())
        })
    }

    fn get_claim<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, ClusterResult<Option<ClaimObject>>> {
        Self::boxed(async move {
            self.get_json(
                &["get", "pvc", name, "--namespace", namespace, "-o", "json"],
                "claim",
            )
            .await
        })
    }

    fn create_claim<'a>(
        &'a self,
        namespace: &'a str,
        claim: &'a ClaimObject,
    ) -> BoxFuture<'a, ClusterResult<()>> {
        Self::boxed(async move {
            self.create(encode(claim)?, Some(namespace)).await?;
            info!(claim = %claim.name(), %namespace, "claim created");
            Ok(())
        })
    }

    fn release_ready<'a>(
        &'a self,
        namespace: &'a str,
        release_name: &'a str,
    ) -> BoxFuture<'a, ClusterResult<bool>> {
        Self::boxed(async move {
            let selector = format!("{}={}", self.instance_label, release_name);
            let pods: Option<PodList> = self
                .get_json(
                    &["get", "pods", "--namespace", namespace, "-l", selector.as_str(), "-o", "json"],
                    "pod list",
                )
                .await?;
            let ready = pods.is_some_and(|p| p.all_ready());
            debug!(release = %release_name, %namespace, ready, "readiness probed");
            Ok(ready)
        })
    }

    fn clean_jobs<'a>(&'a self, namespace: &'a str) -> BoxFuture<'a, ClusterResult<usize>> {
        Self::boxed(async move {
            let jobs: Option<JobList> = self
                .get_json(&["get", "jobs", "--namespace", namespace, "-o", "json"], "job list")
                .await?;
            let names = jobs.map(|j| j.completed()).unwrap_or_default();
            for name in &names {
                let args = self.args(&["delete", "job", name.as_str(), "--namespace", namespace]);
                run_tool(&self.binary, &args, None)
                    .await?
                    .check(&command_line(&self.binary, &args))?;
                debug!(job = %name, %namespace, "completed job deleted");
            }
            info!(%namespace, deleted = names.len(), "completed jobs cleaned");
            Ok(names.len())
        })
    }
}

impl ConfigMapClient for KubectlStore {
    fn read_config_map(&self, namespace: &str, name: &str) -> LedgerResult<Option<ConfigData>> {
        self.read_config_map_blocking(namespace, name)
            .map(|object| object.map(|o| o.data))
            .map_err(|e| LedgerError::Read(e.to_string()))
    }

    fn write_config_map(&self, namespace: &str, name: &str, data: &ConfigData) -> LedgerResult<()> {
        self.apply_config_map_blocking(&ConfigMapObject::new(namespace, name, data.clone()))
            .map_err(|e| LedgerError::Write(e.to_string()))
    }
}

// ── Response shapes ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodStatus {
    #[serde(default)]
    phase: String,
    #[serde(default)]
    container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Deserialize)]
struct ContainerStatus {
    #[serde(default)]
    ready: bool,
}

impl PodList {
    /// At least one pod, and every pod either finished or running with
    /// all containers ready.
    fn all_ready(&self) -> bool {
        !self.items.is_empty()
            && self.items.iter().all(|pod| match pod.status.phase.as_str() {
                "Succeeded" => true,
                "Running" => {
                    !pod.status.container_statuses.is_empty()
                        && pod.status.container_statuses.iter().all(|c| c.ready)
                }
                _ => false,
            })
    }
}

#[derive(Debug, Deserialize)]
struct JobList {
    #[serde(default)]
    items: Vec<Job>,
}

#[derive(Debug, Deserialize)]
struct Job {
    metadata: crate::models::ObjectMeta,
    #[serde(default)]
    status: JobStatus,
}

#[derive(Debug, Default, Deserialize)]
struct JobStatus {
    #[serde(default)]
    succeeded: u32,
}

impl JobList {
    fn completed(self) -> Vec<String> {
        self.items
            .into_iter()
            .filter(|j| j.status.succeeded > 0)
            .map(|j| j.metadata.name)
            .collect()
    }
}
