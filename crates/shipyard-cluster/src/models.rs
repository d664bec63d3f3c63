//! Typed manifests and results exchanged with the cluster.
//!
//! Only the fields the installer reads or writes are modelled. Manifests
//! serialize in the API server's camelCase shape so adapters can submit
//! them verbatim.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const VOLUME_KIND: &str = "PersistentVolume";
pub const CLAIM_KIND: &str = "PersistentVolumeClaim";
pub const CONFIG_MAP_KIND: &str = "ConfigMap";

/// Label marking objects this installer owns.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

// ── Config object ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapObject {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl ConfigMapObject {
    pub fn new(namespace: &str, name: &str, data: BTreeMap<String, String>) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(MANAGED_BY_LABEL.to_string(), "shipyard".to_string());
        Self {
            api_version: "v1".to_string(),
            kind: CONFIG_MAP_KIND.to_string(),
            metadata: ObjectMeta {
                name: name.to_string(),
                namespace: Some(namespace.to_string()),
                labels,
            },
            data,
        }
    }
}

// ── Volume ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeObject {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: VolumeObjectSpec,
}

impl VolumeObject {
    pub fn new(metadata: ObjectMeta, spec: VolumeObjectSpec) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: VOLUME_KIND.to_string(),
            metadata,
            spec,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeObjectSpec {
    #[serde(default)]
    pub access_modes: Vec<String>,
    /// Always carries a `storage` entry.
    #[serde(default)]
    pub capacity: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mount_options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_path: Option<HostPathSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nfs: Option<NfsSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPathSource {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NfsSource {
    pub server: String,
    pub path: String,
}

// ── Claim ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimObject {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: ClaimObjectSpec,
}

impl ClaimObject {
    pub fn new(metadata: ObjectMeta, spec: ClaimObjectSpec) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: CLAIM_KIND.to_string(),
            metadata,
            spec,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimObjectSpec {
    #[serde(default)]
    pub access_modes: Vec<String>,
    #[serde(default)]
    pub resources: ResourceRequests,
    /// Volume this claim binds to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_name: Option<String>,
    /// `Some("")` opts out of dynamic provisioning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceRequests {
    #[serde(default)]
    pub requests: BTreeMap<String, String>,
}

// ── Charts ────────────────────────────────────────────────────────

/// Arguments for one upgrade-or-install call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartArgs {
    pub repo_url: String,
    pub namespace: String,
    /// Cluster-side release name, prefix applied.
    pub release_name: String,
    pub chart_name: String,
    pub version: String,
    /// Readiness wait handed to the package manager; `None` disables it.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseResult {
    pub release_name: String,
    pub namespace: String,
    pub revision: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_manifest_shape() {
        let mut spec = VolumeObjectSpec {
            access_modes: vec!["ReadWriteOnce".to_string()],
            host_path: Some(HostPathSource {
                path: "/data/pg".to_string(),
            }),
            ..Default::default()
        };
        spec.capacity.insert("storage".to_string(), "10Gi".to_string());
        let vol = VolumeObject::new(
            ObjectMeta {
                name: "pg-data".to_string(),
                ..Default::default()
            },
            spec,
        );

        let json = serde_json::to_value(&vol).unwrap();
        assert_eq!(json["apiVersion"], "v1");
        assert_eq!(json["kind"], "PersistentVolume");
        assert_eq!(json["spec"]["accessModes"][0], "ReadWriteOnce");
        assert_eq!(json["spec"]["capacity"]["storage"], "10Gi");
        assert_eq!(json["spec"]["hostPath"]["path"], "/data/pg");
        assert!(json["spec"].get("nfs").is_none());
        assert!(json["metadata"].get("namespace").is_none());
    }

    #[test]
    fn claim_keeps_empty_storage_class() {
        let claim = ClaimObject::new(
            ObjectMeta {
                name: "pg-data".to_string(),
                namespace: Some("platform".to_string()),
                ..Default::default()
            },
            ClaimObjectSpec {
                volume_name: Some("pg-data-x1y2z".to_string()),
                storage_class_name: Some(String::new()),
                ..Default::default()
            },
        );
        let json = serde_json::to_value(&claim).unwrap();
        assert_eq!(json["spec"]["volumeName"], "pg-data-x1y2z");
        assert_eq!(json["spec"]["storageClassName"], "");
        assert_eq!(json["metadata"]["namespace"], "platform");
    }

    #[test]
    fn decodes_server_response_with_extra_fields() {
        let raw = r#"{
            "apiVersion": "v1",
            "kind": "PersistentVolume",
            "metadata": {"name": "data", "uid": "123", "resourceVersion": "9"},
            "spec": {"accessModes": ["ReadWriteMany"], "capacity": {"storage": "1Gi"}},
            "status": {"phase": "Bound"}
        }"#;
        let vol: VolumeObject = serde_json::from_str(raw).unwrap();
        assert_eq!(vol.name(), "data");
        assert_eq!(vol.spec.access_modes, vec!["ReadWriteMany"]);
    }
}
