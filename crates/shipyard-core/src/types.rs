//! Domain types for releases and their storage.
//!
//! These are loaded from the `[[release]]` entries of an install
//! definition and are immutable for the duration of a run.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::quantity::Quantity;

/// Finalized key/value document handed to the package manager.
pub type Values = serde_json::Map<String, serde_json::Value>;

// ── Release ───────────────────────────────────────────────────────

/// A named deployable unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Release {
    pub name: String,
    /// Chart reference inside the repository.
    pub chart: String,
    /// Chart repository; falls back to `[install].chart_repository`.
    #[serde(default)]
    pub repo_url: Option<String>,
    /// Chart version; falls back to the platform version.
    #[serde(default)]
    pub version: Option<String>,
    /// Target namespace; falls back to the run namespace.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Names of releases that must be installed before this one.
    #[serde(default)]
    pub requirements: Vec<String>,
    /// Commands run through the remote executor before the chart operation.
    #[serde(default)]
    pub pre_commands: Vec<String>,
    /// Commands run after the chart operation; the release is not done until they pass.
    #[serde(default)]
    pub post_commands: Vec<String>,
    /// Commands dispatched in the background once the release has succeeded.
    #[serde(default)]
    pub background_commands: Vec<String>,
    /// Volumes and claims provisioned before the pre-commands.
    #[serde(default)]
    pub persistence: Vec<PersistenceSpec>,
    /// Base values merged beneath the rendered values template.
    #[serde(default)]
    pub values: Values,
}

impl Release {
    /// Minimal release with no dependencies or commands.
    pub fn new(name: &str, chart: &str) -> Self {
        Self {
            name: name.to_string(),
            chart: chart.to_string(),
            repo_url: None,
            version: None,
            namespace: None,
            requirements: Vec::new(),
            pre_commands: Vec::new(),
            post_commands: Vec::new(),
            background_commands: Vec::new(),
            persistence: Vec::new(),
            values: Values::new(),
        }
    }

    /// Builder-style helper to declare requirements.
    pub fn requires(mut self, names: &[&str]) -> Self {
        self.requirements = names.iter().map(|n| n.to_string()).collect();
        self
    }
}

// ── Persistence ───────────────────────────────────────────────────

/// Volume access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    ReadWriteOnce,
    ReadOnlyMany,
    ReadWriteMany,
    ReadWriteOncePod,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ReadWriteOnce => "ReadWriteOnce",
            Self::ReadOnlyMany => "ReadOnlyMany",
            Self::ReadWriteMany => "ReadWriteMany",
            Self::ReadWriteOncePod => "ReadWriteOncePod",
        };
        f.write_str(s)
    }
}

/// Backing source for a provisioned volume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VolumeSource {
    HostPath { path: String },
    Nfs { server: String, path: String },
}

/// Directory the executor prepares before a volume is created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirSpec {
    pub path: String,
    /// Octal permission bits, e.g. `"0755"`.
    #[serde(default)]
    pub mode: Option<String>,
    /// Ownership as `uid:gid`.
    #[serde(default)]
    pub owner: Option<String>,
}

/// A desired volume and claim pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistenceSpec {
    /// Logical name; the ledger key and the default reference name.
    pub name: String,
    /// Size string such as `10Gi`.
    pub size: String,
    #[serde(default)]
    pub access_modes: Vec<AccessMode>,
    #[serde(default)]
    pub mount_options: Vec<String>,
    #[serde(default)]
    pub storage_class: Option<String>,
    /// Empty means "the run namespace".
    #[serde(default)]
    pub namespace: String,
    /// Volume name to request; defaults to `name`.
    #[serde(default)]
    pub ref_volume: Option<String>,
    /// Claim name to request; defaults to `name`.
    #[serde(default)]
    pub ref_claim: Option<String>,
    #[serde(default)]
    pub source: Option<VolumeSource>,
    #[serde(default)]
    pub dir: Option<DirSpec>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl PersistenceSpec {
    pub fn new(name: &str, size: &str) -> Self {
        Self {
            name: name.to_string(),
            size: size.to_string(),
            access_modes: Vec::new(),
            mount_options: Vec::new(),
            storage_class: None,
            namespace: String::new(),
            ref_volume: None,
            ref_claim: None,
            source: None,
            dir: None,
            labels: BTreeMap::new(),
        }
    }

    /// Copy of this spec with an empty namespace filled in.
    pub fn in_namespace(&self, namespace: &str) -> Self {
        let mut spec = self.clone();
        if spec.namespace.is_empty() {
            spec.namespace = namespace.to_string();
        }
        spec
    }

    /// Reject specs the cluster objects cannot express.
    ///
    /// Returns the parsed size so callers do not parse it twice.
    pub fn validate(&self) -> ConfigResult<Quantity> {
        if self.access_modes.len() > 1 {
            return Err(ConfigError::MultipleAccessModes {
                name: self.name.clone(),
                count: self.access_modes.len(),
            });
        }
        Quantity::parse(&self.size)
    }

    /// Access modes with the single-writer default applied.
    pub fn effective_access_modes(&self) -> Vec<AccessMode> {
        if self.access_modes.is_empty() {
            vec![AccessMode::ReadWriteOnce]
        } else {
            self.access_modes.clone()
        }
    }
}
