//! Persisted task record shape.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// What kind of resource a record tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    Release,
    Volume,
    VolumeClaim,
    /// Background commands dispatched after a release installed.
    Background,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::Volume => "volume",
            Self::VolumeClaim => "volume-claim",
            Self::Background => "background",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a task. Succeeded and Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Durable state of one release, volume, or claim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRecord {
    pub namespace: String,
    /// Logical resource name.
    pub name: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    /// Actual cluster-object name; differs from `name` after a collision rename.
    pub ref_name: String,
    /// Failure cause, kept verbatim from the underlying error.
    #[serde(default)]
    pub reason: Option<String>,
    /// Digest of the values a release was installed with.
    #[serde(default)]
    pub digest: Option<String>,
    /// Unix timestamp (seconds) of the last write.
    #[serde(default)]
    pub updated_at: u64,
}

impl TaskRecord {
    /// A fresh pending record whose reference name equals its logical name.
    pub fn pending(namespace: &str, kind: TaskKind, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            kind,
            status: TaskStatus::Pending,
            ref_name: name.to_string(),
            reason: None,
            digest: None,
            updated_at: epoch_secs(),
        }
    }

    pub fn with_ref_name(mut self, ref_name: &str) -> Self {
        self.ref_name = ref_name.to_string();
        self
    }

    /// Build the composite key for the tasks table.
    pub fn table_key(&self) -> String {
        task_key(&self.namespace, self.kind, &self.name)
    }
}

/// Composite key shared by reads and writes.
pub fn task_key(namespace: &str, kind: TaskKind, name: &str) -> String {
    format!("{namespace}/{kind}/{name}")
}

pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
