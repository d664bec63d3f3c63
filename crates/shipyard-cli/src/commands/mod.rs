pub mod init;
pub mod install;
pub mod status;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, ValueEnum};
use tracing::debug;

use shipyard_cluster::KubectlStore;
use shipyard_ledger::{ConfigMapLedger, DEFAULT_CONFIG_MAP, Ledger, LedgerStore};

pub const DEFAULT_LEDGER: &str = ".shipyard/ledger.redb";

/// Where task records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LedgerBackend {
    /// A config object in each install namespace, shared by every host.
    Cluster,
    /// A local database file.
    File,
}

/// Cluster access and ledger location, shared by every subcommand that
/// touches the ledger.
#[derive(Debug, Clone, Args)]
pub struct ClusterArgs {
    /// Kubeconfig context for kubectl and helm.
    #[arg(long)]
    pub kube_context: Option<String>,

    #[arg(long, value_enum, default_value = "cluster")]
    pub ledger_backend: LedgerBackend,

    /// Ledger file, used by the file backend.
    #[arg(long, default_value = DEFAULT_LEDGER)]
    pub ledger: PathBuf,

    /// Config object holding the records, used by the cluster backend.
    #[arg(long, default_value = DEFAULT_CONFIG_MAP)]
    pub ledger_config_map: String,
}

impl ClusterArgs {
    pub fn kubectl(&self) -> KubectlStore {
        match &self.kube_context {
            Some(context) => KubectlStore::new().with_context(context.clone()),
            None => KubectlStore::new(),
        }
    }

    /// Open the ledger for an install run. A dry run against a missing
    /// ledger file uses a scratch ledger so nothing is created on disk.
    pub fn open_for_run(&self, dry_run: bool) -> anyhow::Result<Arc<dyn Ledger>> {
        match self.ledger_backend {
            LedgerBackend::File if dry_run && !self.ledger.exists() => {
                debug!(path = %self.ledger.display(), "no ledger file, dry run uses a scratch ledger");
                Ok(Arc::new(LedgerStore::open_in_memory()?))
            }
            LedgerBackend::File => Ok(Arc::new(open_ledger(&self.ledger)?)),
            LedgerBackend::Cluster => Ok(self.cluster_ledger()),
        }
    }

    /// Open a ledger that must already hold records.
    pub fn open_existing(&self) -> anyhow::Result<Arc<dyn Ledger>> {
        match self.ledger_backend {
            LedgerBackend::File => {
                if !self.ledger.exists() {
                    bail!("no ledger at {}", self.ledger.display());
                }
                Ok(Arc::new(open_ledger(&self.ledger)?))
            }
            LedgerBackend::Cluster => Ok(self.cluster_ledger()),
        }
    }

    fn cluster_ledger(&self) -> Arc<dyn Ledger> {
        Arc::new(ConfigMapLedger::with_name(self.kubectl(), &self.ledger_config_map))
    }
}

/// Open the on-disk ledger, creating its directory on first use.
pub fn open_ledger(path: &Path) -> anyhow::Result<LedgerStore> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating ledger directory {}", parent.display()))?;
    }
    LedgerStore::open(path).with_context(|| format!("opening ledger {}", path.display()))
}

#[cfg(test)]
pub(crate) fn file_ledger(path: &Path) -> ClusterArgs {
    ClusterArgs {
        kube_context: None,
        ledger_backend: LedgerBackend::File,
        ledger: path.to_path_buf(),
        ledger_config_map: DEFAULT_CONFIG_MAP.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_run_without_ledger_file_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("ledger.redb");
        let ledger = file_ledger(&path).open_for_run(true).unwrap();
        assert!(ledger.list("ns").unwrap().is_empty());
        assert!(!path.exists());

        file_ledger(&path).open_for_run(false).unwrap();
        assert!(path.exists());
    }
}
