use thiserror::Error;

use shipyard_cluster::ClusterError;
use shipyard_core::ConfigError;
use shipyard_executor::ExecError;
use shipyard_ledger::{LedgerError, TaskKind};

pub type ProvisionResult<T> = Result<T, ProvisionError>;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("invalid persistence spec: {0}")]
    Invalid(#[from] ConfigError),

    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("{kind} {name}: {source}")]
    Cluster {
        kind: TaskKind,
        name: String,
        #[source]
        source: ClusterError,
    },

    #[error("{kind} {name}: no free name after {attempts} attempts")]
    NamesExhausted {
        kind: TaskKind,
        name: String,
        attempts: usize,
    },

    #[error("directory for {name}: {source}")]
    Dir {
        name: String,
        #[source]
        source: ExecError,
    },
}
