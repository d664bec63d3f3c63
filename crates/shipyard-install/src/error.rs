//! Install error types.
//!
//! [`StepError`] is what a single phase of a release can fail with.
//! [`InstallError`] is what a run surfaces; release failures carry the
//! release name and the phase they failed in.

use std::time::Duration;

use thiserror::Error;

use shipyard_cluster::ClusterError;
use shipyard_core::ConfigError;
use shipyard_executor::ExecError;
use shipyard_graph::GraphError;
use shipyard_ledger::LedgerError;
use shipyard_provision::ProvisionError;

use crate::phase::Phase;
use crate::render::RenderError;

pub type InstallResult<T> = Result<T, InstallError>;

#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("dependency {dependency} not ready after {waited:?}")]
    DependencyTimeout { dependency: String, waited: Duration },
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("invalid install definition: {0}")]
    Config(#[from] ConfigError),

    #[error("unresolvable release graph: {0}")]
    Graph(#[from] GraphError),

    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("namespace {namespace} unavailable: {source}")]
    Namespace {
        namespace: String,
        #[source]
        source: ClusterError,
    },

    #[error("failed to start executor: {0}")]
    Executor(#[from] ExecError),

    #[error("release {release} failed during {phase}: {source}")]
    Release {
        release: String,
        phase: Phase,
        #[source]
        source: StepError,
    },

    #[error("background command for {release} failed: {source}")]
    Background {
        release: String,
        #[source]
        source: ExecError,
    },

    #[error("background task aborted abnormally: {0}")]
    TaskJoin(String),

    #[error("job cleanup in {namespace} failed: {source}")]
    Cleanup {
        namespace: String,
        #[source]
        source: ClusterError,
    },

    #[error("run report failed: {0}")]
    Report(String),
}

impl InstallError {
    /// Name of the release this error belongs to, if any.
    pub fn release(&self) -> Option<&str> {
        match self {
            Self::Release { release, .. } | Self::Background { release, .. } => Some(release),
            _ => None,
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::Release { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}
