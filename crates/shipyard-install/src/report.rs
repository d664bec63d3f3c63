//! Run reports and where they go.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{info, warn};

use crate::BoxFuture;
use crate::error::{InstallError, InstallResult};
use crate::phase::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Installed,
    Skipped,
    Failed,
    /// Dry run: would be installed.
    Planned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseOutcome {
    pub name: String,
    /// Cluster-side name, prefix applied.
    pub release_name: String,
    pub namespace: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Summary of one install run.
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub name: String,
    pub namespace: String,
    pub version: String,
    pub dry_run: bool,
    pub started_at: u64,
    pub finished_at: u64,
    /// In install order; releases after a failure are absent.
    pub releases: Vec<ReleaseOutcome>,
    pub background_tasks: usize,
    pub jobs_cleaned: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InstallReport {
    pub fn new(name: &str, namespace: &str, version: &str, dry_run: bool) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            version: version.to_string(),
            dry_run,
            started_at: epoch_secs(),
            finished_at: 0,
            releases: Vec::new(),
            background_tasks: 0,
            jobs_cleaned: 0,
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Names of releases with the given status, in install order.
    pub fn with_status(&self, status: OutcomeStatus) -> Vec<&str> {
        self.releases
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.name.as_str())
            .collect()
    }

    pub(crate) fn finish(&mut self, error: Option<&InstallError>) {
        self.finished_at = epoch_secs();
        self.error = error.map(ToString::to_string);
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Receives the report at the end of every run, failed ones included.
pub trait RunReporter: Send + Sync {
    fn report<'a>(&'a self, report: &'a InstallReport) -> BoxFuture<'a, InstallResult<()>>;
}

/// Writes the summary to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl RunReporter for LogReporter {
    fn report<'a>(&'a self, report: &'a InstallReport) -> BoxFuture<'a, InstallResult<()>> {
        Box::pin(async move {
            let installed = report.with_status(OutcomeStatus::Installed);
            let skipped = report.with_status(OutcomeStatus::Skipped);
            let elapsed = report.finished_at.saturating_sub(report.started_at);
            match &report.error {
                None => info!(
                    install = %report.name,
                    namespace = %report.namespace,
                    ?installed,
                    ?skipped,
                    background = report.background_tasks,
                    jobs_cleaned = report.jobs_cleaned,
                    elapsed_secs = elapsed,
                    "install run finished"
                ),
                Some(error) => warn!(
                    install = %report.name,
                    namespace = %report.namespace,
                    ?installed,
                    ?skipped,
                    %error,
                    elapsed_secs = elapsed,
                    "install run failed"
                ),
            }
            Ok(())
        })
    }
}

/// Writes the report as pretty JSON to a file, replacing it.
#[derive(Debug, Clone)]
pub struct JsonFileReporter {
    path: PathBuf,
}

impl JsonFileReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RunReporter for JsonFileReporter {
    fn report<'a>(&'a self, report: &'a InstallReport) -> BoxFuture<'a, InstallResult<()>> {
        Box::pin(async move {
            let body = serde_json::to_vec_pretty(report)
                .map_err(|e| InstallError::Report(e.to_string()))?;
            tokio::fs::write(&self.path, body)
                .await
                .map_err(|e| InstallError::Report(format!("{}: {e}", self.path.display())))?;
            info!(path = %self.path.display(), "run report written");
            Ok(())
        })
    }
}

/// Fans a report out to several reporters; all run, the first error wins.
#[derive(Default)]
pub struct Reporters(pub Vec<std::sync::Arc<dyn RunReporter>>);

impl RunReporter for Reporters {
    fn report<'a>(&'a self, report: &'a InstallReport) -> BoxFuture<'a, InstallResult<()>> {
        Box::pin(async move {
            let mut first = None;
            for reporter in &self.0 {
                if let Err(e) = reporter.report(report).await {
                    warn!(error = %e, "reporter failed");
                    first.get_or_insert(e);
                }
            }
            first.map_or(Ok(()), Err)
        })
    }
}
