//! `ChartClient` backed by the `helm` binary.
//!
//! Values are staged in a scratch JSON file (valid YAML) and passed with
//! `-f`. The tool's output is forwarded to the log line by line.

use std::io::Write;
use std::path::PathBuf;

use tracing::{info, warn};

use shipyard_core::Values;

use crate::error::{ClusterError, ClusterResult};
use crate::models::{ChartArgs, ReleaseResult};
use crate::process::{command_line, run_tool};
use crate::{BoxFuture, ChartClient};

/// Helm has no "no limit" setting; ten years stands in for one.
const UNBOUNDED_TIMEOUT: &str = "87600h";

#[derive(Debug, Clone)]
pub struct HelmClient {
    binary: PathBuf,
    kube_context: Option<String>,
}

impl Default for HelmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HelmClient {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("helm"),
            kube_context: None,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.kube_context = Some(context.into());
        self
    }

    fn upgrade_args(&self, args: &ChartArgs, values_file: &str) -> Vec<String> {
        let mut out = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            args.release_name.clone(),
            args.chart_name.clone(),
            "--namespace".to_string(),
            args.namespace.clone(),
            "-f".to_string(),
            values_file.to_string(),
        ];
        if !args.repo_url.is_empty() {
            out.extend(["--repo".to_string(), args.repo_url.clone()]);
        }
        if !args.version.is_empty() {
            out.extend(["--version".to_string(), args.version.clone()]);
        }
        // Readiness is always awaited; an unbounded run only lifts the limit.
        let timeout = args
            .timeout
            .map(|t| format!("{}s", t.as_secs()))
            .unwrap_or_else(|| UNBOUNDED_TIMEOUT.to_string());
        out.extend(["--wait".to_string(), "--timeout".to_string(), timeout]);
        if let Some(ctx) = &self.kube_context {
            out.extend(["--kube-context".to_string(), ctx.clone()]);
        }
        out
    }
}

fn stage_values(values: &Values) -> ClusterResult<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("shipyard-values-")
        .suffix(".json")
        .tempfile()
        .map_err(ClusterError::Values)?;
    let body = serde_json::to_vec_pretty(values).map_err(|source| ClusterError::Decode {
        what: "values",
        source,
    })?;
    file.write_all(&body).map_err(ClusterError::Values)?;
    file.flush().map_err(ClusterError::Values)?;
    Ok(file)
}

/// Pull the revision number out of the tool's status block.
fn parse_revision(stdout: &str) -> Option<u32> {
    stdout.lines().find_map(|line| {
        line.trim()
            .strip_prefix("REVISION:")
            .and_then(|rest| rest.trim().parse().ok())
    })
}

impl ChartClient for HelmClient {
    fn upgrade<'a>(
        &'a self,
        args: &'a ChartArgs,
        values: &'a Values,
    ) -> BoxFuture<'a, ClusterResult<ReleaseResult>> {
        Box::pin(async move {
            // Removed when dropped at the end of the call.
            let values_file = stage_values(values)?;
            let argv = self.upgrade_args(args, &values_file.path().to_string_lossy());

            info!(
                release = %args.release_name,
                chart = %args.chart_name,
                version = %args.version,
                namespace = %args.namespace,
                "upgrading chart"
            );
            let out = run_tool(&self.binary, &argv, None).await?;
            for line in out.stdout.lines().filter(|l| !l.trim().is_empty()) {
                info!(release = %args.release_name, "{line}");
            }
            for line in out.stderr.lines().filter(|l| !l.trim().is_empty()) {
                warn!(release = %args.release_name, "{line}");
            }
            let out = out.check(&command_line(&self.binary, &argv))?;

            Ok(ReleaseResult {
                release_name: args.release_name.clone(),
                namespace: args.namespace.clone(),
                revision: parse_revision(&out.stdout),
            })
        })
    }
}
