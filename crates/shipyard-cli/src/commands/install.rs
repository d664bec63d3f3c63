use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use tracing::info;

use shipyard_cluster::HelmClient;
use shipyard_core::{InstallDefinition, RunContext, UserConfig};
use shipyard_executor::{AgentLauncher, HttpLauncher, LocalLauncher};
use shipyard_install::{
    DirValuesSource, Installer, JsonFileReporter, LogReporter, NoTemplates, OutcomeStatus,
    Reporters, RunReporter, ValuesSource,
};

use super::ClusterArgs;

#[derive(Debug, Args)]
pub struct InstallArgs {
    /// Install definition (TOML).
    #[arg(short, long, default_value = "install.toml")]
    pub definition: PathBuf,

    /// User configuration with namespace, prefix, values, and overrides.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Prefix joined onto every release name.
    #[arg(long)]
    pub prefix: Option<String>,

    /// Platform version used for releases that pin none.
    #[arg(long = "platform-version")]
    pub platform_version: Option<String>,

    /// Directory holding one `<release>.toml` values template per release.
    #[arg(long)]
    pub values_dir: Option<PathBuf>,

    /// Wait forever for dependencies and charts.
    #[arg(long)]
    pub no_timeout: bool,

    /// Dependency readiness budget in seconds.
    #[arg(long, default_value = "900")]
    pub dependency_timeout: u64,

    /// Chart readiness budget in seconds.
    #[arg(long, default_value = "600")]
    pub chart_timeout: u64,

    /// Resolve and render only.
    #[arg(long)]
    pub dry_run: bool,

    /// Run commands through the helper at this address instead of locally.
    #[arg(long)]
    pub agent_url: Option<String>,

    /// Per-release override, `release:dotted.key=value`. Repeatable.
    #[arg(long)]
    pub set: Vec<String>,

    /// Also write the run report as JSON to this path.
    #[arg(long)]
    pub report: Option<PathBuf>,

    #[command(flatten)]
    pub cluster: ClusterArgs,
}

/// Layer flags over the user config over the definition.
pub fn resolve_context(
    args: &InstallArgs,
    def: &InstallDefinition,
    mut user: UserConfig,
) -> anyhow::Result<RunContext> {
    for assignment in &args.set {
        user.set_override(assignment)
            .with_context(|| format!("invalid --set {assignment:?}"))?;
    }

    let namespace = args
        .namespace
        .clone()
        .or_else(|| user.namespace.clone())
        .or_else(|| def.install.namespace.clone())
        .unwrap_or_else(|| "default".to_string());
    let version = args
        .platform_version
        .clone()
        .or_else(|| user.version.clone())
        .or_else(|| def.install.version.clone())
        .unwrap_or_default();

    let mut ctx = RunContext::new(&namespace, &version);
    ctx.prefix = args
        .prefix
        .clone()
        .or_else(|| user.prefix.clone())
        .unwrap_or_default();
    ctx.timeouts = !args.no_timeout;
    ctx.wait.timeout = Duration::from_secs(args.dependency_timeout);
    ctx.chart_timeout = Duration::from_secs(args.chart_timeout);
    ctx.dry_run = args.dry_run;
    ctx.user = user;
    Ok(ctx)
}

pub async fn run(args: InstallArgs) -> anyhow::Result<()> {
    let def = InstallDefinition::from_file(&args.definition)
        .with_context(|| format!("loading {}", args.definition.display()))?;
    let user = match &args.config {
        Some(path) => UserConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => UserConfig::default(),
    };
    let ctx = resolve_context(&args, &def, user)?;

    let ledger = args.cluster.open_for_run(ctx.dry_run)?;
    let kubectl = args.cluster.kubectl();
    let helm = match &args.cluster.kube_context {
        Some(context) => HelmClient::new().with_context(context.clone()),
        None => HelmClient::new(),
    };

    let launcher: Arc<dyn AgentLauncher> = match &args.agent_url {
        Some(url) => Arc::new(HttpLauncher::new(url)),
        None => Arc::new(LocalLauncher::new()),
    };
    let values: Arc<dyn ValuesSource> = match &args.values_dir {
        Some(dir) => Arc::new(DirValuesSource::new(dir)),
        None => Arc::new(NoTemplates),
    };
    let mut reporters: Vec<Arc<dyn RunReporter>> = vec![Arc::new(LogReporter)];
    if let Some(path) = &args.report {
        reporters.push(Arc::new(JsonFileReporter::new(path)));
    }

    info!(
        install = %def.install.name,
        namespace = %ctx.namespace,
        prefix = %ctx.prefix,
        version = %ctx.version,
        ledger = ?args.cluster.ledger_backend,
        "starting install"
    );
    let report = Installer::new(ledger, Arc::new(kubectl), Arc::new(helm), launcher)
        .with_values(values)
        .with_reporter(Arc::new(Reporters(reporters)))
        .run(&ctx, &def)
        .await?;

    for outcome in &report.releases {
        let mark = match outcome.status {
            OutcomeStatus::Installed => "✓ installed",
            OutcomeStatus::Skipped => "- skipped  ",
            OutcomeStatus::Planned => "~ planned  ",
            OutcomeStatus::Failed => "✗ failed   ",
        };
        println!("{mark} {} ({})", outcome.release_name, outcome.namespace);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: InstallArgs,
    }

    fn args(flags: &[&str]) -> InstallArgs {
        let mut argv = vec!["install"];
        argv.extend_from_slice(flags);
        Wrapper::try_parse_from(argv).unwrap().args
    }

    fn definition() -> InstallDefinition {
        let mut def = InstallDefinition::scaffold("platform");
        def.install.version = Some("1.0.0".to_string());
        def
    }

    #[test]
    fn flags_beat_config_beat_definition() {
        let user = UserConfig {
            namespace: Some("from-config".to_string()),
            prefix: Some("cfg".to_string()),
            version: Some("2.0.0".to_string()),
            ..Default::default()
        };

        let ctx = resolve_context(&args(&["--namespace", "from-flag"]), &definition(), user.clone())
            .unwrap();
        assert_eq!(ctx.namespace, "from-flag");
        assert_eq!(ctx.prefix, "cfg");
        assert_eq!(ctx.version, "2.0.0");

        let ctx = resolve_context(&args(&[]), &definition(), UserConfig::default()).unwrap();
        assert_eq!(ctx.namespace, "platform");
        assert_eq!(ctx.version, "1.0.0");
        assert_eq!(ctx.prefix, "");
        assert!(ctx.timeouts);
    }

    #[test]
    fn set_flags_become_overrides() {
        let ctx = resolve_context(
            &args(&["--set", "database:auth.enabled=false", "--no-timeout"]),
            &definition(),
            UserConfig::default(),
        )
        .unwrap();
        assert_eq!(
            ctx.user.overrides["database"]["auth"]["enabled"],
            serde_json::json!(false)
        );
        assert!(!ctx.timeouts);
        assert!(ctx.dependency_timeout().is_none());
    }

    #[test]
    fn malformed_set_rejected() {
        let err = resolve_context(&args(&["--set", "no-colon"]), &definition(), UserConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("no-colon"));
    }
}
