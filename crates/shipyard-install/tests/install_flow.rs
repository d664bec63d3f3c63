//! End-to-end install runs against in-memory backends.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use shipyard_cluster::{
    BoxFuture, ChartArgs, ChartClient, ClusterError, ClusterResult, MemoryStore, ReleaseResult,
};
use shipyard_core::{
    DirSpec, InstallDefinition, InstallMeta, PersistenceSpec, Release, RunContext, Values,
};
use shipyard_executor::{Agent, AgentLauncher, CommandOutput, ExecError, ExecResult};
use shipyard_install::{
    DirValuesSource, InstallError, InstallReport, Installer, OutcomeStatus, Phase, RunReporter,
};
use shipyard_ledger::{Ledger, LedgerStore, TaskKind, TaskRecord, TaskStatus};

const NS: &str = "platform";

// ── Mocks ─────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingCharts {
    calls: Mutex<Vec<(ChartArgs, Values)>>,
    fail_release: Mutex<Option<String>>,
}

impl RecordingCharts {
    fn released(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(args, _)| args.release_name.clone())
            .collect()
    }

    fn values_for(&self, release_name: &str) -> Values {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|(args, _)| args.release_name == release_name)
            .map(|(_, values)| values.clone())
            .unwrap()
    }
}

impl ChartClient for RecordingCharts {
    fn upgrade<'a>(
        &'a self,
        args: &'a ChartArgs,
        values: &'a Values,
    ) -> BoxFuture<'a, ClusterResult<ReleaseResult>> {
        self.calls
            .lock()
            .unwrap()
            .push((args.clone(), values.clone()));
        let fail = self.fail_release.lock().unwrap().as_deref() == Some(args.release_name.as_str());
        Box::pin(async move {
            if fail {
                return Err(ClusterError::Rejected("chart hook timed out".to_string()));
            }
            Ok(ReleaseResult {
                release_name: args.release_name.clone(),
                namespace: args.namespace.clone(),
                revision: Some(1),
            })
        })
    }
}

/// Commands containing "fail" exit 1 and echo themselves on stderr,
/// until `healed` is set.
#[derive(Default)]
struct ScriptAgent {
    commands: Mutex<Vec<String>>,
    dirs: Mutex<Vec<String>>,
    shutdowns: AtomicUsize,
    healed: AtomicBool,
}

impl Agent for ScriptAgent {
    fn execute<'a>(&'a self, command: &'a str) -> BoxFuture<'a, ExecResult<CommandOutput>> {
        self.commands.lock().unwrap().push(command.to_string());
        let failed = command.contains("fail") && !self.healed.load(Ordering::SeqCst);
        Box::pin(async move {
            Ok(CommandOutput {
                command: command.to_string(),
                exit_code: i32::from(failed),
                stdout: String::new(),
                stderr: if failed {
                    format!("error: {command} exploded")
                } else {
                    String::new()
                },
            })
        })
    }

    fn make_dir<'a>(&'a self, dir: &'a DirSpec) -> BoxFuture<'a, ExecResult<()>> {
        self.dirs.lock().unwrap().push(dir.path.clone());
        Box::pin(async { Ok(()) })
    }

    fn shutdown(&self) -> BoxFuture<'_, ExecResult<()>> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }
}

struct Launcher {
    agent: Arc<ScriptAgent>,
    launches: AtomicUsize,
    unavailable: AtomicBool,
}

impl AgentLauncher for Launcher {
    fn launch<'a>(&'a self, _namespace: &'a str) -> BoxFuture<'a, ExecResult<Arc<dyn Agent>>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let agent: Arc<dyn Agent> = self.agent.clone();
        let unavailable = self.unavailable.load(Ordering::SeqCst);
        Box::pin(async move {
            if unavailable {
                return Err(ExecError::Unavailable {
                    address: "agent".to_string(),
                    reason: "no schedulable node".to_string(),
                });
            }
            Ok(agent)
        })
    }
}

#[derive(Default)]
struct CapturingReporter {
    reports: Mutex<Vec<InstallReport>>,
}

impl CapturingReporter {
    fn last(&self) -> InstallReport {
        self.reports.lock().unwrap().last().cloned().unwrap()
    }
}

impl RunReporter for CapturingReporter {
    fn report<'a>(
        &'a self,
        report: &'a InstallReport,
    ) -> BoxFuture<'a, shipyard_install::InstallResult<()>> {
        self.reports.lock().unwrap().push(report.clone());
        Box::pin(async { Ok(()) })
    }
}

// ── Harness ───────────────────────────────────────────────────────

struct Harness {
    ledger: Arc<LedgerStore>,
    store: Arc<MemoryStore>,
    charts: Arc<RecordingCharts>,
    agent: Arc<ScriptAgent>,
    launcher: Arc<Launcher>,
    reporter: Arc<CapturingReporter>,
}

impl Harness {
    fn new() -> Self {
        let agent = Arc::new(ScriptAgent::default());
        Self {
            ledger: Arc::new(LedgerStore::open_in_memory().unwrap()),
            store: Arc::new(MemoryStore::new()),
            charts: Arc::new(RecordingCharts::default()),
            launcher: Arc::new(Launcher {
                agent: agent.clone(),
                launches: AtomicUsize::new(0),
                unavailable: AtomicBool::new(false),
            }),
            agent,
            reporter: Arc::new(CapturingReporter::default()),
        }
    }

    fn installer(&self) -> Installer {
        Installer::new(
            self.ledger.clone(),
            self.store.clone(),
            self.charts.clone(),
            self.launcher.clone(),
        )
        .with_reporter(self.reporter.clone())
    }

    async fn run(&self, def: &InstallDefinition) -> Result<InstallReport, InstallError> {
        self.installer().run(&ctx(), def).await
    }

    fn status(&self, name: &str) -> Option<TaskRecord> {
        self.ledger.get(NS, TaskKind::Release, name).unwrap()
    }

    fn mark_succeeded(&self, name: &str) {
        self.ledger
            .put(&TaskRecord {
                status: TaskStatus::Succeeded,
                ..TaskRecord::pending(NS, TaskKind::Release, name)
            })
            .unwrap();
    }

    fn commands(&self) -> Vec<String> {
        self.agent.commands.lock().unwrap().clone()
    }
}

fn ctx() -> RunContext {
    RunContext::new(NS, "1.2.0")
}

fn definition(releases: Vec<Release>) -> InstallDefinition {
    InstallDefinition {
        install: InstallMeta {
            name: "platform".to_string(),
            version: Some("1.2.0".to_string()),
            chart_repository: Some("https://charts.example.com".to_string()),
            namespace: Some(NS.to_string()),
        },
        releases,
    }
}

fn abc() -> Vec<Release> {
    vec![
        Release::new("c", "chart-c").requires(&["a", "b"]),
        Release::new("a", "chart-a"),
        Release::new("b", "chart-b").requires(&["a"]),
    ]
}

// ── Ordering & resume ─────────────────────────────────────────────

#[tokio::test]
async fn installs_in_dependency_order() {
    let h = Harness::new();
    let report = h.run(&definition(abc())).await.unwrap();

    assert_eq!(h.charts.released(), vec!["a", "b", "c"]);
    assert_eq!(report.with_status(OutcomeStatus::Installed), vec!["a", "b", "c"]);
    for name in ["a", "b", "c"] {
        assert_eq!(h.status(name).unwrap().status, TaskStatus::Succeeded);
    }
    assert_eq!(h.launcher.launches.load(Ordering::SeqCst), 1);
    assert_eq!(h.agent.shutdowns.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn resume_skips_succeeded_release() {
    let h = Harness::new();
    h.mark_succeeded("a");

    let report = h.run(&definition(abc())).await.unwrap();

    assert_eq!(h.charts.released(), vec!["b", "c"]);
    assert_eq!(report.with_status(OutcomeStatus::Skipped), vec!["a"]);
    assert_eq!(report.with_status(OutcomeStatus::Installed), vec!["b", "c"]);
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    let h = Harness::new();
    h.run(&definition(abc())).await.unwrap();
    let report = h.run(&definition(abc())).await.unwrap();

    assert_eq!(h.charts.released().len(), 3);
    assert_eq!(report.with_status(OutcomeStatus::Skipped), vec!["a", "b", "c"]);
}

// ── Failure recording ─────────────────────────────────────────────

#[tokio::test]
async fn failed_pre_command_skips_chart_and_records_failure() {
    let h = Harness::new();
    let mut releases = abc();
    releases[2].pre_commands = vec!["echo prep".to_string(), "fail-migrate".to_string(), "never".to_string()];

    let err = h.run(&definition(releases)).await.unwrap_err();

    assert_eq!(err.release(), Some("b"));
    assert_eq!(err.phase(), Some(Phase::PreCommands));
    assert_eq!(h.charts.released(), vec!["a"]);
    assert_eq!(h.commands(), vec!["echo prep", "fail-migrate"]);

    let record = h.status("b").unwrap();
    assert_eq!(record.status, TaskStatus::Failed);
    let reason = record.reason.unwrap();
    assert!(reason.contains("fail-migrate"));
    assert!(reason.contains("exploded"));
    assert!(h.status("c").is_none());

    let report = h.reporter.last();
    assert!(!report.succeeded());
    assert_eq!(report.releases.last().unwrap().status, OutcomeStatus::Failed);
    assert_eq!(h.agent.shutdowns.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_post_command_records_failure_after_chart() {
    let h = Harness::new();
    let mut releases = abc();
    releases[1].post_commands = vec!["fail-smoke-test".to_string()];

    let err = h.run(&definition(releases)).await.unwrap_err();

    assert_eq!(err.phase(), Some(Phase::PostCommands));
    assert_eq!(h.charts.released(), vec!["a"]);
    assert_eq!(h.status("a").unwrap().status, TaskStatus::Failed);
}

#[tokio::test]
async fn chart_failure_recorded() {
    let h = Harness::new();
    *h.charts.fail_release.lock().unwrap() = Some("b".to_string());

    let err = h.run(&definition(abc())).await.unwrap_err();
    assert_eq!(err.phase(), Some(Phase::Chart));
    let record = h.status("b").unwrap();
    assert_eq!(record.status, TaskStatus::Failed);
    assert!(record.reason.unwrap().contains("chart hook timed out"));
}

#[tokio::test]
async fn rerun_after_failure_resumes_at_failed_release() {
    let h = Harness::new();
    let mut broken = abc();
    broken[2].pre_commands = vec!["fail-once".to_string()];
    h.run(&definition(broken)).await.unwrap_err();

    let mut fixed = abc();
    fixed[2].pre_commands = vec!["echo fixed".to_string()];
    let report = h.run(&definition(fixed)).await.unwrap();

    assert_eq!(report.with_status(OutcomeStatus::Skipped), vec!["a"]);
    assert_eq!(report.with_status(OutcomeStatus::Installed), vec!["b", "c"]);
    assert_eq!(h.charts.released(), vec!["a", "b", "c"]);
}

// ── Configuration errors ──────────────────────────────────────────

#[tokio::test]
async fn cycle_fails_before_any_side_effect() {
    let h = Harness::new();
    let releases = vec![
        Release::new("a", "a").requires(&["b"]),
        Release::new("b", "b").requires(&["a"]),
    ];
    let err = h.run(&definition(releases)).await.unwrap_err();

    assert!(matches!(err, InstallError::Graph(_)));
    assert_eq!(h.launcher.launches.load(Ordering::SeqCst), 0);
    assert!(h.ledger.list(NS).unwrap().is_empty());
}

#[tokio::test]
async fn multi_mode_persistence_rejected_before_any_side_effect() {
    let h = Harness::new();
    let mut release = Release::new("db", "postgresql");
    let mut spec = PersistenceSpec::new("pg", "10Gi");
    spec.access_modes = vec![
        shipyard_core::AccessMode::ReadWriteOnce,
        shipyard_core::AccessMode::ReadOnlyMany,
    ];
    release.persistence.push(spec);

    let err = h.run(&definition(vec![release])).await.unwrap_err();
    assert!(matches!(err, InstallError::Config(_)));
    assert_eq!(h.store.lookups(), 0);
    assert_eq!(h.launcher.launches.load(Ordering::SeqCst), 0);
}

// ── Waits, storage, values ────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn dependency_timeout_fails_dependent() {
    let h = Harness::new();
    h.store.set_ready(NS, "a", false);
    let mut ctx = ctx();
    ctx.wait.timeout = Duration::from_secs(60);

    let err = h.installer().run(&ctx, &definition(abc())).await.unwrap_err();

    assert_eq!(err.release(), Some("b"));
    assert_eq!(err.phase(), Some(Phase::DependencyWait));
    assert_eq!(h.charts.released(), vec!["a"]);
    assert!(h.status("b").unwrap().reason.unwrap().contains("dependency-wait"));
}

#[tokio::test]
async fn dependency_waits_use_prefixed_names() {
    let h = Harness::new();
    let mut ctx = ctx();
    ctx.prefix = "staging".to_string();
    h.store.set_ready(NS, "a", false);

    // Only the prefixed name is consulted, and it defaults to ready.
    h.installer().run(&ctx, &definition(abc())).await.unwrap();
    assert_eq!(h.charts.released(), vec!["staging-a", "staging-b", "staging-c"]);
}

#[tokio::test]
async fn persistence_provisioned_before_pre_commands() {
    let h = Harness::new();
    let mut release = Release::new("db", "postgresql");
    let mut spec = PersistenceSpec::new("pg-data", "5Gi");
    spec.dir = Some(DirSpec {
        path: "/srv/pg".to_string(),
        mode: Some("0700".to_string()),
        owner: None,
    });
    release.persistence.push(spec);
    release.pre_commands = vec!["echo init".to_string()];

    h.run(&definition(vec![release])).await.unwrap();

    assert_eq!(*h.agent.dirs.lock().unwrap(), vec!["/srv/pg"]);
    assert!(h.store.volume("pg-data").is_some());
    let claim = h.store.claim(NS, "pg-data").unwrap();
    assert_eq!(claim.spec.volume_name.as_deref(), Some("pg-data"));
    assert!(h.ledger.succeeded(NS, TaskKind::Volume, "pg-data").unwrap());
    assert!(h.ledger.succeeded(NS, TaskKind::VolumeClaim, "pg-data").unwrap());
}

#[tokio::test]
async fn rendered_values_reach_the_chart_and_digest_is_recorded() {
    let h = Harness::new();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("api.toml"),
        "replicas = 2\n[ingress]\nhost = \"api.{{ values.domain }}\"\nnamespace = \"{{ namespace }}\"\n",
    )
    .unwrap();

    let mut release = Release::new("api", "api");
    release.values.insert("replicas".to_string(), json!(1));
    let mut ctx = ctx();
    ctx.user
        .values
        .insert("domain".to_string(), "example.com".to_string());

    let report = h
        .installer()
        .with_values(Arc::new(DirValuesSource::new(dir.path())))
        .run(&ctx, &definition(vec![release]))
        .await
        .unwrap();

    let values = h.charts.values_for("api");
    assert_eq!(values["replicas"], json!(2));
    assert_eq!(values["ingress"]["host"], json!("api.example.com"));
    assert_eq!(values["ingress"]["namespace"], json!(NS));

    let digest = h.status("api").unwrap().digest.unwrap();
    assert_eq!(report.releases[0].digest.as_deref(), Some(digest.as_str()));
}

#[tokio::test]
async fn unknown_placeholder_fails_before_chart() {
    let h = Harness::new();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("api.toml"), "x = \"{{ nope }}\"\n").unwrap();

    let err = h
        .installer()
        .with_values(Arc::new(DirValuesSource::new(dir.path())))
        .run(&ctx(), &definition(vec![Release::new("api", "api")]))
        .await
        .unwrap_err();

    assert_eq!(err.phase(), Some(Phase::RenderValues));
    assert!(h.charts.released().is_empty());
}

// ── Background work & deferred effects ────────────────────────────

#[tokio::test]
async fn background_failure_surfaces_after_drain() {
    let h = Harness::new();
    h.store.add_completed_jobs(NS, 2);
    let mut releases = abc();
    releases[1].background_commands = vec!["fail-warm-cache".to_string()];

    let err = h.run(&definition(releases)).await.unwrap_err();

    assert!(matches!(err, InstallError::Background { ref release, .. } if release == "a"));
    // Releases themselves all went through.
    assert_eq!(h.charts.released(), vec!["a", "b", "c"]);
    assert_eq!(h.status("a").unwrap().status, TaskStatus::Succeeded);
    let background = h.ledger.get(NS, TaskKind::Background, "a").unwrap().unwrap();
    assert_eq!(background.status, TaskStatus::Failed);
    assert!(background.reason.unwrap().contains("fail-warm-cache"));
    // Cleanup only runs on success; the reporter runs regardless.
    assert_eq!(h.store.completed_jobs(NS), 2);
    let report = h.reporter.last();
    assert_eq!(report.background_tasks, 1);
    assert!(report.error.unwrap().contains("fail-warm-cache"));
}

#[tokio::test]
async fn background_work_retried_on_next_run() {
    let h = Harness::new();
    let mut releases = abc();
    releases[1].background_commands = vec!["echo prime".to_string(), "fail-warm-cache".to_string()];
    let def = definition(releases);

    h.run(&def).await.unwrap_err();
    assert!(h.ledger.succeeded(NS, TaskKind::Release, "a").unwrap());
    assert!(!h.ledger.succeeded(NS, TaskKind::Background, "a").unwrap());

    // The release is skipped but its unfinished background work is redone.
    h.agent.healed.store(true, Ordering::SeqCst);
    h.agent.commands.lock().unwrap().clear();
    let report = h.run(&def).await.unwrap();
    assert_eq!(report.with_status(OutcomeStatus::Skipped), vec!["a", "b", "c"]);
    assert_eq!(report.background_tasks, 1);
    assert_eq!(h.commands(), vec!["echo prime", "fail-warm-cache"]);
    assert!(h.ledger.succeeded(NS, TaskKind::Background, "a").unwrap());
    assert_eq!(h.charts.released(), vec!["a", "b", "c"]);

    // Once recorded as succeeded it is not dispatched again.
    h.agent.commands.lock().unwrap().clear();
    let report = h.run(&def).await.unwrap();
    assert_eq!(report.background_tasks, 0);
    assert!(h.commands().is_empty());
}

#[tokio::test]
async fn completed_jobs_cleaned_on_success() {
    let h = Harness::new();
    h.store.add_completed_jobs(NS, 3);
    let mut releases = abc();
    releases[0].background_commands = vec!["echo warm".to_string()];

    let report = h.run(&definition(releases)).await.unwrap();
    assert_eq!(report.jobs_cleaned, 3);
    assert_eq!(report.background_tasks, 1);
    assert_eq!(h.store.completed_jobs(NS), 0);
    assert!(h.commands().contains(&"echo warm".to_string()));
}

#[tokio::test]
async fn dry_run_touches_nothing() {
    let h = Harness::new();
    h.mark_succeeded("a");
    let mut ctx = ctx();
    ctx.dry_run = true;

    let report = h.installer().run(&ctx, &definition(abc())).await.unwrap();

    assert!(report.dry_run);
    assert_eq!(report.with_status(OutcomeStatus::Skipped), vec!["a"]);
    assert_eq!(report.with_status(OutcomeStatus::Planned), vec!["b", "c"]);
    assert!(report.releases.iter().all(|r| r.digest.is_some()));
    assert!(h.charts.released().is_empty());
    assert_eq!(h.launcher.launches.load(Ordering::SeqCst), 0);
    assert_eq!(h.ledger.list(NS).unwrap().len(), 1);
    assert_eq!(h.store.ready_probes(), 0);
    assert!(h.store.created_namespaces().is_empty());
}

// ── Namespaces & run reporting ────────────────────────────────────

#[tokio::test]
async fn namespaces_created_before_any_release() {
    let h = Harness::new();
    h.store.insert_namespace(NS);
    let mut edge = Release::new("edge", "ingress");
    edge.namespace = Some("edge".to_string());
    let mut db = Release::new("db", "postgresql");
    let mut spec = PersistenceSpec::new("pg-data", "5Gi");
    spec.namespace = "storage".to_string();
    db.persistence.push(spec);

    h.run(&definition(vec![edge, db])).await.unwrap();

    assert_eq!(h.store.created_namespaces(), vec!["edge", "storage"]);
    assert!(h.store.claim("storage", "pg-data").is_some());

    h.run(&definition(vec![Release::new("edge", "ingress")])).await.unwrap();
    assert_eq!(h.store.created_namespaces().len(), 2);
}

#[tokio::test]
async fn namespace_failure_stops_before_executor_and_is_reported() {
    let h = Harness::new();
    h.store.fail_namespaces("namespaces is forbidden");

    let err = h.run(&definition(abc())).await.unwrap_err();

    assert!(matches!(err, InstallError::Namespace { ref namespace, .. } if namespace == NS));
    assert_eq!(h.launcher.launches.load(Ordering::SeqCst), 0);
    assert!(h.charts.released().is_empty());
    let report = h.reporter.last();
    assert!(!report.succeeded());
    assert!(report.error.unwrap().contains("forbidden"));
}

#[tokio::test]
async fn executor_start_failure_is_reported() {
    let h = Harness::new();
    h.launcher.unavailable.store(true, Ordering::SeqCst);

    let err = h.run(&definition(abc())).await.unwrap_err();

    assert!(matches!(err, InstallError::Executor(_)));
    assert!(h.charts.released().is_empty());
    assert!(h.ledger.list(NS).unwrap().is_empty());
    let report = h.reporter.last();
    assert!(report.releases.is_empty());
    assert!(report.error.unwrap().contains("no schedulable node"));
}
