//! The install run: resolve, drain, join, report.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use shipyard_cluster::{ChartArgs, ChartClient, ObjectStore};
use shipyard_core::{InstallDefinition, Release, RunContext};
use shipyard_executor::{AgentLauncher, ExecutorHandle};
use shipyard_graph::{InstallQueue, ReleaseGraph};
use shipyard_ledger::{Ledger, TaskGuard, TaskKind, TaskRecord, TaskStatus};
use shipyard_provision::{provision_persistence, SuffixFn};

use crate::error::{InstallError, InstallResult, StepError};
use crate::phase::Phase;
use crate::render::{render_values, values_digest, NoTemplates, RenderError, ValuesSource};
use crate::report::{InstallReport, LogReporter, OutcomeStatus, ReleaseOutcome, RunReporter};
use crate::tasks::TaskGroup;
use crate::wait::wait_until_ready;

type StepResult<T> = Result<T, (Phase, StepError)>;

fn at<E: Into<StepError>>(phase: Phase) -> impl Fn(E) -> (Phase, StepError) {
    move |e| (phase, e.into())
}

/// Drives install runs against one set of backends.
pub struct Installer {
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn ObjectStore>,
    charts: Arc<dyn ChartClient>,
    launcher: Arc<dyn AgentLauncher>,
    values: Arc<dyn ValuesSource>,
    reporter: Arc<dyn RunReporter>,
    suffix: Option<SuffixFn>,
}

/// Where one release lands in the cluster.
struct Target {
    release_name: String,
    namespace: String,
}

impl Installer {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        store: Arc<dyn ObjectStore>,
        charts: Arc<dyn ChartClient>,
        launcher: Arc<dyn AgentLauncher>,
    ) -> Self {
        Self {
            ledger,
            store,
            charts,
            launcher,
            values: Arc::new(NoTemplates),
            reporter: Arc::new(LogReporter),
            suffix: None,
        }
    }

    pub fn with_values(mut self, values: Arc<dyn ValuesSource>) -> Self {
        self.values = values;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn RunReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Replace the collision suffix generator used for storage names.
    pub fn with_suffix(mut self, suffix: SuffixFn) -> Self {
        self.suffix = Some(suffix);
        self
    }

    /// Install every release of `def` in dependency order.
    ///
    /// Releases already recorded as succeeded are skipped, so re-running
    /// after a failure resumes at the first unfinished release. Background
    /// commands keep their own record and are redone for skipped releases
    /// until they succeed. The first failure stops the drain; background
    /// work dispatched before it is still joined. The reporter runs on
    /// every path past graph resolution.
    pub async fn run(&self, ctx: &RunContext, def: &InstallDefinition) -> InstallResult<InstallReport> {
        def.validate()?;
        let mut queue = ReleaseGraph::build(def.releases.clone())?.topo_sort_by_kahn()?;
        info!(
            install = %def.install.name,
            namespace = %ctx.namespace,
            order = ?queue.names(),
            dry_run = ctx.dry_run,
            "install plan resolved"
        );

        let mut report =
            InstallReport::new(&def.install.name, &ctx.namespace, &ctx.version, ctx.dry_run);

        if ctx.dry_run {
            let result = self.plan(ctx, &mut queue, &mut report).await;
            return self.conclude(report, result).await;
        }

        if let Err(e) = self.ensure_namespaces(ctx, def).await {
            return self.conclude(report, Err(e)).await;
        }
        let (executor, stop) =
            match ExecutorHandle::start(self.launcher.as_ref(), &ctx.namespace).await {
                Ok(started) => started,
                Err(e) => {
                    error!(error = %e, "executor failed to start");
                    return self.conclude(report, Err(e.into())).await;
                }
            };
        let mut tasks = TaskGroup::new();

        let drained = self
            .drain(ctx, def, &mut queue, &executor, &mut tasks, &mut report)
            .await;
        let joined = tasks.join_all().await;
        report.background_tasks = tasks.dispatched();

        let mut result = match (drained, joined) {
            (Err(e), Err(bg)) => {
                warn!(error = %bg, "background task failed after release failure");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), joined) => joined,
        };

        if result.is_ok() {
            match self.store.clean_jobs(&ctx.namespace).await {
                Ok(cleaned) => report.jobs_cleaned = cleaned,
                Err(source) => {
                    result = Err(InstallError::Cleanup {
                        namespace: ctx.namespace.clone(),
                        source,
                    })
                }
            }
        }

        let concluded = self.conclude(report, result).await;
        stop.stop().await;
        concluded
    }

    /// Stamp the outcome, hand the report to the reporter, then surface
    /// the run error ahead of any reporter error.
    async fn conclude(
        &self,
        mut report: InstallReport,
        result: InstallResult<()>,
    ) -> InstallResult<InstallReport> {
        report.finish(result.as_ref().err());
        let reported = self.reporter.report(&report).await;
        result?;
        reported?;
        Ok(report)
    }

    /// Create the run namespace and every namespace a release or its
    /// storage lands in.
    async fn ensure_namespaces(&self, ctx: &RunContext, def: &InstallDefinition) -> InstallResult<()> {
        let mut namespaces = BTreeSet::from([ctx.namespace.clone()]);
        for release in &def.releases {
            let target = Self::target(release, ctx);
            for spec in &release.persistence {
                namespaces.insert(spec.in_namespace(&target.namespace).namespace);
            }
            namespaces.insert(target.namespace);
        }

        for namespace in namespaces {
            match self.store.ensure_namespace(&namespace).await {
                Ok(created) => debug!(%namespace, created, "namespace ensured"),
                Err(source) => return Err(InstallError::Namespace { namespace, source }),
            }
        }
        Ok(())
    }

    fn target(release: &Release, ctx: &RunContext) -> Target {
        Target {
            release_name: ctx.release_name(&release.name),
            namespace: release
                .namespace
                .clone()
                .unwrap_or_else(|| ctx.namespace.clone()),
        }
    }

    async fn drain(
        &self,
        ctx: &RunContext,
        def: &InstallDefinition,
        queue: &mut InstallQueue,
        executor: &ExecutorHandle,
        tasks: &mut TaskGroup,
        report: &mut InstallReport,
    ) -> InstallResult<()> {
        let namespaces: HashMap<&str, String> = def
            .releases
            .iter()
            .map(|r| (r.name.as_str(), Self::target(r, ctx).namespace))
            .collect();

        while let Some(release) = queue.dequeue() {
            let target = Self::target(&release, ctx);
            match self
                .install_release(ctx, def, &release, &target, &namespaces, executor, tasks)
                .await
            {
                Ok(outcome) => report.releases.push(outcome),
                Err(e) => {
                    report.releases.push(ReleaseOutcome {
                        name: release.name.clone(),
                        release_name: target.release_name,
                        namespace: target.namespace,
                        status: OutcomeStatus::Failed,
                        phase: e.phase(),
                        digest: None,
                        reason: Some(e.to_string()),
                    });
                    if !queue.is_empty() {
                        warn!(not_attempted = ?queue.names(), "stopping after failed release");
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn install_release(
        &self,
        ctx: &RunContext,
        def: &InstallDefinition,
        release: &Release,
        target: &Target,
        namespaces: &HashMap<&str, String>,
        executor: &ExecutorHandle,
        tasks: &mut TaskGroup,
    ) -> InstallResult<ReleaseOutcome> {
        let mut outcome = ReleaseOutcome {
            name: release.name.clone(),
            release_name: target.release_name.clone(),
            namespace: target.namespace.clone(),
            status: OutcomeStatus::Installed,
            phase: None,
            digest: None,
            reason: None,
        };

        if let Some(record) = self.ledger.get(&ctx.namespace, TaskKind::Release, &release.name)? {
            if record.status == TaskStatus::Succeeded {
                info!(release = %release.name, "already installed, skipping");
                outcome.status = OutcomeStatus::Skipped;
                outcome.digest = record.digest;
                self.dispatch_background(ctx, release, executor, tasks, false)?;
                return Ok(outcome);
            }
            debug!(release = %release.name, status = %record.status, "resuming unfinished release");
        }

        info!(release = %release.name, release_name = %target.release_name, namespace = %target.namespace, "installing release");
        let mut guard = TaskGuard::begin(
            self.ledger.as_ref(),
            TaskRecord::pending(&ctx.namespace, TaskKind::Release, &release.name)
                .with_ref_name(&target.release_name),
        )?;

        match self
            .release_steps(ctx, def, release, target, namespaces, executor)
            .await
        {
            Ok(digest) => {
                guard.set_digest(digest.clone());
                guard.succeed()?;
                info!(release = %release.name, %digest, "release installed");
                outcome.digest = Some(digest);
            }
            Err((phase, source)) => {
                error!(release = %release.name, %phase, error = %source, "release failed");
                guard.fail(format!("{phase}: {source}"))?;
                return Err(InstallError::Release {
                    release: release.name.clone(),
                    phase,
                    source,
                });
            }
        }

        self.dispatch_background(ctx, release, executor, tasks, true)?;
        Ok(outcome)
    }

    /// Spawn the release's background commands under a ledger record of
    /// their own. A freshly installed release always dispatches; a skipped
    /// one only when the last background run did not succeed.
    fn dispatch_background(
        &self,
        ctx: &RunContext,
        release: &Release,
        executor: &ExecutorHandle,
        tasks: &mut TaskGroup,
        installed: bool,
    ) -> InstallResult<()> {
        if release.background_commands.is_empty() {
            return Ok(());
        }
        if !installed
            && self
                .ledger
                .succeeded(&ctx.namespace, TaskKind::Background, &release.name)?
        {
            return Ok(());
        }

        let ledger = Arc::clone(&self.ledger);
        let exec = executor.clone();
        let commands = release.background_commands.clone();
        let namespace = ctx.namespace.clone();
        let name = release.name.clone();
        tasks.spawn(async move {
            let guard = TaskGuard::begin(
                ledger.as_ref(),
                TaskRecord::pending(&namespace, TaskKind::Background, &name),
            )?;
            for command in &commands {
                if let Err(source) = exec.execute(command).await {
                    guard.fail(format!("{command}: {source}"))?;
                    return Err(InstallError::Background {
                        release: name,
                        source,
                    });
                }
            }
            guard.succeed()?;
            info!(release = %name, count = commands.len(), "background commands finished");
            Ok(())
        });
        debug!(release = %release.name, installed, "background commands dispatched");
        Ok(())
    }

    /// Phases between the pending record and the terminal one. Returns
    /// the values digest.
    async fn release_steps(
        &self,
        ctx: &RunContext,
        def: &InstallDefinition,
        release: &Release,
        target: &Target,
        namespaces: &HashMap<&str, String>,
        executor: &ExecutorHandle,
    ) -> StepResult<String> {
        for requirement in &release.requirements {
            let namespace = namespaces
                .get(requirement.as_str())
                .cloned()
                .unwrap_or_else(|| ctx.namespace.clone());
            wait_until_ready(
                self.store.as_ref(),
                &namespace,
                &ctx.release_name(requirement),
                &ctx.wait,
                ctx.dependency_timeout(),
            )
            .await
            .map_err(at(Phase::DependencyWait))?;
        }

        for spec in &release.persistence {
            let spec = spec.in_namespace(&target.namespace);
            let refs = provision_persistence(
                &spec,
                Arc::clone(&self.store),
                Arc::clone(&self.ledger),
                Some(executor),
                self.suffix.clone(),
            )
            .await
            .map_err(at(Phase::Provision))?;
            debug!(release = %release.name, volume = %refs.volume, claim = %refs.claim, "storage ready");
        }

        for command in &release.pre_commands {
            executor
                .execute(command)
                .await
                .map_err(at(Phase::PreCommands))?;
            debug!(release = %release.name, %command, "pre-command finished");
        }

        let template = self
            .values
            .template(release)
            .await
            .map_err(|source| RenderError::Source {
                release: release.name.clone(),
                source,
            })
            .map_err(at(Phase::RenderValues))?;
        let values =
            render_values(template.as_deref(), release, ctx).map_err(at(Phase::RenderValues))?;
        let digest = values_digest(&values);

        let args = ChartArgs {
            repo_url: release
                .repo_url
                .clone()
                .or_else(|| def.install.chart_repository.clone())
                .unwrap_or_default(),
            namespace: target.namespace.clone(),
            release_name: target.release_name.clone(),
            chart_name: release.chart.clone(),
            version: release.version.clone().unwrap_or_else(|| ctx.version.clone()),
            timeout: ctx.chart_timeout(),
        };
        let result = self
            .charts
            .upgrade(&args, &values)
            .await
            .map_err(at(Phase::Chart))?;
        info!(release = %release.name, revision = ?result.revision, "chart applied");

        for command in &release.post_commands {
            executor
                .execute(command)
                .await
                .map_err(at(Phase::PostCommands))?;
            debug!(release = %release.name, %command, "post-command finished");
        }

        Ok(digest)
    }

    /// Dry run: render every release in order without side effects.
    async fn plan(
        &self,
        ctx: &RunContext,
        queue: &mut InstallQueue,
        report: &mut InstallReport,
    ) -> InstallResult<()> {
        while let Some(release) = queue.dequeue() {
            let target = Self::target(&release, ctx);
            let done = self
                .ledger
                .succeeded(&ctx.namespace, TaskKind::Release, &release.name)?;

            let rendered = async {
                let template = self.values.template(&release).await.map_err(|source| {
                    RenderError::Source {
                        release: release.name.clone(),
                        source,
                    }
                })?;
                render_values(template.as_deref(), &release, ctx)
            }
            .await
            .map_err(|e| InstallError::Release {
                release: release.name.clone(),
                phase: Phase::RenderValues,
                source: e.into(),
            })?;

            let digest = values_digest(&rendered);
            let status = if done {
                OutcomeStatus::Skipped
            } else {
                OutcomeStatus::Planned
            };
            info!(
                release = %release.name,
                release_name = %target.release_name,
                namespace = %target.namespace,
                ?status,
                %digest,
                "planned"
            );
            report.releases.push(ReleaseOutcome {
                name: release.name.clone(),
                release_name: target.release_name,
                namespace: target.namespace,
                status,
                phase: None,
                digest: Some(digest),
                reason: None,
            });
        }
        Ok(())
    }
}
