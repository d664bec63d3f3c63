//! Per-run executor handle and its stop signal.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use shipyard_core::DirSpec;

use crate::error::{ExecError, ExecResult};
use crate::{Agent, AgentLauncher, CommandOutput};

/// Shared access to the run's agent. Clones talk to the same agent.
#[derive(Clone)]
pub struct ExecutorHandle {
    agent: Arc<dyn Agent>,
    namespace: String,
    stopped: watch::Receiver<bool>,
}

/// Tears the agent down when fired. Fires on drop if never fired.
pub struct StopSignal {
    tx: watch::Sender<bool>,
    teardown: Option<JoinHandle<()>>,
}

impl ExecutorHandle {
    /// Launch the agent for `namespace` and spawn its teardown task.
    pub async fn start(
        launcher: &dyn AgentLauncher,
        namespace: &str,
    ) -> ExecResult<(Self, StopSignal)> {
        let agent = launcher.launch(namespace).await?;
        let (tx, rx) = watch::channel(false);

        let teardown_agent = Arc::clone(&agent);
        let mut teardown_rx = rx.clone();
        let ns = namespace.to_string();
        let teardown = tokio::spawn(async move {
            // Err means the sender is gone, which is a stop as well.
            let _ = teardown_rx.wait_for(|stopped| *stopped).await;
            match teardown_agent.shutdown().await {
                Ok(()) => info!(namespace = %ns, "executor stopped"),
                Err(e) => warn!(namespace = %ns, error = %e, "executor shutdown failed"),
            }
        });

        info!(%namespace, "executor started");
        Ok((
            Self {
                agent,
                namespace: namespace.to_string(),
                stopped: rx,
            },
            StopSignal {
                tx,
                teardown: Some(teardown),
            },
        ))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }

    /// Run `command`. A non-zero exit is a [`ExecError::CommandFailed`].
    pub async fn execute(&self, command: &str) -> ExecResult<CommandOutput> {
        if self.is_stopped() {
            return Err(ExecError::Stopped);
        }
        debug!(%command, namespace = %self.namespace, "executing command");
        let mut output = self.agent.execute(command).await?;
        if output.command.is_empty() {
            output.command = command.to_string();
        }
        if !output.success() {
            return Err(ExecError::CommandFailed {
                command: command.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    pub async fn make_dir(&self, dir: &DirSpec) -> ExecResult<()> {
        if self.is_stopped() {
            return Err(ExecError::Stopped);
        }
        self.agent.make_dir(dir).await?;
        debug!(path = %dir.path, "directory prepared");
        Ok(())
    }
}

impl StopSignal {
    /// Fire the signal and wait for the agent to be torn down.
    pub async fn stop(mut self) {
        self.tx.send_replace(true);
        if let Some(teardown) = self.teardown.take() {
            if let Err(e) = teardown.await {
                warn!(error = %e, "executor teardown task failed");
            }
        }
    }
}

impl Drop for StopSignal {
    fn drop(&mut self) {
        if !*self.tx.borrow() {
            debug!("stop signal dropped unfired, stopping executor");
            self.tx.send_replace(true);
        }
    }
}
