//! Agent that runs commands through the local shell.
//!
//! Used when the installer itself runs on a host that can reach the
//! cluster's storage paths, and in tests.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tracing::{debug, info};

use shipyard_core::DirSpec;

use crate::error::{ExecError, ExecResult};
use crate::{Agent, AgentLauncher, BoxFuture, CommandOutput};

/// Environment variable carrying the run namespace into every command.
pub const NAMESPACE_ENV: &str = "SHIPYARD_NAMESPACE";

#[derive(Debug, Clone)]
pub struct LocalShellAgent {
    shell: PathBuf,
    workdir: Option<PathBuf>,
    namespace: String,
}

impl LocalShellAgent {
    pub fn new(namespace: &str) -> Self {
        Self {
            shell: PathBuf::from("sh"),
            workdir: None,
            namespace: namespace.to_string(),
        }
    }

    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    async fn run(&self, command: &str) -> ExecResult<CommandOutput> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .env(NAMESPACE_ENV, &self.namespace)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await.map_err(|source| ExecError::Spawn {
            command: command.to_string(),
            source,
        })?;
        // Signal-terminated processes have no code.
        let exit_code = output.status.code().unwrap_or(-1);
        debug!(%command, exit_code, "local command finished");
        Ok(CommandOutput {
            command: command.to_string(),
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn prepare_dir(&self, dir: &DirSpec) -> ExecResult<()> {
        let path = match &self.workdir {
            Some(base) if Path::new(&dir.path).is_relative() => base.join(&dir.path),
            _ => PathBuf::from(&dir.path),
        };
        let dir_err = |reason: String| ExecError::Dir {
            path: dir.path.clone(),
            reason,
        };

        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| dir_err(e.to_string()))?;

        if let Some(mode) = &dir.mode {
            let bits = parse_mode(mode).ok_or_else(|| dir_err(format!("invalid mode {mode:?}")))?;
            set_mode(&path, bits)
                .await
                .map_err(|e| dir_err(e.to_string()))?;
        }

        if let Some(owner) = &dir.owner {
            let output = chown_command(owner, &path)
                .output()
                .await
                .map_err(|e| dir_err(format!("chown: {e}")))?;
            if !output.status.success() {
                return Err(dir_err(format!(
                    "chown: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }
            debug!(path = %path.display(), %owner, "ownership set");
        }
        Ok(())
    }
}

/// `chown` invoked directly; owner and path are single arguments, never shell text.
fn chown_command(owner: &str, path: &Path) -> Command {
    let mut cmd = Command::new("chown");
    cmd.arg(owner)
        .arg(path)
        .stdin(Stdio::null())
        .kill_on_drop(true);
    cmd
}

/// Parse octal permission bits such as `0755`, `755` or `0o750`.
pub(crate) fn parse_mode(mode: &str) -> Option<u32> {
    let digits = mode.trim().trim_start_matches("0o");
    if digits.is_empty() {
        return None;
    }
    u32::from_str_radix(digits, 8).ok().filter(|bits| *bits <= 0o7777)
}

#[cfg(unix)]
async fn set_mode(path: &Path, bits: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(bits)).await
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _bits: u32) -> std::io::Result<()> {
    Ok(())
}

impl Agent for LocalShellAgent {
    fn execute<'a>(&'a self, command: &'a str) -> BoxFuture<'a, ExecResult<CommandOutput>> {
        Box::pin(self.run(command))
    }

    fn make_dir<'a>(&'a self, dir: &'a DirSpec) -> BoxFuture<'a, ExecResult<()>> {
        Box::pin(self.prepare_dir(dir))
    }

    fn shutdown(&self) -> BoxFuture<'_, ExecResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Launches a [`LocalShellAgent`] per namespace.
#[derive(Debug, Clone, Default)]
pub struct LocalLauncher {
    workdir: Option<PathBuf>,
}

impl LocalLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }
}

impl AgentLauncher for LocalLauncher {
    fn launch<'a>(&'a self, namespace: &'a str) -> BoxFuture<'a, ExecResult<Arc<dyn Agent>>> {
        Box::pin(async move {
            let mut agent = LocalShellAgent::new(namespace);
            if let Some(dir) = &self.workdir {
                agent = agent.with_workdir(dir.clone());
            }
            info!(%namespace, "local shell agent ready");
            Ok(Arc::new(agent) as Arc<dyn Agent>)
        })
    }
}
