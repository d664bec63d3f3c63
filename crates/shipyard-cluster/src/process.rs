//! Thin wrapper over `tokio::process` shared by the CLI-backed adapters.

use std::path::Path;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{ClusterError, ClusterResult};

/// Captured result of a finished tool invocation.
pub(crate) struct ToolOutput {
    pub success: bool,
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Turn a non-zero exit into a `Command` error naming `command`.
    pub fn check(self, command: &str) -> ClusterResult<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(ClusterError::Command {
                command: command.to_string(),
                status: self.status,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

pub(crate) async fn run_tool(
    program: &Path,
    args: &[String],
    stdin: Option<&[u8]>,
) -> ClusterResult<ToolOutput> {
    let shown = program.display().to_string();
    debug!(program = %shown, ?args, "running tool");

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let spawn_err = |source| ClusterError::Spawn {
        program: shown.clone(),
        source,
    };
    let mut child = cmd.spawn().map_err(spawn_err)?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input).await.map_err(spawn_err)?;
        // Closing stdin lets the tool see EOF.
        drop(pipe);
    }

    let output = child.wait_with_output().await.map_err(spawn_err)?;
    Ok(ToolOutput {
        success: output.status.success(),
        status: output.status.to_string(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Synchronous variant for callers outside async code, such as the
/// ledger. On a multi-threaded runtime the worker is handed back to the
/// scheduler while the tool runs.
pub(crate) fn run_tool_blocking(
    program: &Path,
    args: &[String],
    stdin: Option<&[u8]>,
) -> ClusterResult<ToolOutput> {
    use tokio::runtime::{Handle, RuntimeFlavor};

    let run = || run_tool_sync(program, args, stdin);
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(run)
        }
        _ => run(),
    }
}

fn run_tool_sync(
    program: &Path,
    args: &[String],
    stdin: Option<&[u8]>,
) -> ClusterResult<ToolOutput> {
    use std::io::Write;

    let shown = program.display().to_string();
    debug!(program = %shown, ?args, "running tool (blocking)");
    let spawn_err = |source| ClusterError::Spawn {
        program: shown.clone(),
        source,
    };

    let mut child = std::process::Command::new(program)
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_err)?;
    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input).map_err(spawn_err)?;
    }
    let output = child.wait_with_output().map_err(spawn_err)?;
    Ok(ToolOutput {
        success: output.status.success(),
        status: output.status.to_string(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Render a command line for error messages.
pub(crate) fn command_line(program: &Path, args: &[String]) -> String {
    let mut line = program.display().to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn stdin_reaches_the_tool_and_exit_status_is_kept() {
        let out = run_tool(Path::new("sh"), &sh("cat; echo oops >&2; exit 3"), Some(b"manifest"))
            .await
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.stdout, "manifest");
        let err = out.check("sh -c ...").err().unwrap();
        assert!(err.to_string().contains("oops"));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let err = run_tool(Path::new("/nonexistent/kubectl"), &[], None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ClusterError::Spawn { ref program, .. } if program == "/nonexistent/kubectl"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn blocking_variant_runs_inside_a_multi_threaded_runtime() {
        let out = run_tool_blocking(Path::new("sh"), &sh("cat"), Some(b"{}")).unwrap();
        assert!(out.success);
        assert_eq!(out.stdout, "{}");
    }

    #[test]
    fn blocking_variant_runs_without_a_runtime() {
        let out = run_tool_blocking(Path::new("sh"), &sh("echo ready"), None).unwrap();
        assert_eq!(out.stdout.trim(), "ready");
    }
}
