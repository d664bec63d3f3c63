//! shipyard-executor: runs install-time commands on behalf of releases.
//!
//! An [`Agent`] is whatever actually executes commands: a local shell
//! ([`LocalShellAgent`]) or a helper service reached over HTTP
//! ([`HttpAgent`]). An [`AgentLauncher`] brings one up for a namespace.
//!
//! [`ExecutorHandle::start`] launches the agent once per run and returns
//! the cloneable handle plus a [`StopSignal`] that tears the agent down.

pub mod error;
pub mod handle;
pub mod remote;
pub mod local;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use shipyard_core::DirSpec;

pub use error::{ExecError, ExecResult};
pub use handle::{ExecutorHandle, StopSignal};
pub use remote::{HttpAgent, HttpLauncher};
pub use local::{LocalLauncher, LocalShellAgent};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of one command, whatever its exit status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    #[serde(default)]
    pub command: String,
    pub exit_code: i32,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Command execution transport.
///
/// `execute` reports non-zero exits as a normal [`CommandOutput`]; turning
/// them into errors is the handle's job.
pub trait Agent: Send + Sync {
    fn execute<'a>(&'a self, command: &'a str) -> BoxFuture<'a, ExecResult<CommandOutput>>;

    fn make_dir<'a>(&'a self, dir: &'a DirSpec) -> BoxFuture<'a, ExecResult<()>>;

    fn shutdown(&self) -> BoxFuture<'_, ExecResult<()>>;
}

pub trait AgentLauncher: Send + Sync {
    /// Bring up an agent serving `namespace` and return once it is usable.
    fn launch<'a>(&'a self, namespace: &'a str) -> BoxFuture<'a, ExecResult<Arc<dyn Agent>>>;
}
