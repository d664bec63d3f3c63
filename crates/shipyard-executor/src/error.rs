//! Executor error types.

use thiserror::Error;

pub type ExecResult<T> = Result<T, ExecError>;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("command `{command}` failed with exit code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to prepare directory {path}: {reason}")]
    Dir { path: String, reason: String },

    #[error("agent at {address} unavailable: {reason}")]
    Unavailable { address: String, reason: String },

    #[error("agent transport error: {0}")]
    Transport(String),

    #[error("agent protocol error: {0}")]
    Protocol(String),

    #[error("executor already stopped")]
    Stopped,
}
