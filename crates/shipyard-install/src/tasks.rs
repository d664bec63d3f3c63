//! Background work dispatched during a run and joined at its end.

use std::future::Future;

use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, warn};

use crate::error::{InstallError, InstallResult};

/// A set of spawned tasks whose first failure is surfaced on join.
#[derive(Default)]
pub struct TaskGroup {
    set: JoinSet<InstallResult<()>>,
    dispatched: usize,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` onto the runtime. The handle can cancel it early.
    pub fn spawn<F>(&mut self, task: F) -> AbortHandle
    where
        F: Future<Output = InstallResult<()>> + Send + 'static,
    {
        self.dispatched += 1;
        self.set.spawn(task)
    }

    /// Tasks spawned so far, finished or not.
    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    /// Tasks not yet joined.
    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Wait for every task. Returns the first error after all have ended.
    ///
    /// Aborted tasks are not errors; a panicked task is.
    pub async fn join_all(&mut self) -> InstallResult<()> {
        let mut first: Option<InstallError> = None;
        while let Some(joined) = self.set.join_next().await {
            let outcome = match joined {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => {
                    debug!("background task aborted");
                    Ok(())
                }
                Err(e) => Err(InstallError::TaskJoin(e.to_string())),
            };
            if let Err(e) = outcome {
                if first.is_none() {
                    first = Some(e);
                } else {
                    warn!(error = %e, "additional background task failure");
                }
            }
        }
        first.map_or(Ok(()), Err)
    }
}
