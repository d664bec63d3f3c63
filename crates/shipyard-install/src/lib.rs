//! shipyard-install: the install orchestrator.
//!
//! [`Installer::run`] takes an install definition through one run:
//!
//! 1. build and sort the release graph (configuration errors stop here)
//! 2. start the executor
//! 3. install each release in order, skipping those the ledger already
//!    marks as succeeded
//! 4. join background work, clean up finished jobs, report
//! 5. stop the executor
//!
//! Each release walks the [`Phase`]s in order. A failure in any phase is
//! written to the ledger and ends the run; the next run resumes there.

pub mod error;
pub mod installer;
pub mod phase;
pub mod render;
pub mod report;
pub mod tasks;
pub mod wait;

use std::future::Future;
use std::pin::Pin;

pub use error::{InstallError, InstallResult, StepError};
pub use installer::Installer;
pub use phase::Phase;
pub use render::{DirValuesSource, NoTemplates, RenderError, ValuesSource};
pub use report::{
    InstallReport, JsonFileReporter, LogReporter, OutcomeStatus, ReleaseOutcome, Reporters,
    RunReporter,
};
pub use tasks::TaskGroup;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
