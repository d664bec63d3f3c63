//! Graph error types. All of them are configuration errors.

use thiserror::Error;

pub type GraphResult<T> = Result<T, GraphError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("release {0} is declared more than once")]
    DuplicateRelease(String),

    #[error("unresolved requirements: {}", format_missing(.missing))]
    MissingRequirements {
        /// `(release, requirement)` pairs, in declaration order.
        missing: Vec<(String, String)>,
    },

    #[error("release dependency graph is not a DAG, cycle among: {}", .releases.join(", "))]
    CycleDetected {
        /// Releases that never reached in-degree zero.
        releases: Vec<String>,
    },
}

fn format_missing(missing: &[(String, String)]) -> String {
    missing
        .iter()
        .map(|(release, req)| format!("{release} requires unknown release {req}"))
        .collect::<Vec<_>>()
        .join("; ")
}
