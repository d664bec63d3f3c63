//! shipyard-graph: release dependency graph and install ordering.
//!
//! [`ReleaseGraph::build`] resolves every release's requirements into
//! edges and rejects unknown or duplicate names. [`ReleaseGraph::topo_sort_by_kahn`]
//! turns the graph into an [`InstallQueue`], breaking ties by declaration
//! order so identical input always yields an identical queue.

pub mod error;
pub mod graph;
pub mod queue;

pub use error::{GraphError, GraphResult};
pub use graph::ReleaseGraph;
pub use queue::InstallQueue;
