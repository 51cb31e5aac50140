//! Dataflow scheduling.
//!
//! Turns the ports declared during configure into a dependency graph, rejects
//! cyclic graphs, derives a topological [`Schedule`] and drives each cycle's
//! tasks through a bounded worker pool.

mod executor;
mod graph;
mod schedule;
mod tarjan;

pub(crate) use executor::{CycleExecutor, TaskHandle};
pub use graph::{DataflowGraph, Edge, ExternalInput, GraphNode};
pub use schedule::Schedule;
pub use tarjan::strongly_connected;
