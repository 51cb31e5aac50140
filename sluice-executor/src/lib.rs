//! Sluice Executor - dataflow pipeline engine.
//!
//! This crate provides the execution infrastructure for sluice:
//! - Component registry keyed by type name
//! - Dataflow graph builder with Tarjan cycle detection
//! - Topological scheduler running independent tasks concurrently
//! - Lifecycle-driving engine with failure policies and cancellation
//! - YAML job descriptions
//! - Tracing subscriber setup

#![warn(missing_docs)]

pub mod engine;
pub mod job;
pub mod observability;
pub mod registry;
pub mod scheduler;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::engine::{
        CycleObserver, Engine, EngineConfig, EngineMetrics, FailurePolicy, RunReport, Seeder,
    };
    pub use crate::job::{ComponentSpec, JobSettings, JobSpec};
    pub use crate::observability::{LogFormat, TracingConfig, init_tracing};
    pub use crate::registry::Registry;
    pub use crate::scheduler::{DataflowGraph, Schedule};
    pub use sluice_core::prelude::*;
}
