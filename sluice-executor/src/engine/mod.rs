//! Run orchestration: configuration, lifecycle driving and run metrics.

mod config;
mod controller;
mod metrics;

pub use config::{EngineConfig, FailurePolicy};
pub use controller::{CycleObserver, Engine, Seeder};
pub use metrics::{EngineMetrics, RunReport};
