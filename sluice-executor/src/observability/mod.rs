//! Logging setup for processes embedding the engine.
//!
//! The engine itself only emits `tracing` events; installing a subscriber is
//! left to the binary. [`init_tracing`] installs one configured from
//! [`TracingConfig`], which can be read from the environment:
//!
//! - `SLUICE_LOG_FORMAT`: `json`, `pretty` or `compact`
//! - `SLUICE_LOG_LEVEL` (or `RUST_LOG`): an `EnvFilter` directive string
//!
//! # Example
//!
//! ```ignore
//! use sluice_executor::observability::{TracingConfig, init_tracing};
//!
//! let _guard = init_tracing(TracingConfig::from_env())?;
//! ```

mod config;
mod tracing_setup;

pub use config::{LogFormat, TracingConfig, TracingConfigBuilder};
pub use tracing_setup::{TracingGuard, init_tracing};
