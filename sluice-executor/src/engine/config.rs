//! Engine configuration.

use serde::{Deserialize, Serialize};
use sluice_core::error::SluiceError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// What the engine does when a task fails during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop starting cycles, let in-flight ones finish, then fail the run.
    #[default]
    Abort,
    /// Discard the failed cycle's store and continue with the next cycle.
    SkipCycle,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => f.write_str("abort"),
            Self::SkipCycle => f.write_str("skip_cycle"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = SluiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "abort" => Ok(Self::Abort),
            "skip" | "skip_cycle" => Ok(Self::SkipCycle),
            other => Err(SluiceError::ConfigValue {
                field: "failure_policy".to_string(),
                cause: format!("unknown policy '{other}', expected 'abort' or 'skip_cycle'"),
            }),
        }
    }
}

/// Configuration for an [`Engine`](super::Engine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum concurrent `process` calls across all cycles in flight.
    pub workers: usize,
    /// Number of cycles to run; `None` runs until cancelled or end of stream.
    pub max_cycles: Option<u64>,
    /// Cycles executed concurrently, each with its own store.
    pub cycles_in_flight: usize,
    /// Per-cycle time budget.
    pub cycle_timeout: Option<Duration>,
    /// Reaction to a failed cycle.
    pub failure_policy: FailurePolicy,
    /// Reject input keys that no task produces.
    pub strict_inputs: bool,
    /// Write the dataflow graph in DOT format here after configure.
    pub dot_file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_cycles: None,
            cycles_in_flight: 1,
            cycle_timeout: None,
            failure_policy: FailurePolicy::default(),
            strict_inputs: false,
            dot_file: None,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}

impl EngineConfig {
    /// Create configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `SLUICE_WORKERS`: worker-pool bound
    /// - `SLUICE_MAX_CYCLES`: cycle count; a negative value means unbounded
    /// - `SLUICE_CYCLES_IN_FLIGHT`: concurrently executing cycles
    /// - `SLUICE_CYCLE_TIMEOUT_MS`: per-cycle budget in milliseconds
    /// - `SLUICE_FAILURE_POLICY`: `abort` or `skip_cycle`
    /// - `SLUICE_STRICT_INPUTS`: `true` to reject inputs without producer
    /// - `SLUICE_DOT_FILE`: path of the DOT dump
    ///
    /// Unparseable values are ignored with a warning.
    ///
    /// # Example
    ///
    /// ```bash
    /// export SLUICE_WORKERS=8
    /// export SLUICE_MAX_CYCLES=10000
    /// export SLUICE_FAILURE_POLICY=skip_cycle
    /// ```
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse::<T>() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(var = %key, value = %raw, "Ignoring invalid configuration value");
                    None
                }
            }
        }

        let mut config = Self::default();

        if let Some(workers) = parsed::<usize>("SLUICE_WORKERS", lookup("SLUICE_WORKERS")) {
            config = config.with_workers(workers);
        }
        if let Some(max) = parsed::<i64>("SLUICE_MAX_CYCLES", lookup("SLUICE_MAX_CYCLES")) {
            config.max_cycles = u64::try_from(max).ok();
        }
        if let Some(n) = parsed::<usize>("SLUICE_CYCLES_IN_FLIGHT", lookup("SLUICE_CYCLES_IN_FLIGHT"))
        {
            config = config.with_cycles_in_flight(n);
        }
        if let Some(ms) = parsed::<u64>("SLUICE_CYCLE_TIMEOUT_MS", lookup("SLUICE_CYCLE_TIMEOUT_MS"))
        {
            config.cycle_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(policy) =
            parsed::<FailurePolicy>("SLUICE_FAILURE_POLICY", lookup("SLUICE_FAILURE_POLICY"))
        {
            config.failure_policy = policy;
        }
        if let Some(strict) = lookup("SLUICE_STRICT_INPUTS") {
            config.strict_inputs = strict.eq_ignore_ascii_case("true") || strict == "1";
        }
        if let Some(path) = lookup("SLUICE_DOT_FILE") {
            config.dot_file = Some(PathBuf::from(path));
        }

        config
    }

    /// Set the worker-pool bound (at least 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Run exactly `cycles` cycles.
    pub fn with_max_cycles(mut self, cycles: u64) -> Self {
        self.max_cycles = Some(cycles);
        self
    }

    /// Run until cancelled or a task signals end of stream.
    pub fn unbounded(mut self) -> Self {
        self.max_cycles = None;
        self
    }

    /// Set how many cycles may execute concurrently (at least 1).
    pub fn with_cycles_in_flight(mut self, cycles: usize) -> Self {
        self.cycles_in_flight = cycles.max(1);
        self
    }

    /// Set the per-cycle time budget.
    pub fn with_cycle_timeout(mut self, timeout: Duration) -> Self {
        self.cycle_timeout = Some(timeout);
        self
    }

    /// Set the failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Reject inputs with no producing task.
    pub fn with_strict_inputs(mut self, strict: bool) -> Self {
        self.strict_inputs = strict;
        self
    }

    /// Dump the dataflow graph to `path` after configure.
    pub fn with_dot_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.dot_file = Some(path.into());
        self
    }
}
