//! Run counters and the report returned at the end of a run.

use serde::Serialize;
use sluice_core::types::RunId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters updated while a run executes.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Cycles whose store was created and tasks released.
    pub cycles_started: AtomicU64,
    /// Cycles in which every task succeeded.
    pub cycles_completed: AtomicU64,
    /// Cycles that failed and were skipped under the skip-cycle policy.
    pub cycles_skipped: AtomicU64,
    /// Cycles that failed and aborted the run.
    pub cycles_failed: AtomicU64,
    /// Cycles ended by an end-of-stream signal.
    pub cycles_ended: AtomicU64,
    /// Cycles cut short by cancellation.
    pub cycles_cancelled: AtomicU64,
    /// Cycles currently executing.
    pub cycles_active: AtomicU64,
    /// Task `process` calls that returned.
    pub task_invocations: AtomicU64,
    /// Total time spent inside `process` calls, in microseconds.
    pub total_process_us: AtomicU64,
}

impl EngineMetrics {
    /// Record a cycle start.
    pub fn record_cycle_start(&self) {
        self.cycles_started.fetch_add(1, Ordering::Relaxed);
        self.cycles_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful cycle.
    pub fn record_cycle_complete(&self) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.cycles_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a cycle skipped after a failure.
    pub fn record_cycle_skipped(&self) {
        self.cycles_skipped.fetch_add(1, Ordering::Relaxed);
        self.cycles_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a cycle that aborted the run.
    pub fn record_cycle_failed(&self) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
        self.cycles_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a cycle ended by end of stream.
    pub fn record_cycle_ended(&self) {
        self.cycles_ended.fetch_add(1, Ordering::Relaxed);
        self.cycles_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a cycle cut short by cancellation.
    pub fn record_cycle_cancelled(&self) {
        self.cycles_cancelled.fetch_add(1, Ordering::Relaxed);
        self.cycles_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record one `process` call and its duration.
    pub fn record_task(&self, elapsed: Duration) {
        self.task_invocations.fetch_add(1, Ordering::Relaxed);
        self.total_process_us.fetch_add(
            u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
    }

    /// Fraction of started cycles that failed or were skipped.
    pub fn failure_rate(&self) -> f64 {
        let started = self.cycles_started.load(Ordering::Relaxed);
        let failed = self.cycles_failed.load(Ordering::Relaxed)
            + self.cycles_skipped.load(Ordering::Relaxed);
        if started == 0 {
            0.0
        } else {
            failed as f64 / started as f64
        }
    }
}

/// Summary of one call to the cycle loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// The run.
    pub run_id: RunId,
    /// Cycles started.
    pub cycles_started: u64,
    /// Cycles completed successfully.
    pub cycles_completed: u64,
    /// Cycles skipped after a failure.
    pub cycles_skipped: u64,
    /// Cycles cut short by cancellation.
    pub cycles_cancelled: u64,
    /// Whether a task signalled end of stream.
    pub end_of_stream: bool,
    /// Whether cancellation stopped the loop.
    pub cancelled: bool,
    /// Task `process` calls made.
    pub task_invocations: u64,
    /// Wall-clock duration of the loop.
    pub elapsed: Duration,
}

impl RunReport {
    pub(crate) fn from_metrics(
        run_id: RunId,
        metrics: &EngineMetrics,
        end_of_stream: bool,
        cancelled: bool,
        elapsed: Duration,
    ) -> Self {
        Self {
            run_id,
            cycles_started: metrics.cycles_started.load(Ordering::Relaxed),
            cycles_completed: metrics.cycles_completed.load(Ordering::Relaxed),
            cycles_skipped: metrics.cycles_skipped.load(Ordering::Relaxed),
            cycles_cancelled: metrics.cycles_cancelled.load(Ordering::Relaxed),
            end_of_stream,
            cancelled,
            task_invocations: metrics.task_invocations.load(Ordering::Relaxed),
            elapsed,
        }
    }
}
