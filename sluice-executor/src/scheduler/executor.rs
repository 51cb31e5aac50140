//! Per-cycle task execution.
//!
//! Each cycle is driven by a dependency-counting scheduler: a task is released
//! as soon as every producer it reads from has completed in the same cycle.
//! Released tasks are spawned onto the runtime and wait on a semaphore shared
//! by all cycles in flight, which bounds the number of concurrent `process`
//! calls to the configured worker count.
//!
//! On the first failure no further task of the cycle is released; tasks
//! already running are allowed to finish before the error is returned.
//! Cancelling the run has the same effect, and a cycle that could not run all
//! of its tasks because of it returns [`SluiceError::Cancelled`].

use super::schedule::Schedule;
use crate::engine::EngineMetrics;
use sluice_core::error::{Result, SluiceError};
use sluice_core::ports::TaskPorts;
use sluice_core::property::PropertyStore;
use sluice_core::store::Store;
use sluice_core::traits::{CycleContext, Phase, Services, Task};
use sluice_core::types::RunId;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// A configured task ready to be invoked.
#[derive(Clone)]
pub(crate) struct TaskHandle {
    pub(crate) name: Arc<str>,
    pub(crate) task: Arc<dyn Task>,
    pub(crate) ports: Arc<TaskPorts>,
    pub(crate) properties: Arc<PropertyStore>,
}

struct TaskCompletion {
    index: usize,
    result: Result<()>,
}

/// Runs the tasks of one cycle in dependency order.
pub(crate) struct CycleExecutor {
    run_id: RunId,
    schedule: Arc<Schedule>,
    tasks: Vec<TaskHandle>,
    services: Arc<Services>,
    semaphore: Arc<Semaphore>,
    metrics: Arc<EngineMetrics>,
    cancel: CancellationToken,
}

impl CycleExecutor {
    pub(crate) fn new(
        run_id: RunId,
        schedule: Arc<Schedule>,
        tasks: Vec<TaskHandle>,
        services: Arc<Services>,
        workers: usize,
        metrics: Arc<EngineMetrics>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            run_id,
            schedule,
            tasks,
            services,
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
            metrics,
            cancel,
        }
    }

    /// Execute every task once against `store`.
    #[instrument(
        skip(self, store),
        fields(run_id = %self.run_id, cycle = %store.cycle(), tasks = self.tasks.len())
    )]
    pub(crate) async fn run_cycle(&self, store: Arc<Store>) -> Result<()> {
        let mut pending = self.schedule.pending_counts();
        let mut running: JoinSet<TaskCompletion> = JoinSet::new();
        let mut failure: Option<SluiceError> = None;
        let mut withheld = false;

        if self.cancel.is_cancelled() {
            return Err(SluiceError::Cancelled);
        }
        for &index in self.schedule.order() {
            if pending[index] == 0 {
                self.spawn_task(&mut running, index, &store);
            }
        }

        while let Some(joined) = running.join_next().await {
            let completion = match joined {
                Ok(completion) => completion,
                Err(join_error) => {
                    let cause = if join_error.is_panic() {
                        "task panicked during process"
                    } else {
                        "task was cancelled during process"
                    };
                    tracing::error!(cycle = %store.cycle(), error = %cause, "Task join error");
                    failure.get_or_insert(SluiceError::msg(cause));
                    continue;
                }
            };

            match completion.result {
                Ok(()) if failure.is_none() && !self.cancel.is_cancelled() => {
                    for &next in self.schedule.successors(completion.index) {
                        pending[next] -= 1;
                        if pending[next] == 0 {
                            self.spawn_task(&mut running, next, &store);
                        }
                    }
                }
                Ok(()) => {
                    withheld |= !self.schedule.successors(completion.index).is_empty();
                }
                Err(SluiceError::Cancelled) => withheld = true,
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None if withheld => {
                tracing::debug!(cycle = %store.cycle(), "Cycle cut short by cancellation");
                Err(SluiceError::Cancelled)
            }
            None => Ok(()),
        }
    }

    fn spawn_task(&self, running: &mut JoinSet<TaskCompletion>, index: usize, store: &Arc<Store>) {
        let handle = self.tasks[index].clone();
        let ctx = CycleContext::new(
            self.run_id,
            Arc::clone(&handle.ports),
            Arc::clone(store),
            Arc::clone(&handle.properties),
            Arc::clone(&self.services),
        );
        let semaphore = Arc::clone(&self.semaphore);
        let metrics = Arc::clone(&self.metrics);
        let cancel = self.cancel.clone();

        running.spawn(async move {
            let result = Self::invoke(handle, ctx, semaphore, metrics, cancel).await;
            TaskCompletion { index, result }
        });
    }

    async fn invoke(
        handle: TaskHandle,
        ctx: CycleContext,
        semaphore: Arc<Semaphore>,
        metrics: Arc<EngineMetrics>,
        cancel: CancellationToken,
    ) -> Result<()> {
        // A task still waiting for a worker when the run is cancelled never starts.
        let _permit = tokio::select! {
            permit = semaphore.acquire_owned() => permit.map_err(|_| SluiceError::Cancelled)?,
            () = cancel.cancelled() => return Err(SluiceError::Cancelled),
        };

        let cycle = ctx.cycle();
        tracing::trace!(cycle = %cycle, component = %handle.name, "Processing");

        let started = Instant::now();
        let result = handle.task.process(ctx).await;
        metrics.record_task(started.elapsed());

        result.map_err(|e| {
            if !e.is_end_of_stream() {
                tracing::error!(cycle = %cycle, component = %handle.name, error = %e, "Task failed");
            }
            SluiceError::ComponentFailure {
                component: handle.name.to_string(),
                phase: Phase::Process,
                source: Box::new(e),
            }
        })
    }
}
