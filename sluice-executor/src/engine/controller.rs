//! Run orchestration.
//!
//! The [`Engine`] owns one run: the component instances created through the
//! registry, their property stores, the port table, and the lifecycle state.
//! It drives the run through
//! configure → start → N × process → stop → shutdown and refuses any call
//! made out of order.

use super::config::{EngineConfig, FailurePolicy};
use super::metrics::{EngineMetrics, RunReport};
use crate::job::JobSpec;
use crate::registry::Registry;
use crate::scheduler::{CycleExecutor, DataflowGraph, Schedule, TaskHandle};
use sluice_core::error::{DeclarationKind, Result, SluiceError};
use sluice_core::ports::PortTable;
use sluice_core::property::PropertyStore;
use sluice_core::state::{Lifecycle, RunState, Transition};
use sluice_core::store::{Store, StoreSchema};
use sluice_core::traits::{
    Component, ComponentKind, ConfigureCtx, LifecycleCtx, Phase, Service, Services, Task,
};
use sluice_core::types::{CycleId, RunId};
use sluice_core::value::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Callback filling a fresh store with externally supplied inputs.
pub type Seeder = Arc<dyn Fn(CycleId, &Store) -> Result<()> + Send + Sync>;

/// Callback receiving a completed cycle's store just before it is dropped.
pub type CycleObserver = Arc<dyn Fn(CycleId, &Store) + Send + Sync>;

struct ComponentSlot {
    type_name: String,
    name: Arc<str>,
    kind: ComponentKind,
    properties: PropertyStore,
    instance: Option<Component>,
}

struct ServiceHandle {
    name: Arc<str>,
    service: Arc<dyn Service>,
    properties: Arc<PropertyStore>,
}

/// Everything computed by a successful configure.
struct Prepared {
    graph: DataflowGraph,
    schedule: Arc<Schedule>,
    schema: Arc<StoreSchema>,
    services: Arc<Services>,
    service_handles: Vec<ServiceHandle>,
    tasks: Vec<TaskHandle>,
}

/// A single pipeline run.
///
/// # Example
///
/// ```ignore
/// let mut engine = Engine::new(EngineConfig::default().with_max_cycles(10), registry);
/// engine.create("producer", "t1")?;
/// engine.create("squarer", "t2")?;
/// engine.set_property("t1", "Value", 2.0)?;
/// let report = engine.run_all().await?;
/// ```
pub struct Engine {
    run_id: RunId,
    config: EngineConfig,
    registry: Arc<Registry>,
    lifecycle: Lifecycle,
    components: Vec<ComponentSlot>,
    index: HashMap<String, usize>,
    ports: PortTable,
    prepared: Option<Prepared>,
    cancel: CancellationToken,
    metrics: Arc<EngineMetrics>,
    seeder: Option<Seeder>,
    observer: Option<CycleObserver>,
}

impl Engine {
    /// Create an engine in the `Undefined` state.
    pub fn new(config: EngineConfig, registry: Arc<Registry>) -> Self {
        Self {
            run_id: RunId::new(),
            config,
            registry,
            lifecycle: Lifecycle::new(),
            components: Vec::new(),
            index: HashMap::new(),
            ports: PortTable::new(),
            prepared: None,
            cancel: CancellationToken::new(),
            metrics: Arc::new(EngineMetrics::default()),
            seeder: None,
            observer: None,
        }
    }

    /// Assemble an engine from a job description.
    ///
    /// The job's settings are applied on top of `base`, then every component
    /// is created and its property overrides applied.
    pub fn from_job(job: &JobSpec, base: EngineConfig, registry: Arc<Registry>) -> Result<Self> {
        let config = job.settings.apply(base)?;
        let mut engine = Self::new(config, registry);
        for entry in &job.components {
            engine.create(&entry.type_name, &entry.name)?;
            for (prop, value) in &entry.props {
                engine.set_property(&entry.name, prop, value.clone())?;
            }
        }
        Ok(engine)
    }

    /// The run identifier.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// The current run state.
    pub fn state(&self) -> RunState {
        self.lifecycle.state()
    }

    /// The configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Live counters.
    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Token that cancels the cycle loop when triggered.
    ///
    /// In-flight cycles finish; no further cycle starts.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Install a callback that seeds every fresh store.
    pub fn set_seeder<F>(&mut self, seeder: F)
    where
        F: Fn(CycleId, &Store) -> Result<()> + Send + Sync + 'static,
    {
        self.seeder = Some(Arc::new(seeder));
    }

    /// Install a callback that inspects every completed store.
    pub fn set_cycle_observer<F>(&mut self, observer: F)
    where
        F: Fn(CycleId, &Store) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
    }

    /// Create a component instance through the registry.
    pub fn create(&mut self, type_name: &str, name: &str) -> Result<()> {
        self.lifecycle
            .require(RunState::Undefined, "create a component")?;
        if let Some(&existing) = self.index.get(name) {
            return Err(SluiceError::DuplicateDeclaration {
                kind: DeclarationKind::ComponentInstance,
                name: name.to_string(),
                owner: self.components[existing].type_name.clone(),
                claimant: type_name.to_string(),
            });
        }

        let mut properties = PropertyStore::new(name);
        let component = self.registry.create(type_name, name, &mut properties)?;
        let kind = component.kind();
        if kind == ComponentKind::Task {
            self.ports.add_task(name);
        }

        tracing::debug!(
            run_id = %self.run_id,
            component = %name,
            r#type = %type_name,
            kind = %kind,
            "Created component"
        );

        self.index.insert(name.to_string(), self.components.len());
        self.components.push(ComponentSlot {
            type_name: type_name.to_string(),
            name: Arc::from(name),
            kind,
            properties,
            instance: Some(component),
        });
        Ok(())
    }

    /// Override a property of a created component. Allowed once per property,
    /// before configure.
    pub fn set_property(
        &mut self,
        component: &str,
        property: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        self.lifecycle
            .require(RunState::Undefined, "override a property")?;
        let slot = self.slot_mut(component)?;
        slot.properties.override_value(property, value)
    }

    /// Read a component's property.
    pub fn property(&self, component: &str, property: &str) -> Result<&Value> {
        self.slot(component)?.properties.get(property)
    }

    /// The dataflow graph, available once configured.
    pub fn graph(&self) -> Option<&DataflowGraph> {
        self.prepared.as_ref().map(|p| &p.graph)
    }

    /// The execution schedule, available once configured.
    pub fn schedule(&self) -> Option<&Schedule> {
        self.prepared.as_ref().map(|p| p.schedule.as_ref())
    }

    /// Configure every component, then build and validate the dataflow graph.
    ///
    /// Services configure first, then tasks, each in creation order. Any
    /// failure leaves the run in `Configuring`.
    #[instrument(skip(self), fields(run_id = %self.run_id, components = self.components.len()))]
    pub fn configure(&mut self) -> Result<()> {
        self.lifecycle.advance(Transition::BeginConfigure)?;

        for kind in [ComponentKind::Service, ComponentKind::Task] {
            for slot in self.components.iter_mut().filter(|s| s.kind == kind) {
                let mut ctx = ConfigureCtx::new(
                    self.run_id,
                    &slot.name,
                    slot.kind,
                    &self.lifecycle,
                    &mut slot.properties,
                    &mut self.ports,
                );
                let result = match slot.instance.as_mut() {
                    Some(Component::Task(task)) => task.configure(&mut ctx),
                    Some(Component::Service(service)) => service.configure(&mut ctx),
                    None => Ok(()),
                };
                result.map_err(|e| hook_failure(&slot.name, Phase::Configure, e))?;
                slot.properties.freeze();
            }
        }

        let graph = DataflowGraph::build(&self.ports, self.config.strict_inputs)?;
        let schedule = Arc::new(graph.schedule()?);

        if let Some(path) = &self.config.dot_file {
            std::fs::write(path, graph.to_dot()).map_err(|e| SluiceError::Io {
                path: path.clone(),
                cause: e.to_string(),
            })?;
        }

        self.prepared = Some(self.prepare(graph, schedule)?);
        self.lifecycle.advance(Transition::Configured)?;

        if let Some(schedule) = self.schedule() {
            tracing::info!(
                run_id = %self.run_id,
                order = ?schedule.order_names(),
                layers = schedule.layers().len(),
                "Configured"
            );
        }
        Ok(())
    }

    /// Share the configured instances for the start, process and stop phases.
    fn prepare(&mut self, graph: DataflowGraph, schedule: Arc<Schedule>) -> Result<Prepared> {
        let mut services = Services::new();
        let mut service_handles = Vec::new();
        let mut tasks_by_name: HashMap<Arc<str>, (Arc<dyn Task>, Arc<PropertyStore>)> =
            HashMap::new();

        for slot in &mut self.components {
            let properties = Arc::new(slot.properties.clone());
            match slot.instance.take() {
                Some(Component::Service(service)) => {
                    let service: Arc<dyn Service> = Arc::from(service);
                    services.insert(slot.name.to_string(), Arc::clone(&service));
                    service_handles.push(ServiceHandle {
                        name: Arc::clone(&slot.name),
                        service,
                        properties,
                    });
                }
                Some(Component::Task(task)) => {
                    tasks_by_name.insert(Arc::clone(&slot.name), (Arc::from(task), properties));
                }
                None => {}
            }
        }

        let mut tasks = Vec::with_capacity(graph.len());
        for node in graph.nodes() {
            let (task, properties) = tasks_by_name.remove(node.name.as_str()).ok_or_else(|| {
                SluiceError::UnknownComponent {
                    name: node.name.clone(),
                }
            })?;
            let ports = self.ports.task(&node.name).cloned().ok_or_else(|| {
                SluiceError::UnknownComponent {
                    name: node.name.clone(),
                }
            })?;
            tasks.push(TaskHandle {
                name: Arc::from(node.name.as_str()),
                task,
                ports: Arc::new(ports),
                properties,
            });
        }

        Ok(Prepared {
            schema: Arc::new(self.ports.schema()),
            graph,
            schedule,
            services: Arc::new(services),
            service_handles,
            tasks,
        })
    }

    /// Start services in creation order, then tasks in topological order.
    ///
    /// Any failure leaves the run in `Starting`.
    #[instrument(skip(self), fields(run_id = %self.run_id))]
    pub fn start(&mut self) -> Result<()> {
        self.lifecycle.advance(Transition::BeginStart)?;
        let prepared = self.prepared_or("start")?;

        for handle in &prepared.service_handles {
            let ctx = self.lifecycle_ctx(prepared, &handle.name, &handle.properties);
            handle
                .service
                .start(&ctx)
                .map_err(|e| hook_failure(&handle.name, Phase::Start, e))?;
        }
        for &index in prepared.schedule.order() {
            let handle = &prepared.tasks[index];
            let ctx = self.lifecycle_ctx(prepared, &handle.name, &handle.properties);
            handle
                .task
                .start(&ctx)
                .map_err(|e| hook_failure(&handle.name, Phase::Start, e))?;
        }

        self.lifecycle.advance(Transition::Started)?;
        tracing::info!(run_id = %self.run_id, "Started");
        Ok(())
    }

    /// Execute the cycle loop.
    ///
    /// Runs until `max_cycles` cycles have started, the cancel token fires or a
    /// task signals end of stream. At most `cycles_in_flight` cycles execute at
    /// once. Always leaves the run in `Stopping`; under the abort policy the
    /// first cycle failure is returned once in-flight cycles have drained.
    ///
    /// On cancellation, running `process` calls finish but no further task is
    /// released. Cycles cut short this way count as cancelled, not completed,
    /// and are not passed to the cycle observer.
    #[instrument(
        skip(self),
        fields(
            run_id = %self.run_id,
            max_cycles = ?self.config.max_cycles,
            cycles_in_flight = self.config.cycles_in_flight,
            workers = self.config.workers,
        )
    )]
    pub async fn run(&mut self) -> Result<RunReport> {
        self.lifecycle.advance(Transition::BeginLoop)?;
        let prepared = self.prepared_or("run")?;

        let executor = Arc::new(CycleExecutor::new(
            self.run_id,
            Arc::clone(&prepared.schedule),
            prepared.tasks.clone(),
            Arc::clone(&prepared.services),
            self.config.workers,
            Arc::clone(&self.metrics),
            self.cancel.clone(),
        ));
        let schema = Arc::clone(&prepared.schema);
        let timeout = self.config.cycle_timeout;
        let in_flight = self.config.cycles_in_flight.max(1);

        let started = Instant::now();
        let mut cycles: JoinSet<(Arc<Store>, Result<()>)> = JoinSet::new();
        let mut next = 0u64;
        let mut draining = false;
        let mut end_of_stream = false;
        let mut cancelled = false;
        let mut failure: Option<SluiceError> = None;

        loop {
            while !draining && cycles.len() < in_flight {
                if self.config.max_cycles.is_some_and(|max| next >= max) {
                    draining = true;
                    break;
                }
                if self.cancel.is_cancelled() {
                    tracing::info!(run_id = %self.run_id, next_cycle = next, "Run cancelled");
                    cancelled = true;
                    draining = true;
                    break;
                }

                let cycle = CycleId::new(next);
                next += 1;
                let store = Arc::new(Store::new(cycle, Arc::clone(&schema)));
                self.metrics.record_cycle_start();

                if let Some(seeder) = &self.seeder {
                    if let Err(e) = seeder(cycle, store.as_ref()) {
                        let e = hook_failure("seeder", Phase::Process, e);
                        if self.on_cycle_failure(cycle, e, &mut failure) {
                            draining = true;
                        }
                        // Nothing else awaits between skipped seedings.
                        tokio::task::yield_now().await;
                        continue;
                    }
                }

                let executor = Arc::clone(&executor);
                cycles.spawn(async move {
                    let result = match timeout {
                        Some(budget) => {
                            match tokio::time::timeout(budget, executor.run_cycle(Arc::clone(&store)))
                                .await
                            {
                                Ok(result) => result,
                                Err(_) => Err(SluiceError::CycleTimeout {
                                    cycle: cycle.as_u64(),
                                    timeout_ms: u64::try_from(budget.as_millis())
                                        .unwrap_or(u64::MAX),
                                }),
                            }
                        }
                        None => executor.run_cycle(Arc::clone(&store)).await,
                    };
                    (store, result)
                });
            }

            let Some(joined) = cycles.join_next().await else {
                break;
            };
            let (store, result) = match joined {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    tracing::error!(run_id = %self.run_id, error = %join_error, "Cycle join error");
                    failure.get_or_insert(SluiceError::msg(format!("cycle aborted: {join_error}")));
                    self.metrics.record_cycle_failed();
                    draining = true;
                    continue;
                }
            };
            let cycle = store.cycle();

            match result {
                Ok(()) => {
                    self.metrics.record_cycle_complete();
                    if let Some(observer) = &self.observer {
                        observer(cycle, store.as_ref());
                    }
                    tracing::debug!(run_id = %self.run_id, cycle = %cycle, keys = store.len(), "Cycle completed");
                }
                Err(SluiceError::Cancelled) => {
                    self.metrics.record_cycle_cancelled();
                    tracing::info!(run_id = %self.run_id, cycle = %cycle, "Cycle cancelled");
                    cancelled = true;
                    draining = true;
                }
                Err(e) if e.is_end_of_stream() => {
                    self.metrics.record_cycle_ended();
                    if !end_of_stream {
                        tracing::info!(run_id = %self.run_id, cycle = %cycle, "End of stream");
                    }
                    end_of_stream = true;
                    draining = true;
                }
                Err(e) => {
                    if self.on_cycle_failure(cycle, e, &mut failure) {
                        draining = true;
                    }
                }
            }
        }

        self.lifecycle.advance(Transition::LoopEnded)?;

        let report = RunReport::from_metrics(
            self.run_id,
            &self.metrics,
            end_of_stream,
            cancelled,
            started.elapsed(),
        );
        tracing::info!(
            run_id = %self.run_id,
            cycles_completed = report.cycles_completed,
            cycles_skipped = report.cycles_skipped,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Cycle loop ended"
        );

        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Apply the failure policy. Returns `true` if the loop must drain.
    fn on_cycle_failure(
        &self,
        cycle: CycleId,
        error: SluiceError,
        failure: &mut Option<SluiceError>,
    ) -> bool {
        match self.config.failure_policy {
            FailurePolicy::SkipCycle => {
                self.metrics.record_cycle_skipped();
                tracing::warn!(run_id = %self.run_id, cycle = %cycle, error = %error, "Skipping failed cycle");
                false
            }
            FailurePolicy::Abort => {
                self.metrics.record_cycle_failed();
                tracing::error!(run_id = %self.run_id, cycle = %cycle, error = %error, "Cycle failed, aborting run");
                failure.get_or_insert(error);
                true
            }
        }
    }

    /// Stop tasks in reverse topological order, then services in reverse
    /// creation order.
    ///
    /// Every stop hook is attempted. The run reaches `Stopped` even if some
    /// fail; the failures are returned together.
    #[instrument(skip(self), fields(run_id = %self.run_id))]
    pub fn stop(&mut self) -> Result<()> {
        self.lifecycle.require(RunState::Stopping, "stop")?;
        let prepared = self.prepared_or("stop")?;
        let mut failures = Vec::new();

        for &index in prepared.schedule.order().iter().rev() {
            let handle = &prepared.tasks[index];
            let ctx = self.lifecycle_ctx(prepared, &handle.name, &handle.properties);
            if let Err(e) = handle.task.stop(&ctx) {
                tracing::error!(run_id = %self.run_id, component = %handle.name, error = %e, "Stop failed");
                failures.push((handle.name.to_string(), e.to_string()));
            }
        }
        for handle in prepared.service_handles.iter().rev() {
            let ctx = self.lifecycle_ctx(prepared, &handle.name, &handle.properties);
            if let Err(e) = handle.service.stop(&ctx) {
                tracing::error!(run_id = %self.run_id, component = %handle.name, error = %e, "Stop failed");
                failures.push((handle.name.to_string(), e.to_string()));
            }
        }

        self.lifecycle.advance(Transition::Stopped)?;
        tracing::info!(run_id = %self.run_id, failures = failures.len(), "Stopped");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(SluiceError::StopFailures { failures })
        }
    }

    /// Release every component and move to the terminal state.
    pub fn shutdown(&mut self) -> Result<()> {
        self.lifecycle.advance(Transition::Shutdown)?;
        self.prepared = None;
        tracing::info!(run_id = %self.run_id, "Offline");
        Ok(())
    }

    /// Configure, start, run, stop and shut down.
    ///
    /// Configure and start failures are returned immediately. After the cycle
    /// loop, teardown always runs; a loop failure takes precedence over stop
    /// failures in the returned error.
    pub async fn run_all(&mut self) -> Result<RunReport> {
        self.configure()?;
        self.start()?;
        let outcome = self.run().await;
        let stopped = self.stop();
        self.shutdown()?;

        match (outcome, stopped) {
            (Err(e), Err(stop)) => {
                tracing::warn!(run_id = %self.run_id, error = %stop, "Teardown also failed");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(_), Err(stop)) => Err(stop),
            (Ok(report), Ok(())) => Ok(report),
        }
    }

    fn prepared_or(&self, operation: &str) -> Result<&Prepared> {
        self.prepared
            .as_ref()
            .ok_or_else(|| SluiceError::IllegalStateTransition {
                current: self.lifecycle.state(),
                operation: operation.to_string(),
            })
    }

    fn lifecycle_ctx(
        &self,
        prepared: &Prepared,
        name: &Arc<str>,
        properties: &Arc<PropertyStore>,
    ) -> LifecycleCtx {
        LifecycleCtx::new(
            self.run_id,
            Arc::clone(name),
            Arc::clone(properties),
            Arc::clone(&prepared.services),
        )
    }

    fn slot(&self, name: &str) -> Result<&ComponentSlot> {
        self.index
            .get(name)
            .map(|&i| &self.components[i])
            .ok_or_else(|| SluiceError::UnknownComponent {
                name: name.to_string(),
            })
    }

    fn slot_mut(&mut self, name: &str) -> Result<&mut ComponentSlot> {
        match self.index.get(name) {
            Some(&i) => Ok(&mut self.components[i]),
            None => Err(SluiceError::UnknownComponent {
                name: name.to_string(),
            }),
        }
    }
}

/// Wrap a hook error, letting configuration defects through unchanged.
fn hook_failure(component: &str, phase: Phase, error: SluiceError) -> SluiceError {
    if error.is_config_error() {
        return error;
    }
    SluiceError::ComponentFailure {
        component: component.to_string(),
        phase,
        source: Box::new(error),
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("run_id", &self.run_id)
            .field("state", &self.state())
            .field("components", &self.components.len())
            .finish()
    }
}
