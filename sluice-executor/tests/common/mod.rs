//! Common test components for integration tests.

#![allow(dead_code)]

use sluice_core::prelude::*;
use sluice_executor::engine::{Engine, EngineConfig};
use sluice_executor::registry::Registry;
use std::any::Any;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared recorder of lifecycle events and concurrency.
#[derive(Default)]
pub struct Journal {
    events: Mutex<Vec<String>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Journal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Events starting with `prefix`, with the prefix stripped.
    pub fn events_with(&self, prefix: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| e.strip_prefix(prefix).map(str::to_string))
            .collect()
    }

    pub fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Produces `a` and `b` as `f64`.
pub struct Producer {
    a: f64,
    b: f64,
}

impl Task for Producer {
    fn configure(&mut self, ctx: &mut ConfigureCtx<'_>) -> Result<()> {
        self.a = ctx.property("A")?;
        self.b = ctx.property("B")?;
        ctx.declare_output::<f64>("a")?;
        ctx.declare_output::<f64>("b")
    }

    fn process<'a>(&'a self, ctx: CycleContext) -> TaskFuture<'a> {
        Box::pin(async move {
            ctx.put("a", self.a)?;
            ctx.put("b", self.b)
        })
    }
}

/// Reads one `f64` key and writes its square.
pub struct Squarer {
    input: String,
    output: String,
}

impl Task for Squarer {
    fn configure(&mut self, ctx: &mut ConfigureCtx<'_>) -> Result<()> {
        self.input = ctx.property("Input")?;
        self.output = ctx.property("Output")?;
        ctx.declare_input::<f64>(&self.input)?;
        ctx.declare_output::<f64>(&self.output)
    }

    fn process<'a>(&'a self, ctx: CycleContext) -> TaskFuture<'a> {
        Box::pin(async move {
            let v = ctx.get::<f64>(&self.input)?;
            ctx.put(&self.output, *v * *v)
        })
    }
}

/// Writes an empty `Vec<f64>` under `d`.
pub struct EmptyList;

impl Task for EmptyList {
    fn configure(&mut self, ctx: &mut ConfigureCtx<'_>) -> Result<()> {
        ctx.declare_output::<Vec<f64>>("d")
    }

    fn process<'a>(&'a self, ctx: CycleContext) -> TaskFuture<'a> {
        Box::pin(async move { ctx.put("d", Vec::<f64>::new()) })
    }
}

/// Configurable task passing the cycle number along `u64` keys.
///
/// Properties:
/// - `Inputs` / `Outputs`: key lists
/// - `DelayMs`: sleep inside `process`
/// - `FailOnCycle`: return an error on that cycle
/// - `EndAtCycle`: signal end of stream from that cycle on
/// - `FailStart` / `FailStop`: fail the lifecycle hook
pub struct Relay {
    journal: Arc<Journal>,
    name: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    delay: Duration,
    fail_on: Option<u64>,
    end_at: Option<u64>,
    fail_start: bool,
    fail_stop: bool,
}

impl Relay {
    fn new(journal: Arc<Journal>) -> Self {
        Self {
            journal,
            name: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            delay: Duration::ZERO,
            fail_on: None,
            end_at: None,
            fail_start: false,
            fail_stop: false,
        }
    }

    fn declare(ctx: &mut BuildContext<'_>) -> Result<()> {
        ctx.declare_property("Inputs", Vec::<Value>::new())?;
        ctx.declare_property("Outputs", Vec::<Value>::new())?;
        ctx.declare_property("DelayMs", 0i64)?;
        ctx.declare_property("FailOnCycle", -1i64)?;
        ctx.declare_property("EndAtCycle", -1i64)?;
        ctx.declare_property("FailStart", false)?;
        ctx.declare_property("FailStop", false)
    }
}

fn keys(name: &str, list: Vec<Value>) -> Result<Vec<String>> {
    list.iter()
        .map(|v| {
            String::from_value(v).ok_or_else(|| SluiceError::TypeMismatch {
                key: name.to_string(),
                expected: ValueKind::Str.to_string(),
                found: v.kind().to_string(),
            })
        })
        .collect()
}

impl Task for Relay {
    fn configure(&mut self, ctx: &mut ConfigureCtx<'_>) -> Result<()> {
        self.name = ctx.name().to_string();
        self.inputs = keys("Inputs", ctx.property("Inputs")?)?;
        self.outputs = keys("Outputs", ctx.property("Outputs")?)?;
        self.delay = Duration::from_millis(ctx.property::<i64>("DelayMs")?.max(0) as u64);
        self.fail_on = u64::try_from(ctx.property::<i64>("FailOnCycle")?).ok();
        self.end_at = u64::try_from(ctx.property::<i64>("EndAtCycle")?).ok();
        self.fail_start = ctx.property("FailStart")?;
        self.fail_stop = ctx.property("FailStop")?;

        for key in &self.inputs {
            ctx.declare_input::<u64>(key)?;
        }
        for key in &self.outputs {
            ctx.declare_output::<u64>(key)?;
        }
        self.journal.record(format!("configure:{}", self.name));
        Ok(())
    }

    fn start(&self, _ctx: &LifecycleCtx) -> Result<()> {
        self.journal.record(format!("start:{}", self.name));
        if self.fail_start {
            return Err(SluiceError::msg("start refused"));
        }
        Ok(())
    }

    fn process<'a>(&'a self, ctx: CycleContext) -> TaskFuture<'a> {
        Box::pin(async move {
            let cycle = ctx.cycle().as_u64();
            for key in &self.inputs {
                let seen = ctx.get::<u64>(key)?;
                assert_eq!(*seen, cycle, "value leaked across cycles");
            }

            self.journal.enter();
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.journal.exit();
            self.journal.record(format!("process:{}:{}", self.name, cycle));

            if self.fail_on == Some(cycle) {
                return Err(SluiceError::msg(format!("injected failure on cycle {cycle}")));
            }
            if self.end_at.is_some_and(|end| cycle >= end) {
                return Err(SluiceError::EndOfStream);
            }
            for key in &self.outputs {
                ctx.put(key, cycle)?;
            }
            Ok(())
        })
    }

    fn stop(&self, _ctx: &LifecycleCtx) -> Result<()> {
        self.journal.record(format!("stop:{}", self.name));
        if self.fail_stop {
            return Err(SluiceError::msg("stop refused"));
        }
        Ok(())
    }
}

/// Service counting hits from tasks.
pub struct Counter {
    journal: Arc<Journal>,
    pub hits: AtomicU64,
}

impl Service for Counter {
    fn configure(&mut self, ctx: &mut ConfigureCtx<'_>) -> Result<()> {
        self.journal.record(format!("configure:{}", ctx.name()));
        Ok(())
    }

    fn start(&self, ctx: &LifecycleCtx) -> Result<()> {
        self.journal.record(format!("start:{}", ctx.name()));
        Ok(())
    }

    fn stop(&self, ctx: &LifecycleCtx) -> Result<()> {
        self.journal.record(format!("stop:{}", ctx.name()));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Task bumping the `counter` service once per cycle.
pub struct Tally;

impl Task for Tally {
    fn configure(&mut self, _ctx: &mut ConfigureCtx<'_>) -> Result<()> {
        Ok(())
    }

    fn process<'a>(&'a self, ctx: CycleContext) -> TaskFuture<'a> {
        Box::pin(async move {
            ctx.service::<Counter>("counter")?
                .hits
                .fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Registry with every test component type.
pub fn registry(journal: &Arc<Journal>) -> Arc<Registry> {
    let mut registry = Registry::new();

    registry
        .register("producer", |ctx: &mut BuildContext<'_>| {
            ctx.declare_property("A", 1.0)?;
            ctx.declare_property("B", 2.0)?;
            Ok(Component::task(Producer { a: 0.0, b: 0.0 }))
        })
        .unwrap();
    registry
        .register("squarer", |ctx: &mut BuildContext<'_>| {
            ctx.declare_property("Input", "a")?;
            ctx.declare_property("Output", "c")?;
            Ok(Component::task(Squarer {
                input: String::new(),
                output: String::new(),
            }))
        })
        .unwrap();
    registry
        .register("empty_list", |_ctx: &mut BuildContext<'_>| {
            Ok(Component::task(EmptyList))
        })
        .unwrap();

    let relay_journal = Arc::clone(journal);
    registry
        .register("relay", move |ctx: &mut BuildContext<'_>| {
            Relay::declare(ctx)?;
            Ok(Component::task(Relay::new(Arc::clone(&relay_journal))))
        })
        .unwrap();

    let counter_journal = Arc::clone(journal);
    registry
        .register("counter", move |_ctx: &mut BuildContext<'_>| {
            Ok(Component::service(Counter {
                journal: Arc::clone(&counter_journal),
                hits: AtomicU64::new(0),
            }))
        })
        .unwrap();
    registry
        .register("tally", |_ctx: &mut BuildContext<'_>| Ok(Component::task(Tally)))
        .unwrap();

    Arc::new(registry)
}

/// Engine backed by the test registry.
pub fn engine(journal: &Arc<Journal>, config: EngineConfig) -> Engine {
    Engine::new(config, registry(journal))
}

/// Create a relay with the given ports.
pub fn relay(engine: &mut Engine, name: &str, inputs: &[&str], outputs: &[&str]) {
    engine.create("relay", name).unwrap();
    engine
        .set_property(name, "Inputs", inputs.to_vec())
        .unwrap();
    engine
        .set_property(name, "Outputs", outputs.to_vec())
        .unwrap();
}

/// Default test configuration: a bounded number of cycles and four workers.
pub fn config(cycles: u64) -> EngineConfig {
    EngineConfig::default()
        .with_max_cycles(cycles)
        .with_workers(4)
}
