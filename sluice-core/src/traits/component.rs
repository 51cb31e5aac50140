//! Task and service traits.

use super::context::{BuildContext, ConfigureCtx, CycleContext, LifecycleCtx};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// A lifecycle phase in which a component hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// `configure` hook.
    Configure,
    /// `start` hook.
    Start,
    /// Per-cycle `process` hook.
    Process,
    /// `stop` hook.
    Stop,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Configure => "configure",
            Self::Start => "start",
            Self::Process => "process",
            Self::Stop => "stop",
        };
        f.write_str(s)
    }
}

/// A boxed future returned by [`Task::process`].
pub type TaskFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// A unit of per-cycle work.
///
/// During `configure` a task declares the store keys it reads and writes;
/// the engine derives the execution order from those declarations. `process`
/// may be invoked concurrently for different cycles, so per-cycle state must
/// live in the store, not in `self`.
///
/// # Example
///
/// ```ignore
/// use sluice_core::prelude::*;
///
/// struct Square;
///
/// impl Task for Square {
///     fn configure(&mut self, ctx: &mut ConfigureCtx<'_>) -> Result<()> {
///         ctx.declare_input::<f64>("a")?;
///         ctx.declare_output::<f64>("c")
///     }
///
///     fn process<'a>(&'a self, ctx: CycleContext) -> TaskFuture<'a> {
///         Box::pin(async move {
///             let a = ctx.get::<f64>("a")?;
///             ctx.put("c", *a * *a)
///         })
///     }
/// }
/// ```
pub trait Task: Send + Sync {
    /// Declare ports and read properties.
    fn configure(&mut self, ctx: &mut ConfigureCtx<'_>) -> Result<()>;

    /// Acquire resources before the first cycle.
    fn start(&self, _ctx: &LifecycleCtx) -> Result<()> {
        Ok(())
    }

    /// Process one cycle.
    fn process<'a>(&'a self, ctx: CycleContext) -> TaskFuture<'a>;

    /// Release resources after the last cycle.
    fn stop(&self, _ctx: &LifecycleCtx) -> Result<()> {
        Ok(())
    }
}

/// A singleton utility shared by every task of a run, looked up by name.
///
/// Services have no ports and take no part in the per-cycle graph.
pub trait Service: Send + Sync {
    /// Read properties.
    fn configure(&mut self, _ctx: &mut ConfigureCtx<'_>) -> Result<()> {
        Ok(())
    }

    /// Acquire resources before any task starts.
    fn start(&self, _ctx: &LifecycleCtx) -> Result<()> {
        Ok(())
    }

    /// Release resources after every task stopped.
    fn stop(&self, _ctx: &LifecycleCtx) -> Result<()> {
        Ok(())
    }

    /// Downcast support for typed lookup.
    fn as_any(&self) -> &dyn Any;
}

/// Whether a component is a task or a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// Participates in the per-cycle graph.
    Task,
    /// Singleton utility.
    Service,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Task => f.write_str("task"),
            Self::Service => f.write_str("service"),
        }
    }
}

/// A component instance built by a factory.
pub enum Component {
    /// A task.
    Task(Box<dyn Task>),
    /// A service.
    Service(Box<dyn Service>),
}

impl Component {
    /// Wrap a task.
    pub fn task(task: impl Task + 'static) -> Self {
        Self::Task(Box::new(task))
    }

    /// Wrap a service.
    pub fn service(service: impl Service + 'static) -> Self {
        Self::Service(Box::new(service))
    }

    /// Which capability set this component has.
    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::Task(_) => ComponentKind::Task,
            Self::Service(_) => ComponentKind::Service,
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component::{:?}", self.kind())
    }
}

/// Builds component instances for one registered type.
///
/// Any `Fn(&mut BuildContext<'_>) -> Result<Component>` closure is a factory.
pub trait ComponentFactory: Send + Sync {
    /// Build an instance, declaring its properties on `ctx`.
    fn create(&self, ctx: &mut BuildContext<'_>) -> Result<Component>;
}

impl<F> ComponentFactory for F
where
    F: Fn(&mut BuildContext<'_>) -> Result<Component> + Send + Sync,
{
    fn create(&self, ctx: &mut BuildContext<'_>) -> Result<Component> {
        self(ctx)
    }
}
