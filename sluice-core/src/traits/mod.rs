//! Component traits and the contexts handed to them.
//!
//! - `Task`: per-cycle unit of work with declared input and output keys
//! - `Service`: singleton utility looked up by name
//! - `ComponentFactory`: builds instances for the registry

mod component;
mod context;

pub use component::{
    Component, ComponentFactory, ComponentKind, Phase, Service, Task, TaskFuture,
};
pub use context::{BuildContext, ConfigureCtx, CycleContext, LifecycleCtx, Services};
