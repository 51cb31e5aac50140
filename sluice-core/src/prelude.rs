//! Prelude for convenient imports.
//!
//! ```ignore
//! use sluice_core::prelude::*;
//! ```

pub use crate::error::{DeclarationKind, Result, SluiceError};
pub use crate::ports::{PortDirection, PortTable, TaskPorts};
pub use crate::property::{Property, PropertyStore};
pub use crate::state::{Lifecycle, RunState, Transition};
pub use crate::store::{Store, StoreSchema};
pub use crate::traits::{
    BuildContext, Component, ComponentFactory, ComponentKind, ConfigureCtx, CycleContext,
    LifecycleCtx, Phase, Service, Services, Task, TaskFuture,
};
pub use crate::types::{CycleId, DataType, RunId};
pub use crate::value::{FromValue, Value, ValueKind};
