//! Contexts handed to components in each lifecycle phase.

use super::component::{ComponentKind, Service};
use crate::error::{Result, SluiceError};
use crate::ports::{PortDirection, PortTable, TaskPorts};
use crate::property::PropertyStore;
use crate::state::{Lifecycle, RunState};
use crate::store::Store;
use crate::types::{CycleId, DataType, RunId};
use crate::value::{FromValue, Value};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Named services of a run.
#[derive(Default, Clone)]
pub struct Services {
    entries: BTreeMap<String, Arc<dyn Service>>,
}

impl Services {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service under its instance name.
    pub fn insert(&mut self, name: impl Into<String>, service: Arc<dyn Service>) {
        self.entries.insert(name.into(), service);
    }

    /// Look up a service and downcast it to `T`.
    pub fn get<T: Any>(&self, name: &str) -> Result<&T> {
        self.entries
            .get(name)
            .and_then(|svc| svc.as_any().downcast_ref::<T>())
            .ok_or_else(|| SluiceError::ServiceNotFound {
                name: name.to_string(),
            })
    }

    /// Look up a service without downcasting.
    pub fn get_dyn(&self, name: &str) -> Option<&Arc<dyn Service>> {
        self.entries.get(name)
    }

    /// Service names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of services.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no services.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}

/// Context passed to a factory while it builds an instance.
pub struct BuildContext<'a> {
    type_name: &'a str,
    name: &'a str,
    properties: &'a mut PropertyStore,
}

impl<'a> BuildContext<'a> {
    /// Create a build context.
    pub fn new(type_name: &'a str, name: &'a str, properties: &'a mut PropertyStore) -> Self {
        Self {
            type_name,
            name,
            properties,
        }
    }

    /// The registered type name.
    pub fn type_name(&self) -> &str {
        self.type_name
    }

    /// The instance name.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Declare a property with its default value.
    pub fn declare_property(
        &mut self,
        name: impl Into<String>,
        default: impl Into<Value>,
    ) -> Result<()> {
        self.properties.declare(name, default)
    }
}

/// Context passed to `configure`.
///
/// Port declarations are only accepted while the run is configuring and
/// only from tasks.
pub struct ConfigureCtx<'a> {
    run_id: RunId,
    name: &'a str,
    kind: ComponentKind,
    lifecycle: &'a Lifecycle,
    properties: &'a mut PropertyStore,
    ports: &'a mut PortTable,
}

impl<'a> ConfigureCtx<'a> {
    /// Create a configure context.
    pub fn new(
        run_id: RunId,
        name: &'a str,
        kind: ComponentKind,
        lifecycle: &'a Lifecycle,
        properties: &'a mut PropertyStore,
        ports: &'a mut PortTable,
    ) -> Self {
        Self {
            run_id,
            name,
            kind,
            lifecycle,
            properties,
            ports,
        }
    }

    /// The run being configured.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// The instance name.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Declare an input port carrying `T`.
    pub fn declare_input<T: Any + Send + Sync>(&mut self, key: &str) -> Result<()> {
        self.declare_port(key, PortDirection::Input, DataType::of::<T>())
    }

    /// Declare an output port carrying `T`.
    pub fn declare_output<T: Any + Send + Sync>(&mut self, key: &str) -> Result<()> {
        self.declare_port(key, PortDirection::Output, DataType::of::<T>())
    }

    /// Declare a port with an explicit data type.
    pub fn declare_port(
        &mut self,
        key: &str,
        direction: PortDirection,
        data_type: DataType,
    ) -> Result<()> {
        self.lifecycle
            .require(RunState::Configuring, "declare a port")?;
        if self.kind == ComponentKind::Service {
            return Err(SluiceError::PortOnService {
                component: self.name.to_string(),
                key: key.to_string(),
            });
        }
        match direction {
            PortDirection::Input => self.ports.declare_input(self.name, key, data_type),
            PortDirection::Output => self.ports.declare_output(self.name, key, data_type),
        }
    }

    /// Declare a property with its default value.
    pub fn declare_property(
        &mut self,
        name: impl Into<String>,
        default: impl Into<Value>,
    ) -> Result<()> {
        self.properties.declare(name, default)
    }

    /// Set a property.
    pub fn set_property(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.properties.set(name, value)
    }

    /// Read a property as `T`.
    pub fn property<T: FromValue>(&self, name: &str) -> Result<T> {
        self.properties.get_as(name)
    }

    /// Read a property as a raw [`Value`].
    pub fn property_value(&self, name: &str) -> Result<&Value> {
        self.properties.get(name)
    }

    /// Log an informational message tagged with this component.
    pub fn log(&self, message: &str) {
        tracing::info!(run_id = %self.run_id, component = %self.name, "{}", message);
    }
}

/// Context passed to `start` and `stop`.
#[derive(Debug, Clone)]
pub struct LifecycleCtx {
    run_id: RunId,
    name: Arc<str>,
    properties: Arc<PropertyStore>,
    services: Arc<Services>,
}

impl LifecycleCtx {
    /// Create a lifecycle context.
    pub fn new(
        run_id: RunId,
        name: Arc<str>,
        properties: Arc<PropertyStore>,
        services: Arc<Services>,
    ) -> Self {
        Self {
            run_id,
            name,
            properties,
            services,
        }
    }

    /// The run.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// The instance name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read a property as `T`.
    pub fn property<T: FromValue>(&self, name: &str) -> Result<T> {
        self.properties.get_as(name)
    }

    /// Look up a service by name.
    pub fn service<T: Any>(&self, name: &str) -> Result<&T> {
        self.services.get(name)
    }

    /// Log an informational message.
    pub fn log(&self, message: &str) {
        tracing::info!(run_id = %self.run_id, component = %self.name, "{}", message);
    }

    /// Log a warning.
    pub fn warn(&self, message: &str) {
        tracing::warn!(run_id = %self.run_id, component = %self.name, "{}", message);
    }
}

/// Context passed to `process` for one cycle.
///
/// Reads and writes go to the cycle's store and are restricted to the keys
/// the task declared.
#[derive(Debug, Clone)]
pub struct CycleContext {
    run_id: RunId,
    name: Arc<str>,
    ports: Arc<TaskPorts>,
    store: Arc<Store>,
    properties: Arc<PropertyStore>,
    services: Arc<Services>,
}

impl CycleContext {
    /// Create a cycle context.
    pub fn new(
        run_id: RunId,
        ports: Arc<TaskPorts>,
        store: Arc<Store>,
        properties: Arc<PropertyStore>,
        services: Arc<Services>,
    ) -> Self {
        Self {
            run_id,
            name: Arc::from(ports.owner()),
            ports,
            store,
            properties,
            services,
        }
    }

    /// The run.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// The current cycle.
    pub fn cycle(&self) -> CycleId {
        self.store.cycle()
    }

    /// The instance name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read a declared input.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>> {
        if self.ports.input(key).is_none() {
            return Err(self.undeclared(key, PortDirection::Input));
        }
        self.store.get(key)
    }

    /// Write a declared output.
    pub fn put<T: Any + Send + Sync>(&self, key: &str, value: T) -> Result<()> {
        if self.ports.output(key).is_none() {
            return Err(self.undeclared(key, PortDirection::Output));
        }
        self.store.put(key, value)
    }

    /// Check if a declared input has been written this cycle.
    pub fn has(&self, key: &str) -> bool {
        self.ports.input(key).is_some() && self.store.has(key)
    }

    /// Read a property as `T`.
    pub fn property<T: FromValue>(&self, name: &str) -> Result<T> {
        self.properties.get_as(name)
    }

    /// Look up a service by name.
    pub fn service<T: Any>(&self, name: &str) -> Result<&T> {
        self.services.get(name)
    }

    /// Log an informational message tagged with this component and cycle.
    pub fn log(&self, message: &str) {
        tracing::info!(
            run_id = %self.run_id,
            cycle = %self.cycle(),
            component = %self.name,
            "{}",
            message
        );
    }

    /// Log a debug message.
    pub fn debug(&self, message: &str) {
        tracing::debug!(
            run_id = %self.run_id,
            cycle = %self.cycle(),
            component = %self.name,
            "{}",
            message
        );
    }

    /// Log a warning.
    pub fn warn(&self, message: &str) {
        tracing::warn!(
            run_id = %self.run_id,
            cycle = %self.cycle(),
            component = %self.name,
            "{}",
            message
        );
    }

    /// Log an error.
    pub fn error(&self, message: &str) {
        tracing::error!(
            run_id = %self.run_id,
            cycle = %self.cycle(),
            component = %self.name,
            "{}",
            message
        );
    }

    fn undeclared(&self, key: &str, direction: PortDirection) -> SluiceError {
        SluiceError::UndeclaredPort {
            component: self.name.to_string(),
            key: key.to_string(),
            direction: direction.label(),
        }
    }
}
