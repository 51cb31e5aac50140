//! Component type registry.
//!
//! Maps a textual type name to the factory that builds instances of it.
//! Registration happens once at process start; engines look factories up by
//! name when a job is assembled.

use sluice_core::error::{DeclarationKind, Result, SluiceError};
use sluice_core::property::PropertyStore;
use sluice_core::traits::{BuildContext, Component, ComponentFactory};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of component factories keyed by type name.
#[derive(Default, Clone)]
pub struct Registry {
    factories: HashMap<String, Arc<dyn ComponentFactory>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory closure for `type_name`.
    ///
    /// Registering the same name twice fails with `DuplicateDeclaration`.
    pub fn register<F>(&mut self, type_name: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn(&mut BuildContext<'_>) -> Result<Component> + Send + Sync + 'static,
    {
        self.register_factory(type_name, Arc::new(factory))
    }

    /// Register a shared factory object for `type_name`.
    pub fn register_factory(
        &mut self,
        type_name: impl Into<String>,
        factory: Arc<dyn ComponentFactory>,
    ) -> Result<()> {
        let type_name = type_name.into();
        if self.factories.contains_key(&type_name) {
            return Err(SluiceError::DuplicateDeclaration {
                kind: DeclarationKind::ComponentType,
                name: type_name,
                owner: "registry".to_string(),
                claimant: "registry".to_string(),
            });
        }

        tracing::debug!(r#type = %type_name, "Registered component type");
        self.factories.insert(type_name, factory);
        Ok(())
    }

    /// Build an instance of `type_name` named `name`.
    ///
    /// The factory declares the instance's properties into `properties`.
    pub fn create(
        &self,
        type_name: &str,
        name: &str,
        properties: &mut PropertyStore,
    ) -> Result<Component> {
        let factory = self
            .factories
            .get(type_name)
            .ok_or_else(|| SluiceError::UnknownType {
                type_name: type_name.to_string(),
            })?;
        let mut ctx = BuildContext::new(type_name, name, properties);
        factory.create(&mut ctx)
    }

    /// Check if a type is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Registered type names, sorted.
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Check if no type is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("types", &self.types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::traits::{ComponentKind, Service};
    use std::any::Any;

    struct Noop;

    impl Service for Noop {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register("noop", |ctx: &mut BuildContext<'_>| {
                ctx.declare_property("Level", 3i64)?;
                Ok(Component::service(Noop))
            })
            .unwrap();
        registry
    }

    #[test]
    fn create_invokes_factory_with_instance_name() {
        let registry = registry();
        let mut props = PropertyStore::new("n1");
        let component = registry.create("noop", "n1", &mut props).unwrap();
        assert_eq!(component.kind(), ComponentKind::Service);
        assert_eq!(props.get_as::<i64>("Level").unwrap(), 3);
    }

    #[test]
    fn unknown_type_fails() {
        let registry = registry();
        let mut props = PropertyStore::new("x");
        let err = registry.create("missing", "x", &mut props).unwrap_err();
        assert!(matches!(err, SluiceError::UnknownType { .. }));
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = registry();
        let err = registry
            .register("noop", |_ctx: &mut BuildContext<'_>| Ok(Component::service(Noop)))
            .unwrap_err();
        assert!(matches!(
            err,
            SluiceError::DuplicateDeclaration {
                kind: DeclarationKind::ComponentType,
                ..
            }
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn factory_errors_propagate() {
        let mut registry = Registry::new();
        registry
            .register("bad", |ctx: &mut BuildContext<'_>| {
                ctx.declare_property("X", 1i64)?;
                ctx.declare_property("X", 2i64)?;
                Ok(Component::service(Noop))
            })
            .unwrap();
        let mut props = PropertyStore::new("b");
        assert!(registry.create("bad", "b", &mut props).is_err());
    }
}
