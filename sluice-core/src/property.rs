//! Per-component property slots.

use crate::error::{DeclarationKind, Result, SluiceError};
use crate::value::{FromValue, Value, ValueKind, extract};
use std::collections::BTreeMap;

/// A declared property: its type, default, current value and override marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    kind: ValueKind,
    default: Value,
    value: Value,
    overridden: bool,
}

impl Property {
    /// The slot type.
    ///
    /// Inferred from the default. A list declared empty gets its element kind
    /// from the first non-empty list assigned to it.
    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    /// The value given at declaration.
    pub fn default_value(&self) -> &Value {
        &self.default
    }

    /// The current value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Whether external configuration has overridden this property.
    pub fn is_overridden(&self) -> bool {
        self.overridden
    }
}

/// Typed configuration slots owned by one component instance.
///
/// The type of each slot is fixed by its default value. Properties are
/// writable until the owning component finishes configuring; the engine then
/// freezes the store.
#[derive(Debug, Clone)]
pub struct PropertyStore {
    owner: String,
    entries: BTreeMap<String, Property>,
    frozen: bool,
}

impl PropertyStore {
    /// Create an empty store for the named component.
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            entries: BTreeMap::new(),
            frozen: false,
        }
    }

    /// The owning component's instance name.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Declare a property, inferring its type from `default`.
    pub fn declare(&mut self, name: impl Into<String>, default: impl Into<Value>) -> Result<()> {
        let name = name.into();
        self.ensure_writable(&name)?;
        if self.entries.contains_key(&name) {
            return Err(SluiceError::DuplicateDeclaration {
                kind: DeclarationKind::Property,
                name,
                owner: self.owner.clone(),
                claimant: self.owner.clone(),
            });
        }
        let default = default.into();
        let kind = uniform_kind(&name, &default)?;
        self.entries.insert(
            name,
            Property {
                kind,
                value: default.clone(),
                default,
                overridden: false,
            },
        );
        Ok(())
    }

    /// Set a property from component code.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.ensure_writable(name)?;
        let value = value.into();
        let owner = &self.owner;
        let prop = self
            .entries
            .get_mut(name)
            .ok_or_else(|| SluiceError::UnknownProperty {
                component: owner.clone(),
                name: name.to_string(),
            })?;
        prop.kind = check_kind(name, &prop.kind, &value)?;
        prop.value = value;
        Ok(())
    }

    /// Apply an external override. Each property may be overridden at most once.
    pub fn override_value(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.ensure_writable(name)?;
        let value = value.into();
        let owner = &self.owner;
        let prop = self
            .entries
            .get_mut(name)
            .ok_or_else(|| SluiceError::UnknownProperty {
                component: owner.clone(),
                name: name.to_string(),
            })?;
        if prop.overridden {
            return Err(SluiceError::PropertyAlreadyOverridden {
                component: owner.clone(),
                name: name.to_string(),
            });
        }
        prop.kind = check_kind(name, &prop.kind, &value)?;
        prop.value = value;
        prop.overridden = true;
        Ok(())
    }

    /// Get the current value of a property.
    pub fn get(&self, name: &str) -> Result<&Value> {
        self.property(name).map(Property::value)
    }

    /// Get the current value of a property converted to `T`.
    pub fn get_as<T: FromValue>(&self, name: &str) -> Result<T> {
        extract(name, self.get(name)?)
    }

    /// Get the full property record.
    pub fn property(&self, name: &str) -> Result<&Property> {
        self.entries
            .get(name)
            .ok_or_else(|| SluiceError::UnknownProperty {
                component: self.owner.clone(),
                name: name.to_string(),
            })
    }

    /// Check if a property is declared.
    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Iterate declared properties in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Property)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of declared properties.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no property is declared.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Make every property read-only.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Check if the store is read-only.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn ensure_writable(&self, name: &str) -> Result<()> {
        if self.frozen {
            return Err(SluiceError::PropertyReadOnly {
                component: self.owner.clone(),
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

/// Check `value` against the slot kind and return the refined slot kind.
fn check_kind(name: &str, expected: &ValueKind, value: &Value) -> Result<ValueKind> {
    let found = uniform_kind(name, value)?;
    expected
        .unify(&found)
        .ok_or_else(|| SluiceError::TypeMismatch {
            key: name.to_string(),
            expected: expected.to_string(),
            found: found.to_string(),
        })
}

fn uniform_kind(name: &str, value: &Value) -> Result<ValueKind> {
    value.checked_kind().ok_or_else(|| SluiceError::TypeMismatch {
        key: name.to_string(),
        expected: "list of one kind".to_string(),
        found: format!("mixed list {value}"),
    })
}
