//! Per-cycle key/value store.
//!
//! A fresh [`Store`] is created for every cycle and dropped when the cycle
//! ends. Each key is written at most once; values are shared with readers as
//! `Arc<T>` so consumers never copy what a producer wrote.

use crate::error::{Result, SluiceError};
use crate::types::{CycleId, DataType};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Declared type of every known key.
#[derive(Debug, Clone, Default)]
pub struct StoreSchema {
    types: HashMap<String, DataType>,
}

impl StoreSchema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the type of a key, replacing any previous one.
    pub fn insert(&mut self, key: impl Into<String>, data_type: DataType) {
        self.types.insert(key.into(), data_type);
    }

    /// Type of a key, if declared.
    pub fn get(&self, key: &str) -> Option<DataType> {
        self.types.get(key).copied()
    }

    /// Check if a key is declared.
    pub fn contains(&self, key: &str) -> bool {
        self.types.contains_key(key)
    }

    /// Number of declared keys.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

struct Slot {
    data_type: DataType,
    value: Arc<dyn Any + Send + Sync>,
}

/// Data exchanged between tasks during one cycle.
pub struct Store {
    cycle: CycleId,
    schema: Arc<StoreSchema>,
    entries: DashMap<String, Slot>,
}

impl Store {
    /// Create an empty store for `cycle`, type-checking writes against `schema`.
    pub fn new(cycle: CycleId, schema: Arc<StoreSchema>) -> Self {
        Self {
            cycle,
            schema,
            entries: DashMap::new(),
        }
    }

    /// The cycle this store belongs to.
    pub fn cycle(&self) -> CycleId {
        self.cycle
    }

    /// Write `value` under `key`.
    ///
    /// Fails if the key was already written this cycle, or if a port declares
    /// the key with a different type.
    pub fn put<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) -> Result<()> {
        let key = key.into();
        let data_type = DataType::of::<T>();

        if let Some(declared) = self.schema.get(&key) {
            if declared != data_type {
                return Err(SluiceError::TypeMismatch {
                    key,
                    expected: declared.to_string(),
                    found: data_type.to_string(),
                });
            }
        }

        match self.entries.entry(key) {
            MapEntry::Occupied(e) => Err(SluiceError::KeyAlreadyWritten {
                key: e.key().clone(),
                cycle: self.cycle.as_u64(),
            }),
            MapEntry::Vacant(e) => {
                e.insert(Slot {
                    data_type,
                    value: Arc::new(value),
                });
                Ok(())
            }
        }
    }

    /// Read the value under `key` as `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>> {
        let (data_type, value) = {
            let slot = self
                .entries
                .get(key)
                .ok_or_else(|| SluiceError::MissingKey {
                    key: key.to_string(),
                    cycle: self.cycle.as_u64(),
                })?;
            (slot.data_type, Arc::clone(&slot.value))
        };

        value
            .downcast::<T>()
            .map_err(|_| SluiceError::TypeMismatch {
                key: key.to_string(),
                expected: DataType::of::<T>().to_string(),
                found: data_type.to_string(),
            })
    }

    /// Check if `key` has been written this cycle.
    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Type of the value stored under `key`.
    pub fn type_of(&self, key: &str) -> Option<DataType> {
        self.entries.get(key).map(|slot| slot.data_type)
    }

    /// Keys written so far, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Number of keys written.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("cycle", &self.cycle)
            .field("keys", &self.keys())
            .finish()
    }
}
