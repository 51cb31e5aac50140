//! Port declarations.
//!
//! Tasks declare the store keys they read (inputs) and write (outputs) while
//! configuring. The [`PortTable`] enforces the single-writer rule across all
//! tasks of a run and is the input of the dataflow graph builder.

use crate::error::{DeclarationKind, Result, SluiceError};
use crate::store::StoreSchema;
use crate::types::DataType;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Direction of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    /// The task reads the key.
    Input,
    /// The task writes the key.
    Output,
}

impl PortDirection {
    /// Lowercase label used in messages.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The ports declared by one task.
#[derive(Debug, Clone, Default)]
pub struct TaskPorts {
    owner: String,
    inputs: BTreeMap<String, DataType>,
    outputs: BTreeMap<String, DataType>,
}

impl TaskPorts {
    /// Create an empty declaration set for a task.
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            ..Self::default()
        }
    }

    /// The task's instance name.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Declared input keys and their types, in key order.
    pub fn inputs(&self) -> &BTreeMap<String, DataType> {
        &self.inputs
    }

    /// Declared output keys and their types, in key order.
    pub fn outputs(&self) -> &BTreeMap<String, DataType> {
        &self.outputs
    }

    /// Type of a declared input.
    pub fn input(&self, key: &str) -> Option<DataType> {
        self.inputs.get(key).copied()
    }

    /// Type of a declared output.
    pub fn output(&self, key: &str) -> Option<DataType> {
        self.outputs.get(key).copied()
    }
}

/// Every task's port declarations for a run, in task creation order.
#[derive(Debug, Default)]
pub struct PortTable {
    tasks: Vec<TaskPorts>,
    index: HashMap<String, usize>,
    producers: HashMap<String, usize>,
}

impl PortTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task with no ports yet. Re-adding an existing task is a no-op.
    pub fn add_task(&mut self, owner: &str) {
        if self.index.contains_key(owner) {
            return;
        }
        self.index.insert(owner.to_string(), self.tasks.len());
        self.tasks.push(TaskPorts::new(owner));
    }

    /// Declare an input port on `owner`.
    pub fn declare_input(&mut self, owner: &str, key: &str, data_type: DataType) -> Result<()> {
        let idx = self.task_index(owner)?;
        let task = &mut self.tasks[idx];
        if task.inputs.contains_key(key) {
            return Err(SluiceError::DuplicateDeclaration {
                kind: DeclarationKind::InPort,
                name: key.to_string(),
                owner: owner.to_string(),
                claimant: owner.to_string(),
            });
        }
        task.inputs.insert(key.to_string(), data_type);

        tracing::trace!(component = %owner, key = %key, r#type = %data_type, "Declared input port");
        Ok(())
    }

    /// Declare an output port on `owner`. Fails if any task already writes `key`.
    pub fn declare_output(&mut self, owner: &str, key: &str, data_type: DataType) -> Result<()> {
        let idx = self.task_index(owner)?;
        if let Some(&producer) = self.producers.get(key) {
            return Err(SluiceError::DuplicateDeclaration {
                kind: DeclarationKind::OutPort,
                name: key.to_string(),
                owner: self.tasks[producer].owner.clone(),
                claimant: owner.to_string(),
            });
        }
        self.tasks[idx].outputs.insert(key.to_string(), data_type);
        self.producers.insert(key.to_string(), idx);

        tracing::trace!(component = %owner, key = %key, r#type = %data_type, "Declared output port");
        Ok(())
    }

    /// Declarations of one task.
    pub fn task(&self, owner: &str) -> Option<&TaskPorts> {
        self.index.get(owner).map(|&i| &self.tasks[i])
    }

    /// All declarations, in task creation order.
    pub fn tasks(&self) -> &[TaskPorts] {
        &self.tasks
    }

    /// The task writing `key`, if any.
    pub fn producer_of(&self, key: &str) -> Option<&TaskPorts> {
        self.producers.get(key).map(|&i| &self.tasks[i])
    }

    /// Key types known from declarations, for store type checks.
    ///
    /// Output types win; inputs without a producer contribute their own type so
    /// that externally seeded values are checked too.
    pub fn schema(&self) -> StoreSchema {
        let mut schema = StoreSchema::new();
        for task in &self.tasks {
            for (key, dt) in &task.outputs {
                schema.insert(key.clone(), *dt);
            }
        }
        for task in &self.tasks {
            for (key, dt) in &task.inputs {
                if !schema.contains(key) {
                    schema.insert(key.clone(), *dt);
                }
            }
        }
        schema
    }

    fn task_index(&self, owner: &str) -> Result<usize> {
        self.index
            .get(owner)
            .copied()
            .ok_or_else(|| SluiceError::UnknownComponent {
                name: owner.to_string(),
            })
    }
}
