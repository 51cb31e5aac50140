//! Job descriptions.
//!
//! A job lists the components to instantiate, their property overrides and
//! optional engine settings. Jobs are usually written in YAML:
//!
//! ```yaml
//! settings:
//!   max_cycles: 100
//!   workers: 4
//!   failure_policy: skip_cycle
//! components:
//!   - type: producer
//!     name: t1
//!     props:
//!       Value: 2.0
//!   - type: squarer
//!     name: t2
//! ```

use crate::engine::{EngineConfig, FailurePolicy};
use serde::{Deserialize, Serialize};
use sluice_core::error::{Result, SluiceError};
use sluice_core::value::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Engine settings carried by a job. Unset fields keep the base configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobSettings {
    /// Number of cycles; a negative value means unbounded.
    pub max_cycles: Option<i64>,
    /// Worker-pool bound.
    pub workers: Option<usize>,
    /// Concurrently executing cycles.
    pub cycles_in_flight: Option<usize>,
    /// Reaction to a failed cycle.
    pub failure_policy: Option<FailurePolicy>,
    /// Per-cycle budget in milliseconds.
    pub cycle_timeout_ms: Option<u64>,
    /// Reject inputs without producer.
    pub strict_inputs: Option<bool>,
    /// Where to write the dataflow graph.
    pub dot_file: Option<PathBuf>,
}

impl JobSettings {
    /// Layer these settings over `base`.
    pub fn apply(&self, base: EngineConfig) -> Result<EngineConfig> {
        let mut config = base;

        if let Some(max) = self.max_cycles {
            config.max_cycles = u64::try_from(max).ok();
        }
        if let Some(workers) = self.workers {
            if workers == 0 {
                return Err(SluiceError::ConfigValue {
                    field: "workers".to_string(),
                    cause: "must be at least 1".to_string(),
                });
            }
            config = config.with_workers(workers);
        }
        if let Some(n) = self.cycles_in_flight {
            if n == 0 {
                return Err(SluiceError::ConfigValue {
                    field: "cycles_in_flight".to_string(),
                    cause: "must be at least 1".to_string(),
                });
            }
            config = config.with_cycles_in_flight(n);
        }
        if let Some(policy) = self.failure_policy {
            config.failure_policy = policy;
        }
        if let Some(ms) = self.cycle_timeout_ms {
            config.cycle_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(strict) = self.strict_inputs {
            config.strict_inputs = strict;
        }
        if let Some(path) = &self.dot_file {
            config.dot_file = Some(path.clone());
        }

        Ok(config)
    }
}

/// One component to instantiate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentSpec {
    /// Registered type name.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Instance name, unique within the job.
    pub name: String,
    /// Property overrides.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub props: BTreeMap<String, Value>,
}

impl ComponentSpec {
    /// Create a component entry without overrides.
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: name.into(),
            props: BTreeMap::new(),
        }
    }

    /// Add a property override.
    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }
}

/// A complete job description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Engine settings.
    #[serde(default)]
    pub settings: JobSettings,
    /// Components in creation order.
    #[serde(default)]
    pub components: Vec<ComponentSpec>,
}

impl JobSpec {
    /// Parse a job from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| SluiceError::YamlParse {
            path: PathBuf::from("<inline>"),
            cause: e.to_string(),
        })
    }

    /// Load a job from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| SluiceError::Io {
            path: path.to_path_buf(),
            cause: e.to_string(),
        })?;
        serde_yaml::from_str(&content).map_err(|e| SluiceError::YamlParse {
            path: path.to_path_buf(),
            cause: e.to_string(),
        })
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| SluiceError::ConfigValue {
            field: "job".to_string(),
            cause: e.to_string(),
        })
    }

    /// Append a component.
    pub fn with_component(mut self, component: ComponentSpec) -> Self {
        self.components.push(component);
        self
    }
}
