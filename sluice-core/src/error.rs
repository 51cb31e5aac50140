//! Error types for sluice.
//!
//! Every error carries the identifiers (component name, key, state) needed to
//! locate the defect. Configuration-time defects abort a run before any cycle
//! executes; see [`SluiceError::is_config_error`].

use crate::state::RunState;
use crate::traits::Phase;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for sluice operations.
pub type Result<T> = std::result::Result<T, SluiceError>;

/// What kind of declaration collided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclarationKind {
    /// A component type name in the registry.
    ComponentType,
    /// A component instance name within a run.
    ComponentInstance,
    /// A property on a component.
    Property,
    /// An input port on a task.
    InPort,
    /// An output port on a task.
    OutPort,
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ComponentType => "component type",
            Self::ComponentInstance => "component instance",
            Self::Property => "property",
            Self::InPort => "in-port",
            Self::OutPort => "out-port",
        };
        f.write_str(s)
    }
}

/// The main error type for sluice operations.
#[derive(Error, Debug)]
pub enum SluiceError {
    // =========================================================================
    // Registry / Declaration Errors (E100-E199)
    // =========================================================================
    /// No factory registered under the requested type name.
    #[error("E101: Unknown component type '{type_name}'")]
    UnknownType {
        /// The type name that was looked up.
        type_name: String,
    },

    /// A name was declared twice.
    #[error("E102: {kind} '{name}' requested by '{claimant}' is already declared by '{owner}'")]
    DuplicateDeclaration {
        /// What was being declared.
        kind: DeclarationKind,
        /// The colliding name (type name, instance name, property or key).
        name: String,
        /// The component that already owns the declaration.
        owner: String,
        /// The component attempting the new declaration.
        claimant: String,
    },

    /// No component with that instance name exists in the run.
    #[error("E103: Component '{name}' not found")]
    UnknownComponent {
        /// The instance name.
        name: String,
    },

    /// Get/set on a property that was never declared.
    #[error("E104: Component '{component}' has no property named '{name}'")]
    UnknownProperty {
        /// The owning component.
        component: String,
        /// The property name.
        name: String,
    },

    /// Set on a property after its component finished configuring.
    #[error("E105: Property '{name}' of component '{component}' is read-only after configure")]
    PropertyReadOnly {
        /// The owning component.
        component: String,
        /// The property name.
        name: String,
    },

    /// A second external override of the same property.
    #[error("E106: Property '{name}' of component '{component}' was already overridden")]
    PropertyAlreadyOverridden {
        /// The owning component.
        component: String,
        /// The property name.
        name: String,
    },

    /// A task touched a store key it never declared as a port.
    #[error("E107: Task '{component}' did not declare {direction} port '{key}'")]
    UndeclaredPort {
        /// The task.
        component: String,
        /// The store key.
        key: String,
        /// "input" or "output".
        direction: &'static str,
    },

    /// A service attempted to declare a port.
    #[error("E108: Service '{component}' cannot declare port '{key}': only tasks own ports")]
    PortOnService {
        /// The service.
        component: String,
        /// The port key.
        key: String,
    },

    // =========================================================================
    // Graph Errors (E200-E299)
    // =========================================================================
    /// Producer and consumer disagree on the type of a key.
    #[error(
        "E201: Type inconsistency for port '{key}': '{producer}' declares {expected}, '{consumer}' declares {found}"
    )]
    PortTypeMismatch {
        /// The shared key.
        key: String,
        /// The component whose declaration sets the expected type.
        producer: String,
        /// The expected type.
        expected: String,
        /// The component with the conflicting declaration.
        consumer: String,
        /// The conflicting type.
        found: String,
    },

    /// An input key with no producer while strict inputs are enforced.
    #[error("E202: Component '{component}' declared port '{key}' as input but no known producer")]
    MissingProducer {
        /// The consuming task.
        component: String,
        /// The unresolved key.
        key: String,
    },

    /// One or more dependency cycles among tasks.
    #[error("E203: Cyclic dependency detected among tasks: {cycles:?}")]
    CyclicDependency {
        /// Each offending strongly-connected component, as task names.
        cycles: Vec<Vec<String>>,
    },

    // =========================================================================
    // Store Errors (E300-E399)
    // =========================================================================
    /// A read of a key not written in the current cycle.
    #[error("E301: Key '{key}' not found in store for cycle {cycle}")]
    MissingKey {
        /// The requested key.
        key: String,
        /// The cycle whose store was read.
        cycle: u64,
    },

    /// A second write of the same key within one cycle.
    #[error("E302: Key '{key}' already written in cycle {cycle}")]
    KeyAlreadyWritten {
        /// The key.
        key: String,
        /// The cycle.
        cycle: u64,
    },

    /// A value's type does not match the declared or stored type.
    #[error("E303: Type mismatch for '{key}': expected {expected}, got {found}")]
    TypeMismatch {
        /// The store key or property name.
        key: String,
        /// The declared/stored type.
        expected: String,
        /// The offending type.
        found: String,
    },

    // =========================================================================
    // Lifecycle Errors (E400-E499)
    // =========================================================================
    /// An operation attempted in a state that does not permit it.
    #[error("E401: Illegal state transition: cannot {operation} while {current}")]
    IllegalStateTransition {
        /// The current run state.
        current: RunState,
        /// The attempted operation.
        operation: String,
    },

    /// The run was cancelled before completing.
    #[error("E402: Run cancelled")]
    Cancelled,

    // =========================================================================
    // Component Errors (E500-E599)
    // =========================================================================
    /// A lifecycle hook of a component failed.
    #[error("E501: Component '{component}' failed during {phase}: {source}")]
    ComponentFailure {
        /// The failing component.
        component: String,
        /// The lifecycle phase.
        phase: Phase,
        /// The underlying error.
        #[source]
        source: Box<SluiceError>,
    },

    /// A cycle exceeded its time budget.
    #[error("E502: Cycle {cycle} timed out after {timeout_ms}ms")]
    CycleTimeout {
        /// The cycle.
        cycle: u64,
        /// The configured budget.
        timeout_ms: u64,
    },

    /// Stop hooks that failed during best-effort teardown.
    #[error("E503: {} component(s) failed to stop: {failures:?}", .failures.len())]
    StopFailures {
        /// (component, error message) pairs.
        failures: Vec<(String, String)>,
    },

    /// Signalled by a task when its input is exhausted; ends the loop gracefully.
    #[error("E504: End of stream")]
    EndOfStream,

    /// Service lookup by name failed.
    #[error("E505: Service '{name}' not found or not of the requested type")]
    ServiceNotFound {
        /// The requested service name.
        name: String,
    },

    /// An error raised by component code.
    #[error("E506: {0}")]
    External(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// A plain message raised by component code.
    #[error("E507: {0}")]
    Message(String),

    // =========================================================================
    // Configuration Errors (E600-E699)
    // =========================================================================
    /// YAML parsing failed.
    #[error("E601: Failed to parse YAML at {path}: {cause}")]
    YamlParse {
        /// The path to the YAML file (or `<inline>`).
        path: PathBuf,
        /// Reason for the parse failure.
        cause: String,
    },

    /// Invalid configuration value.
    #[error("E602: Invalid configuration '{field}': {cause}")]
    ConfigValue {
        /// The configuration field with invalid value.
        field: String,
        /// Description of why the value is invalid.
        cause: String,
    },

    /// File I/O error.
    #[error("E603: I/O error at {path}: {cause}")]
    Io {
        /// The path where the I/O error occurred.
        path: PathBuf,
        /// Description of the I/O error.
        cause: String,
    },
}

impl SluiceError {
    /// Wrap a foreign error raised by component code.
    pub fn external(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::External(Box::new(err))
    }

    /// Build an error from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Get the error code (e.g., "E101").
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownType { .. } => "E101",
            Self::DuplicateDeclaration { .. } => "E102",
            Self::UnknownComponent { .. } => "E103",
            Self::UnknownProperty { .. } => "E104",
            Self::PropertyReadOnly { .. } => "E105",
            Self::PropertyAlreadyOverridden { .. } => "E106",
            Self::UndeclaredPort { .. } => "E107",
            Self::PortOnService { .. } => "E108",
            Self::PortTypeMismatch { .. } => "E201",
            Self::MissingProducer { .. } => "E202",
            Self::CyclicDependency { .. } => "E203",
            Self::MissingKey { .. } => "E301",
            Self::KeyAlreadyWritten { .. } => "E302",
            Self::TypeMismatch { .. } => "E303",
            Self::IllegalStateTransition { .. } => "E401",
            Self::Cancelled => "E402",
            Self::ComponentFailure { .. } => "E501",
            Self::CycleTimeout { .. } => "E502",
            Self::StopFailures { .. } => "E503",
            Self::EndOfStream => "E504",
            Self::ServiceNotFound { .. } => "E505",
            Self::External(_) => "E506",
            Self::Message(_) => "E507",
            Self::YamlParse { .. } => "E601",
            Self::ConfigValue { .. } => "E602",
            Self::Io { .. } => "E603",
        }
    }

    /// Check if this error is a configuration-time defect.
    ///
    /// These abort the run before any cycle executes and are never retried.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownType { .. }
                | Self::DuplicateDeclaration { .. }
                | Self::UnknownComponent { .. }
                | Self::UnknownProperty { .. }
                | Self::PropertyReadOnly { .. }
                | Self::PropertyAlreadyOverridden { .. }
                | Self::PortOnService { .. }
                | Self::PortTypeMismatch { .. }
                | Self::MissingProducer { .. }
                | Self::CyclicDependency { .. }
                | Self::IllegalStateTransition { .. }
                | Self::YamlParse { .. }
                | Self::ConfigValue { .. }
        )
    }

    /// Check if this error (or the error it wraps) is an end-of-stream signal.
    #[must_use]
    pub fn is_end_of_stream(&self) -> bool {
        match self {
            Self::EndOfStream => true,
            Self::ComponentFailure { source, .. } => source.is_end_of_stream(),
            _ => false,
        }
    }

    /// Get the innermost error, unwrapping component failures.
    #[must_use]
    pub fn root(&self) -> &SluiceError {
        match self {
            Self::ComponentFailure { source, .. } => source.root(),
            other => other,
        }
    }
}
