//! Run lifecycle state machine.
//!
//! A run moves strictly forward through
//! `Undefined → Configuring → Configured → Starting → Started → Running →
//! Stopping → Stopped → Offline`. The state is owned by the engine and shared
//! by handle with every context that needs to validate an operation.

use crate::error::{Result, SluiceError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The phase a run is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Components may be created and their properties overridden.
    Undefined,
    /// Components are running their configure hooks.
    Configuring,
    /// Graph is built and validated.
    Configured,
    /// Components are running their start hooks.
    Starting,
    /// All components started.
    Started,
    /// The cycle loop is executing.
    Running,
    /// Components are running their stop hooks.
    Stopping,
    /// All stop hooks attempted.
    Stopped,
    /// Terminal.
    Offline,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Undefined => "undefined",
            Self::Configuring => "configuring",
            Self::Configured => "configured",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Offline => "offline",
        };
        f.write_str(s)
    }
}

/// An event that moves the run to its next state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// `Undefined → Configuring`.
    BeginConfigure,
    /// `Configuring → Configured`.
    Configured,
    /// `Configured → Starting`.
    BeginStart,
    /// `Starting → Started`.
    Started,
    /// `Started → Running`.
    BeginLoop,
    /// `Running → Stopping`.
    LoopEnded,
    /// `Stopping → Stopped`.
    Stopped,
    /// `Stopped → Offline`.
    Shutdown,
}

impl Transition {
    /// The state this event must fire from.
    #[must_use]
    pub const fn from(self) -> RunState {
        match self {
            Self::BeginConfigure => RunState::Undefined,
            Self::Configured => RunState::Configuring,
            Self::BeginStart => RunState::Configured,
            Self::Started => RunState::Starting,
            Self::BeginLoop => RunState::Started,
            Self::LoopEnded => RunState::Running,
            Self::Stopped => RunState::Stopping,
            Self::Shutdown => RunState::Stopped,
        }
    }

    /// The state this event leads to.
    #[must_use]
    pub const fn to(self) -> RunState {
        match self {
            Self::BeginConfigure => RunState::Configuring,
            Self::Configured => RunState::Configured,
            Self::BeginStart => RunState::Starting,
            Self::Started => RunState::Started,
            Self::BeginLoop => RunState::Running,
            Self::LoopEnded => RunState::Stopping,
            Self::Stopped => RunState::Stopped,
            Self::Shutdown => RunState::Offline,
        }
    }

    fn operation(self) -> &'static str {
        match self {
            Self::BeginConfigure => "begin configure",
            Self::Configured => "complete configure",
            Self::BeginStart => "begin start",
            Self::Started => "complete start",
            Self::BeginLoop => "begin cycle loop",
            Self::LoopEnded => "end cycle loop",
            Self::Stopped => "complete stop",
            Self::Shutdown => "shut down",
        }
    }
}

/// Shared handle to the run state.
///
/// Cloning yields another handle to the same state. Transitions are validated
/// and never rolled back.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: Arc<RwLock<RunState>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Create a lifecycle in the `Undefined` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(RunState::Undefined)),
        }
    }

    /// Get the current state.
    pub fn state(&self) -> RunState {
        *self.state.read()
    }

    /// Fail with `IllegalStateTransition` unless the run is in `expected`.
    pub fn require(&self, expected: RunState, operation: &str) -> Result<()> {
        let current = self.state();
        if current != expected {
            return Err(SluiceError::IllegalStateTransition {
                current,
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    /// Apply a transition, returning the new state.
    pub fn advance(&self, transition: Transition) -> Result<RunState> {
        let mut state = self.state.write();
        if *state != transition.from() {
            return Err(SluiceError::IllegalStateTransition {
                current: *state,
                operation: transition.operation().to_string(),
            });
        }
        *state = transition.to();

        tracing::debug!(
            from = %transition.from(),
            to = %transition.to(),
            "Run state changed"
        );

        Ok(*state)
    }
}
