//! Sluice Core Library
//!
//! Foundational types and traits for the sluice pipeline engine: the error
//! taxonomy, typed property slots, port declarations, the per-cycle store
//! and the run lifecycle state machine.
//!
//! # Key Components
//!
//! - **Traits**: `Task` and `Service`, the component contract
//! - **Ports**: typed input/output declarations with a single writer per key
//! - **Store**: single-assignment key/value data exchanged within one cycle
//! - **State**: the forward-only run lifecycle
//!
//! # Example
//!
//! ```ignore
//! use sluice_core::prelude::*;
//!
//! let store = Store::new(CycleId::new(0), Arc::new(StoreSchema::new()));
//! store.put("a", 1.0f64)?;
//! assert_eq!(*store.get::<f64>("a")?, 1.0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod ports;
pub mod prelude;
pub mod property;
pub mod state;
pub mod store;
pub mod traits;
pub mod types;
pub mod value;

// Re-export key types at crate root for convenience
pub use error::{Result, SluiceError};
pub use state::{Lifecycle, RunState};
pub use store::Store;
pub use traits::{Component, Service, Task};
pub use types::{CycleId, DataType, RunId};
pub use value::Value;
