//! Core types for sluice.
//!
//! - `RunId`: Unique identifier for one engine run (log correlation)
//! - `CycleId`: Index of a processing cycle within a run
//! - `DataType`: Runtime type discriminant for ports and store entries

mod data_type;
mod ids;

pub use data_type::DataType;
pub use ids::{CycleId, RunId};
