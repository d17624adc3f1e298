//! Simulation driver
//!
//! The [`StepCoordinator`] owns the active spatial index for the whole run,
//! advances it one tick at a time under the configured schedule and applies
//! the lifecycle events behaviors queued during the step.

mod context;
mod coordinator;
mod statistics;

pub use context::{LifecycleEvent, StepContext};
pub use coordinator::{build_index, SimulationError, StepCoordinator};
pub use statistics::{SimulationStats, TickReport};
