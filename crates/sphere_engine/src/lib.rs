//! # Sphere Engine
//!
//! Spatial indexing core for simulations of many moving, colliding spheres.
//!
//! ## Features
//!
//! - **Pluggable Index**: chunk grid, concurrent chunk grid or R-tree behind one trait
//! - **Parallel Stepping**: 8-color chunk schedule on a rayon worker pool
//! - **Exactly-once Ticks**: every entity runs its behavior once per tick
//! - **Deferred Lifecycle**: births and deaths applied at the tick boundary
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sphere_engine::prelude::*;
//!
//! fn main() -> Result<(), SimulationError> {
//!     let config = SimulationConfig::new(WorldConfig::cube(32.0, 0.5))
//!         .with_backend(BackendConfig::RTree(RTreeConfig::default()));
//!     let mut sim = StepCoordinator::new(&config)?;
//!     sim.seed(Vec3::zeros(), 0.5, Arc::new(Inert))?;
//!     sim.run(100)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod entity;
pub mod foundation;
pub mod physics;
pub mod simulation;
pub mod spatial;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        core::config::{BackendConfig, ChunkGridConfig, Config, RTreeConfig, SimulationConfig, WorldConfig},
        entity::{Behavior, Entity, EntityId, EntityRef, Inert},
        foundation::{math::Vec3, time::Stopwatch},
        simulation::{LifecycleEvent, SimulationError, SimulationStats, StepContext, StepCoordinator, TickReport},
        spatial::{BoundingBox, CollisionQuery, Schedule, SpatialIndex, WorldBounds},
    };
}
