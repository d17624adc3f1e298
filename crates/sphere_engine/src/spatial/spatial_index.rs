//! Abstract spatial index interface
//!
//! This abstraction allows swapping the partitioning scheme (chunk grid,
//! concurrent chunk grid, R-tree) without changing the stepping driver or the
//! entity behaviors that query it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::{Entity, EntityId, EntityRef, Owner};
use crate::foundation::math::{utils, Vec3};
use crate::simulation::StepContext;

/// Scheduling model a backend steps under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    /// One thread, no suspension points
    Sequential,
    /// Grid-coloring on a worker pool
    Parallel,
}

/// Errors emitted by spatial index implementations
#[derive(Debug, Error)]
pub enum IndexError {
    /// Construction parameters that cannot be used
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Entity failed validation on insert
    #[error("invalid entity {id}: {reason}")]
    InvalidEntity {
        /// Offending entity
        id: EntityId,
        /// What was wrong with it
        reason: String,
    },

    /// Entity is already owned by an index
    #[error("entity {0} is already registered with an index")]
    DuplicateEntity(EntityId),

    /// The step method does not match the backend's schedule
    #[error("{backend} cannot be stepped with the {requested:?} schedule")]
    WrongSchedule {
        /// Backend name
        backend: &'static str,
        /// Schedule the caller asked for
        requested: Schedule,
    },

    /// A chunk step started while the same chunk was still stepping
    #[error("chunk {chunk} entered its step while already stepping")]
    ReentrantStep {
        /// Flat chunk index
        chunk: usize,
    },

    /// Worker pool could not be created
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}

/// Read-side queries used by entity behaviors
///
/// Implemented by every [`SpatialIndex`] and by the chunk-local view handed to
/// behaviors while a chunk grid steps. Every query excludes the subject
/// entity itself and ignores entities that have been removed.
pub trait CollisionQuery {
    /// True if `entity` centered at `candidate` would leave the world or
    /// touch any other entity
    fn check_collision(&self, entity: &Entity, candidate: Vec3) -> bool;

    /// Distance along `direction` (up to `length`) at which `entity` would
    /// first touch another entity or the world bounds
    fn find_first_collision(&self, entity: &Entity, direction: Vec3, length: f32) -> Option<f32>;

    /// Entity whose center is closest to `entity`'s center
    fn nearest_neighbor(&self, entity: &Entity) -> Option<EntityRef>;

    /// Entities whose centers lie within `radius` of `entity`'s center
    fn entities_within_range(&self, entity: &Entity, radius: f32) -> Vec<EntityRef>;
}

/// Spatial index contract shared by every backend
pub trait SpatialIndex: CollisionQuery + Send {
    /// Human-readable backend name
    fn backend_name(&self) -> &'static str;

    /// Scheduling model this backend must be stepped with
    fn schedule(&self) -> Schedule;

    /// Register an entity; the index owns it from now on
    fn add_entity(&mut self, entity: EntityRef) -> Result<(), IndexError>;

    /// Unregister an entity. Returns false if it was not held by this index.
    fn remove_entity(&mut self, entity: &Entity) -> bool;

    /// Advance one tick on the calling thread
    fn step(&mut self, _ctx: &StepContext) -> Result<(), IndexError> {
        Err(IndexError::WrongSchedule {
            backend: self.backend_name(),
            requested: Schedule::Sequential,
        })
    }

    /// Advance one tick on the worker pool
    fn step_parallel(&mut self, _ctx: &StepContext) -> Result<(), IndexError> {
        Err(IndexError::WrongSchedule {
            backend: self.backend_name(),
            requested: Schedule::Parallel,
        })
    }

    /// Snapshot of every live entity
    fn get_all(&self) -> Vec<EntityRef>;

    /// Number of live entities
    fn count(&self) -> usize;

    /// Remove every entity
    fn clear(&mut self);
}

/// Defensive checks applied by every backend's `add_entity`
pub(crate) fn validate_entity(entity: &Entity, max_radius: f32) -> Result<(), IndexError> {
    let invalid = |reason: String| IndexError::InvalidEntity {
        id: entity.id(),
        reason,
    };

    if entity.owner() != Owner::Detached {
        return Err(IndexError::DuplicateEntity(entity.id()));
    }
    let sphere = entity.sphere();
    if !utils::is_finite(&sphere.center) {
        return Err(invalid(format!("non-finite position {:?}", sphere.center)));
    }
    if !sphere.radius.is_finite() || sphere.radius <= 0.0 {
        return Err(invalid(format!("radius {} must be positive", sphere.radius)));
    }
    if sphere.radius > max_radius {
        return Err(invalid(format!(
            "radius {} exceeds configured maximum {}",
            sphere.radius, max_radius
        )));
    }
    Ok(())
}
