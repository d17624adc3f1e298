//! Behavior capability attached to entities
//!
//! The spatial index never knows what kind of entity it holds; each kind
//! supplies a [`Behavior`] and the index calls it once per tick.

use super::EntityRef;
use crate::simulation::StepContext;
use crate::spatial::CollisionQuery;

/// Per-kind stepping logic
///
/// Implementations may move or resize `entity` (and only `entity`), must
/// validate moves with `scope` before committing them, and report births or
/// deaths through `ctx` instead of touching the index directly.
pub trait Behavior: Send + Sync {
    /// Advance `entity` by one tick
    fn step(&self, entity: &EntityRef, scope: &dyn CollisionQuery, ctx: &StepContext);

    /// Short name of the entity kind, used in logs
    fn kind(&self) -> &'static str {
        "entity"
    }
}

/// Behavior that never moves
#[derive(Debug, Clone, Copy, Default)]
pub struct Inert;

impl Behavior for Inert {
    fn step(&self, _entity: &EntityRef, _scope: &dyn CollisionQuery, _ctx: &StepContext) {}

    fn kind(&self) -> &'static str {
        "inert"
    }
}
