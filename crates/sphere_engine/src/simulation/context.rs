//! Per-tick context handed to behaviors
//!
//! Behaviors never add or remove entities directly: the index is in the
//! middle of a step and, under the parallel schedule, other chunks are
//! stepping at the same time. Births and deaths are queued here instead and
//! applied by the coordinator once the step has finished.

use std::fmt;
use std::sync::Arc;

use crossbeam::queue::SegQueue;

use crate::entity::{Behavior, Entity, EntityId, EntityRef};
use crate::foundation::math::Vec3;

/// Entity lifecycle change requested during a step
pub enum LifecycleEvent {
    /// Create a new entity after the step
    Spawn {
        /// Entity that produced the offspring, if any
        parent: Option<EntityId>,
        /// Center of the new entity
        position: Vec3,
        /// Radius of the new entity
        radius: f32,
        /// Behavior of the new entity
        behavior: Arc<dyn Behavior>,
    },
    /// Remove an entity after the step
    Death {
        /// Entity to remove
        entity: EntityRef,
    },
}

impl fmt::Debug for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::Spawn {
                parent,
                position,
                radius,
                behavior,
            } => f
                .debug_struct("Spawn")
                .field("parent", parent)
                .field("position", position)
                .field("radius", radius)
                .field("kind", &behavior.kind())
                .finish(),
            LifecycleEvent::Death { entity } => f.debug_struct("Death").field("entity", &entity.id()).finish(),
        }
    }
}

/// Tick number and lifecycle event sink for one step
#[derive(Debug, Default)]
pub struct StepContext {
    tick: u64,
    events: SegQueue<LifecycleEvent>,
}

impl StepContext {
    /// Context for `tick`
    pub fn new(tick: u64) -> Self {
        Self {
            tick,
            events: SegQueue::new(),
        }
    }

    /// Tick being stepped
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Request an offspring of `parent`
    pub fn spawn(&self, parent: &Entity, position: Vec3, radius: f32, behavior: Arc<dyn Behavior>) {
        self.events.push(LifecycleEvent::Spawn {
            parent: Some(parent.id()),
            position,
            radius,
            behavior,
        });
    }

    /// Request removal of `entity`
    pub fn kill(&self, entity: &EntityRef) {
        self.events.push(LifecycleEvent::Death {
            entity: entity.clone(),
        });
    }

    /// Number of queued events
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Take every queued event in submission order
    pub fn take_events(&self) -> Vec<LifecycleEvent> {
        std::iter::from_fn(|| self.events.pop()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Inert;

    #[test]
    fn test_events_drain_in_order() {
        let ctx = StepContext::new(4);
        let parent = Entity::inert(EntityId::from_raw(1), Vec3::zeros(), 1.0);
        ctx.spawn(&parent, Vec3::new(2.0, 0.0, 0.0), 0.5, Arc::new(Inert));
        ctx.kill(&parent);
        assert_eq!(ctx.pending_events(), 2);

        let events = ctx.take_events();
        assert!(matches!(events[0], LifecycleEvent::Spawn { parent: Some(id), .. } if id == parent.id()));
        assert!(matches!(&events[1], LifecycleEvent::Death { entity } if entity.id() == parent.id()));
        assert_eq!(ctx.pending_events(), 0);
        assert_eq!(ctx.tick(), 4);
    }
}
