//! Simulated sphere entities
//!
//! An entity is a movable sphere with a stable identity. It is shared between
//! the index that owns it (as a resident or leaf entry) and any read-only
//! references held for collision math (chunk halos, query results), so it is
//! handed around as an [`EntityRef`]. Position and radius are only ever
//! written by the entity's own [`Behavior`] during its own turn.

mod behavior;
mod id;

pub use behavior::{Behavior, Inert};
pub use id::EntityId;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::foundation::math::Vec3;
use crate::physics::BoundingSphere;
use crate::spatial::rtree::{NodeKey, TreeId};
use crate::spatial::BoundingBox;

/// Shared handle to an entity
pub type EntityRef = Arc<Entity>;

/// Sentinel for "never stepped"
const NEVER_STEPPED: u64 = u64::MAX;

/// Container currently owning an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Owner {
    /// Not registered with any index
    #[default]
    Detached,
    /// Resident of the chunk with this flat index
    Chunk(usize),
    /// Entry of an R-tree leaf
    Leaf {
        /// Tree that issued `leaf`
        tree: TreeId,
        /// Leaf holding the entry
        leaf: NodeKey,
    },
}

impl Owner {
    /// Leaf of `tree` holding the entity, if `tree` owns it
    pub fn leaf_in(self, tree: TreeId) -> Option<NodeKey> {
        match self {
            Owner::Leaf { tree: owner, leaf } if owner == tree => Some(leaf),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Body {
    position: Vec3,
    radius: f32,
    owner: Owner,
}

/// A movable sphere tracked by a spatial index
pub struct Entity {
    id: EntityId,
    body: RwLock<Body>,
    behavior: Arc<dyn Behavior>,
    alive: AtomicBool,
    last_stepped: AtomicU64,
}

impl Entity {
    /// Create a detached entity
    pub fn new(id: EntityId, position: Vec3, radius: f32, behavior: Arc<dyn Behavior>) -> Self {
        Self {
            id,
            body: RwLock::new(Body {
                position,
                radius,
                owner: Owner::Detached,
            }),
            behavior,
            alive: AtomicBool::new(true),
            last_stepped: AtomicU64::new(NEVER_STEPPED),
        }
    }

    /// Create a detached entity already wrapped in a shared handle
    pub fn spawn(id: EntityId, position: Vec3, radius: f32, behavior: Arc<dyn Behavior>) -> EntityRef {
        Arc::new(Self::new(id, position, radius, behavior))
    }

    /// Create an entity with the do-nothing behavior
    pub fn inert(id: EntityId, position: Vec3, radius: f32) -> EntityRef {
        Self::spawn(id, position, radius, Arc::new(Inert))
    }

    fn read(&self) -> RwLockReadGuard<'_, Body> {
        self.body.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Body> {
        self.body.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Unique identity
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Current center
    pub fn position(&self) -> Vec3 {
        self.read().position
    }

    /// Current radius
    pub fn radius(&self) -> f32 {
        self.read().radius
    }

    /// Center and radius read together
    pub fn sphere(&self) -> BoundingSphere {
        let body = self.read();
        BoundingSphere::new(body.position, body.radius)
    }

    /// Tight box around the sphere
    pub fn bbox(&self) -> BoundingBox {
        let body = self.read();
        BoundingBox::from_sphere(body.position, body.radius)
    }

    /// Move the entity. Only the entity's own behavior should call this.
    pub fn set_position(&self, position: Vec3) {
        self.write().position = position;
    }

    /// Resize the entity. Only the entity's own behavior should call this.
    pub fn set_radius(&self, radius: f32) {
        self.write().radius = radius;
    }

    /// Container currently holding the entity
    pub fn owner(&self) -> Owner {
        self.read().owner
    }

    pub(crate) fn set_owner(&self, owner: Owner) {
        self.write().owner = owner;
    }

    /// Behavior capability supplied for this entity's kind
    pub fn behavior(&self) -> &Arc<dyn Behavior> {
        &self.behavior
    }

    /// False once the entity has been removed from its index
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn retire(&self) {
        self.alive.store(false, Ordering::Release);
        self.set_owner(Owner::Detached);
    }

    pub(crate) fn revive(&self) {
        self.alive.store(true, Ordering::Release);
    }

    /// Record that the entity is being stepped in `tick`
    ///
    /// Returns false if it was already stepped in that tick, which happens
    /// when an entity is handed to a chunk that runs later in the same tick.
    pub(crate) fn mark_stepped(&self, tick: u64) -> bool {
        self.last_stepped.swap(tick, Ordering::AcqRel) != tick
    }

    /// Tick in which the entity last ran its behavior
    pub fn last_stepped_tick(&self) -> Option<u64> {
        match self.last_stepped.load(Ordering::Acquire) {
            NEVER_STEPPED => None,
            tick => Some(tick),
        }
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Entity {}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = self.read();
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("kind", &self.behavior.kind())
            .field("position", &body.position)
            .field("radius", &body.radius)
            .field("owner", &body.owner)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}
