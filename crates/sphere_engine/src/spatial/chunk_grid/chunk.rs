//! Per-chunk state and the per-chunk step
//!
//! A chunk owns its residents and holds read-only references (the halo) to
//! entities owned by nearby chunks that sit within `halo_width` of its box.
//! Behaviors of residents query this chunk's residents and halo plus the
//! residents of whichever neighbors their query box reaches. A chunk step
//! writes nothing outside the chunk except its neighbors' inboxes and, while
//! draining them, the neighbors' lists under their locks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::entity::{Entity, EntityRef, Owner};
use crate::foundation::math::Vec3;
use crate::physics::Ray;
use crate::simulation::StepContext;
use crate::spatial::chunk_grid::layout::GridLayout;
use crate::spatial::chunk_grid::queue::TransferQueue;
use crate::spatial::{narrow_phase, BoundingBox, BoxBounds, CollisionQuery, IndexError, WorldBounds};

type EntityList = RwLock<Vec<EntityRef>>;

fn read(list: &EntityList) -> RwLockReadGuard<'_, Vec<EntityRef>> {
    list.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(list: &EntityList) -> RwLockWriteGuard<'_, Vec<EntityRef>> {
    list.write().unwrap_or_else(PoisonError::into_inner)
}

fn holds(list: &[EntityRef], entity: &Entity) -> bool {
    list.iter().any(|e| e.id() == entity.id())
}

/// Everything a chunk step reads besides its own state
pub(crate) struct GridScope<'a, Q> {
    pub layout: &'a GridLayout,
    pub states: &'a [ChunkState],
    pub inboxes: &'a [Q],
    pub bounds: &'a dyn WorldBounds,
    pub max_entity_radius: f32,
}

/// Residents, halo and re-entrancy guard of one chunk
///
/// Lock order is residents before halo. A chunk never holds its own locks
/// while taking another chunk's write locks.
#[derive(Debug, Default)]
pub(crate) struct ChunkState {
    residents: EntityList,
    halo: EntityList,
    /// Set for the duration of a step; a second step of the same chunk
    /// arriving through a broken schedule finds it set and bails out
    stepping: AtomicBool,
}

impl ChunkState {
    pub fn residents(&self) -> RwLockReadGuard<'_, Vec<EntityRef>> {
        read(&self.residents)
    }

    pub fn halo(&self) -> RwLockReadGuard<'_, Vec<EntityRef>> {
        read(&self.halo)
    }

    /// Exclusive access to both lists without locking
    pub fn lists_mut(&mut self) -> (&mut Vec<EntityRef>, &mut Vec<EntityRef>) {
        (
            self.residents.get_mut().unwrap_or_else(PoisonError::into_inner),
            self.halo.get_mut().unwrap_or_else(PoisonError::into_inner),
        )
    }

    /// Move everything waiting in `inbox` into this chunk
    ///
    /// Entities that map to this chunk become residents (leaving the halo if
    /// they were there); entities within the halo band join the halo; the
    /// rest are dropped. Nothing is added twice.
    pub fn drain<Q: TransferQueue>(&self, layout: &GridLayout, index: usize, inbox: &Q) -> usize {
        if inbox.is_empty() {
            return 0;
        }
        let mut residents = write(&self.residents);
        let mut halo = write(&self.halo);

        let mut drained = 0;
        while let Some(entity) = inbox.pop() {
            drained += 1;
            if !entity.is_alive() {
                continue;
            }
            let position = entity.position();
            if layout.chunk_index_of(position) == index {
                halo.retain(|e| e.id() != entity.id());
                if !holds(&residents, &entity) {
                    entity.set_owner(Owner::Chunk(index));
                    residents.push(entity);
                }
            } else if layout.within_halo(index, position) && !holds(&halo, &entity) && !holds(&residents, &entity) {
                halo.push(entity);
            }
        }
        drained
    }

    /// Run one tick of this chunk
    ///
    /// Drains this chunk's inbox and its neighbors' inboxes, steps every
    /// resident not yet stepped in this tick, hands leavers and boundary
    /// residents to neighbors, then prunes the halo. Neighbors must not be
    /// stepping at the same time.
    pub fn step<Q: TransferQueue>(
        &self,
        grid: &GridScope<'_, Q>,
        index: usize,
        ctx: &StepContext,
    ) -> Result<(), IndexError> {
        if self.stepping.swap(true, Ordering::AcqRel) {
            return Err(IndexError::ReentrantStep { chunk: index });
        }

        let layout = grid.layout;
        self.drain(layout, index, &grid.inboxes[index]);
        // Entities handed over earlier in this tick must be visible to queries
        // that cross into a neighbor.
        for &neighbor in layout.neighbors(index) {
            grid.states[neighbor].drain(layout, neighbor, &grid.inboxes[neighbor]);
        }

        {
            let residents = self.residents();
            let halo = self.halo();
            let view = ChunkView::new(grid, index, &residents, &halo);
            for entity in residents.iter() {
                if entity.is_alive() && entity.mark_stepped(ctx.tick()) {
                    entity.behavior().step(entity, &view, ctx);
                }
            }
        }

        self.redistribute(layout, index, grid.inboxes);

        self.stepping.store(false, Ordering::Release);
        Ok(())
    }

    fn redistribute<Q: TransferQueue>(&self, layout: &GridLayout, index: usize, inboxes: &[Q]) {
        let mut residents = write(&self.residents);
        let mut halo = write(&self.halo);

        for entity in std::mem::take(&mut *residents) {
            let position = entity.position();
            let owner = layout.chunk_index_of(position);
            let mut owner_notified = false;

            for &neighbor in layout.neighbors(index) {
                if neighbor == owner || layout.within_halo(neighbor, position) {
                    inboxes[neighbor].push(entity.clone());
                    owner_notified |= neighbor == owner;
                }
            }

            if owner == index {
                residents.push(entity);
                continue;
            }
            if !owner_notified {
                inboxes[owner].push(entity.clone());
            }
            if layout.within_halo(index, position) && !holds(&halo, &entity) {
                halo.push(entity);
            }
        }

        halo.retain(|e| e.is_alive() && layout.within_halo(index, e.position()));
    }

    /// Drop every resident and halo member, retiring the residents
    pub fn clear(&mut self) {
        let (residents, halo) = self.lists_mut();
        for entity in residents.drain(..) {
            entity.retire();
        }
        halo.clear();
    }
}

/// Chunk-local query scope handed to behaviors during a chunk step
///
/// Sees the chunk's own residents and halo and the residents of the direct
/// neighbors. Anything past the neighbor ring cannot be checked, so a query
/// reaching beyond it is answered as a collision at the ring edge.
pub(crate) struct ChunkView<'a, Q> {
    grid: &'a GridScope<'a, Q>,
    index: usize,
    residents: &'a [EntityRef],
    halo: &'a [EntityRef],
    reach: BoxBounds,
}

impl<'a, Q> ChunkView<'a, Q> {
    pub fn new(grid: &'a GridScope<'a, Q>, index: usize, residents: &'a [EntityRef], halo: &'a [EntityRef]) -> Self {
        let ring = grid.layout.chunk_box(index).expanded(grid.layout.chunk_size());
        Self {
            grid,
            index,
            residents,
            halo,
            reach: BoxBounds::new(ring),
        }
    }

    /// Own residents and halo, plus residents of the neighbors `query` touches
    fn gather(&self, query: &BoundingBox) -> Vec<EntityRef> {
        let layout = self.grid.layout;
        let mut found: Vec<EntityRef> = self.residents.iter().chain(self.halo).cloned().collect();
        for &neighbor in layout.neighbors(self.index) {
            if layout.chunk_box(neighbor).intersects(query) {
                found.extend(self.grid.states[neighbor].residents().iter().cloned());
            }
        }
        found.sort_unstable_by_key(|e| e.id());
        found.dedup_by_key(|e| e.id());
        found
    }
}

impl<Q> CollisionQuery for ChunkView<'_, Q> {
    fn check_collision(&self, entity: &Entity, candidate: Vec3) -> bool {
        let reach = entity.radius() + self.grid.max_entity_radius;
        if self.reach.is_outside(candidate, reach) {
            return true;
        }
        let query = BoundingBox::from_sphere(candidate, reach);
        narrow_phase::collides(entity, candidate, self.grid.bounds, &self.gather(&query))
    }

    fn find_first_collision(&self, entity: &Entity, direction: Vec3, length: f32) -> Option<f32> {
        let sphere = entity.sphere();
        let ray = Ray::new(sphere.center, direction, length)?;
        let reach = sphere.radius + self.grid.max_entity_radius;
        let query = BoundingBox::from_sphere(sphere.center, reach)
            .enlarge(&BoundingBox::from_sphere(ray.point_at(ray.max_length), reach));

        let edge = self.reach.exit_distance(&ray, reach);
        narrow_phase::first_hit(entity, direction, length, self.grid.bounds, &self.gather(&query))
            .into_iter()
            .chain(edge)
            .min_by(f32::total_cmp)
    }

    fn nearest_neighbor(&self, entity: &Entity) -> Option<EntityRef> {
        let ring = self.grid.layout.chunk_box(self.index).expanded(self.grid.layout.chunk_size());
        narrow_phase::nearest(entity, &self.gather(&ring)).map(|(found, _)| found)
    }

    fn entities_within_range(&self, entity: &Entity, radius: f32) -> Vec<EntityRef> {
        let query = BoundingBox::from_sphere(entity.position(), radius.max(0.0));
        narrow_phase::within(entity, radius, &self.gather(&query))
    }
}
