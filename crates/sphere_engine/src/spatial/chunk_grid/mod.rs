//! Halo-zone chunk grid
//!
//! Space is cut into equal cubes. Each chunk owns the entities whose centers
//! fall inside it and mirrors, as a read-only halo, every entity owned by a
//! neighbor that sits within `halo_width` of its box. The halo is at least one
//! entity diameter wide, so a resident that stays inside its chunk sees every
//! possible contact without leaving it. Moves that cross a face also scan the
//! residents of the neighbors they reach, and a chunk step never looks past
//! its direct neighbors.
//!
//! Entities crossing a chunk boundary are handed over through per-chunk
//! inboxes and picked up the next time the receiving chunk drains, at the
//! latest in the settle pass that closes every tick.

mod chunk;
mod layout;
mod queue;

pub use layout::{GridLayout, COLOR_COUNT, GRID_PADDING};
pub use queue::{LocalQueue, SharedQueue, TransferQueue};

pub(crate) use chunk::{ChunkState, GridScope};

use std::sync::Arc;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::core::ChunkGridConfig;
use crate::entity::{Entity, EntityRef, Owner};
use crate::foundation::math::Vec3;
use crate::simulation::StepContext;
use crate::spatial::spatial_index::validate_entity;
use crate::spatial::{
    narrow_phase, BoundingBox, BoxBounds, CollisionQuery, IndexError, Schedule, SpatialIndex, WorldBounds,
};

/// Chunks larger than this many entity diameters hold too many entities to scan
pub const OVERSIZED_CHUNK_FACTOR: f32 = 16.0;

/// Check chunk geometry against the largest entity
///
/// Returns the effective halo width.
pub(crate) fn validate_geometry(
    world: &BoundingBox,
    config: &ChunkGridConfig,
    max_entity_radius: f32,
) -> Result<f32, IndexError> {
    let invalid = |message: String| Err(IndexError::InvalidConfig(message));

    if !world.is_valid() || world.volume() <= 0.0 {
        return invalid(format!("world box {:?} must be valid and non-empty", world));
    }
    if !(max_entity_radius.is_finite() && max_entity_radius > 0.0) {
        return invalid(format!("max entity radius {} must be positive", max_entity_radius));
    }
    let chunk_size = config.chunk_size;
    if !(chunk_size.is_finite() && chunk_size > 0.0) {
        return invalid(format!("chunk size {} must be positive", chunk_size));
    }
    if chunk_size / 2.0 < max_entity_radius {
        return invalid(format!(
            "chunk size {} is smaller than the largest entity diameter {}",
            chunk_size,
            2.0 * max_entity_radius
        ));
    }

    let halo_width = config.halo_width.unwrap_or(2.0 * max_entity_radius);
    if halo_width < 2.0 * max_entity_radius {
        return invalid(format!(
            "halo width {} is narrower than the largest entity diameter {}",
            halo_width,
            2.0 * max_entity_radius
        ));
    }
    if halo_width >= chunk_size {
        return invalid(format!(
            "halo width {} must be smaller than the chunk size {}",
            halo_width, chunk_size
        ));
    }

    if chunk_size > OVERSIZED_CHUNK_FACTOR * 2.0 * max_entity_radius {
        warn!(
            "Chunk size {} is over {}x the entity diameter; chunk scans will be slow",
            chunk_size, OVERSIZED_CHUNK_FACTOR
        );
    }
    Ok(halo_width)
}

/// Uniform grid of chunks with halo zones
///
/// `Q` picks the inbox type: [`LocalQueue`] for the single-threaded grid,
/// [`SharedQueue`] when chunks are stepped from worker threads.
pub struct ChunkGrid<Q: TransferQueue = LocalQueue> {
    pub(crate) layout: GridLayout,
    pub(crate) states: Vec<ChunkState>,
    pub(crate) inboxes: Vec<Q>,
    pub(crate) bounds: Arc<dyn WorldBounds>,
    max_entity_radius: f32,
    order: Vec<usize>,
    shuffle: Option<StdRng>,
}

impl<Q: TransferQueue> ChunkGrid<Q> {
    /// Create a grid over `world`, which also serves as the collision bounds
    pub fn new(world: BoundingBox, config: &ChunkGridConfig, max_entity_radius: f32) -> Result<Self, IndexError> {
        Self::with_bounds(world, Arc::new(BoxBounds::new(world)), config, max_entity_radius)
    }

    /// Create a grid over `world` with custom collision bounds
    pub fn with_bounds(
        world: BoundingBox,
        bounds: Arc<dyn WorldBounds>,
        config: &ChunkGridConfig,
        max_entity_radius: f32,
    ) -> Result<Self, IndexError> {
        let halo_width = validate_geometry(&world, config, max_entity_radius)?;
        let layout = GridLayout::new(&world, config.chunk_size, halo_width);
        let count = layout.chunk_count();

        info!(
            "Chunk grid ready: {:?} chunks of size {} (halo {})",
            layout.dims(),
            config.chunk_size,
            halo_width
        );

        Ok(Self {
            states: (0..count).map(|_| ChunkState::default()).collect(),
            inboxes: (0..count).map(|_| Q::default()).collect(),
            layout,
            bounds,
            max_entity_radius,
            order: (0..count).collect(),
            shuffle: config.shuffle_seed.map(StdRng::seed_from_u64),
        })
    }

    /// Chunk geometry
    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    /// Entities owned by chunk `index`
    pub fn residents(&self, index: usize) -> Vec<EntityRef> {
        self.states[index].residents().clone()
    }

    /// Entities mirrored into chunk `index`
    pub fn halo(&self, index: usize) -> Vec<EntityRef> {
        self.states[index].halo().clone()
    }

    /// Transfers not yet picked up by their receiving chunk
    pub fn pending_transfers(&self) -> usize {
        self.inboxes.iter().map(TransferQueue::len).sum()
    }

    /// Drain every inbox so that membership is complete
    pub fn settle(&mut self) -> usize {
        let layout = &self.layout;
        self.states
            .iter()
            .zip(self.inboxes.iter())
            .enumerate()
            .map(|(index, (state, inbox))| state.drain(layout, index, inbox))
            .sum()
    }

    /// Step every chunk once on the calling thread, then settle
    pub(crate) fn step_sequential(&mut self, ctx: &StepContext) -> Result<(), IndexError> {
        if let Some(rng) = self.shuffle.as_mut() {
            self.order.shuffle(rng);
        }

        let scope = self.scope();
        for &index in &self.order {
            self.states[index].step(&scope, index, ctx)?;
        }

        let settled = self.settle();
        debug!("Chunk grid tick {}: settled {} transfers", ctx.tick(), settled);
        Ok(())
    }

    pub(crate) fn scope(&self) -> GridScope<'_, Q> {
        GridScope {
            layout: &self.layout,
            states: &self.states,
            inboxes: &self.inboxes,
            bounds: self.bounds.as_ref(),
            max_entity_radius: self.max_entity_radius,
        }
    }

    fn residents_in(&self, chunks: impl IntoIterator<Item = usize>) -> Vec<EntityRef> {
        chunks
            .into_iter()
            .flat_map(|index| self.states[index].residents().clone())
            .collect()
    }

    pub(crate) fn insert(&mut self, entity: EntityRef) -> Result<(), IndexError> {
        validate_entity(&entity, self.max_entity_radius)?;
        entity.revive();

        let position = entity.position();
        let index = self.layout.chunk_index_of(position);
        for &neighbor in self.layout.neighbors(index) {
            if self.layout.within_halo(neighbor, position) {
                self.states[neighbor].lists_mut().1.push(entity.clone());
            }
        }
        entity.set_owner(Owner::Chunk(index));
        self.states[index].lists_mut().0.push(entity);
        Ok(())
    }

    pub(crate) fn remove(&mut self, entity: &Entity) -> bool {
        let id = entity.id();
        // Between ticks a resident sits in the chunk its center maps to
        let hinted = match entity.owner() {
            Owner::Chunk(index) if index < self.states.len() => Some(index),
            _ => None,
        };
        let mapped = self.layout.chunk_index_of(entity.position());
        let located = hinted.into_iter().chain(Some(mapped)).find_map(|index| {
            let slot = self.states[index].residents().iter().position(|e| e.id() == id)?;
            Some((index, slot))
        });
        let Some((index, slot)) = located else {
            return false;
        };

        let (residents, halo) = self.states[index].lists_mut();
        let removed = residents.swap_remove(slot);
        halo.retain(|e| e.id() != id);
        for &neighbor in self.layout.neighbors(index) {
            self.states[neighbor].lists_mut().1.retain(|e| e.id() != id);
        }
        removed.retire();
        true
    }

    pub(crate) fn all(&self) -> Vec<EntityRef> {
        self.residents_in(0..self.states.len())
    }

    pub(crate) fn len(&self) -> usize {
        self.states.iter().map(|s| s.residents().len()).sum()
    }

    pub(crate) fn reset(&mut self) {
        for state in &mut self.states {
            state.clear();
        }
        for inbox in &self.inboxes {
            while inbox.pop().is_some() {}
        }
    }
}

impl<Q: TransferQueue> CollisionQuery for ChunkGrid<Q> {
    fn check_collision(&self, entity: &Entity, candidate: Vec3) -> bool {
        let reach = entity.radius() + self.max_entity_radius;
        let query = BoundingBox::from_sphere(candidate, reach);
        let candidates = self.residents_in(self.layout.chunks_overlapping(&query));
        narrow_phase::collides(entity, candidate, self.bounds.as_ref(), &candidates)
    }

    fn find_first_collision(&self, entity: &Entity, direction: Vec3, length: f32) -> Option<f32> {
        let sphere = entity.sphere();
        let end = sphere.center + direction.try_normalize(f32::EPSILON)? * length.max(0.0);
        let reach = sphere.radius + self.max_entity_radius;
        let query = BoundingBox::from_sphere(sphere.center, reach).enlarge(&BoundingBox::from_sphere(end, reach));
        let candidates = self.residents_in(self.layout.chunks_overlapping(&query));
        narrow_phase::first_hit(entity, direction, length, self.bounds.as_ref(), &candidates)
    }

    /// Searches chunk shells outward from the entity's chunk
    ///
    /// After finishing ring `r`, every unvisited chunk is at least
    /// `r * chunk_size` away, so the search stops once the best distance is
    /// within that bound.
    fn nearest_neighbor(&self, entity: &Entity) -> Option<EntityRef> {
        let center = self.layout.coord_of(entity.position());
        let mut best: Option<(EntityRef, f32)> = None;

        for ring in 0..self.layout.max_ring() {
            let candidates = self.residents_in(self.layout.shell(center, ring));
            if let Some((found, distance)) = narrow_phase::nearest(entity, &candidates) {
                if best.as_ref().map_or(true, |(_, current)| distance < *current) {
                    best = Some((found, distance));
                }
            }
            if let Some((_, distance)) = &best {
                if *distance <= ring as f32 * self.layout.chunk_size() {
                    break;
                }
            }
        }
        best.map(|(found, _)| found)
    }

    fn entities_within_range(&self, entity: &Entity, radius: f32) -> Vec<EntityRef> {
        let query = BoundingBox::from_sphere(entity.position(), radius.max(0.0));
        narrow_phase::within(entity, radius, &self.residents_in(self.layout.chunks_overlapping(&query)))
    }
}

impl SpatialIndex for ChunkGrid<LocalQueue> {
    fn backend_name(&self) -> &'static str {
        "chunk_grid"
    }

    fn schedule(&self) -> Schedule {
        Schedule::Sequential
    }

    fn add_entity(&mut self, entity: EntityRef) -> Result<(), IndexError> {
        self.insert(entity)
    }

    fn remove_entity(&mut self, entity: &Entity) -> bool {
        self.remove(entity)
    }

    fn step(&mut self, ctx: &StepContext) -> Result<(), IndexError> {
        self.step_sequential(ctx)
    }

    fn get_all(&self) -> Vec<EntityRef> {
        self.all()
    }

    fn count(&self) -> usize {
        self.len()
    }

    fn clear(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityId;

    fn world() -> BoundingBox {
        BoundingBox::new(Vec3::new(-8.0, -8.0, -8.0), Vec3::new(8.0, 8.0, 8.0))
    }

    fn config(chunk_size: f32, halo_width: f32) -> ChunkGridConfig {
        ChunkGridConfig {
            chunk_size,
            halo_width: Some(halo_width),
            ..ChunkGridConfig::default()
        }
    }

    #[test]
    fn test_rejects_bad_geometry() {
        let small_chunk = ChunkGrid::<LocalQueue>::new(world(), &config(1.0, 0.9), 0.6);
        assert!(matches!(small_chunk, Err(IndexError::InvalidConfig(_))));

        let thin_halo = ChunkGrid::<LocalQueue>::new(world(), &config(4.0, 0.5), 0.5);
        assert!(matches!(thin_halo, Err(IndexError::InvalidConfig(_))));

        let wide_halo = ChunkGrid::<LocalQueue>::new(world(), &config(4.0, 4.0), 0.5);
        assert!(matches!(wide_halo, Err(IndexError::InvalidConfig(_))));

        assert!(ChunkGrid::<LocalQueue>::new(world(), &config(4.0, 1.0), 0.5).is_ok());
    }

    #[test]
    fn test_default_halo_is_one_diameter() {
        let cfg = ChunkGridConfig {
            chunk_size: 4.0,
            ..ChunkGridConfig::default()
        };
        let grid = ChunkGrid::<LocalQueue>::new(world(), &cfg, 0.5).unwrap();
        assert_eq!(grid.layout().halo_width(), 1.0);
    }

    #[test]
    fn test_remove_purges_halos() {
        let mut grid = ChunkGrid::<LocalQueue>::new(world(), &config(4.0, 1.0), 0.5).unwrap();
        let e = Entity::inert(EntityId::from_raw(1), Vec3::new(-0.2, 1.0, 1.0), 0.5);
        grid.add_entity(e.clone()).unwrap();
        let neighbor = grid.layout().chunk_index_of(Vec3::new(0.2, 1.0, 1.0));
        assert_eq!(grid.halo(neighbor).len(), 1);

        assert!(grid.remove_entity(&e));
        assert!(grid.halo(neighbor).is_empty());
        assert_eq!(grid.count(), 0);
        assert!(!grid.remove_entity(&e));
    }

    #[test]
    fn test_remove_finds_resident_without_owner_hint() {
        let mut grid = ChunkGrid::<LocalQueue>::new(world(), &config(4.0, 1.0), 0.5).unwrap();
        let e = Entity::inert(EntityId::from_raw(1), Vec3::new(2.0, 2.0, 2.0), 0.5);
        grid.add_entity(e.clone()).unwrap();

        let elsewhere = grid.layout().chunk_index_of(Vec3::new(-6.0, -6.0, -6.0));
        e.set_owner(Owner::Chunk(elsewhere));
        assert!(grid.remove_entity(&e));
        assert_eq!(grid.count(), 0);

        let stranger = Entity::inert(EntityId::from_raw(2), Vec3::new(2.0, 2.0, 2.0), 0.5);
        assert!(!grid.remove_entity(&stranger));
    }

    #[test]
    fn test_sequential_grid_rejects_parallel_step() {
        let mut grid = ChunkGrid::<LocalQueue>::new(world(), &config(4.0, 1.0), 0.5).unwrap();
        let ctx = StepContext::new(0);
        assert!(matches!(
            grid.step_parallel(&ctx),
            Err(IndexError::WrongSchedule { requested: Schedule::Parallel, .. })
        ));
    }
}
