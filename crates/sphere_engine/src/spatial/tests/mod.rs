//! Cross-backend tests
//!
//! Shared fixtures for scenario, brute-force and stepping tests that run the
//! same checks against every backend.

mod properties;
mod scenarios;

use std::collections::HashSet;
use std::sync::Arc;

use crossbeam::queue::SegQueue;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::{ChunkGridConfig, RTreeConfig};
use crate::entity::{Behavior, Entity, EntityId, EntityRef, Owner};
use crate::foundation::math::Vec3;
use crate::simulation::StepContext;
use crate::spatial::{
    BoundingBox, BoxBounds, ChunkGrid, CollisionQuery, ConcurrentChunkGrid, LocalQueue, RTreeIndex, SpatialIndex,
    TransferQueue,
};

pub(super) fn cube(half: f32) -> BoundingBox {
    BoundingBox::new(Vec3::new(-half, -half, -half), Vec3::new(half, half, half))
}

pub(super) fn chunk_grid(world: BoundingBox, chunk_size: f32, halo: f32, max_radius: f32) -> ChunkGrid<LocalQueue> {
    let config = ChunkGridConfig::new(chunk_size).with_halo_width(halo);
    ChunkGrid::new(world, &config, max_radius).unwrap()
}

pub(super) fn concurrent_grid(world: BoundingBox, chunk_size: f32, halo: f32, max_radius: f32) -> ConcurrentChunkGrid {
    let config = ChunkGridConfig::new(chunk_size).with_halo_width(halo).with_worker_threads(4);
    ConcurrentChunkGrid::new(world, &config, max_radius).unwrap()
}

pub(super) fn rtree_index(world: BoundingBox, max_radius: f32) -> RTreeIndex {
    RTreeIndex::new(&RTreeConfig::new(2, 6), Arc::new(BoxBounds::new(world)), max_radius).unwrap()
}

/// One of each backend over the same world
pub(super) fn all_backends(world: BoundingBox, max_radius: f32) -> Vec<Box<dyn SpatialIndex>> {
    let chunk = 8.0 * max_radius;
    let halo = 2.0 * max_radius;
    vec![
        Box::new(chunk_grid(world, chunk, halo, max_radius)),
        Box::new(concurrent_grid(world, chunk, halo, max_radius)),
        Box::new(rtree_index(world, max_radius)),
    ]
}

pub(super) fn random_point(rng: &mut StdRng, half: f32) -> Vec3 {
    Vec3::new(
        rng.gen_range(-half..half),
        rng.gen_range(-half..half),
        rng.gen_range(-half..half),
    )
}

/// Non-overlapping entities on a jittered lattice
pub(super) fn lattice(
    count: usize,
    spacing: f32,
    radius: f32,
    behavior: Arc<dyn Behavior>,
    seed: u64,
) -> Vec<EntityRef> {
    let mut rng = StdRng::seed_from_u64(seed);
    let side = (count as f32).cbrt().ceil() as usize;
    let offset = (side as f32 - 1.0) * spacing / 2.0;
    let jitter = (spacing / 2.0 - radius).max(0.0) * 0.9;

    (0..count)
        .map(|i| {
            let cell = Vec3::new((i % side) as f32, ((i / side) % side) as f32, (i / (side * side)) as f32);
            let wobble = Vec3::new(
                rng.gen_range(-jitter..=jitter),
                rng.gen_range(-jitter..=jitter),
                rng.gen_range(-jitter..=jitter),
            );
            let position = cell * spacing - Vec3::new(offset, offset, offset) + wobble;
            Entity::spawn(EntityId::from_raw(i as u64 + 1), position, radius, behavior.clone())
        })
        .collect()
}

/// Random walker that never moves into a collision and logs each step
pub(super) struct Walker {
    pub reach: f32,
    pub log: SegQueue<(u64, EntityId)>,
}

impl Walker {
    pub fn new(reach: f32) -> Arc<Self> {
        Arc::new(Self {
            reach,
            log: SegQueue::new(),
        })
    }

    /// Drain everything logged so far
    pub fn take_log(&self) -> Vec<(u64, EntityId)> {
        std::iter::from_fn(|| self.log.pop()).collect()
    }
}

impl Behavior for Walker {
    fn step(&self, entity: &EntityRef, scope: &dyn CollisionQuery, ctx: &StepContext) {
        self.log.push((ctx.tick(), entity.id()));

        let mut rng = StdRng::seed_from_u64(entity.id().raw().wrapping_mul(0x9E37_79B9) ^ ctx.tick());
        let delta = Vec3::new(
            rng.gen_range(-self.reach..=self.reach),
            rng.gen_range(-self.reach..=self.reach),
            rng.gen_range(-self.reach..=self.reach),
        );
        let target = entity.position() + delta;
        if !scope.check_collision(entity, target) {
            entity.set_position(target);
        }
    }

    fn kind(&self) -> &'static str {
        "walker"
    }
}

/// Assert the residency, uniqueness and halo completeness invariants
pub(super) fn assert_grid_membership<Q: TransferQueue>(grid: &ChunkGrid<Q>, expected: usize) {
    let layout = grid.layout();
    let mut seen = HashSet::new();

    assert_eq!(grid.pending_transfers(), 0);
    for index in 0..layout.chunk_count() {
        for entity in grid.residents(index) {
            assert_eq!(layout.chunk_index_of(entity.position()), index, "{:?} in wrong chunk", entity);
            assert_eq!(entity.owner(), Owner::Chunk(index));
            assert!(seen.insert(entity.id()), "{:?} resident twice", entity);

            for &neighbor in layout.neighbors(index) {
                if layout.within_halo(neighbor, entity.position()) {
                    assert!(
                        grid.halo(neighbor).iter().any(|h| h.id() == entity.id()),
                        "{:?} missing from halo of chunk {}",
                        entity,
                        neighbor
                    );
                }
            }
        }
        for member in grid.halo(index) {
            assert_ne!(layout.chunk_index_of(member.position()), index);
        }
    }
    assert_eq!(seen.len(), expected);
}

/// Assert no two entities overlap
pub(super) fn assert_no_overlaps(entities: &[EntityRef]) {
    for (i, a) in entities.iter().enumerate() {
        for b in &entities[i + 1..] {
            let gap = (a.position() - b.position()).magnitude() - a.radius() - b.radius();
            assert!(gap > -1e-4, "{:?} overlaps {:?}", a, b);
        }
    }
}
