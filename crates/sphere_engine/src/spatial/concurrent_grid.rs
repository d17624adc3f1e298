//! Multi-threaded chunk grid
//!
//! Chunks are colored by the parity of their grid coordinates, giving eight
//! groups in three dimensions. No two chunks of one color are neighbors, and
//! since the halo is narrower than a chunk, a chunk step only reads entities
//! of its own chunk and its direct neighbors, and writes only their inboxes and
//! lists under their locks. All chunks of one color can therefore step at the
//! same time; the groups run one after another with a scope barrier in between.
//!
//! Cross-chunk transfers go through lock-free queues because two chunks of the
//! same color may post to a shared neighbor concurrently.

use crossbeam::queue::SegQueue;
use log::{debug, info};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::core::ChunkGridConfig;
use crate::entity::{Entity, EntityRef};
use crate::foundation::math::Vec3;
use crate::simulation::StepContext;
use crate::spatial::chunk_grid::{ChunkGrid, GridLayout, SharedQueue, COLOR_COUNT};
use crate::spatial::{BoundingBox, CollisionQuery, IndexError, Schedule, SpatialIndex, WorldBounds};

/// Chunks of one color split into per-worker batches
type ColorGroup = Vec<Vec<usize>>;

/// Chunk grid stepped by a worker pool under the 8-color schedule
pub struct ConcurrentChunkGrid {
    grid: ChunkGrid<SharedQueue>,
    pool: ThreadPool,
    groups: Vec<ColorGroup>,
}

/// Split each color's chunks into `workers` batches, round-robin
fn plan_batches(layout: &GridLayout, workers: usize) -> Vec<ColorGroup> {
    let workers = workers.max(1);
    let mut groups: Vec<ColorGroup> = (0..COLOR_COUNT).map(|_| vec![Vec::new(); workers]).collect();

    let mut seen = [0usize; COLOR_COUNT];
    for index in 0..layout.chunk_count() {
        let color = layout.color(index);
        groups[color][seen[color] % workers].push(index);
        seen[color] += 1;
    }

    for group in &mut groups {
        group.retain(|batch| !batch.is_empty());
    }
    groups
}

impl ConcurrentChunkGrid {
    /// Create a grid over `world` with its own worker pool
    pub fn new(world: BoundingBox, config: &ChunkGridConfig, max_entity_radius: f32) -> Result<Self, IndexError> {
        let grid = ChunkGrid::new(world, config, max_entity_radius)?;
        Self::from_grid(grid, config.worker_threads)
    }

    /// Create a grid over `world` with custom collision bounds
    pub fn with_bounds(
        world: BoundingBox,
        bounds: std::sync::Arc<dyn WorldBounds>,
        config: &ChunkGridConfig,
        max_entity_radius: f32,
    ) -> Result<Self, IndexError> {
        let grid = ChunkGrid::with_bounds(world, bounds, config, max_entity_radius)?;
        Self::from_grid(grid, config.worker_threads)
    }

    fn from_grid(grid: ChunkGrid<SharedQueue>, threads: Option<usize>) -> Result<Self, IndexError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.unwrap_or(0))
            .thread_name(|i| format!("chunk-worker-{}", i))
            .build()
            .map_err(|e| IndexError::ThreadPool(e.to_string()))?;

        let workers = pool.current_num_threads();
        let groups = plan_batches(grid.layout(), workers);
        info!("Concurrent chunk grid using {} worker threads", workers);

        Ok(Self { grid, pool, groups })
    }

    /// Underlying grid, for inspection
    pub fn grid(&self) -> &ChunkGrid<SharedQueue> {
        &self.grid
    }

    /// Number of worker threads in the pool
    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl CollisionQuery for ConcurrentChunkGrid {
    fn check_collision(&self, entity: &Entity, candidate: Vec3) -> bool {
        self.grid.check_collision(entity, candidate)
    }

    fn find_first_collision(&self, entity: &Entity, direction: Vec3, length: f32) -> Option<f32> {
        self.grid.find_first_collision(entity, direction, length)
    }

    fn nearest_neighbor(&self, entity: &Entity) -> Option<EntityRef> {
        self.grid.nearest_neighbor(entity)
    }

    fn entities_within_range(&self, entity: &Entity, radius: f32) -> Vec<EntityRef> {
        self.grid.entities_within_range(entity, radius)
    }
}

impl SpatialIndex for ConcurrentChunkGrid {
    fn backend_name(&self) -> &'static str {
        "concurrent_chunk_grid"
    }

    fn schedule(&self) -> Schedule {
        Schedule::Parallel
    }

    fn add_entity(&mut self, entity: EntityRef) -> Result<(), IndexError> {
        self.grid.insert(entity)
    }

    fn remove_entity(&mut self, entity: &Entity) -> bool {
        self.grid.remove(entity)
    }

    fn step_parallel(&mut self, ctx: &StepContext) -> Result<(), IndexError> {
        let scope = self.grid.scope();
        let failures: SegQueue<IndexError> = SegQueue::new();

        for group in &self.groups {
            self.pool.scope(|s| {
                for batch in group {
                    let (scope, failures) = (&scope, &failures);
                    s.spawn(move |_| {
                        for &index in batch {
                            if let Err(err) = scope.states[index].step(scope, index, ctx) {
                                failures.push(err);
                            }
                        }
                    });
                }
            });

            if let Some(err) = failures.pop() {
                return Err(err);
            }
        }

        let settled: usize = self.pool.install(|| {
            scope
                .states
                .par_iter()
                .zip(scope.inboxes.par_iter())
                .enumerate()
                .map(|(index, (state, inbox))| state.drain(scope.layout, index, inbox))
                .sum()
        });

        debug!("Concurrent grid tick {}: settled {} transfers", ctx.tick(), settled);
        Ok(())
    }

    fn get_all(&self) -> Vec<EntityRef> {
        self.grid.all()
    }

    fn count(&self) -> usize {
        self.grid.len()
    }

    fn clear(&mut self) {
        self.grid.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_batches_cover_every_chunk_once() {
        let world = BoundingBox::new(Vec3::new(-8.0, -8.0, -8.0), Vec3::new(8.0, 8.0, 8.0));
        let layout = GridLayout::new(&world, 4.0, 1.0);
        let groups = plan_batches(&layout, 3);

        assert_eq!(groups.len(), COLOR_COUNT);
        let mut seen = HashSet::new();
        for (color, group) in groups.iter().enumerate() {
            assert!(group.len() <= 3);
            let sizes: Vec<usize> = group.iter().map(Vec::len).collect();
            let spread = sizes.iter().max().unwrap() - sizes.iter().min().unwrap();
            assert!(spread <= 1);
            for &index in group.iter().flatten() {
                assert_eq!(layout.color(index), color);
                assert!(seen.insert(index));
            }
        }
        assert_eq!(seen.len(), layout.chunk_count());
    }

    #[test]
    fn test_sequential_step_is_rejected() {
        let world = BoundingBox::new(Vec3::new(-8.0, -8.0, -8.0), Vec3::new(8.0, 8.0, 8.0));
        let config = ChunkGridConfig {
            chunk_size: 4.0,
            worker_threads: Some(2),
            ..ChunkGridConfig::default()
        };
        let mut grid = ConcurrentChunkGrid::new(world, &config, 0.5).unwrap();
        assert_eq!(grid.worker_count(), 2);
        let ctx = StepContext::new(0);
        assert!(matches!(
            grid.step(&ctx),
            Err(IndexError::WrongSchedule { requested: Schedule::Sequential, .. })
        ));
    }
}
