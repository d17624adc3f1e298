//! Step coordinator
//!
//! Drives the run: builds the configured backend, steps it once per tick with
//! the matching schedule, then applies the deaths and births queued by
//! behaviors. Deaths are applied first so their space is free for the births
//! of the same tick.

use std::sync::Arc;

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::config::ConfigError;
use crate::core::{BackendConfig, SimulationConfig};
use crate::entity::{Behavior, Entity, EntityId, EntityRef};
use crate::foundation::math::Vec3;
use crate::foundation::time::Stopwatch;
use crate::simulation::{LifecycleEvent, SimulationStats, StepContext, TickReport};
use crate::spatial::{
    BoxBounds, ChunkGrid, ConcurrentChunkGrid, IndexError, LocalQueue, RTreeIndex, Schedule, SpatialIndex,
    WorldBounds,
};

/// Errors that abort a run
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Configuration could not be used
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The spatial index refused an operation
    #[error("spatial index error: {0}")]
    Index(#[from] IndexError),
}

/// Build the backend selected by `config`
pub fn build_index(config: &SimulationConfig) -> Result<Box<dyn SpatialIndex>, IndexError> {
    let world = config.world.bounds();
    let bounds: Arc<dyn WorldBounds> = Arc::new(BoxBounds::new(world));
    let max_radius = config.world.max_entity_radius;

    let index: Box<dyn SpatialIndex> = match &config.backend {
        BackendConfig::ChunkGrid(grid) => {
            Box::new(ChunkGrid::<LocalQueue>::with_bounds(world, bounds, grid, max_radius)?)
        }
        BackendConfig::ConcurrentChunkGrid(grid) => {
            Box::new(ConcurrentChunkGrid::with_bounds(world, bounds, grid, max_radius)?)
        }
        BackendConfig::RTree(tree) => Box::new(RTreeIndex::new(tree, bounds, max_radius)?),
    };
    Ok(index)
}

/// Owns the spatial index and advances the simulation
pub struct StepCoordinator {
    index: Box<dyn SpatialIndex>,
    schedule: Schedule,
    stats: SimulationStats,
    tick: u64,
}

impl StepCoordinator {
    /// Validate `config` and build its backend
    pub fn new(config: &SimulationConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        let index = build_index(config)?;
        info!(
            "Simulation ready: {} backend, {:?} schedule",
            index.backend_name(),
            config.schedule
        );
        Self::with_index(index, config.schedule)
    }

    /// Drive an already built index
    pub fn with_index(index: Box<dyn SpatialIndex>, schedule: Schedule) -> Result<Self, SimulationError> {
        if index.schedule() != schedule {
            return Err(ConfigError::Invalid(format!(
                "{} backend cannot run under the {:?} schedule",
                index.backend_name(),
                schedule
            ))
            .into());
        }
        let mut stats = SimulationStats::default();
        stats.record_seeded(index.count());
        Ok(Self {
            index,
            schedule,
            stats,
            tick: 0,
        })
    }

    /// Active index
    pub fn index(&self) -> &dyn SpatialIndex {
        self.index.as_ref()
    }

    /// Accumulated statistics
    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    /// Next tick to be stepped
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Live entity count
    pub fn population(&self) -> usize {
        self.index.count()
    }

    /// Snapshot of every live entity
    pub fn entities(&self) -> Vec<EntityRef> {
        self.index.get_all()
    }

    /// Place a root entity before or between ticks
    ///
    /// Returns `None` if the spot is blocked or the entity is invalid.
    pub fn seed(
        &mut self,
        position: Vec3,
        radius: f32,
        behavior: Arc<dyn Behavior>,
    ) -> Result<Option<EntityId>, SimulationError> {
        let id = EntityId::derive(self.tick, &position, None);
        let entity = Entity::spawn(id, position, radius, behavior);
        let placed = place(self.index.as_mut(), entity)?;
        self.stats.record_seeded(self.index.count());
        Ok(placed)
    }

    /// Add an existing entity, bypassing the collision check
    pub fn insert(&mut self, entity: EntityRef) -> Result<(), SimulationError> {
        self.index.add_entity(entity)?;
        self.stats.record_seeded(self.index.count());
        Ok(())
    }

    /// Advance one tick
    pub fn tick(&mut self) -> Result<TickReport, SimulationError> {
        let ctx = StepContext::new(self.tick);
        let mut watch = Stopwatch::start_new();

        let stepped = match self.schedule {
            Schedule::Sequential => self.index.step(&ctx),
            Schedule::Parallel => self.index.step_parallel(&ctx),
        };
        watch.stop();
        if let Err(err) = stepped {
            error!("Tick {} aborted: {}", self.tick, err);
            return Err(err.into());
        }

        let mut report = TickReport {
            tick: self.tick,
            step_millis: watch.elapsed_millis(),
            ..TickReport::default()
        };
        apply_events(self.index.as_mut(), ctx.take_events(), self.tick, &mut report)?;
        report.population = self.index.count();

        self.stats.record(&report);
        debug!(
            "Tick {}: population {} (+{} -{}, {} rejected) in {:.2}ms",
            report.tick, report.population, report.births, report.deaths, report.rejected_spawns, report.step_millis
        );

        self.tick += 1;
        Ok(report)
    }

    /// Advance `ticks` ticks
    pub fn run(&mut self, ticks: u64) -> Result<&SimulationStats, SimulationError> {
        for _ in 0..ticks {
            self.tick()?;
        }
        Ok(&self.stats)
    }
}

/// Add `entity` unless its spot is blocked; invalid entities are dropped
fn place(index: &mut dyn SpatialIndex, entity: EntityRef) -> Result<Option<EntityId>, IndexError> {
    if index.check_collision(&entity, entity.position()) {
        return Ok(None);
    }
    match index.add_entity(entity.clone()) {
        Ok(()) => Ok(Some(entity.id())),
        Err(IndexError::InvalidEntity { id, reason }) => {
            warn!("Dropping spawn {}: {}", id, reason);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn apply_events(
    index: &mut dyn SpatialIndex,
    events: Vec<LifecycleEvent>,
    tick: u64,
    report: &mut TickReport,
) -> Result<(), IndexError> {
    let (deaths, spawns): (Vec<_>, Vec<_>) = events
        .into_iter()
        .partition(|event| matches!(event, LifecycleEvent::Death { .. }));

    for event in deaths {
        if let LifecycleEvent::Death { entity } = event {
            if index.remove_entity(&entity) {
                report.deaths += 1;
            }
        }
    }

    for event in spawns {
        if let LifecycleEvent::Spawn {
            parent,
            position,
            radius,
            behavior,
        } = event
        {
            let id = EntityId::derive(tick, &position, parent);
            match place(index, Entity::spawn(id, position, radius, behavior))? {
                Some(_) => report.births += 1,
                None => report.rejected_spawns += 1,
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChunkGridConfig, RTreeConfig, WorldConfig};
    use crate::entity::Inert;
    use crate::spatial::CollisionQuery;

    /// Splits once at tick 0, then dies at tick 2
    struct Budding;

    impl Behavior for Budding {
        fn step(&self, entity: &EntityRef, scope: &dyn CollisionQuery, ctx: &StepContext) {
            let offset = Vec3::new(2.0, 0.0, 0.0);
            match ctx.tick() {
                0 => {
                    let spot = entity.position() + offset;
                    if !scope.check_collision(entity, spot) {
                        ctx.spawn(entity, spot, entity.radius(), Arc::new(Inert));
                    }
                    // Blocked by the parent itself
                    ctx.spawn(entity, entity.position(), entity.radius(), Arc::new(Inert));
                }
                2 => {
                    ctx.kill(entity);
                    ctx.kill(entity);
                }
                _ => {}
            }
        }
    }

    fn configs() -> Vec<SimulationConfig> {
        let world = WorldConfig::cube(16.0, 0.5);
        vec![
            SimulationConfig::new(world.clone())
                .with_backend(BackendConfig::ChunkGrid(ChunkGridConfig::new(4.0))),
            SimulationConfig::new(world.clone()).with_backend(BackendConfig::ConcurrentChunkGrid(
                ChunkGridConfig::new(4.0).with_worker_threads(2),
            )),
            SimulationConfig::new(world).with_backend(BackendConfig::RTree(RTreeConfig::new(2, 4))),
        ]
    }

    #[test]
    fn test_births_and_deaths_are_applied_after_step() {
        for config in configs() {
            let mut sim = StepCoordinator::new(&config).unwrap();
            let parent = sim.seed(Vec3::zeros(), 0.5, Arc::new(Budding)).unwrap();
            assert!(parent.is_some());

            let report = sim.tick().unwrap();
            assert_eq!(report.births, 1, "{}", sim.index().backend_name());
            assert_eq!(report.rejected_spawns, 1);
            assert_eq!(report.population, 2);

            sim.tick().unwrap();
            let report = sim.tick().unwrap();
            assert_eq!(report.deaths, 1);
            assert_eq!(report.population, 1);

            let stats = sim.stats();
            assert_eq!(stats.ticks, 3);
            assert_eq!(stats.births, 1);
            assert_eq!(stats.deaths, 1);
            assert_eq!(stats.peak_population, 2);
            assert_eq!(sim.current_tick(), 3);
        }
    }

    #[test]
    fn test_seed_rejects_blocked_spot() {
        let mut sim = StepCoordinator::new(&SimulationConfig::default()).unwrap();
        assert!(sim.seed(Vec3::zeros(), 0.5, Arc::new(Inert)).unwrap().is_some());
        assert!(sim.seed(Vec3::new(0.5, 0.0, 0.0), 0.5, Arc::new(Inert)).unwrap().is_none());
        assert!(sim.seed(Vec3::new(100.0, 0.0, 0.0), 0.5, Arc::new(Inert)).unwrap().is_none());
        assert_eq!(sim.population(), 1);
    }

    #[test]
    fn test_mismatched_schedule_is_fatal() {
        let config = SimulationConfig::default()
            .with_backend(BackendConfig::RTree(RTreeConfig::default()))
            .with_schedule(Schedule::Parallel);
        assert!(matches!(StepCoordinator::new(&config), Err(SimulationError::Config(_))));

        let grid = build_index(&SimulationConfig::default()).unwrap();
        assert!(StepCoordinator::with_index(grid, Schedule::Parallel).is_err());
    }

    #[test]
    fn test_bad_geometry_is_fatal() {
        let config = SimulationConfig::new(WorldConfig::cube(16.0, 3.0))
            .with_backend(BackendConfig::ChunkGrid(ChunkGridConfig::new(4.0)));
        assert!(matches!(
            StepCoordinator::new(&config),
            Err(SimulationError::Index(IndexError::InvalidConfig(_)))
        ));
    }
}
