//! # Simulation Configuration
//!
//! Describes a run: the world box, the largest entity it will hold, which
//! spatial index backend to use and how that backend is scheduled. The
//! structures are plain serde types so they can be loaded from TOML or RON
//! through the [`Config`] trait.
//!
//! Validation happens in two places. [`SimulationConfig::validate`] catches
//! combinations that make no sense regardless of geometry (a backend paired
//! with a schedule it cannot run under, an empty world); the index
//! constructors then check the geometry itself (chunk size against entity
//! size, fanout bounds).

use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};

use crate::foundation::math::Vec3;
use crate::spatial::{BoundingBox, Schedule};

/// # World Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Minimum corner of the world box
    pub min: [f32; 3],
    /// Maximum corner of the world box
    pub max: [f32; 3],
    /// Largest radius any entity may have
    pub max_entity_radius: f32,
}

impl WorldConfig {
    /// Cube centered on the origin with the given half-size
    pub fn cube(half_size: f32, max_entity_radius: f32) -> Self {
        Self {
            min: [-half_size; 3],
            max: [half_size; 3],
            max_entity_radius,
        }
    }

    /// World box
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::new(Vec3::from(self.min), Vec3::from(self.max))
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self::cube(64.0, 0.5)
    }
}

/// # Chunk Grid Configuration
///
/// Shared by the single-threaded and concurrent chunk grids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkGridConfig {
    /// Edge length of one chunk
    pub chunk_size: f32,
    /// Halo band width; one entity diameter when unset
    pub halo_width: Option<f32>,
    /// Seed for shuffling the chunk order every tick; fixed order when unset
    pub shuffle_seed: Option<u64>,
    /// Worker threads for the concurrent grid; one per core when unset
    pub worker_threads: Option<usize>,
}

impl ChunkGridConfig {
    /// Grid with the given chunk size and default halo
    pub fn new(chunk_size: f32) -> Self {
        Self {
            chunk_size,
            ..Self::default()
        }
    }

    /// Set the halo width
    pub fn with_halo_width(mut self, halo_width: f32) -> Self {
        self.halo_width = Some(halo_width);
        self
    }

    /// Shuffle chunk order each tick from `seed`
    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    /// Set the worker thread count
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }
}

impl Default for ChunkGridConfig {
    fn default() -> Self {
        Self {
            chunk_size: 8.0,
            halo_width: None,
            shuffle_seed: None,
            worker_threads: None,
        }
    }
}

/// # R-tree Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RTreeConfig {
    /// Minimum children per non-root node
    pub min_fanout: usize,
    /// Maximum children per node
    pub max_fanout: usize,
    /// Seed for shuffling the stepping order every tick; fixed order when unset
    pub shuffle_seed: Option<u64>,
}

impl RTreeConfig {
    /// Tree with the given fanout bounds
    pub fn new(min_fanout: usize, max_fanout: usize) -> Self {
        Self {
            min_fanout,
            max_fanout,
            shuffle_seed: None,
        }
    }

    /// Shuffle stepping order each tick from `seed`
    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }
}

impl Default for RTreeConfig {
    fn default() -> Self {
        Self::new(4, 10)
    }
}

/// # Backend Selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendConfig {
    /// Single-threaded halo-zone grid
    ChunkGrid(ChunkGridConfig),
    /// Halo-zone grid stepped on a worker pool
    ConcurrentChunkGrid(ChunkGridConfig),
    /// Dynamic R-tree
    RTree(RTreeConfig),
}

impl BackendConfig {
    /// Schedule this backend runs under
    pub fn natural_schedule(&self) -> Schedule {
        match self {
            BackendConfig::ConcurrentChunkGrid(_) => Schedule::Parallel,
            BackendConfig::ChunkGrid(_) | BackendConfig::RTree(_) => Schedule::Sequential,
        }
    }

    /// Short backend name for logs
    pub fn name(&self) -> &'static str {
        match self {
            BackendConfig::ChunkGrid(_) => "chunk_grid",
            BackendConfig::ConcurrentChunkGrid(_) => "concurrent_chunk_grid",
            BackendConfig::RTree(_) => "rtree",
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::ChunkGrid(ChunkGridConfig::default())
    }
}

/// # Complete Simulation Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Log level for the run
    pub log_level: String,
    /// Scheduling model; must match the backend
    pub schedule: Schedule,
    /// World extent and entity size limit
    pub world: WorldConfig,
    /// Spatial index backend
    pub backend: BackendConfig,
}

impl SimulationConfig {
    /// Configuration over `world` with the default backend
    pub fn new(world: WorldConfig) -> Self {
        Self {
            world,
            ..Self::default()
        }
    }

    /// Select a backend and its natural schedule
    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.schedule = backend.natural_schedule();
        self.backend = backend;
        self
    }

    /// Override the schedule
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| Err(ConfigError::Invalid(message));

        let bounds = self.world.bounds();
        if !bounds.is_valid() || bounds.volume() <= 0.0 {
            return invalid(format!("world box {:?}..{:?} is empty", self.world.min, self.world.max));
        }
        if !(self.world.max_entity_radius.is_finite() && self.world.max_entity_radius > 0.0) {
            return invalid(format!(
                "max entity radius {} must be positive",
                self.world.max_entity_radius
            ));
        }

        let natural = self.backend.natural_schedule();
        if self.schedule != natural {
            return invalid(format!(
                "{} backend cannot run under the {:?} schedule",
                self.backend.name(),
                self.schedule
            ));
        }

        if let BackendConfig::ConcurrentChunkGrid(grid) = &self.backend {
            if grid.worker_threads == Some(0) {
                return invalid("worker thread count must be at least 1".to_string());
            }
        }

        Ok(())
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            schedule: Schedule::Sequential,
            world: WorldConfig::default(),
            backend: BackendConfig::default(),
        }
    }
}

impl Config for SimulationConfig {}
