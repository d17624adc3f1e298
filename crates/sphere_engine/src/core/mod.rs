//! # Core Module
//!
//! Shared configuration for the simulation: world extent, backend choice and
//! scheduling model. Everything a run needs is described here and validated
//! before any index is built.

pub mod config;

pub use config::{
    BackendConfig,
    ChunkGridConfig,
    Config,
    ConfigError,
    RTreeConfig,
    SimulationConfig,
    WorldConfig,
};
