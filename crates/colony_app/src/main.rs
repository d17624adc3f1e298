//! Colony demo application
//!
//! Runs a headless colony of microbes on the configured spatial index and
//! logs population statistics as it goes.
//!
//! Usage: `colony [config.toml|config.ron] [ticks]`

mod microbe;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use sphere_engine::config::ConfigError;
use sphere_engine::foundation::logging;
use sphere_engine::prelude::*;

use microbe::{Microbe, MicrobeTraits};

// Colony settings
const INITIAL_MICROBES: usize = 400;
const DEFAULT_TICKS: u64 = 500;
const REPORT_INTERVAL: u64 = 50;
const RANDOM_SEED: u64 = 0x5EED;

// Microbe tunables
const MICROBE_SPEED: f32 = 0.4;
const MICROBE_GROWTH: f32 = 0.01;
const BIRTH_RADIUS: f32 = 0.25;
const DEATH_CHANCE: f64 = 0.002;

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error("invalid tick count {0:?}")]
    Ticks(String),
}

struct ColonyApp {
    simulation: StepCoordinator,
    ticks: u64,
}

impl ColonyApp {
    fn new(config: &SimulationConfig, ticks: u64) -> Result<Self, AppError> {
        let mut simulation = StepCoordinator::new(config)?;

        let world = config.world.bounds();
        let traits = MicrobeTraits {
            speed: MICROBE_SPEED,
            growth: MICROBE_GROWTH,
            split_radius: config.world.max_entity_radius,
            birth_radius: BIRTH_RADIUS.min(config.world.max_entity_radius),
            death_chance: DEATH_CHANCE,
            world,
            seed: RANDOM_SEED,
        };
        let behavior = Microbe::new(traits);

        let mut rng = StdRng::seed_from_u64(RANDOM_SEED);
        let margin = config.world.max_entity_radius;
        let mut placed = 0;
        for _ in 0..INITIAL_MICROBES {
            let position = Vec3::new(
                rng.gen_range(world.min.x + margin..world.max.x - margin),
                rng.gen_range(world.min.y + margin..world.max.y - margin),
                rng.gen_range(world.min.z + margin..world.max.z - margin),
            );
            if simulation.seed(position, BIRTH_RADIUS.min(margin), behavior.clone())?.is_some() {
                placed += 1;
            }
        }
        log::info!("Seeded {} of {} microbes", placed, INITIAL_MICROBES);

        Ok(Self { simulation, ticks })
    }

    fn run(mut self) -> Result<(), AppError> {
        let mut watch = Stopwatch::start_new();

        for _ in 0..self.ticks {
            let report = self.simulation.tick()?;
            if report.tick % REPORT_INTERVAL == 0 {
                log::info!(
                    "tick {:>5}: population {:>6} (+{} -{}, {} rejected) step {:.2}ms",
                    report.tick,
                    report.population,
                    report.births,
                    report.deaths,
                    report.rejected_spawns,
                    report.step_millis
                );
            }
            if report.population == 0 {
                log::warn!("Colony died out at tick {}", report.tick);
                break;
            }
        }

        watch.stop();
        let stats = self.simulation.stats();
        log::info!(
            "Finished {} ticks in {:.1}ms: births {}, deaths {}, rejected {}, peak {}, final {}, avg step {:.3}ms",
            stats.ticks,
            watch.elapsed_millis(),
            stats.births,
            stats.deaths,
            stats.rejected_spawns,
            stats.peak_population,
            stats.population,
            stats.average_step_millis()
        );
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);

    let config = match args.next() {
        Some(path) => SimulationConfig::load_from_file(&path).map_err(AppError::from)?,
        None => SimulationConfig::default(),
    };
    let ticks = match args.next() {
        Some(raw) => raw.parse().map_err(|_| AppError::Ticks(raw))?,
        None => DEFAULT_TICKS,
    };

    logging::init_with_level(&config.log_level);
    log::info!(
        "=== Colony Demo ({} backend, {:?} schedule) ===",
        config.backend.name(),
        config.schedule
    );

    let app = ColonyApp::new(&config, ticks)?;
    app.run()?;
    Ok(())
}
