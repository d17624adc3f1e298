//! Run statistics

use serde::{Deserialize, Serialize};

/// Outcome of one tick
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TickReport {
    /// Tick that was stepped
    pub tick: u64,
    /// Entities added from spawn events
    pub births: usize,
    /// Entities removed by death events
    pub deaths: usize,
    /// Spawn events dropped because the spot was taken or invalid
    pub rejected_spawns: usize,
    /// Live entities after the tick
    pub population: usize,
    /// Time spent inside the index step
    pub step_millis: f32,
}

/// Totals accumulated by the coordinator over a run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimulationStats {
    /// Ticks completed
    pub ticks: u64,
    /// Total births
    pub births: u64,
    /// Total deaths
    pub deaths: u64,
    /// Total rejected spawns
    pub rejected_spawns: u64,
    /// Live entities after the last tick
    pub population: usize,
    /// Largest population seen
    pub peak_population: usize,
    /// Step time of the last tick
    pub last_step_millis: f32,
    /// Step time summed over the run
    pub total_step_millis: f64,
}

impl SimulationStats {
    /// Fold a tick into the totals
    pub fn record(&mut self, report: &TickReport) {
        self.ticks += 1;
        self.births += report.births as u64;
        self.deaths += report.deaths as u64;
        self.rejected_spawns += report.rejected_spawns as u64;
        self.population = report.population;
        self.peak_population = self.peak_population.max(report.population);
        self.last_step_millis = report.step_millis;
        self.total_step_millis += f64::from(report.step_millis);
    }

    /// Record entities added outside of a tick (initial seeding)
    pub fn record_seeded(&mut self, population: usize) {
        self.population = population;
        self.peak_population = self.peak_population.max(population);
    }

    /// Mean step time per tick
    pub fn average_step_millis(&self) -> f64 {
        if self.ticks == 0 {
            0.0
        } else {
            self.total_step_millis / self.ticks as f64
        }
    }
}
