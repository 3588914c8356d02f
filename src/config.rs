//! TOML-based scenario configuration
//!
//! Every field has a default matching the 5x5 downtown scenario, so an
//! empty file (or no file at all) is a valid configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::simulation::{
    EmissionModel, GridPos, RoutingPolicy, SignalMode, SignalTiming, SimError, SimResult,
};

/// Top-level simulation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Human-readable scenario name carried into the report
    pub scenario: String,
    /// Intersections per side of the square grid
    pub grid_size: usize,
    /// Distance between adjacent intersections (m)
    pub spacing_m: f64,
    pub vehicle_count: usize,
    /// Duration of one tick (s)
    pub tick_secs: f64,
    /// Simulated duration after which the run stops (s)
    pub horizon_secs: f64,
    pub signal_mode: SignalMode,
    /// Master random seed
    pub seed: u64,
    pub signals: SignalTiming,
    pub emissions: EmissionModel,
    pub routing: RoutingPolicy,
    /// Segments removed from the grid, both directions
    pub closed_segments: Vec<(GridPos, GridPos)>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            scenario: "Urban Traffic Congestion Management".to_string(),
            grid_size: 5,
            spacing_m: 1000.0,
            vehicle_count: 2500,
            tick_secs: 1.0,
            horizon_secs: 3.0 * 3600.0,
            signal_mode: SignalMode::Adaptive,
            seed: 42,
            signals: SignalTiming::default(),
            emissions: EmissionModel::default(),
            routing: RoutingPolicy::default(),
            closed_segments: Vec::new(),
        }
    }
}

impl SimulationConfig {
    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Configuration` if the file cannot be read or the
    /// TOML is invalid.
    pub fn from_toml_file(path: &Path) -> SimResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            SimError::config("config", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> SimResult<Self> {
        toml::from_str(s).map_err(|e| SimError::config("toml", e.to_string()))
    }

    /// Number of ticks needed to reach the horizon when free-running
    pub fn total_ticks(&self) -> u64 {
        (self.horizon_secs / self.tick_secs).ceil() as u64
    }

    /// Checks every constraint, returning the first violation
    pub fn validate(&self) -> SimResult<()> {
        if self.grid_size < 2 {
            return Err(SimError::config("grid_size", "must be at least 2"));
        }
        if !positive(self.spacing_m) {
            return Err(SimError::config("spacing_m", "must be > 0"));
        }
        if !positive(self.tick_secs) {
            return Err(SimError::config("tick_secs", "must be > 0"));
        }
        if !positive(self.horizon_secs) {
            return Err(SimError::config("horizon_secs", "must be > 0"));
        }

        let SignalTiming {
            min_green_secs,
            max_green_secs,
        } = self.signals;
        if !positive(min_green_secs) {
            return Err(SimError::config("signals.min_green_secs", "must be > 0"));
        }
        if max_green_secs < min_green_secs {
            return Err(SimError::config(
                "signals.max_green_secs",
                format!("must be >= min_green_secs ({min_green_secs})"),
            ));
        }

        let emissions = &self.emissions;
        if emissions.idle_g_per_sec < 0.0 || emissions.moving_g_per_m < 0.0 {
            return Err(SimError::config("emissions", "rates must be >= 0"));
        }

        if self.routing.alternative_routes == 0 {
            return Err(SimError::config(
                "routing.alternative_routes",
                "must be at least 1",
            ));
        }
        if self.routing.walk_noise.is_nan() || self.routing.walk_noise < 0.0 {
            return Err(SimError::config("routing.walk_noise", "must be >= 0"));
        }

        for (a, b) in &self.closed_segments {
            let in_bounds = |p: &GridPos| p.x < self.grid_size && p.y < self.grid_size;
            if !in_bounds(a) || !in_bounds(b) {
                return Err(SimError::config(
                    "closed_segments",
                    format!("segment {a} -> {b} lies outside the grid"),
                ));
            }
            if !a.is_adjacent(b) {
                return Err(SimError::config(
                    "closed_segments",
                    format!("{a} and {b} are not adjacent"),
                ));
            }
        }

        Ok(())
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}
