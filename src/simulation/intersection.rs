//! Intersection and signal control logic for the traffic simulation
//!
//! Every intersection owns a two-phase signal. The signal's green time is
//! stretched toward `max_green` in proportion to the share of waiting demand
//! on the phase that currently has green.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::types::{Direction, GridPos, IntersectionId, SignalPhase};

/// How signal green times are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalMode {
    /// Green time follows measured demand
    #[default]
    Adaptive,
    /// Demand is ignored; both phases get the midpoint green time
    Fixed,
}

impl fmt::Display for SignalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalMode::Adaptive => write!(f, "adaptive"),
            SignalMode::Fixed => write!(f, "fixed"),
        }
    }
}

impl FromStr for SignalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "adaptive" => Ok(SignalMode::Adaptive),
            "fixed" => Ok(SignalMode::Fixed),
            other => Err(format!(
                "unknown signal mode \"{other}\", expected \"adaptive\" or \"fixed\""
            )),
        }
    }
}

/// Green time bounds shared by all signals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignalTiming {
    pub min_green_secs: f64,
    pub max_green_secs: f64,
}

impl Default for SignalTiming {
    fn default() -> Self {
        Self {
            min_green_secs: 15.0,
            max_green_secs: 90.0,
        }
    }
}

/// Queue counts seen by a signal on one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Demand {
    pub north_south: usize,
    pub east_west: usize,
}

impl Demand {
    pub fn record(&mut self, direction: Direction) {
        match direction {
            Direction::NorthSouth => self.north_south += 1,
            Direction::EastWest => self.east_west += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.north_south + self.east_west
    }
}

/// Two-phase signal state machine
#[derive(Debug, Clone)]
pub struct SignalController {
    timing: SignalTiming,
    current_phase: SignalPhase,
    phase_elapsed_secs: f64,
    ns_queue_len: usize,
    ew_queue_len: usize,
}

impl SignalController {
    pub fn new(timing: SignalTiming) -> Self {
        Self {
            timing,
            current_phase: SignalPhase::NorthSouth,
            phase_elapsed_secs: 0.0,
            ns_queue_len: 0,
            ew_queue_len: 0,
        }
    }

    pub fn current_phase(&self) -> SignalPhase {
        self.current_phase
    }

    pub fn phase_elapsed_secs(&self) -> f64 {
        self.phase_elapsed_secs
    }

    /// Demand observed on the most recent update, as (north-south, east-west)
    pub fn queue_lengths(&self) -> (usize, usize) {
        (self.ns_queue_len, self.ew_queue_len)
    }

    /// Green time the current phase is entitled to under the given demand
    pub fn target_green(&self, ns_demand: usize, ew_demand: usize) -> f64 {
        let SignalTiming {
            min_green_secs,
            max_green_secs,
        } = self.timing;
        let total = ns_demand + ew_demand;
        if total == 0 {
            return min_green_secs;
        }
        let current = match self.current_phase {
            SignalPhase::NorthSouth => ns_demand,
            SignalPhase::EastWest => ew_demand,
        };
        min_green_secs + (max_green_secs - min_green_secs) * (current as f64 / total as f64)
    }

    /// Advances the phase timer by `dt` and flips phase once the target green
    /// time has been served.
    ///
    /// Returns true when the phase changed.
    pub fn update(&mut self, dt: f64, ns_demand: usize, ew_demand: usize) -> bool {
        self.phase_elapsed_secs += dt;
        self.ns_queue_len = ns_demand;
        self.ew_queue_len = ew_demand;

        if self.phase_elapsed_secs >= self.target_green(ns_demand, ew_demand) {
            self.current_phase = self.current_phase.flipped();
            self.phase_elapsed_secs = 0.0;
            return true;
        }
        false
    }

    /// Update using the configured mode. Fixed mode reports equal demand on
    /// both phases so the split is always the midpoint.
    pub fn update_with_mode(&mut self, dt: f64, demand: Demand, mode: SignalMode) -> bool {
        match mode {
            SignalMode::Adaptive => self.update(dt, demand.north_south, demand.east_west),
            SignalMode::Fixed => self.update(dt, 1, 1),
        }
    }

    /// Whether a single hop from `from` to `to` has green right now.
    ///
    /// Diagonal, zero-length and multi-hop moves never pass.
    pub fn can_pass(&self, from: GridPos, to: GridPos) -> bool {
        Direction::between(from, to).is_some_and(|direction| self.current_phase.allows(direction))
    }
}

/// A signalised intersection in the traffic simulation
#[derive(Debug, Clone)]
pub struct Intersection {
    pub id: IntersectionId,
    pub position: GridPos,
    pub signal: SignalController,
}

impl Intersection {
    pub fn new(id: IntersectionId, position: GridPos, timing: SignalTiming) -> Self {
        Self {
            id,
            position,
            signal: SignalController::new(timing),
        }
    }
}
