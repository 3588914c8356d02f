//! Vehicle movement logic for the traffic simulation
//!
//! A vehicle hops one intersection per tick along a precomputed route when
//! the signal at its current intersection shows green for the next hop, and
//! waits otherwise.

use serde::{Deserialize, Serialize};

use super::agent::Agent;
use super::error::{SimError, SimResult};
use super::intersection::SignalController;
use super::types::{Direction, GridPos, Route, VehicleId};

/// Simplified CO2 model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmissionModel {
    /// Grams emitted per second while idling
    pub idle_g_per_sec: f64,
    /// Grams emitted per metre while moving
    pub moving_g_per_m: f64,
    /// Speeds below this count as idling
    pub moving_threshold_mps: f64,
}

impl Default for EmissionModel {
    fn default() -> Self {
        Self {
            idle_g_per_sec: 2.31,
            moving_g_per_m: 0.15,
            moving_threshold_mps: 1.0,
        }
    }
}

impl EmissionModel {
    pub fn grams(&self, speed_mps: f64, dt: f64) -> f64 {
        if speed_mps < self.moving_threshold_mps {
            self.idle_g_per_sec * dt
        } else {
            self.moving_g_per_m * speed_mps * dt
        }
    }
}

/// Result of a vehicle update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Already completed, nothing happened
    Idle,
    /// Reached its destination on an earlier tick and is now complete
    Arrived,
    /// Crossed to the next intersection
    Moved,
    /// Held at a red signal
    Waiting,
    /// Ran out of route without reaching the destination; forced complete
    RouteExhausted,
}

impl AdvanceOutcome {
    pub fn completed_now(self) -> bool {
        matches!(self, AdvanceOutcome::Arrived | AdvanceOutcome::RouteExhausted)
    }
}

/// A vehicle in the traffic simulation
#[derive(Debug, Clone)]
pub struct VehicleAgent {
    pub id: VehicleId,
    pub origin: GridPos,
    pub destination: GridPos,
    route: Route,
    route_index: usize,
    position: GridPos,
    speed_mps: f64,
    travel_time_secs: f64,
    delay_secs: f64,
    distance_m: f64,
    emissions_g: f64,
    completed: bool,
    hop_length_m: f64,
    emissions: EmissionModel,
}

impl VehicleAgent {
    pub fn new(
        id: VehicleId,
        origin: GridPos,
        destination: GridPos,
        route: Route,
        hop_length_m: f64,
        emissions: EmissionModel,
    ) -> Self {
        Self {
            id,
            origin,
            destination,
            route,
            route_index: 0,
            position: origin,
            speed_mps: 0.0,
            travel_time_secs: 0.0,
            delay_secs: 0.0,
            distance_m: 0.0,
            emissions_g: 0.0,
            completed: false,
            hop_length_m,
            emissions,
        }
    }

    pub fn route(&self) -> &[GridPos] {
        &self.route
    }

    pub fn route_index(&self) -> usize {
        self.route_index
    }

    pub fn position(&self) -> GridPos {
        self.position
    }

    pub fn speed_mps(&self) -> f64 {
        self.speed_mps
    }

    pub fn travel_time_secs(&self) -> f64 {
        self.travel_time_secs
    }

    pub fn delay_secs(&self) -> f64 {
        self.delay_secs
    }

    pub fn distance_m(&self) -> f64 {
        self.distance_m
    }

    pub fn emissions_g(&self) -> f64 {
        self.emissions_g
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn next_hop(&self) -> Option<GridPos> {
        self.route.get(self.route_index + 1).copied()
    }

    /// Direction this vehicle is queued for, if it is still travelling
    pub fn waiting_direction(&self) -> Option<Direction> {
        if self.completed || self.position == self.destination {
            return None;
        }
        Direction::between(self.position, self.next_hop()?)
    }

    /// Single tick update against the signal at the current intersection
    pub fn step(&mut self, dt: f64, signal: &SignalController) -> SimResult<AdvanceOutcome> {
        if self.completed {
            return Ok(AdvanceOutcome::Idle);
        }

        if self.position == self.destination {
            self.completed = true;
            return Ok(AdvanceOutcome::Arrived);
        }

        let Some(next) = self.next_hop() else {
            self.completed = true;
            return Ok(AdvanceOutcome::RouteExhausted);
        };

        if !self.position.is_adjacent(&next) {
            return Err(SimError::AgentStateViolation {
                vehicle: self.id,
                from: self.position,
                to: next,
            });
        }

        let outcome = if signal.can_pass(self.position, next) {
            self.position = next;
            self.route_index += 1;
            self.distance_m += self.hop_length_m;
            self.speed_mps = if dt > 0.0 { self.hop_length_m / dt } else { 0.0 };
            AdvanceOutcome::Moved
        } else {
            self.speed_mps = 0.0;
            self.delay_secs += dt;
            AdvanceOutcome::Waiting
        };

        self.travel_time_secs += dt;
        self.emissions_g += self.emissions.grams(self.speed_mps, dt);

        Ok(outcome)
    }
}

impl Agent<SignalController> for VehicleAgent {
    type Effect = AdvanceOutcome;

    fn advance(&mut self, dt: f64, signal: &SignalController) -> SimResult<AdvanceOutcome> {
        self.step(dt, signal)
    }
}
