//! Main simulation engine that ties everything together
//!
//! One tick: count demand at every intersection, update every signal, step
//! every vehicle in ascending id order, ask the clock for the next time
//! boundary, then record a snapshot stamped with the granted time.

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use crate::config::SimulationConfig;

use super::agent::{Agent, SignalInput};
use super::clock::{ClockError, LocalClock, TimeAdvance};
use super::error::{SimError, SimResult};
use super::intersection::{Demand, Intersection, SignalMode};
use super::metrics::{MetricsSink, ProgressLogSink, QueueStats, SimulationReport, TickSnapshot};
use super::road_network::RoadNetwork;
use super::route_finder::RouteFinder;
use super::types::{GridPos, VehicleId};
use super::vehicle::VehicleAgent;

/// How many destinations are tried for an origin before giving up
const MAX_DESTINATION_DRAWS: usize = 32;

/// Slack when comparing accumulated time against the horizon
const TIME_EPSILON: f64 = 1e-9;

pub struct TrafficSimulationEngine {
    config: SimulationConfig,
    network: RoadNetwork,

    /// Indexed by intersection id
    intersections: Vec<Intersection>,

    /// Sorted by ascending vehicle id
    vehicles: Vec<VehicleAgent>,

    clock: Box<dyn TimeAdvance>,
    synchronized: bool,

    time_secs: f64,
    tick: u64,
    completed: usize,
    completed_travel_time_secs: f64,
    queue_stats: QueueStats,
    phase_changes: u64,
}

impl TrafficSimulationEngine {
    /// Builds the network and spawns `vehicle_count` vehicles with random
    /// origin/destination pairs drawn from the configured seed.
    pub fn new(config: SimulationConfig) -> SimResult<Self> {
        config.validate()?;
        let network = Self::build_network(&config)?;

        info!("Initializing {} vehicles...", config.vehicle_count);
        let mut rng = StdRng::seed_from_u64(config.seed);
        let vehicles = spawn_vehicles(&network, &config, &mut rng)?;
        info!("Created {} vehicles", vehicles.len());

        Ok(Self::assemble(config, network, vehicles))
    }

    /// Builds the engine with one vehicle per explicit (origin, destination)
    /// trip, ignoring `vehicle_count`.
    pub fn with_trips(config: SimulationConfig, trips: &[(GridPos, GridPos)]) -> SimResult<Self> {
        config.validate()?;
        let network = Self::build_network(&config)?;
        let mut rng = StdRng::seed_from_u64(config.seed);

        let vehicles = {
            let mut finder = RouteFinder::new(&network, config.routing);
            trips
                .iter()
                .enumerate()
                .map(|(index, &(origin, destination))| {
                    let route = finder.choose_route(origin, destination, &mut rng)?;
                    Ok(new_vehicle(&config, index, origin, destination, route))
                })
                .collect::<SimResult<Vec<_>>>()?
        };

        Ok(Self::assemble(config, network, vehicles))
    }

    /// Replaces the free-running clock
    pub fn with_clock(mut self, clock: Box<dyn TimeAdvance>) -> Self {
        self.synchronized = clock.is_synchronized();
        self.clock = clock;
        self
    }

    fn build_network(config: &SimulationConfig) -> SimResult<RoadNetwork> {
        let network = RoadNetwork::with_closed_segments(
            config.grid_size,
            config.spacing_m,
            &config.closed_segments,
        )?;
        info!(
            "Built {}x{} grid: {} intersections, {} directed road segments",
            config.grid_size,
            config.grid_size,
            network.intersection_count(),
            network.road_count()
        );
        Ok(network)
    }

    fn assemble(
        config: SimulationConfig,
        network: RoadNetwork,
        vehicles: Vec<VehicleAgent>,
    ) -> Self {
        let intersections: Vec<Intersection> = network
            .positions()
            .map(|pos| Intersection::new(network.intersection_id(pos), pos, config.signals))
            .collect();
        let queue_stats = QueueStats::new(intersections.len());

        Self {
            config,
            network,
            intersections,
            vehicles,
            clock: Box::new(LocalClock),
            synchronized: false,
            time_secs: 0.0,
            tick: 0,
            completed: 0,
            completed_travel_time_secs: 0.0,
            queue_stats,
            phase_changes: 0,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn network(&self) -> &RoadNetwork {
        &self.network
    }

    pub fn intersections(&self) -> &[Intersection] {
        &self.intersections
    }

    pub fn vehicles(&self) -> &[VehicleAgent] {
        &self.vehicles
    }

    pub fn time_secs(&self) -> f64 {
        self.time_secs
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn completed_count(&self) -> usize {
        self.completed
    }

    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    pub fn is_finished(&self) -> bool {
        self.time_secs + TIME_EPSILON >= self.config.horizon_secs
    }

    /// Runs to the horizon, feeding every tick to `sink`
    pub fn run<S: MetricsSink>(&mut self, mut sink: S) -> SimResult<SimulationReport> {
        info!(
            "Starting {:.1}-hour simulation ({} ticks) with {} signals ({} vehicles, {} intersections)",
            self.config.horizon_secs / 3600.0,
            self.config.total_ticks(),
            self.config.signal_mode,
            self.vehicles.len(),
            self.intersections.len()
        );

        while !self.is_finished() {
            let snapshot = self.step()?;
            sink.record_tick(&snapshot)?;
        }

        let report = self.report();
        sink.finish(&report)?;
        info!(
            "Simulation completed: {}/{} vehicles finished",
            report.completed_vehicles, report.total_vehicles
        );
        Ok(report)
    }

    /// Executes one tick and returns its snapshot
    pub fn step(&mut self) -> SimResult<TickSnapshot> {
        let dt = self.config.tick_secs;

        let demand = self.collect_demand();
        let phase_changes = self.update_signals(dt, &demand)?;
        self.move_vehicles(dt)?;

        let tick = self.tick;
        self.advance_time(dt);
        Ok(self.collect_metrics(tick, phase_changes))
    }

    /// Waiting demand per intersection in one pass over the vehicles
    fn collect_demand(&self) -> Vec<Demand> {
        let mut demand = vec![Demand::default(); self.intersections.len()];
        for vehicle in &self.vehicles {
            if let Some(direction) = vehicle.waiting_direction() {
                let id = self.network.intersection_id(vehicle.position());
                demand[id.0].record(direction);
            }
        }
        demand
    }

    fn update_signals(&mut self, dt: f64, demand: &[Demand]) -> SimResult<usize> {
        let mode = self.config.signal_mode;
        let mut changes = 0;
        for (intersection, &demand) in self.intersections.iter_mut().zip(demand) {
            if intersection.signal.advance(dt, &SignalInput { demand, mode })? {
                changes += 1;
            }
        }
        self.phase_changes += changes as u64;
        Ok(changes)
    }

    fn move_vehicles(&mut self, dt: f64) -> SimResult<()> {
        for vehicle in self.vehicles.iter_mut().filter(|v| !v.is_completed()) {
            let id = self.network.intersection_id(vehicle.position());
            let outcome = vehicle.advance(dt, &self.intersections[id.0].signal)?;

            if outcome.completed_now() {
                debug!(
                    "Vehicle {} completed ({:?}) after {:.0}s",
                    vehicle.id,
                    outcome,
                    vehicle.travel_time_secs()
                );
                self.completed += 1;
                self.completed_travel_time_secs += vehicle.travel_time_secs();
            }
        }
        Ok(())
    }

    /// Snapshot of tick `tick`, stamped with the boundary the clock granted
    fn collect_metrics(&mut self, tick: u64, phase_changes: usize) -> TickSnapshot {
        let mut queue_lengths = vec![0; self.intersections.len()];
        for vehicle in self.vehicles.iter().filter(|v| !v.is_completed()) {
            queue_lengths[self.network.intersection_id(vehicle.position()).0] += 1;
        }
        self.queue_stats.record(&queue_lengths);

        let total_emissions_g = self.vehicles.iter().map(VehicleAgent::emissions_g).sum();

        TickSnapshot {
            tick,
            time_secs: self.time_secs,
            queue_lengths,
            total_emissions_g,
            completed_vehicles: self.completed,
            active_vehicles: self.vehicles.len() - self.completed,
            avg_travel_time_secs: (self.completed > 0)
                .then(|| self.completed_travel_time_secs / self.completed as f64),
            phase_changes,
        }
    }

    /// Asks the clock for the next boundary, dropping to local ticking for
    /// the rest of the run if the clock fails or stalls
    fn advance_time(&mut self, dt: f64) {
        let proposed = self.time_secs + dt;
        let granted = match self.clock.request_next_boundary(proposed) {
            Ok(granted) if granted > self.time_secs => Ok(granted),
            Ok(granted) => Err(ClockError::NoProgress {
                current: self.time_secs,
                granted,
            }),
            Err(e) => Err(e),
        };

        self.time_secs = match granted {
            Ok(granted) => granted,
            Err(e) => {
                warn!("Time coordinator failed ({e}); continuing with local ticks");
                self.clock = Box::new(LocalClock);
                self.synchronized = false;
                proposed
            }
        };
        self.tick += 1;
    }

    /// Aggregate report for the run so far
    pub fn report(&self) -> SimulationReport {
        let total = self.vehicles.len();
        let completed: Vec<&VehicleAgent> =
            self.vehicles.iter().filter(|v| v.is_completed()).collect();

        let avg_travel_time_secs = average(completed.iter().map(|v| v.travel_time_secs()));
        let avg_delay_secs = average(completed.iter().map(|v| v.delay_secs()));

        let total_emissions_g: f64 = self.vehicles.iter().map(VehicleAgent::emissions_g).sum();
        let horizon_hours = self.config.horizon_secs / 3600.0;
        let per_vehicle = |value: f64| if total > 0 { value / total as f64 } else { 0.0 };

        SimulationReport {
            scenario: self.config.scenario.clone(),
            signal_mode: self.config.signal_mode,
            tick_secs: self.config.tick_secs,
            horizon_hours,
            ticks: self.tick,
            synchronized: self.synchronized,
            total_vehicles: total,
            intersections: self.intersections.len(),
            network_size_km: self.config.grid_size as f64 * self.config.spacing_m / 1000.0,
            completed_vehicles: completed.len(),
            completion_rate_pct: per_vehicle(completed.len() as f64) * 100.0,
            avg_travel_time_secs,
            avg_delay_secs,
            total_emissions_kg_co2: total_emissions_g / 1000.0,
            emissions_per_vehicle_g: per_vehicle(total_emissions_g),
            max_queue_length: self.queue_stats.max(),
            avg_queue_length: self.queue_stats.mean(),
            throughput_veh_per_hour: completed.len() as f64 / horizon_hours,
            phase_changes: self.phase_changes,
        }
    }
}

fn average(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let count = values.len();
    if count == 0 {
        return 0.0;
    }
    values.sum::<f64>() / count as f64
}

fn new_vehicle(
    config: &SimulationConfig,
    index: usize,
    origin: GridPos,
    destination: GridPos,
    route: Vec<GridPos>,
) -> VehicleAgent {
    VehicleAgent::new(
        VehicleId(index),
        origin,
        destination,
        route,
        config.spacing_m,
        config.emissions,
    )
}

fn random_pos<R: Rng>(rng: &mut R, grid_size: usize) -> GridPos {
    GridPos::new(rng.random_range(0..grid_size), rng.random_range(0..grid_size))
}

/// Random origin/destination pairs with a route each.
///
/// An unreachable destination (only possible with closed segments) is
/// redrawn a bounded number of times before the spawn fails.
fn spawn_vehicles(
    network: &RoadNetwork,
    config: &SimulationConfig,
    rng: &mut StdRng,
) -> SimResult<Vec<VehicleAgent>> {
    let mut finder = RouteFinder::new(network, config.routing);
    let grid_size = config.grid_size;
    let mut vehicles = Vec::with_capacity(config.vehicle_count);

    for index in 0..config.vehicle_count {
        let origin = random_pos(rng, grid_size);
        let mut draws = 0;

        let vehicle = loop {
            let mut destination = random_pos(rng, grid_size);
            while destination == origin {
                destination = random_pos(rng, grid_size);
            }

            match finder.choose_route(origin, destination, rng) {
                Ok(route) => break new_vehicle(config, index, origin, destination, route),
                Err(e @ SimError::RoutingFailure { .. }) => {
                    draws += 1;
                    if draws >= MAX_DESTINATION_DRAWS {
                        return Err(e);
                    }
                    debug!("Redrawing destination for vehicle {}: {}", index, e);
                }
                Err(e) => return Err(e),
            }
        };
        vehicles.push(vehicle);
    }

    Ok(vehicles)
}

/// Runs the same seeded scenario under fixed and adaptive control
pub fn compare_signal_modes(config: &SimulationConfig) -> SimResult<Vec<SimulationReport>> {
    [SignalMode::Fixed, SignalMode::Adaptive]
        .into_iter()
        .map(|mode| {
            info!("Running {} signal control...", mode);
            let config = SimulationConfig {
                signal_mode: mode,
                ..config.clone()
            };
            TrafficSimulationEngine::new(config)?.run(ProgressLogSink::default())
        })
        .collect()
}
