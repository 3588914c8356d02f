//! Grid traffic simulation core
//!
//! Road network, signal control, routing, vehicle agents and the tick loop.
//! Everything here is single-threaded and deterministic for a given seed.

mod agent;
mod clock;
mod engine;
mod error;
mod intersection;
mod metrics;
mod road_network;
mod route_finder;
mod types;
mod vehicle;

pub use agent::{Agent, SignalInput};
pub use clock::{ClockError, CoordinatorClock, LocalClock, TimeAdvance};
pub use engine::{compare_signal_modes, TrafficSimulationEngine};
pub use error::{SimError, SimResult};
pub use intersection::{Demand, Intersection, SignalController, SignalMode, SignalTiming};
pub use metrics::{
    comparison_table, JsonLinesSink, MemorySink, MetricsSink, NullSink, ProgressLogSink,
    QueueStats, SimulationReport, TickSnapshot,
};
pub use road_network::{RoadEdge, RoadNetwork};
pub use route_finder::{RouteFinder, RoutingPolicy};
pub use types::{
    is_simple_route, Direction, GridPos, IntersectionId, Route, SignalPhase, VehicleId,
};
pub use vehicle::{AdvanceOutcome, EmissionModel, VehicleAgent};
