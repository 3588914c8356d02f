//! Tick loop behaviour
//!
//! Runs small scenarios end to end and checks the accounting that every
//! snapshot and report must satisfy.

use grid_traffic::config::SimulationConfig;
use grid_traffic::simulation::{
    compare_signal_modes, ClockError, GridPos, MemorySink, NullSink, RoutingPolicy, SignalMode,
    SimError, TimeAdvance, TrafficSimulationEngine,
};

fn small_config() -> SimulationConfig {
    SimulationConfig {
        grid_size: 4,
        vehicle_count: 60,
        horizon_secs: 900.0,
        seed: 11,
        ..SimulationConfig::default()
    }
}

#[test]
fn test_accounting_holds_every_tick() {
    let mut engine = TrafficSimulationEngine::new(small_config()).unwrap();
    let total = engine.vehicles().len();
    let mut last_completed = 0;

    while !engine.is_finished() {
        let before: Vec<(bool, usize, GridPos)> = engine
            .vehicles()
            .iter()
            .map(|v| (v.is_completed(), v.route_index(), v.position()))
            .collect();

        let snapshot = engine.step().unwrap();

        let after = engine.vehicles().iter().zip(&before);
        for (vehicle, &(was_completed, prev_index, prev_pos)) in after {
            if was_completed {
                assert!(vehicle.is_completed(), "vehicle {} un-completed", vehicle.id);
            }
            assert!(vehicle.route_index() >= prev_index);
            assert!(vehicle.route_index() <= prev_index + 1);
            if vehicle.route_index() == prev_index {
                assert_eq!(vehicle.position(), prev_pos);
            } else {
                assert_eq!(vehicle.position(), vehicle.route()[vehicle.route_index()]);
                assert!(prev_pos.is_adjacent(&vehicle.position()));
            }
        }

        assert!(snapshot.completed_vehicles >= last_completed);
        assert_eq!(snapshot.completed_vehicles + snapshot.active_vehicles, total);
        // every active vehicle sits at exactly one intersection
        assert_eq!(
            snapshot.queue_lengths.iter().sum::<usize>(),
            snapshot.active_vehicles
        );
        assert_eq!(snapshot.queue_lengths.len(), 16);
        last_completed = snapshot.completed_vehicles;
    }

    assert_eq!(engine.tick_count(), 900);
    assert!((engine.time_secs() - 900.0).abs() < 1e-6);
    assert_eq!(engine.completed_count(), last_completed);
}

#[test]
fn test_same_seed_same_run() {
    let mut first = MemorySink::default();
    let mut second = MemorySink::default();

    let report_a = TrafficSimulationEngine::new(small_config())
        .unwrap()
        .run(&mut first)
        .unwrap();
    let report_b = TrafficSimulationEngine::new(small_config())
        .unwrap()
        .run(&mut second)
        .unwrap();

    assert_eq!(report_a, report_b);
    assert_eq!(first.snapshots, second.snapshots);
    assert_eq!(first.report, Some(report_a));
}

#[test]
fn test_single_vehicle_crosses_grid() {
    let config = SimulationConfig {
        grid_size: 5,
        horizon_secs: 3600.0,
        routing: RoutingPolicy {
            alternative_routes: 1,
            ..RoutingPolicy::default()
        },
        ..SimulationConfig::default()
    };
    let trip = (GridPos::new(0, 0), GridPos::new(4, 4));
    let mut engine = TrafficSimulationEngine::with_trips(config, &[trip]).unwrap();

    assert_eq!(engine.vehicles()[0].route().len(), 9);

    let report = engine.run(NullSink).unwrap();
    let vehicle = &engine.vehicles()[0];

    assert!(vehicle.is_completed());
    assert_eq!(vehicle.position(), GridPos::new(4, 4));
    assert_eq!(vehicle.distance_m(), 8000.0);
    assert!(vehicle.travel_time_secs() >= 8.0);
    assert!(vehicle.delay_secs() >= 0.0);
    assert!(
        (vehicle.travel_time_secs() - vehicle.delay_secs() - 8.0).abs() < 1e-9,
        "moving time should be one tick per hop"
    );

    assert_eq!(report.completed_vehicles, 1);
    assert_eq!(report.completion_rate_pct, 100.0);
    assert_eq!(report.network_size_km, 5.0);
    assert_eq!(report.intersections, 25);
}

#[test]
fn test_report_is_consistent() {
    let mut engine = TrafficSimulationEngine::new(small_config()).unwrap();
    let report = engine.run(NullSink).unwrap();

    assert_eq!(report.total_vehicles, 60);
    assert_eq!(report.ticks, 900);
    assert!(!report.synchronized);
    assert!(report.completed_vehicles <= report.total_vehicles);
    assert!(report.avg_delay_secs <= report.avg_travel_time_secs);
    assert!(report.total_emissions_kg_co2 > 0.0);
    assert!(report.avg_queue_length <= report.max_queue_length as f64);
    assert!(report.phase_changes > 0);
    assert!(
        (report.throughput_veh_per_hour - report.completed_vehicles as f64 / 0.25).abs() < 1e-9
    );
}

#[test]
fn test_compare_runs_fixed_then_adaptive() {
    let config = SimulationConfig {
        vehicle_count: 30,
        horizon_secs: 300.0,
        ..small_config()
    };
    let reports = compare_signal_modes(&config).unwrap();

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].signal_mode, SignalMode::Fixed);
    assert_eq!(reports[1].signal_mode, SignalMode::Adaptive);
    assert_eq!(reports[0].total_vehicles, reports[1].total_vehicles);
}

#[test]
fn test_unreachable_trip_is_routing_failure() {
    let config = SimulationConfig {
        grid_size: 2,
        closed_segments: vec![
            (GridPos::new(0, 0), GridPos::new(0, 1)),
            (GridPos::new(0, 0), GridPos::new(1, 0)),
        ],
        ..SimulationConfig::default()
    };

    let trip = (GridPos::new(0, 0), GridPos::new(1, 1));
    let result = TrafficSimulationEngine::with_trips(config.clone(), &[trip]);
    assert!(matches!(result, Err(SimError::RoutingFailure { .. })));

    // an isolated corner is eventually drawn as an origin
    let result = TrafficSimulationEngine::new(SimulationConfig {
        vehicle_count: 200,
        ..config
    });
    assert!(matches!(result, Err(SimError::RoutingFailure { .. })));
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = SimulationConfig {
        tick_secs: 0.0,
        ..small_config()
    };
    assert!(matches!(
        TrafficSimulationEngine::new(config),
        Err(SimError::Configuration { .. })
    ));
}

/// Grants one extra second on every request
struct SkippingClock;

impl TimeAdvance for SkippingClock {
    fn request_next_boundary(&mut self, proposed: f64) -> Result<f64, ClockError> {
        Ok(proposed + 1.0)
    }

    fn is_synchronized(&self) -> bool {
        true
    }
}

/// Works for a few ticks, then the coordinator goes away
struct DroppingClock {
    remaining: usize,
}

impl TimeAdvance for DroppingClock {
    fn request_next_boundary(&mut self, proposed: f64) -> Result<f64, ClockError> {
        if self.remaining == 0 {
            return Err(ClockError::Disconnected);
        }
        self.remaining -= 1;
        Ok(proposed)
    }

    fn is_synchronized(&self) -> bool {
        true
    }
}

/// Always grants the start of the run
struct StalledClock;

impl TimeAdvance for StalledClock {
    fn request_next_boundary(&mut self, _proposed: f64) -> Result<f64, ClockError> {
        Ok(0.0)
    }

    fn is_synchronized(&self) -> bool {
        true
    }
}

#[test]
fn test_coordinator_grants_are_honoured() {
    let config = SimulationConfig {
        horizon_secs: 10.0,
        ..small_config()
    };
    let mut engine = TrafficSimulationEngine::new(config)
        .unwrap()
        .with_clock(Box::new(SkippingClock));
    assert!(engine.is_synchronized());

    let mut sink = MemorySink::default();
    let report = engine.run(&mut sink).unwrap();
    assert_eq!(report.ticks, 5);
    assert!(report.synchronized);

    // snapshots carry the granted boundary, not the proposed one
    let times: Vec<f64> = sink.snapshots.iter().map(|s| s.time_secs).collect();
    assert_eq!(times, vec![2.0, 4.0, 6.0, 8.0, 10.0]);
    let ticks: Vec<u64> = sink.snapshots.iter().map(|s| s.tick).collect();
    assert_eq!(ticks, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_lost_coordinator_falls_back_to_local_ticks() {
    let config = SimulationConfig {
        horizon_secs: 50.0,
        ..small_config()
    };
    let mut engine = TrafficSimulationEngine::new(config)
        .unwrap()
        .with_clock(Box::new(DroppingClock { remaining: 10 }));

    let report = engine.run(NullSink).unwrap();
    assert_eq!(report.ticks, 50);
    assert!(!report.synchronized);
    assert!((engine.time_secs() - 50.0).abs() < 1e-6);
}

#[test]
fn test_stalled_coordinator_falls_back_to_local_ticks() {
    let config = SimulationConfig {
        horizon_secs: 20.0,
        ..small_config()
    };
    let mut engine = TrafficSimulationEngine::new(config)
        .unwrap()
        .with_clock(Box::new(StalledClock));

    let report = engine.run(NullSink).unwrap();
    assert_eq!(report.ticks, 20);
    assert!(!report.synchronized);
}
