//! Per-tick snapshots, metrics sinks and the end-of-run report.

use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;

use super::error::SimResult;
use super::intersection::SignalMode;

/// State of the run at the end of one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickSnapshot {
    pub tick: u64,
    /// Simulated time at the end of the tick
    pub time_secs: f64,
    /// Queued vehicles per intersection, indexed by intersection id
    pub queue_lengths: Vec<usize>,
    pub total_emissions_g: f64,
    pub completed_vehicles: usize,
    pub active_vehicles: usize,
    /// Mean travel time over vehicles completed so far
    pub avg_travel_time_secs: Option<f64>,
    pub phase_changes: usize,
}

/// Receiver of tick snapshots and the final report
pub trait MetricsSink {
    fn record_tick(&mut self, snapshot: &TickSnapshot) -> SimResult<()>;

    fn finish(&mut self, _report: &SimulationReport) -> SimResult<()> {
        Ok(())
    }
}

impl<S: MetricsSink + ?Sized> MetricsSink for &mut S {
    fn record_tick(&mut self, snapshot: &TickSnapshot) -> SimResult<()> {
        (**self).record_tick(snapshot)
    }

    fn finish(&mut self, report: &SimulationReport) -> SimResult<()> {
        (**self).finish(report)
    }
}

/// Forwards to both sinks in order
impl<A: MetricsSink, B: MetricsSink> MetricsSink for (A, B) {
    fn record_tick(&mut self, snapshot: &TickSnapshot) -> SimResult<()> {
        self.0.record_tick(snapshot)?;
        self.1.record_tick(snapshot)
    }

    fn finish(&mut self, report: &SimulationReport) -> SimResult<()> {
        self.0.finish(report)?;
        self.1.finish(report)
    }
}

/// Discards everything
#[derive(Debug, Default)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn record_tick(&mut self, _snapshot: &TickSnapshot) -> SimResult<()> {
        Ok(())
    }
}

/// Keeps every snapshot in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub snapshots: Vec<TickSnapshot>,
    pub report: Option<SimulationReport>,
}

impl MetricsSink for MemorySink {
    fn record_tick(&mut self, snapshot: &TickSnapshot) -> SimResult<()> {
        self.snapshots.push(snapshot.clone());
        Ok(())
    }

    fn finish(&mut self, report: &SimulationReport) -> SimResult<()> {
        self.report = Some(report.clone());
        Ok(())
    }
}

/// Logs a progress line every `every` ticks
#[derive(Debug)]
pub struct ProgressLogSink {
    every: u64,
}

impl ProgressLogSink {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
        }
    }
}

impl Default for ProgressLogSink {
    /// Fifteen simulated minutes at one-second ticks
    fn default() -> Self {
        Self::new(900)
    }
}

impl MetricsSink for ProgressLogSink {
    fn record_tick(&mut self, snapshot: &TickSnapshot) -> SimResult<()> {
        if (snapshot.tick + 1) % self.every == 0 {
            info!(
                "Step {}: Time {:.2}h, Completed: {}/{}, Avg Travel Time: {:.1}s",
                snapshot.tick + 1,
                snapshot.time_secs / 3600.0,
                snapshot.completed_vehicles,
                snapshot.completed_vehicles + snapshot.active_vehicles,
                snapshot.avg_travel_time_secs.unwrap_or(0.0)
            );
        }
        Ok(())
    }
}

/// Writes one JSON object per tick, then the report as a final line
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> MetricsSink for JsonLinesSink<W> {
    fn record_tick(&mut self, snapshot: &TickSnapshot) -> SimResult<()> {
        serde_json::to_writer(&mut self.writer, snapshot)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn finish(&mut self, report: &SimulationReport) -> SimResult<()> {
        serde_json::to_writer(&mut self.writer, report)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Running per-intersection queue statistics
#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    sums: Vec<u64>,
    max: usize,
    samples: u64,
}

impl QueueStats {
    pub fn new(intersections: usize) -> Self {
        Self {
            sums: vec![0; intersections],
            max: 0,
            samples: 0,
        }
    }

    pub fn record(&mut self, queue_lengths: &[usize]) {
        for (sum, &len) in self.sums.iter_mut().zip(queue_lengths) {
            *sum += len as u64;
            self.max = self.max.max(len);
        }
        self.samples += 1;
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Mean over intersections of each intersection's mean queue length
    pub fn mean(&self) -> f64 {
        if self.samples == 0 || self.sums.is_empty() {
            return 0.0;
        }
        let per_intersection: f64 = self
            .sums
            .iter()
            .map(|&sum| sum as f64 / self.samples as f64)
            .sum();
        per_intersection / self.sums.len() as f64
    }
}

/// Aggregate results of a complete run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub scenario: String,
    pub signal_mode: SignalMode,
    pub tick_secs: f64,
    pub horizon_hours: f64,
    pub ticks: u64,
    /// False when the run fell back to local ticking or never had a coordinator
    pub synchronized: bool,
    pub total_vehicles: usize,
    pub intersections: usize,
    pub network_size_km: f64,
    pub completed_vehicles: usize,
    pub completion_rate_pct: f64,
    pub avg_travel_time_secs: f64,
    pub avg_delay_secs: f64,
    pub total_emissions_kg_co2: f64,
    pub emissions_per_vehicle_g: f64,
    pub max_queue_length: usize,
    pub avg_queue_length: f64,
    pub throughput_veh_per_hour: f64,
    pub phase_changes: u64,
}

impl SimulationReport {
    pub fn avg_travel_time_min(&self) -> f64 {
        self.avg_travel_time_secs / 60.0
    }

    pub fn avg_delay_min(&self) -> f64 {
        self.avg_delay_secs / 60.0
    }

    pub fn to_json_pretty(&self) -> SimResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== SIMULATION REPORT ===")?;
        writeln!(f, "Scenario:              {}", self.scenario)?;
        writeln!(f, "Signal control:        {}", self.signal_mode.to_string().to_uppercase())?;
        writeln!(
            f,
            "Duration:              {:.2} h ({} ticks of {}s)",
            self.horizon_hours, self.ticks, self.tick_secs
        )?;
        writeln!(f, "Synchronized:          {}", self.synchronized)?;
        writeln!(f, "Vehicles:              {}", self.total_vehicles)?;
        writeln!(
            f,
            "Intersections:         {} ({:.1} km network)",
            self.intersections, self.network_size_km
        )?;
        writeln!(
            f,
            "Completed:             {} ({:.2}%)",
            self.completed_vehicles, self.completion_rate_pct
        )?;
        writeln!(f, "Avg travel time:       {:.2} min", self.avg_travel_time_min())?;
        writeln!(f, "Avg delay:             {:.2} min", self.avg_delay_min())?;
        writeln!(
            f,
            "Total emissions:       {:.2} kg CO2 ({:.2} g/vehicle)",
            self.total_emissions_kg_co2, self.emissions_per_vehicle_g
        )?;
        writeln!(
            f,
            "Queue length:          max {}, avg {:.2}",
            self.max_queue_length, self.avg_queue_length
        )?;
        writeln!(f, "Phase changes:         {}", self.phase_changes)?;
        write!(
            f,
            "Throughput:            {:.0} veh/h",
            self.throughput_veh_per_hour
        )
    }
}

/// Side-by-side table of the headline metrics of several runs
pub fn comparison_table(reports: &[SimulationReport]) -> String {
    let mut table = String::from("=== STRATEGY COMPARISON ===\n");
    table.push_str(&format!(
        "{:<10} {:>16} {:>14} {:>18} {:>16}\n",
        "strategy", "travel time min", "delay min", "emissions kg CO2", "throughput veh/h"
    ));
    for report in reports {
        table.push_str(&format!(
            "{:<10} {:>16.2} {:>14.2} {:>18.2} {:>16.0}\n",
            report.signal_mode.to_string(),
            report.avg_travel_time_min(),
            report.avg_delay_min(),
            report.total_emissions_kg_co2,
            report.throughput_veh_per_hour
        ));
    }
    table
}
