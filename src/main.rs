use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::fs::File;
use std::io::BufWriter;
use std::net::TcpStream;
use std::path::PathBuf;
use std::time::Duration;

use grid_traffic::config::SimulationConfig;
use grid_traffic::simulation::{
    comparison_table, compare_signal_modes, CoordinatorClock, JsonLinesSink, ProgressLogSink,
    SignalMode, TrafficSimulationEngine,
};

#[derive(Parser)]
#[command(name = "grid_traffic")]
#[command(about = "Signalised grid traffic simulation with optional co-simulation pacing")]
struct Cli {
    /// TOML scenario file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Intersections per side of the grid
    #[arg(long)]
    grid_size: Option<usize>,

    /// Distance between intersections in metres
    #[arg(long)]
    spacing: Option<f64>,

    /// Number of vehicles to spawn
    #[arg(long)]
    vehicles: Option<usize>,

    /// Tick duration in seconds
    #[arg(long)]
    tick: Option<f64>,

    /// Simulated duration in seconds
    #[arg(long)]
    horizon: Option<f64>,

    /// Signal control: adaptive or fixed
    #[arg(long)]
    signals: Option<SignalMode>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Run fixed and adaptive control back to back and compare them
    #[arg(long, conflicts_with_all = ["coordinator", "report", "snapshots"])]
    compare: bool,

    /// Address of a time coordinator (host:port) to pace the run
    #[arg(long)]
    coordinator: Option<String>,

    /// Seconds to wait when connecting to the coordinator before running
    /// unsynchronized
    #[arg(long, default_value = "5")]
    coordinator_timeout: u64,

    /// Write the final report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Write every tick snapshot as JSON lines to this path
    #[arg(long)]
    snapshots: Option<PathBuf>,
}

impl Cli {
    fn load_config(&self) -> Result<SimulationConfig> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::from_toml_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => SimulationConfig::default(),
        };

        if let Some(grid_size) = self.grid_size {
            config.grid_size = grid_size;
        }
        if let Some(spacing) = self.spacing {
            config.spacing_m = spacing;
        }
        if let Some(vehicles) = self.vehicles {
            config.vehicle_count = vehicles;
        }
        if let Some(tick) = self.tick {
            config.tick_secs = tick;
        }
        if let Some(horizon) = self.horizon {
            config.horizon_secs = horizon;
        }
        if let Some(signals) = self.signals {
            config.signal_mode = signals;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli.load_config()?;

    info!("{}", "=".repeat(70));
    info!("Scenario: {}", config.scenario);
    info!("{}", "=".repeat(70));

    if cli.compare {
        let reports = compare_signal_modes(&config)?;
        for report in &reports {
            println!("{report}\n");
        }
        println!("{}", comparison_table(&reports));
        return Ok(());
    }

    run_single(&cli, config)
}

fn run_single(cli: &Cli, config: SimulationConfig) -> Result<()> {
    let mut engine = TrafficSimulationEngine::new(config)?;

    if let Some(addr) = &cli.coordinator {
        let timeout = Duration::from_secs(cli.coordinator_timeout);
        match CoordinatorClock::<TcpStream, TcpStream>::connect(addr.as_str(), timeout) {
            Ok(clock) => {
                info!("Pacing run from coordinator at {}", addr);
                engine = engine.with_clock(Box::new(clock));
            }
            Err(e) => warn!("Coordinator {} unavailable ({}); running unsynchronized", addr, e),
        }
    }

    let report = match &cli.snapshots {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating snapshot file {}", path.display()))?;
            engine.run((ProgressLogSink::default(), JsonLinesSink::new(BufWriter::new(file))))?
        }
        None => engine.run(ProgressLogSink::default())?,
    };

    println!("{report}");

    if let Some(path) = &cli.report {
        std::fs::write(path, report.to_json_pretty()?)
            .with_context(|| format!("writing report to {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    Ok(())
}
