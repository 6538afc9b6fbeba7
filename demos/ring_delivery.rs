//! Delivery fleet on a street grid, allocating generated tasks with the ring relay

use clap::Parser;
use dccbba::config::{self, SimConfig};
use dccbba::consensus::logging as relay_log;
use dccbba::logger;
use dccbba::report::{build_report, write_report_json};
use dccbba::warehouse::{generate_tasks, load_tasks, save_tasks};
use dccbba::{AgentId, EdgeId, Position, RelayFabric, RoadNetwork, Simulation, VehicleAgent, Warehouse};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (.pkl or .json); defaults are used when omitted
    #[arg(long)]
    config: Option<String>,

    /// Override simulation.duration_ticks
    #[arg(long)]
    ticks: Option<u64>,

    /// Override logging.level, e.g. "info,relay=debug"
    #[arg(long)]
    log_level: Option<String>,

    /// Override logging.report_dir
    #[arg(long)]
    report_dir: Option<String>,

    /// Load scheduled tasks from a JSON file instead of generating them
    #[arg(long)]
    tasks: Option<String>,
}

const GRID_ROWS: usize = 5;
const GRID_COLS: usize = 5;
const BLOCK_LENGTH: f64 = 100.0;

fn vehicle_name(index: usize) -> String {
    if index < 26 {
        format!("vehicle_{}", (b'A' + index as u8) as char)
    } else {
        format!("vehicle_{index}")
    }
}

/// Street grid with the warehouse road hooked onto its north-west corner.
fn build_road_network(warehouse_edge: &EdgeId) -> Result<RoadNetwork, Box<dyn std::error::Error>> {
    let mut network = RoadNetwork::grid(GRID_ROWS, GRID_COLS, BLOCK_LENGTH)?;
    network.add_edge(warehouse_edge.clone(), BLOCK_LENGTH / 2.0)?;
    network.connect(warehouse_edge, &EdgeId::new("h0_0"))?;
    network.connect(warehouse_edge, &EdgeId::new("v0_0"))?;
    network.connect(&EdgeId::new("h0_0r"), warehouse_edge)?;
    network.connect(&EdgeId::new("v0_0r"), warehouse_edge)?;
    Ok(network)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match config::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config {}: {}", path, e);
                return Err(e.into());
            }
        },
        None => SimConfig::default(),
    };
    if let Some(ticks) = cli.ticks {
        config.simulation.duration_ticks = ticks;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(dir) = cli.report_dir {
        config.logging.report_dir = dir;
    }
    config.validate()?;

    let result_dir = Path::new(&config.logging.report_dir).to_path_buf();
    std::fs::create_dir_all(&result_dir)?;
    let _guard = logger::init(result_dir.join(&config.logging.log_file), &config.logging.level)?;

    info!("Results will be saved to: {}", result_dir.display());

    let warehouse_edge = config.network.warehouse_edge.clone();
    let roads = Arc::new(build_road_network(&warehouse_edge)?);

    let mut delivery_edges = config.network.delivery_edges.clone();
    if delivery_edges.is_empty() {
        delivery_edges = roads.edges().filter(|e| **e != warehouse_edge).cloned().collect();
        delivery_edges.sort();
    }
    for edge in &delivery_edges {
        if !roads.contains(edge) {
            warn!("Delivery edge {} is not on the road network, bids for it will be infeasible", edge);
        }
    }

    let mut agents = Vec::with_capacity(config.vehicles.num_vehicles);
    for i in 0..config.vehicles.num_vehicles {
        agents.push(VehicleAgent::new(
            AgentId::new(vehicle_name(i))?,
            Position {
                x: 0.0,
                y: i as f64 * 10.0,
            },
            warehouse_edge.clone(),
            config.vehicles.default_capacity,
            config.vehicles.default_battery,
            Arc::clone(&roads),
        )?);
    }
    let fabric = RelayFabric::new(agents, config.relay_config())?;

    let tasks = match &cli.tasks {
        Some(path) => {
            info!("Loading tasks from file: {}", path);
            let path = Path::new(path);
            if let Err(e) = std::fs::copy(path, result_dir.join("tasks.json")) {
                warn!("Failed to copy tasks file: {}", e);
            }
            load_tasks(path)?
        }
        None => {
            let mut rng = StdRng::seed_from_u64(config.simulation.random_seed);
            let tasks = generate_tasks(&config.tasks, &warehouse_edge, &delivery_edges, &mut rng);
            info!("Generated {} tasks (seed {})", tasks.len(), config.simulation.random_seed);
            save_tasks(&tasks, &result_dir.join("tasks.json"))?;
            tasks
        }
    };
    let warehouse = Warehouse::with_schedule(warehouse_edge, tasks);

    let mut sim = Simulation::from_config(fabric, warehouse, &config);
    info!("Running for {} ticks", config.simulation.duration_ticks);
    let delivered = sim.run(config.simulation.duration_ticks);
    info!("Simulation finished: {} messages delivered", delivered);

    let agents: Vec<_> = sim.fabric.agents().collect();
    relay_log::log_fleet_status(&agents);
    relay_log::log_assignment_table(&sim.fabric);

    let report = build_report(&sim);
    let summary_path = write_report_json(&report, &result_dir)?;
    info!("JSON summary saved to {}", summary_path.display());

    Ok(())
}
