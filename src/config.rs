use crate::consensus::relay::RelayConfig;
use crate::consensus::types::EdgeId;
use crate::error::Error;
use anyhow::{Context, Result, anyhow};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use tracing::error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSection {
    pub duration_ticks: u64,
    pub random_seed: u64,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            duration_ticks: 3600,
            random_seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    pub warehouse_edge: EdgeId,
    pub communication_range: f64,
    /// Candidate delivery edges for generated tasks. Empty means the warehouse edge.
    pub delivery_edges: Vec<EdgeId>,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            warehouse_edge: EdgeId::new("edge_warehouse"),
            communication_range: 600.0,
            delivery_edges: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleSection {
    pub num_vehicles: usize,
    pub default_capacity: f64,
    pub default_battery: f64,
    pub sod_start_index: usize,
}

impl Default for VehicleSection {
    fn default() -> Self {
        Self {
            num_vehicles: 3,
            default_capacity: 10.0,
            default_battery: 100.0,
            sod_start_index: 0,
        }
    }
}

/// Parameters for random task generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskGenParams {
    pub sod_tasks: usize,
    pub mid_tasks: usize,
    pub sod_deadline_range: (f64, f64),
    /// Added to the release tick of a mid-day task to get its deadline.
    pub mid_deadline_offset_range: (f64, f64),
    pub mid_release_range: (u64, u64),
    pub weight_range: (f64, f64),
}

impl Default for TaskGenParams {
    fn default() -> Self {
        Self {
            sod_tasks: 5,
            mid_tasks: 20,
            sod_deadline_range: (1800.0, 2000.0),
            mid_deadline_offset_range: (4000.0, 4200.0),
            mid_release_range: (1, 1800),
            weight_range: (0.5, 6.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub log_file: String,
    pub level: String,
    pub status_interval: u64,
    pub battery_drain_per_status: f64,
    pub report_dir: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            log_file: "simulation.log".to_string(),
            level: "info".to_string(),
            status_interval: 100,
            battery_drain_per_status: 0.1,
            report_dir: "reports".to_string(),
        }
    }
}

/// Full run configuration. Every section falls back to its defaults, so a
/// file only needs the values it changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub simulation: SimulationSection,
    pub network: NetworkSection,
    pub vehicles: VehicleSection,
    pub tasks: TaskGenParams,
    pub logging: LoggingSection,
}

fn check_range<T: PartialOrd + std::fmt::Debug>(name: &str, (lo, hi): (T, T)) -> std::result::Result<(), Error> {
    if lo > hi {
        return Err(Error::ConfigurationError(format!("{name} is inverted: ({lo:?}, {hi:?})")));
    }
    Ok(())
}

impl SimConfig {
    pub fn validate(&self) -> std::result::Result<(), Error> {
        if self.vehicles.num_vehicles == 0 {
            return Err(Error::ConfigurationError("num_vehicles must be at least 1".to_string()));
        }
        if self.vehicles.sod_start_index >= self.vehicles.num_vehicles {
            return Err(Error::ConfigurationError(format!(
                "sod_start_index must be below num_vehicles ({}), got {}",
                self.vehicles.num_vehicles, self.vehicles.sod_start_index
            )));
        }
        if !self.vehicles.default_capacity.is_finite() || self.vehicles.default_capacity <= 0.0 {
            return Err(Error::ConfigurationError(format!(
                "default_capacity must be positive, got {}",
                self.vehicles.default_capacity
            )));
        }
        if !self.vehicles.default_battery.is_finite() || self.vehicles.default_battery < 0.0 {
            return Err(Error::ConfigurationError(format!(
                "default_battery must be non-negative, got {}",
                self.vehicles.default_battery
            )));
        }
        if !self.network.communication_range.is_finite() || self.network.communication_range < 0.0 {
            return Err(Error::ConfigurationError(format!(
                "communication_range must be non-negative, got {}",
                self.network.communication_range
            )));
        }
        if self.network.warehouse_edge.0.is_empty() {
            return Err(Error::ConfigurationError("warehouse_edge must not be empty".to_string()));
        }

        let tasks = &self.tasks;
        check_range("sod_deadline_range", tasks.sod_deadline_range)?;
        check_range("mid_deadline_offset_range", tasks.mid_deadline_offset_range)?;
        check_range("mid_release_range", tasks.mid_release_range)?;
        check_range("weight_range", tasks.weight_range)?;
        if tasks.weight_range.0 < 0.0 {
            return Err(Error::ConfigurationError("weight_range must be non-negative".to_string()));
        }
        Ok(())
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            communication_range: self.network.communication_range,
            sod_start_index: self.vehicles.sod_start_index,
        }
    }
}

pub fn load_pkl<T: DeserializeOwned>(config_path: impl AsRef<Path>) -> Result<T> {
    let config_path = config_path.as_ref();
    let output = Command::new("pkl")
        .arg("eval")
        .arg("-f")
        .arg("json")
        .arg(config_path)
        .output()
        .context("Failed to execute pkl command")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("pkl failed: {}", stderr);
        return Err(anyhow!("pkl failed: {}", stderr));
    }

    let json_str = String::from_utf8_lossy(&output.stdout);

    let config: T = serde_json::from_str(&json_str).context("Failed to parse config json")?;

    Ok(config)
}

pub fn load_json<T: DeserializeOwned>(config_path: impl AsRef<Path>) -> Result<T> {
    let config_path = config_path.as_ref();
    let json_str = std::fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
    let config: T = serde_json::from_str(&json_str).context("Failed to parse config json")?;
    Ok(config)
}

/// Load and validate a run configuration. `.pkl` files go through the
/// `pkl` CLI, everything else is read as JSON.
pub fn load(config_path: impl AsRef<Path>) -> Result<SimConfig> {
    let config_path = config_path.as_ref();
    let config: SimConfig = match config_path.extension().and_then(|e| e.to_str()) {
        Some("pkl") => load_pkl(config_path)?,
        _ => load_json(config_path)?,
    };
    config.validate()?;
    Ok(config)
}
