//! Persistence of per-vehicle and per-period metrics.
//!
//! Metrics live in two tables, `vehicle_output` keyed by vehicle name and `simulation_output`
//! keyed by period. Writing a row whose key already exists replaces it.

use crate::RerouteError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The metrics of a single vehicle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleMetrics {
    pub vehicle_id: String,
    pub number_times_rerouted: u32,
    pub cumulative_extra_time: f64,
    pub total_time_spent_in_system: f64,
}

/// The network-wide metrics of a single rerouting period.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodMetrics {
    pub period_key: String,
    pub fairness_index: f64,
    #[serde(rename = "standardDeviationQOE")]
    pub standard_deviation_qoe: f64,
    pub mean_congestion_level: f64,
}

/// A table of the metrics store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Table {
    VehicleOutput,
    SimulationOutput,
}

impl Table {
    pub const ALL: [Table; 2] = [Table::VehicleOutput, Table::SimulationOutput];

    pub fn name(&self) -> &'static str {
        match self {
            Table::VehicleOutput => "vehicle_output",
            Table::SimulationOutput => "simulation_output",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Table {
    type Err = RerouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| RerouteError::Config(format!("unknown table '{}'", s)))
    }
}

/// A row of either table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Row {
    Vehicle(VehicleMetrics),
    Period(PeriodMetrics),
}

/// A store for rerouting metrics.
pub trait MetricsStore {
    /// Inserts the vehicle's metrics, replacing any existing row for the vehicle.
    fn upsert_vehicle_metrics(&mut self, metrics: VehicleMetrics) -> Result<(), RerouteError>;

    /// Inserts the period's metrics, replacing any existing row for the period.
    fn upsert_period_metrics(&mut self, metrics: PeriodMetrics) -> Result<(), RerouteError>;

    /// Deletes every row of a table.
    fn clear_table(&mut self, table: Table) -> Result<(), RerouteError>;

    /// Deletes every row of every table.
    fn clear_all(&mut self) -> Result<(), RerouteError> {
        for table in Table::ALL {
            self.clear_table(table)?;
        }
        Ok(())
    }

    /// Reads every row of a table, in insertion order.
    fn read_all_rows(&self, table: Table) -> Result<Vec<Row>, RerouteError>;

    /// Makes every write so far durable.
    fn commit(&mut self) -> Result<(), RerouteError>;
}

/// The contents of both tables.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Tables {
    #[serde(default)]
    vehicle_output: Vec<VehicleMetrics>,
    #[serde(default)]
    simulation_output: Vec<PeriodMetrics>,
}

impl Tables {
    fn upsert_vehicle(&mut self, metrics: VehicleMetrics) {
        match self
            .vehicle_output
            .iter_mut()
            .find(|row| row.vehicle_id == metrics.vehicle_id)
        {
            Some(row) => *row = metrics,
            None => self.vehicle_output.push(metrics),
        }
    }

    fn upsert_period(&mut self, metrics: PeriodMetrics) {
        match self
            .simulation_output
            .iter_mut()
            .find(|row| row.period_key == metrics.period_key)
        {
            Some(row) => *row = metrics,
            None => self.simulation_output.push(metrics),
        }
    }

    fn clear(&mut self, table: Table) {
        match table {
            Table::VehicleOutput => self.vehicle_output.clear(),
            Table::SimulationOutput => self.simulation_output.clear(),
        }
    }

    fn rows(&self, table: Table) -> Vec<Row> {
        match table {
            Table::VehicleOutput => self.vehicle_output.iter().cloned().map(Row::Vehicle).collect(),
            Table::SimulationOutput => {
                self.simulation_output.iter().cloned().map(Row::Period).collect()
            }
        }
    }
}

/// A metrics store held in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    tables: Tables,
}

impl MemoryStore {
    pub fn new() -> Self {
        Default::default()
    }
}

impl MetricsStore for MemoryStore {
    fn upsert_vehicle_metrics(&mut self, metrics: VehicleMetrics) -> Result<(), RerouteError> {
        self.tables.upsert_vehicle(metrics);
        Ok(())
    }

    fn upsert_period_metrics(&mut self, metrics: PeriodMetrics) -> Result<(), RerouteError> {
        self.tables.upsert_period(metrics);
        Ok(())
    }

    fn clear_table(&mut self, table: Table) -> Result<(), RerouteError> {
        self.tables.clear(table);
        Ok(())
    }

    fn read_all_rows(&self, table: Table) -> Result<Vec<Row>, RerouteError> {
        Ok(self.tables.rows(table))
    }

    fn commit(&mut self) -> Result<(), RerouteError> {
        Ok(())
    }
}

/// A metrics store backed by a JSON file, which is rewritten on every commit.
#[derive(Clone, Debug)]
pub struct JsonStore {
    path: PathBuf,
    tables: Tables,
}

impl JsonStore {
    /// Opens the store at `path`, creating an empty one if the file doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RerouteError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            let mut store = Self {
                path,
                tables: Tables::default(),
            };
            store.commit()?;
            return Ok(store);
        }

        let content = std::fs::read_to_string(&path).map_err(|e| RerouteError::io(&path, e))?;
        let tables = serde_json::from_str(&content).map_err(|e| RerouteError::Storage {
            path: path.clone(),
            message: format!("malformed metrics file: {}", e),
        })?;
        Ok(Self { path, tables })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricsStore for JsonStore {
    fn upsert_vehicle_metrics(&mut self, metrics: VehicleMetrics) -> Result<(), RerouteError> {
        self.tables.upsert_vehicle(metrics);
        Ok(())
    }

    fn upsert_period_metrics(&mut self, metrics: PeriodMetrics) -> Result<(), RerouteError> {
        self.tables.upsert_period(metrics);
        Ok(())
    }

    fn clear_table(&mut self, table: Table) -> Result<(), RerouteError> {
        self.tables.clear(table);
        Ok(())
    }

    fn read_all_rows(&self, table: Table) -> Result<Vec<Row>, RerouteError> {
        Ok(self.tables.rows(table))
    }

    fn commit(&mut self) -> Result<(), RerouteError> {
        let json = serde_json::to_string_pretty(&self.tables)?;
        std::fs::write(&self.path, json).map_err(|e| RerouteError::io(&self.path, e))
    }
}
