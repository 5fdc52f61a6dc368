//! The mutable state carried across a rerouting run.

use crate::travel_time::TravelTimeTable;
use crate::VehicleId;
use std::collections::{HashMap, HashSet};

/// How fairly a vehicle has been treated so far.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VehicleFairnessRecord {
    /// The number of times the vehicle's route has been changed.
    pub rerouted_count: u32,
    /// The sum of the extra travel time, in s, of every route the vehicle was given
    /// over the best route available at the time.
    pub cumulative_extra_time: f64,
    /// The time the vehicle has spent using the network, in s.
    pub time_in_network: f64,
    /// The time the vehicle has spent in a stopped state during this run, in s.
    pub time_stopped: f64,
}

/// The vehicles rerouted during the current rerouting period.
/// A vehicle can be rerouted at most once per period.
#[derive(Clone, Debug, Default)]
pub struct ReroutedThisPeriod(HashSet<VehicleId>);

impl ReroutedThisPeriod {
    /// Records that a vehicle was rerouted.
    /// Returns false if it had already been rerouted this period.
    pub fn insert(&mut self, vehicle: VehicleId) -> bool {
        self.0.insert(vehicle)
    }

    pub fn contains(&self, vehicle: VehicleId) -> bool {
        self.0.contains(&vehicle)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// Per-vehicle bookkeeping for a vehicle currently in the network.
#[derive(Clone, Debug)]
struct ActiveVehicle {
    name: String,
    /// The step at which the vehicle departed.
    depart: usize,
    /// Whether the vehicle was stopped at the previous period boundary.
    stopped_last_period: Option<bool>,
}

/// Everything the rerouting engine remembers between simulation steps.
///
/// Fairness records are keyed by vehicle name so that they outlive the vehicle
/// and can be carried over between runs.
#[derive(Clone, Debug, Default)]
pub struct SimulationState {
    records: HashMap<String, VehicleFairnessRecord>,
    /// The time in network each vehicle had accumulated before this run.
    initial_time: HashMap<String, f64>,
    active: HashMap<VehicleId, ActiveVehicle>,
    rerouted: ReroutedThisPeriod,
    travel_times: TravelTimeTable,
}

impl SimulationState {
    pub fn new() -> Self {
        Default::default()
    }

    /// Seeds a vehicle's record with the values from a previous run.
    pub fn load_record(&mut self, name: &str, record: VehicleFairnessRecord) {
        self.initial_time.insert(name.to_string(), record.time_in_network);
        self.records.insert(
            name.to_string(),
            VehicleFairnessRecord {
                time_stopped: 0.0,
                ..record
            },
        );
    }

    /// Starts tracking a vehicle which has just entered the network,
    /// creating its fairness record if it doesn't have one yet.
    pub fn vehicle_departed(&mut self, vehicle: VehicleId, name: &str, step: usize) {
        let record = self.records.entry(name.to_string()).or_default();
        record.time_stopped = 0.0;
        self.active.insert(
            vehicle,
            ActiveVehicle {
                name: name.to_string(),
                depart: step,
                stopped_last_period: None,
            },
        );
    }

    /// Stops tracking a vehicle which has reached its destination,
    /// replacing its approximate time in network with the observed one.
    pub fn vehicle_arrived(&mut self, vehicle: VehicleId, step: usize) {
        let Some(active) = self.active.remove(&vehicle) else {
            return;
        };
        let initial = self.initial_time.get(&active.name).copied().unwrap_or(0.0);
        if let Some(record) = self.records.get_mut(&active.name) {
            let running = step as f64 - active.depart as f64 - record.time_stopped;
            record.time_in_network = initial + f64::max(running, 0.0);
        }
    }

    /// Adds a period's worth of time to every vehicle in the network. Vehicles which were
    /// stopped at both this and the previous period boundary accumulate stopped time instead.
    ///
    /// # Parameters
    /// * `period` - The length of the period in s
    /// * `vehicles` - Each vehicle in the network, and whether it is currently stopped
    pub fn accumulate_period(
        &mut self,
        period: f64,
        vehicles: impl IntoIterator<Item = (VehicleId, bool)>,
    ) {
        for (vehicle, stopped) in vehicles {
            let Some(active) = self.active.get_mut(&vehicle) else {
                continue;
            };
            let stopped_before = active.stopped_last_period.unwrap_or(stopped);
            active.stopped_last_period = Some(stopped);
            let Some(record) = self.records.get_mut(&active.name) else {
                continue;
            };
            if stopped_before && stopped {
                record.time_stopped += period;
            } else {
                record.time_in_network += period;
            }
        }
    }

    /// Forgets which vehicles were rerouted, ready for a new period.
    pub fn begin_period(&mut self) {
        self.rerouted.clear();
    }

    /// The name of a vehicle currently in the network.
    pub fn vehicle_name(&self, vehicle: VehicleId) -> Option<&str> {
        self.active.get(&vehicle).map(|a| a.name.as_str())
    }

    /// The fairness record of a vehicle currently in the network.
    /// Vehicles which haven't been seen departing have no record.
    pub fn record(&self, vehicle: VehicleId) -> Option<&VehicleFairnessRecord> {
        self.records.get(self.vehicle_name(vehicle)?)
    }

    pub fn record_mut(&mut self, vehicle: VehicleId) -> Option<&mut VehicleFairnessRecord> {
        let name = self.active.get(&vehicle)?.name.as_str();
        self.records.get_mut(name)
    }

    /// Looks up a fairness record by vehicle name, including vehicles which have left the network.
    pub fn record_by_name(&self, name: &str) -> Option<&VehicleFairnessRecord> {
        self.records.get(name)
    }

    /// Returns an iterator over every fairness record, keyed by vehicle name.
    pub fn records(&self) -> impl Iterator<Item = (&str, &VehicleFairnessRecord)> {
        self.records.iter().map(|(name, record)| (name.as_str(), record))
    }

    pub fn rerouted(&self) -> &ReroutedThisPeriod {
        &self.rerouted
    }

    pub fn rerouted_mut(&mut self) -> &mut ReroutedThisPeriod {
        &mut self.rerouted
    }

    pub fn travel_times(&self) -> &TravelTimeTable {
        &self.travel_times
    }

    pub fn travel_times_mut(&mut self) -> &mut TravelTimeTable {
        &mut self.travel_times
    }
}
