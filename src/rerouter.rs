//! The rerouting loop: steps the simulator, looks for congestion once per period
//! and reroutes the vehicles heading into it.

use crate::config::RerouteConfig;
use crate::congestion::CongestionMonitor;
use crate::fairness::FairnessScorer;
use crate::kpaths::KShortestPaths;
use crate::network::{RoadNetworkIndex, Segment};
use crate::selection::select_candidates;
use crate::simulator::{Simulator, TravelTimeView};
use crate::state::{SimulationState, VehicleFairnessRecord};
use crate::storage::{MetricsStore, PeriodMetrics, Row, Table, VehicleMetrics};
use crate::{RerouteError, VehicleId};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

/// The default number of steps between rerouting periods.
pub const REROUTING_PERIOD: usize = 100;

/// The default step at which a run ends.
pub const END_TIME: usize = 10000;

/// How vehicles heading into congestion are rerouted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    /// Congestion is monitored but nobody is rerouted.
    NoRerouting,
    /// Dynamic shortest path: every affected vehicle takes the fastest route.
    Dsp,
    /// Every affected vehicle takes a random route from its k shortest paths.
    KPaths,
    /// As `Dsp`, but only the vehicles selected by their QOE are rerouted.
    DspFairness,
    /// As `KPaths`, but only the vehicles selected by their QOE are rerouted.
    KPathsFairness,
}

impl Algorithm {
    pub const ALL: [Algorithm; 5] = [
        Algorithm::NoRerouting,
        Algorithm::Dsp,
        Algorithm::KPaths,
        Algorithm::DspFairness,
        Algorithm::KPathsFairness,
    ];

    /// Looks up an algorithm by its numeric index, `0` to `4`.
    pub fn from_index(index: usize) -> Result<Self, RerouteError> {
        Self::ALL.get(index).copied().ok_or_else(|| {
            RerouteError::Config(format!("algorithm index must be between 0 and 4, got {}", index))
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::NoRerouting => "no-rerouting",
            Algorithm::Dsp => "dsp",
            Algorithm::KPaths => "k-paths",
            Algorithm::DspFairness => "dsp-fairness",
            Algorithm::KPathsFairness => "k-paths-fairness",
        }
    }

    pub fn reroutes(&self) -> bool {
        *self != Algorithm::NoRerouting
    }

    pub fn uses_kpaths(&self) -> bool {
        matches!(self, Algorithm::KPaths | Algorithm::KPathsFairness)
    }

    pub fn uses_fairness(&self) -> bool {
        matches!(self, Algorithm::DspFairness | Algorithm::KPathsFairness)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = RerouteError;

    /// Accepts either the algorithm's name or its index.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(index) = s.parse::<usize>() {
            return Self::from_index(index);
        }
        Self::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| RerouteError::Config(format!("unknown algorithm '{}'", s)))
    }
}

/// Why a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndReason {
    /// The configured end time was reached.
    Scheduled { step: usize },
    /// The caller asked for the run to stop.
    Manual { step: usize },
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::Scheduled { step } => {
                write!(f, "Simulation ended as scheduled at step {}", step)
            }
            EndReason::Manual { step } => write!(f, "Simulation stopped manually at step {}", step),
        }
    }
}

/// The result of a single step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Running,
    Finished(EndReason),
}

/// Drives a simulator, rerouting vehicles away from congestion and recording
/// how fairly they are treated.
pub struct Rerouter<S: Simulator, M: MetricsStore> {
    sim: S,
    network: Rc<RoadNetworkIndex>,
    store: M,
    config: RerouteConfig,
    state: SimulationState,
    monitor: CongestionMonitor,
    scorer: FairnessScorer,
    kpaths: KShortestPaths,
    rng: StdRng,
    /// The step at which the caller wants the run to stop, if any.
    stop_at: Option<usize>,
}

impl<S: Simulator, M: MetricsStore> Rerouter<S, M> {
    /// Creates a rerouter.
    ///
    /// # Parameters
    /// * `sim` - The simulator to drive
    /// * `network` - The road network being simulated
    /// * `store` - Where the metrics of each period are written
    /// * `config` - The run configuration, which is validated
    pub fn new(
        sim: S,
        network: Rc<RoadNetworkIndex>,
        store: M,
        config: RerouteConfig,
    ) -> Result<Self, RerouteError> {
        config.validate()?;
        Ok(Self {
            sim,
            network,
            store,
            monitor: config.monitor(),
            scorer: config.scorer(),
            kpaths: config.kpaths(),
            rng: StdRng::seed_from_u64(config.seed),
            config,
            state: SimulationState::new(),
            stop_at: None,
        })
    }

    /// Asks for the run to stop once the given step has been simulated.
    pub fn set_stop_at(&mut self, step: Option<usize>) {
        self.stop_at = step;
    }

    /// Seeds the fairness records with the vehicle metrics already in the store,
    /// and returns how many were loaded.
    pub fn load_previous_records(&mut self) -> Result<usize, RerouteError> {
        let mut loaded = 0;
        for row in self.store.read_all_rows(Table::VehicleOutput)? {
            let Row::Vehicle(metrics) = row else {
                continue;
            };
            self.state.load_record(
                &metrics.vehicle_id,
                VehicleFairnessRecord {
                    rerouted_count: metrics.number_times_rerouted,
                    cumulative_extra_time: metrics.cumulative_extra_time,
                    time_in_network: metrics.total_time_spent_in_system,
                    time_stopped: 0.0,
                },
            );
            loaded += 1;
        }
        info!("Loaded {} vehicle records from a previous run", loaded);
        Ok(loaded)
    }

    /// Advances the simulation by one step, running a rerouting period if one is due.
    pub fn step(&mut self) -> Result<StepOutcome, RerouteError> {
        self.sim.advance_step()?;
        let step = self.sim.current_step();
        self.track_vehicles(step)?;

        if step % self.config.rerouting_period == 0 {
            self.run_period(step)?;
        }

        let outcome = if self.stop_at.is_some_and(|stop| step >= stop) {
            StepOutcome::Finished(EndReason::Manual { step })
        } else if step >= self.config.end_time {
            StepOutcome::Finished(EndReason::Scheduled { step })
        } else {
            StepOutcome::Running
        };
        if let StepOutcome::Finished(reason) = outcome {
            self.write_vehicle_metrics()?;
            self.store.commit()?;
            info!("{}", reason);
        }
        Ok(outcome)
    }

    /// Steps the simulation until the run ends.
    pub fn run(&mut self) -> Result<EndReason, RerouteError> {
        loop {
            if let StepOutcome::Finished(reason) = self.step()? {
                return Ok(reason);
            }
        }
    }

    /// Starts tracking the vehicles which departed in the last step,
    /// and finalises the records of those which arrived.
    fn track_vehicles(&mut self, step: usize) -> Result<(), RerouteError> {
        let arrived = self.sim.arrived_vehicles().iter().copied().collect::<HashSet<_>>();
        for vehicle in self.sim.departed_vehicles().to_vec() {
            match self.sim.vehicle_name(vehicle) {
                Ok(name) => self.state.vehicle_departed(vehicle, &name, step),
                // Departed and arrived within the same step
                Err(_) if arrived.contains(&vehicle) => continue,
                Err(e) => return Err(e),
            }
        }
        for vehicle in arrived {
            self.state.vehicle_arrived(vehicle, step);
        }
        Ok(())
    }

    fn run_period(&mut self, step: usize) -> Result<(), RerouteError> {
        let vehicles = self.sim.vehicle_ids();
        let stopped = vehicles
            .iter()
            .map(|v| Ok((*v, self.sim.is_stopped(*v)?)))
            .collect::<Result<Vec<_>, RerouteError>>()?;
        self.state
            .accumulate_period(self.config.rerouting_period as f64, stopped);

        self.state.travel_times_mut().refresh(
            &mut self.sim,
            &self.network,
            self.config.travel_time_bound_factor,
        )?;
        self.state.begin_period();
        self.monitor.reset();

        let congested = self.monitor.scan(&self.sim, &self.network)?;
        if self.config.algorithm.reroutes() {
            for segment in &congested {
                self.reroute_segment(*segment)?;
            }
        }

        let records = self
            .sim
            .vehicle_ids()
            .into_iter()
            .filter_map(|v| self.state.record(v).map(|r| (v, *r)))
            .collect::<Vec<_>>();
        let fairness = self.scorer.fairness_index(&records);
        let mean_congestion = self.monitor.mean_congestion();

        info!(
            "Step {}: {} congested segments, {} vehicles rerouted, fairness index {:.3}",
            step,
            congested.len(),
            self.state.rerouted().len(),
            fairness.index
        );

        self.store.upsert_period_metrics(PeriodMetrics {
            period_key: format!("{}{}", self.config.simulation_reference, step),
            fairness_index: fairness.index,
            standard_deviation_qoe: fairness.std_dev,
            mean_congestion_level: mean_congestion,
        })?;
        self.write_vehicle_metrics()?;
        self.store.commit()
    }

    /// Reroutes the vehicles affected by congestion on a segment.
    fn reroute_segment(&mut self, segment: Segment) -> Result<(), RerouteError> {
        let candidates =
            select_candidates(&self.sim, &self.network, self.state.rerouted(), segment)?;
        let selected = if self.config.algorithm.uses_fairness() {
            let records = candidates
                .vehicles
                .iter()
                .map(|v| (*v, self.state.record(*v).copied().unwrap_or_default()))
                .collect::<Vec<_>>();
            self.scorer.rank(&records).selected
        } else {
            candidates.vehicles.clone()
        };

        for vehicle in selected {
            let current_edge = candidates
                .occupied_edge
                .get(&vehicle)
                .copied()
                .ok_or_else(|| RerouteError::UnknownVehicle(self.vehicle_label(vehicle)))?;

            let extra_time = if self.config.algorithm.uses_kpaths() {
                let choice = self.kpaths.find_routes(
                    &mut self.sim,
                    self.state.travel_times(),
                    vehicle,
                    current_edge,
                    &mut self.rng,
                )?;
                choice.extra_time
            } else {
                let route = self.sim.shortest_path(vehicle, TravelTimeView::Global)?;
                self.sim.set_route(vehicle, &route)?;
                0.0
            };

            let new_route = self.sim.route(vehicle)?;
            let changed = candidates.old_routes.get(&vehicle) != Some(&new_route);
            if let Some(record) = self.state.record_mut(vehicle) {
                record.cumulative_extra_time += extra_time;
                if changed {
                    record.rerouted_count += 1;
                }
            }
            if changed {
                self.state.rerouted_mut().insert(vehicle);
            }
            debug!(
                "{} {} away from {} (extra time {:.1}s)",
                self.vehicle_label(vehicle),
                if changed { "rerouted" } else { "kept its route" },
                self.network.segment_name(segment),
                extra_time
            );
        }
        Ok(())
    }

    /// Writes the metrics of every vehicle seen so far.
    fn write_vehicle_metrics(&mut self) -> Result<(), RerouteError> {
        let rows = self
            .state
            .records()
            .map(|(name, record)| VehicleMetrics {
                vehicle_id: name.to_string(),
                number_times_rerouted: record.rerouted_count,
                cumulative_extra_time: record.cumulative_extra_time,
                total_time_spent_in_system: record.time_in_network,
            })
            .collect::<Vec<_>>();
        for row in rows {
            self.store.upsert_vehicle_metrics(row)?;
        }
        Ok(())
    }

    fn vehicle_label(&self, vehicle: VehicleId) -> String {
        match self.state.vehicle_name(vehicle) {
            Some(name) => name.to_string(),
            None => format!("{:?}", vehicle),
        }
    }

    pub fn simulator(&self) -> &S {
        &self.sim
    }

    pub fn simulator_mut(&mut self) -> &mut S {
        &mut self.sim
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn store(&self) -> &M {
        &self.store
    }

    pub fn network(&self) -> &RoadNetworkIndex {
        &self.network
    }

    pub fn config(&self) -> &RerouteConfig {
        &self.config
    }
}
