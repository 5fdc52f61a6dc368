use crate::network::{RoadNetworkIndex, Segment, TripDescription};
use crate::simulator::{Simulator, TravelTimeView};
use crate::vehicle::pathfinding::fastest_route;
use crate::vehicle::Vehicle;
use crate::{EdgeId, LaneId, RerouteError, VehicleId};
use rand::Rng;
use rand_distr::Distribution;
use slotmap::{SecondaryMap, SlotMap};
use std::collections::HashMap;
use std::rc::Rc;

/// The length of a simulation step in s.
const STEP_LENGTH: f64 = 1.0; // s

/// Weight given to the newest speed sample by the smoothed speed estimates.
const SMOOTHING_WEIGHT: f64 = 0.5;

/// Travel time estimates never assume vehicles move slower than this, in m/s.
const MIN_ESTIMATE_SPEED: f64 = 0.01; // m/s

/// A trip which has not yet entered the network.
#[derive(Clone, Debug)]
struct PendingTrip {
    name: String,
    depart: usize,
    route: Vec<EdgeId>,
    vel_adjust: f64,
}

/// A mesoscopic traffic simulation.
///
/// Vehicles travel along the lanes of their route at a speed which drops as the lane fills,
/// and queue at the end of an edge until there is room on the next one.
/// Routing state mirrors what a microscopic simulator exposes: live and smoothed travel time
/// estimates per edge, network-wide adapted travel times and per-vehicle adapted travel times.
pub struct Simulation {
    /// The road network.
    network: Rc<RoadNetworkIndex>,
    /// The vehicles being simulated.
    vehicles: SlotMap<VehicleId, Vehicle>,
    /// The vehicles on each lane, in the order they entered it.
    lane_vehicles: SecondaryMap<LaneId, Vec<VehicleId>>,
    /// Trips yet to depart, ordered by departure step.
    pending: Vec<PendingTrip>,
    /// Vehicle IDs by name.
    names: HashMap<String, VehicleId>,
    /// The mean speed on each occupied edge during the last step, in m/s.
    last_speed: SecondaryMap<EdgeId, f64>,
    /// An exponentially smoothed mean speed on each edge, in m/s.
    smoothed_speed: SecondaryMap<EdgeId, f64>,
    /// Network-wide travel times used for routing, in s.
    global_adapted: SecondaryMap<EdgeId, f64>,
    /// Per-vehicle travel times used for routing, in s.
    vehicle_adapted: HashMap<(VehicleId, EdgeId), f64>,
    /// The vehicles which departed in the last step.
    departed: Vec<VehicleId>,
    /// The vehicles which arrived in the last step.
    arrived: Vec<VehicleId>,
    /// The number of steps simulated.
    step: usize,
}

impl Simulation {
    /// Creates a new simulation with no trips.
    pub fn new(network: Rc<RoadNetworkIndex>) -> Self {
        let lane_vehicles = network
            .iter_edges()
            .flat_map(|e| e.lanes().iter().copied())
            .map(|lane| (lane, vec![]))
            .collect();
        let smoothed_speed = network
            .iter_edges()
            .map(|e| (e.id(), e.speed_limit()))
            .collect();
        Self {
            network,
            vehicles: Default::default(),
            lane_vehicles,
            pending: vec![],
            names: HashMap::new(),
            last_speed: SecondaryMap::new(),
            smoothed_speed,
            global_adapted: SecondaryMap::new(),
            vehicle_adapted: HashMap::new(),
            departed: vec![],
            arrived: vec![],
            step: 0,
        }
    }

    /// Creates a simulation of the given trips.
    pub fn with_trips(
        network: Rc<RoadNetworkIndex>,
        trips: &[TripDescription],
    ) -> Result<Self, RerouteError> {
        let mut sim = Self::new(network);
        for trip in trips {
            sim.add_trip(trip)?;
        }
        Ok(sim)
    }

    /// Schedules a trip. The route must be a connected sequence of edges.
    pub fn add_trip(&mut self, trip: &TripDescription) -> Result<(), RerouteError> {
        let route = trip
            .route
            .iter()
            .map(|name| self.network.edge_by_name(name))
            .collect::<Result<Vec<_>, _>>()?;
        if route.is_empty() {
            return Err(RerouteError::Network(format!("trip '{}' has an empty route", trip.id)));
        }
        self.check_connected(&route).map_err(|_| {
            RerouteError::Network(format!("trip '{}' has a disconnected route", trip.id))
        })?;
        let idx = self.pending.partition_point(|p| p.depart <= trip.depart);
        self.pending.insert(
            idx,
            PendingTrip {
                name: trip.id.clone(),
                depart: trip.depart,
                route,
                vel_adjust: 1.0,
            },
        );
        Ok(())
    }

    /// Randomly assigns a desired velocity adjustment factor to each vehicle and each trip
    /// yet to depart, which is sampled from a normal distribution with a mean of 1
    /// (no adjustment) and standard deviation of `stddev`. The deviation must be finite
    /// and non-negative.
    pub fn randomise_velocity_adjusts(
        &mut self,
        stddev: f64,
        rng: &mut impl Rng,
    ) -> Result<(), RerouteError> {
        if !(stddev >= 0.0 && stddev.is_finite()) {
            return Err(RerouteError::Config(format!(
                "velocity deviation must be finite and non-negative, got {}",
                stddev
            )));
        }
        let distr = rand_distr::Normal::new(1.0, stddev)
            .map_err(|e| RerouteError::Config(format!("invalid velocity deviation: {}", e)))?;
        for (_, vehicle) in &mut self.vehicles {
            let factor = distr.sample(rng).clamp(0.75, 1.25);
            vehicle.set_velocity_adjust(factor);
        }
        for trip in &mut self.pending {
            trip.vel_adjust = distr.sample(rng).clamp(0.75, 1.25);
        }
        Ok(())
    }

    /// Sets whether a vehicle is stopped. A stopped vehicle stays where it is
    /// until it is no longer stopped.
    pub fn set_vehicle_stopped(
        &mut self,
        vehicle_id: VehicleId,
        stopped: bool,
    ) -> Result<(), RerouteError> {
        self.vehicle_mut(vehicle_id)?.set_stopped(stopped);
        Ok(())
    }

    /// Looks up a vehicle in the network by name.
    pub fn vehicle_by_name(&self, name: &str) -> Option<VehicleId> {
        self.names.get(name).copied()
    }

    /// Gets a reference to the vehicle with the given ID.
    pub fn get_vehicle(&self, vehicle_id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(vehicle_id)
    }

    /// Returns an iterator over all the vehicles in the simulation.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// Whether every trip has departed and arrived.
    pub fn is_finished(&self) -> bool {
        self.pending.is_empty() && self.vehicles.is_empty()
    }

    /// The road network being simulated.
    pub fn network(&self) -> &RoadNetworkIndex {
        &self.network
    }

    fn vehicle(&self, vehicle_id: VehicleId) -> Result<&Vehicle, RerouteError> {
        self.vehicles
            .get(vehicle_id)
            .ok_or_else(|| RerouteError::UnknownVehicle(format!("{:?}", vehicle_id)))
    }

    fn vehicle_mut(&mut self, vehicle_id: VehicleId) -> Result<&mut Vehicle, RerouteError> {
        self.vehicles
            .get_mut(vehicle_id)
            .ok_or_else(|| RerouteError::UnknownVehicle(format!("{:?}", vehicle_id)))
    }

    fn check_connected(&self, route: &[EdgeId]) -> Result<(), RerouteError> {
        for pair in route.windows(2) {
            if !self.network.outgoing(pair[0])?.contains(&pair[1]) {
                return Err(RerouteError::Simulator(format!(
                    "edge '{}' does not lead to '{}'",
                    self.network.edge(pair[0])?.name(),
                    self.network.edge(pair[1])?.name()
                )));
            }
        }
        Ok(())
    }

    /// The fraction of a lane taken up by vehicles.
    fn lane_occupancy(&self, lane_id: LaneId) -> f64 {
        let Ok(lane) = self.network.lane(lane_id) else {
            return 0.0;
        };
        let used = self
            .lane_vehicles
            .get(lane_id)
            .map(|vehs| vehs.iter().map(|v| self.vehicles[*v].footprint()).sum::<f64>())
            .unwrap_or(0.0);
        f64::min(used / lane.length(), 1.0)
    }

    /// Whether a vehicle fits onto a lane.
    fn has_room(&self, lane_id: LaneId, footprint: f64) -> bool {
        let Ok(lane) = self.network.lane(lane_id) else {
            return false;
        };
        self.lane_occupancy(lane_id) + footprint / lane.length() <= 1.0 + 1e-9
    }

    /// Picks the least occupied lane of `edge_id`, preferring lanes which lead to `next`.
    fn choose_lane(&self, edge_id: EdgeId, next: Option<EdgeId>) -> Result<LaneId, RerouteError> {
        let edge = self.network.edge(edge_id)?;
        let leads_to_next = |lane_id: &LaneId| match next {
            Some(next) => self
                .network
                .lane(*lane_id)
                .map(|lane| {
                    lane.lanes_out().iter().any(|out| {
                        self.network
                            .lane(*out)
                            .map(|l| l.edge() == next)
                            .unwrap_or(false)
                    })
                })
                .unwrap_or(false),
            None => true,
        };
        let preferred = edge.lanes().iter().copied().filter(leads_to_next).collect::<Vec<_>>();
        let candidates = if preferred.is_empty() {
            edge.lanes().to_vec()
        } else {
            preferred
        };
        candidates
            .into_iter()
            .min_by(|a, b| self.lane_occupancy(*a).total_cmp(&self.lane_occupancy(*b)))
            .ok_or_else(|| RerouteError::Network(format!("edge '{}' has no lanes", edge.name())))
    }

    /// Inserts the trips which are due to depart, if there is room for them.
    fn insert_departures(&mut self) -> Result<(), RerouteError> {
        let due = self.pending.partition_point(|p| p.depart <= self.step);
        let trips = self.pending.drain(..due).collect::<Vec<_>>();
        let mut waiting = vec![];

        for trip in trips {
            let lane = self.choose_lane(trip.route[0], trip.route.get(1).copied())?;
            let footprint = crate::vehicle::VEHICLE_LENGTH;
            if !self.has_room(lane, footprint) {
                waiting.push(trip);
                continue;
            }
            let vehicle_id = self.vehicles.insert_with_key(|id| {
                let mut vehicle = Vehicle::new(id, trip.name.clone(), trip.route);
                vehicle.set_velocity_adjust(trip.vel_adjust);
                vehicle
            });
            self.lane_vehicles[lane].push(vehicle_id);
            self.names.insert(trip.name, vehicle_id);
            self.departed.push(vehicle_id);
        }

        // Delayed trips go back to the front of the queue
        waiting.append(&mut self.pending);
        self.pending = waiting;
        Ok(())
    }

    /// Moves every vehicle along its lane.
    fn drive_vehicles(&mut self) -> Result<(), RerouteError> {
        for (lane_id, vehs) in &self.lane_vehicles {
            let lane = self.network.lane(lane_id)?;
            let edge = self.network.edge(lane.edge())?;
            let used = vehs.iter().map(|v| self.vehicles[*v].footprint()).sum::<f64>();
            let occupancy = f64::min(used / lane.length(), 1.0);
            for vehicle_id in vehs {
                self.vehicles[*vehicle_id].drive(
                    STEP_LENGTH,
                    edge.speed_limit(),
                    occupancy,
                    edge.length(),
                );
            }
        }
        Ok(())
    }

    /// Find vehicles that have reached the end of their edge and either move them
    /// to their next edge or remove them from the simulation.
    fn advance_vehicles(&mut self) -> Result<(), RerouteError> {
        let mut ready = vec![];
        for (lane_id, vehs) in &self.lane_vehicles {
            let length = self.network.lane(lane_id)?.length();
            ready.extend(
                vehs.iter()
                    .copied()
                    .filter(|v| !self.vehicles[*v].is_stopped() && self.vehicles[*v].at_end(length))
                    .map(|v| (lane_id, v)),
            );
        }

        for (lane_id, vehicle_id) in ready {
            let vehicle = &self.vehicles[vehicle_id];
            match vehicle.next_edge() {
                None => {
                    self.remove_from_lane(lane_id, vehicle_id);
                    self.vehicles.remove(vehicle_id);
                    self.vehicle_adapted.retain(|(v, _), _| *v != vehicle_id);
                    self.names.retain(|_, v| *v != vehicle_id);
                    self.arrived.push(vehicle_id);
                }
                Some(next) => {
                    let after = vehicle.route().get(2).copied();
                    let footprint = vehicle.footprint();
                    let target = self.choose_target_lane(lane_id, next, after)?;
                    if self.has_room(target, footprint) {
                        self.remove_from_lane(lane_id, vehicle_id);
                        self.lane_vehicles[target].push(vehicle_id);
                        self.vehicles[vehicle_id].advance();
                    }
                }
            }
        }
        Ok(())
    }

    /// Picks the lane of `next` to move onto from `lane_id`, preferring the lane's own connections.
    fn choose_target_lane(
        &self,
        lane_id: LaneId,
        next: EdgeId,
        after: Option<EdgeId>,
    ) -> Result<LaneId, RerouteError> {
        let connected = self
            .network
            .lane(lane_id)?
            .lanes_out()
            .iter()
            .copied()
            .filter(|out| self.network.lane(*out).map(|l| l.edge() == next).unwrap_or(false))
            .min_by(|a, b| self.lane_occupancy(*a).total_cmp(&self.lane_occupancy(*b)));
        match connected {
            Some(lane) => Ok(lane),
            None => self.choose_lane(next, after),
        }
    }

    fn remove_from_lane(&mut self, lane_id: LaneId, vehicle_id: VehicleId) {
        if let Some(vehs) = self.lane_vehicles.get_mut(lane_id) {
            if let Some(idx) = vehs.iter().position(|v| *v == vehicle_id) {
                vehs.remove(idx);
            }
        }
    }

    /// Updates the live and smoothed speed estimates of every edge.
    fn update_speed_estimates(&mut self) {
        for edge in self.network.iter_edges() {
            let speeds = edge
                .lanes()
                .iter()
                .filter_map(|lane| self.lane_vehicles.get(*lane))
                .flatten()
                .map(|v| self.vehicles[*v].vel())
                .collect::<Vec<_>>();
            let sample = if speeds.is_empty() {
                self.last_speed.remove(edge.id());
                edge.speed_limit()
            } else {
                let mean = speeds.iter().sum::<f64>() / speeds.len() as f64;
                self.last_speed.insert(edge.id(), mean);
                mean
            };
            let smoothed = self.smoothed_speed.get(edge.id()).copied().unwrap_or(sample);
            self.smoothed_speed.insert(
                edge.id(),
                (1.0 - SMOOTHING_WEIGHT) * smoothed + SMOOTHING_WEIGHT * sample,
            );
        }
    }

    /// The travel time used for routing on an edge.
    fn routing_time(&self, vehicle_id: Option<VehicleId>, edge_id: EdgeId) -> f64 {
        vehicle_id
            .and_then(|v| self.vehicle_adapted.get(&(v, edge_id)).copied())
            .or_else(|| self.global_adapted.get(edge_id).copied())
            .or_else(|| self.global_travel_time(edge_id).ok())
            .unwrap_or(f64::INFINITY)
    }
}

impl Simulator for Simulation {
    fn advance_step(&mut self) -> Result<(), RerouteError> {
        self.departed.clear();
        self.arrived.clear();
        self.insert_departures()?;
        self.drive_vehicles()?;
        self.advance_vehicles()?;
        self.update_speed_estimates();
        self.step += 1;
        Ok(())
    }

    fn current_step(&self) -> usize {
        self.step
    }

    fn occupancy(&self, segment: Segment) -> Result<f64, RerouteError> {
        match segment {
            Segment::Lane { lane, .. } => {
                self.network.lane(lane)?;
                Ok(self.lane_occupancy(lane))
            }
            Segment::Edge(edge) => {
                let lanes = self.network.edge(edge)?.lanes();
                let total = lanes.iter().map(|l| self.lane_occupancy(*l)).sum::<f64>();
                Ok(total / lanes.len() as f64)
            }
        }
    }

    fn vehicles_on(&self, edge: EdgeId) -> Result<Vec<VehicleId>, RerouteError> {
        let lanes = self.network.edge(edge)?.lanes();
        Ok(lanes
            .iter()
            .filter_map(|lane| self.lane_vehicles.get(*lane))
            .flatten()
            .copied()
            .collect())
    }

    fn vehicle_ids(&self) -> Vec<VehicleId> {
        self.vehicles.keys().collect()
    }

    fn vehicle_name(&self, vehicle: VehicleId) -> Result<String, RerouteError> {
        Ok(self.vehicle(vehicle)?.name().to_string())
    }

    fn route(&self, vehicle: VehicleId) -> Result<Vec<EdgeId>, RerouteError> {
        Ok(self.vehicle(vehicle)?.route().to_vec())
    }

    fn set_route(&mut self, vehicle: VehicleId, route: &[EdgeId]) -> Result<(), RerouteError> {
        let current = self.vehicle(vehicle)?.edge_id();
        if route.first() != Some(&current) {
            return Err(RerouteError::Simulator(format!(
                "new route for {} must start at its current edge",
                self.vehicle(vehicle)?.name()
            )));
        }
        self.check_connected(route)?;
        self.vehicle_mut(vehicle)?.set_route(route);
        Ok(())
    }

    fn shortest_path(
        &self,
        vehicle: VehicleId,
        view: TravelTimeView,
    ) -> Result<Vec<EdgeId>, RerouteError> {
        let veh = self.vehicle(vehicle)?;
        let local = match view {
            TravelTimeView::Global => None,
            TravelTimeView::VehicleLocal => Some(vehicle),
        };
        let route = fastest_route(&self.network, veh.edge_id(), veh.destination(), |edge| {
            self.routing_time(local, edge)
        });
        // Keep the current route when the destination can't be reached
        Ok(route.unwrap_or_else(|| veh.route().to_vec()))
    }

    fn adapted_travel_time(
        &self,
        vehicle: VehicleId,
        edge: EdgeId,
    ) -> Result<Option<f64>, RerouteError> {
        self.vehicle(vehicle)?;
        self.network.edge(edge)?;
        Ok(self.vehicle_adapted.get(&(vehicle, edge)).copied())
    }

    fn set_adapted_travel_time(
        &mut self,
        vehicle: VehicleId,
        edge: EdgeId,
        time: f64,
    ) -> Result<(), RerouteError> {
        self.vehicle(vehicle)?;
        self.network.edge(edge)?;
        self.vehicle_adapted.insert((vehicle, edge), time);
        Ok(())
    }

    fn global_travel_time(&self, edge: EdgeId) -> Result<f64, RerouteError> {
        let edge = self.network.edge(edge)?;
        let speed = self
            .last_speed
            .get(edge.id())
            .copied()
            .unwrap_or(edge.speed_limit());
        Ok(edge.length() / f64::max(speed, MIN_ESTIMATE_SPEED))
    }

    fn adapt_global_travel_time(&mut self, edge: EdgeId, time: f64) -> Result<(), RerouteError> {
        self.network.edge(edge)?;
        self.global_adapted.insert(edge, time);
        Ok(())
    }

    fn device_travel_time(&self, vehicle: VehicleId, edge: EdgeId) -> Result<f64, RerouteError> {
        self.vehicle(vehicle)?;
        let edge = self.network.edge(edge)?;
        let speed = self
            .smoothed_speed
            .get(edge.id())
            .copied()
            .unwrap_or(edge.speed_limit());
        Ok(edge.length() / f64::max(speed, MIN_ESTIMATE_SPEED))
    }

    fn is_stopped(&self, vehicle: VehicleId) -> Result<bool, RerouteError> {
        Ok(self.vehicle(vehicle)?.is_stopped())
    }

    fn departed_vehicles(&self) -> &[VehicleId] {
        &self.departed
    }

    fn arrived_vehicles(&self) -> &[VehicleId] {
        &self.arrived
    }
}
