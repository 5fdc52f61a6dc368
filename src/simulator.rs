//! The interface through which the rerouting engine drives a traffic simulator.

use crate::network::Segment;
use crate::{EdgeId, RerouteError, VehicleId};

/// Which travel time estimates a shortest path search should use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TravelTimeView {
    /// The network-wide estimates, shared by all vehicles.
    Global,
    /// The vehicle's own adapted estimates, falling back to the global ones
    /// for edges the vehicle has no estimate for.
    VehicleLocal,
}

/// A traffic simulator that the rerouting engine observes and steers.
///
/// Routes are ordered lists of edges starting at the edge the vehicle currently occupies.
pub trait Simulator {
    /// Advances the simulation by one step.
    fn advance_step(&mut self) -> Result<(), RerouteError>;

    /// The number of steps simulated so far.
    fn current_step(&self) -> usize;

    /// The fraction of the segment occupied by vehicles during the last step, in `[0, 1]`.
    fn occupancy(&self, segment: Segment) -> Result<f64, RerouteError>;

    /// The vehicles on the given edge during the last step.
    fn vehicles_on(&self, edge: EdgeId) -> Result<Vec<VehicleId>, RerouteError>;

    /// All the vehicles currently in the network.
    fn vehicle_ids(&self) -> Vec<VehicleId>;

    /// A human-readable name for the vehicle.
    fn vehicle_name(&self, vehicle: VehicleId) -> Result<String, RerouteError>;

    /// The route the vehicle is following.
    fn route(&self, vehicle: VehicleId) -> Result<Vec<EdgeId>, RerouteError>;

    /// Replaces the vehicle's route. The route must start at the vehicle's current edge.
    fn set_route(&mut self, vehicle: VehicleId, route: &[EdgeId]) -> Result<(), RerouteError>;

    /// Computes (without assigning) the fastest route from the vehicle's current edge
    /// to its destination under the given travel time view.
    fn shortest_path(
        &self,
        vehicle: VehicleId,
        view: TravelTimeView,
    ) -> Result<Vec<EdgeId>, RerouteError>;

    /// The vehicle's own estimate of the travel time on an edge, if it has one.
    fn adapted_travel_time(
        &self,
        vehicle: VehicleId,
        edge: EdgeId,
    ) -> Result<Option<f64>, RerouteError>;

    /// Sets the vehicle's own estimate of the travel time on an edge.
    /// This does not affect any other vehicle.
    fn set_adapted_travel_time(
        &mut self,
        vehicle: VehicleId,
        edge: EdgeId,
        time: f64,
    ) -> Result<(), RerouteError>;

    /// The simulator's current estimate of the travel time on an edge, in s.
    fn global_travel_time(&self, edge: EdgeId) -> Result<f64, RerouteError>;

    /// Overrides the network-wide travel time used for routing on an edge.
    fn adapt_global_travel_time(&mut self, edge: EdgeId, time: f64) -> Result<(), RerouteError>;

    /// The smoothed travel time estimate held by the vehicle's routing device, in s.
    fn device_travel_time(&self, vehicle: VehicleId, edge: EdgeId) -> Result<f64, RerouteError>;

    /// Whether the vehicle is in a stopped state.
    /// This is not the same as waiting, e.g. at a traffic light or in a queue.
    fn is_stopped(&self, vehicle: VehicleId) -> Result<bool, RerouteError>;

    /// The vehicles which entered the network during the last step.
    fn departed_vehicles(&self) -> &[VehicleId];

    /// The vehicles which reached their destination during the last step.
    fn arrived_vehicles(&self) -> &[VehicleId];
}
