use crate::network::RoadNetworkIndex;
use crate::simulator::Simulator;
use crate::{EdgeId, RerouteError};
use slotmap::SecondaryMap;

/// The default cap on travel time estimates, as a multiple of the free flow time.
pub const FREE_FLOW_TRAVEL_TIME_MAXIMUM: f64 = 5.0;

/// A snapshot of the travel time on every edge, taken once per rerouting period.
///
/// A blocked edge can make a simulator estimate an effectively infinite travel time,
/// so every estimate is capped at a multiple of the edge's free flow time.
#[derive(Clone, Debug, Default)]
pub struct TravelTimeTable {
    times: SecondaryMap<EdgeId, f64>,
}

impl TravelTimeTable {
    pub fn new() -> Self {
        Default::default()
    }

    /// Reads the current estimate of every edge from the simulator, clamps it and stores it.
    /// The clamped values are written back as the simulator's network-wide routing times.
    ///
    /// # Parameters
    /// * `sim` - The simulator to read estimates from
    /// * `network` - The road network
    /// * `bound_factor` - The maximum travel time as a multiple of the free flow time
    pub fn refresh(
        &mut self,
        sim: &mut impl Simulator,
        network: &RoadNetworkIndex,
        bound_factor: f64,
    ) -> Result<(), RerouteError> {
        for edge in network.iter_edges() {
            let bound = edge.free_flow_time() * bound_factor;
            let time = f64::min(sim.global_travel_time(edge.id())?, bound);
            self.times.insert(edge.id(), time);
            sim.adapt_global_travel_time(edge.id(), time)?;
        }
        Ok(())
    }

    /// Gets the stored travel time of an edge.
    pub fn get(&self, edge: EdgeId) -> Option<f64> {
        self.times.get(edge).copied()
    }

    /// Overrides the stored travel time of an edge.
    pub fn set(&mut self, edge: EdgeId, time: f64) {
        self.times.insert(edge, time);
    }

    /// The sum of the stored travel times along a route.
    /// Edges without a stored time contribute nothing.
    pub fn route_time(&self, route: &[EdgeId]) -> f64 {
        route.iter().filter_map(|edge| self.get(*edge)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}
