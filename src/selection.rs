use crate::network::{RoadNetworkIndex, Segment};
use crate::simulator::Simulator;
use crate::state::ReroutedThisPeriod;
use crate::{EdgeId, RerouteError, VehicleId};
use std::collections::HashMap;

/// The vehicles which may be affected by congestion on a segment.
#[derive(Clone, Debug, Default)]
pub struct Candidates {
    /// The vehicles to consider for rerouting, in the order they were found.
    pub vehicles: Vec<VehicleId>,
    /// The edge each inspected vehicle is currently on.
    pub occupied_edge: HashMap<VehicleId, EdgeId>,
    /// The route each inspected vehicle was following before rerouting.
    pub old_routes: HashMap<VehicleId, Vec<EdgeId>>,
}

/// Finds the vehicles upstream of a congested segment whose route takes them through it.
///
/// Vehicles are gathered from the precomputed bounded incoming set of the segment's edge.
/// Vehicles already rerouted this period and stopped vehicles are skipped. When the
/// congestion is confined to a lane, a vehicle is only affected if the edge it takes after
/// the congested one is reached through one of that lane's outgoing lanes; a vehicle whose
/// route ends on the congested edge is skipped.
pub fn select_candidates(
    sim: &impl Simulator,
    network: &RoadNetworkIndex,
    rerouted: &ReroutedThisPeriod,
    segment: Segment,
) -> Result<Candidates, RerouteError> {
    let edge = segment.parent_edge();
    network.edge(edge)?;
    let outgoing_lanes = match segment.lane() {
        Some(lane) => Some(network.outgoing_lanes(lane)?),
        None => None,
    };

    let mut candidates = Candidates::default();
    for &upstream in network.incoming_in_range(edge)? {
        for vehicle in sim.vehicles_on(upstream)? {
            if rerouted.contains(vehicle) || sim.is_stopped(vehicle)? {
                continue;
            }
            if candidates.occupied_edge.insert(vehicle, upstream).is_some() {
                continue;
            }

            let route = sim.route(vehicle)?;
            let affected = match route.iter().position(|e| *e == edge) {
                None => false,
                Some(idx) => match (outgoing_lanes, route.get(idx + 1)) {
                    (None, _) => true,
                    (Some(_), None) => false,
                    (Some(lanes_out), Some(next)) => {
                        let next_lanes = network.lanes_of(*next)?;
                        lanes_out.iter().any(|lane| next_lanes.contains(lane))
                    }
                },
            };
            candidates.old_routes.insert(vehicle, route);
            if affected {
                candidates.vehicles.push(vehicle);
            }
        }
    }
    Ok(candidates)
}
