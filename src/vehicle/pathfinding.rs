use crate::network::RoadNetworkIndex;
use crate::EdgeId;

/// Finds the fastest route between two edges, if one exists.
///
/// The cost of a route is the sum of `cost` over every edge after `src`; the first
/// edge is already being travelled on and is the same for every candidate.
pub(crate) fn fastest_route(
    network: &RoadNetworkIndex,
    src: EdgeId,
    dst: EdgeId,
    cost: impl Fn(EdgeId) -> f64,
) -> Option<Vec<EdgeId>> {
    let result = pathfinding::directed::dijkstra::dijkstra(
        &src,
        |id| successors(*id, network, &cost),
        |id| *id == dst,
    );
    result.map(|(route, _)| route)
}

fn successors(
    edge_id: EdgeId,
    network: &RoadNetworkIndex,
    cost: &impl Fn(EdgeId) -> f64,
) -> Vec<(EdgeId, u64)> {
    network
        .outgoing(edge_id)
        .unwrap_or(&[])
        .iter()
        .map(|id| (*id, to_cost(cost(*id))))
        .collect()
}

/// Converts a travel time in s into an integer cost in ms.
fn to_cost(time: f64) -> u64 {
    (f64::max(time, 0.0) * 1000.0).round() as u64
}
