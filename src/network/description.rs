//! The serialisable form of a road network and its demand.

use crate::RerouteError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A road network that has already been materialised as a graph:
/// edges with their lane counts, and the lane-to-lane connections between them.
/// The trips to simulate on the network travel with it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NetworkDescription {
    /// The edges in the network.
    pub edges: Vec<EdgeDescription>,
    /// The lane connections between edges.
    #[serde(default)]
    pub connections: Vec<ConnectionDescription>,
    /// The trips to be simulated.
    #[serde(default)]
    pub trips: Vec<TripDescription>,
}

/// An edge of the road network.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EdgeDescription {
    /// The unique name of the edge.
    pub id: String,
    /// The length of the edge in m.
    pub length: f64,
    /// The speed limit in m/s.
    pub speed_limit: f64,
    /// The number of lanes, named `<id>_0`, `<id>_1`, ...
    #[serde(default = "default_lanes")]
    pub lanes: usize,
    /// Overrides the computed fringe flag.
    #[serde(default)]
    pub fringe: Option<bool>,
}

/// Specifies that the end of lane `from_lane` of edge `from` connects
/// to the start of lane `to_lane` of edge `to`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionDescription {
    pub from: String,
    #[serde(default)]
    pub from_lane: usize,
    pub to: String,
    #[serde(default)]
    pub to_lane: usize,
}

/// A vehicle trip.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TripDescription {
    /// The name of the vehicle.
    pub id: String,
    /// The simulation step at which the vehicle departs.
    #[serde(default)]
    pub depart: usize,
    /// The edges the vehicle initially intends to follow.
    pub route: Vec<String>,
}

fn default_lanes() -> usize {
    1
}

impl NetworkDescription {
    /// Creates an empty description.
    pub fn new() -> Self {
        Default::default()
    }

    /// Parses a description from JSON.
    pub fn from_json(json: &str) -> Result<Self, RerouteError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON description from disk.
    pub fn load(path: &Path) -> Result<Self, RerouteError> {
        let content = std::fs::read_to_string(path).map_err(|e| RerouteError::io(path, e))?;
        Self::from_json(&content)
    }

    /// Adds an edge.
    pub fn edge(mut self, id: &str, length: f64, speed_limit: f64, lanes: usize) -> Self {
        self.edges.push(EdgeDescription {
            id: id.to_string(),
            length,
            speed_limit,
            lanes,
            fringe: None,
        });
        self
    }

    /// Connects a lane of one edge to a lane of another.
    pub fn connect(mut self, from: &str, from_lane: usize, to: &str, to_lane: usize) -> Self {
        self.connections.push(ConnectionDescription {
            from: from.to_string(),
            from_lane,
            to: to.to_string(),
            to_lane,
        });
        self
    }

    /// Adds a trip.
    pub fn trip(mut self, id: &str, depart: usize, route: &[&str]) -> Self {
        self.trips.push(TripDescription {
            id: id.to_string(),
            depart,
            route: route.iter().map(|s| s.to_string()).collect(),
        });
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_json_with_defaults() {
        let desc = NetworkDescription::from_json(
            r#"{
                "edges": [
                    { "id": "A", "length": 100.0, "speed_limit": 13.9 },
                    { "id": "B", "length": 80.0, "speed_limit": 13.9, "lanes": 2, "fringe": true }
                ],
                "connections": [ { "from": "A", "to": "B", "to_lane": 1 } ],
                "trips": [ { "id": "veh0", "route": ["A", "B"] } ]
            }"#,
        )
        .unwrap();

        assert_eq!(desc.edges[0].lanes, 1);
        assert_eq!(desc.edges[0].fringe, None);
        assert_eq!(desc.edges[1].fringe, Some(true));
        assert_eq!(desc.connections[0].from_lane, 0);
        assert_eq!(desc.connections[0].to_lane, 1);
        assert_eq!(desc.trips[0].depart, 0);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            NetworkDescription::from_json("{ \"edges\": 3 }"),
            Err(RerouteError::Json(_))
        ));
    }
}
