//! The read-only index over the road network's edges and lanes.

pub use description::{ConnectionDescription, EdgeDescription, NetworkDescription, TripDescription};

use crate::{EdgeId, LaneId, RerouteError};
use smallvec::SmallVec;
use slotmap::{SecondaryMap, SlotMap};
use std::collections::{HashMap, HashSet, VecDeque};

mod description;

/// The default number of incoming edges away from an edge to search for affected vehicles.
pub const MAX_EDGE_RECURSIONS_RANGE: usize = 3;

/// The default minimum length (in m) of an edge for it to be monitored for congestion.
pub const MIN_EDGE_LENGTH: f64 = 25.0;

/// A road segment, which is either a whole edge or a single lane of an edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    /// An entire edge.
    Edge(EdgeId),
    /// A lane, along with the edge it belongs to.
    Lane { lane: LaneId, edge: EdgeId },
}

impl Segment {
    /// The edge this segment is, or belongs to.
    pub fn parent_edge(&self) -> EdgeId {
        match *self {
            Segment::Edge(edge) => edge,
            Segment::Lane { edge, .. } => edge,
        }
    }

    /// The lane, if this segment is lane-scoped.
    pub fn lane(&self) -> Option<LaneId> {
        match *self {
            Segment::Edge(_) => None,
            Segment::Lane { lane, .. } => Some(lane),
        }
    }
}

/// An edge of the road network.
#[derive(Clone, Debug)]
pub struct Edge {
    id: EdgeId,
    name: String,
    /// Length in m.
    length: f64,
    /// Speed limit in m/s.
    speed_limit: f64,
    /// The lanes of the edge, ordered by index.
    lanes: SmallVec<[LaneId; 4]>,
    /// The edges that succeed this one.
    edges_out: Vec<EdgeId>,
    /// The edges that precede this one.
    edges_in: Vec<EdgeId>,
    /// Whether the edge is on the boundary of the network.
    fringe: bool,
}

/// A single lane of an edge.
#[derive(Clone, Debug)]
pub struct Lane {
    id: LaneId,
    name: String,
    edge: EdgeId,
    length: f64,
    /// The lanes this lane connects to.
    lanes_out: Vec<LaneId>,
}

impl Edge {
    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the length of the edge in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Gets the speed limit in m/s.
    pub fn speed_limit(&self) -> f64 {
        self.speed_limit
    }

    /// The time taken to traverse the edge at the speed limit, in s.
    pub fn free_flow_time(&self) -> f64 {
        self.length / self.speed_limit
    }

    pub fn lanes(&self) -> &[LaneId] {
        &self.lanes
    }

    pub fn edges_out(&self) -> &[EdgeId] {
        &self.edges_out
    }

    pub fn edges_in(&self) -> &[EdgeId] {
        &self.edges_in
    }

    pub fn is_fringe(&self) -> bool {
        self.fringe
    }
}

impl Lane {
    pub fn id(&self) -> LaneId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The edge the lane belongs to.
    pub fn edge(&self) -> EdgeId {
        self.edge
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn lanes_out(&self) -> &[LaneId] {
        &self.lanes_out
    }
}

/// Precomputed adjacency over the road network.
/// Built once when the network is loaded and never mutated afterwards.
#[derive(Clone, Debug)]
pub struct RoadNetworkIndex {
    edges: SlotMap<EdgeId, Edge>,
    lanes: SlotMap<LaneId, Lane>,
    /// Maps edge and lane names onto segments.
    names: HashMap<String, Segment>,
    /// The depth used for `incoming_in_range`.
    incoming_range: usize,
    /// The incoming edges up to `incoming_range` hops away from each edge.
    incoming_in_range: SecondaryMap<EdgeId, Vec<EdgeId>>,
    /// Lanes of edges with several outgoing edges, monitored individually.
    rerouting_lanes: Vec<LaneId>,
    /// Edges with a single outgoing edge, monitored as a whole.
    single_outgoing_edges: Vec<EdgeId>,
}

impl RoadNetworkIndex {
    /// Builds the index using the default search range and minimum edge length.
    pub fn new(desc: &NetworkDescription) -> Result<Self, RerouteError> {
        Self::with_params(desc, MAX_EDGE_RECURSIONS_RANGE, MIN_EDGE_LENGTH)
    }

    /// Builds the index.
    ///
    /// # Parameters
    /// * `desc` - The network description
    /// * `incoming_range` - The depth of the precomputed bounded incoming sets
    /// * `min_edge_length` - Edges shorter than this are not monitored for congestion
    pub fn with_params(
        desc: &NetworkDescription,
        incoming_range: usize,
        min_edge_length: f64,
    ) -> Result<Self, RerouteError> {
        let mut index = Self {
            edges: SlotMap::with_key(),
            lanes: SlotMap::with_key(),
            names: HashMap::new(),
            incoming_range,
            incoming_in_range: SecondaryMap::new(),
            rerouting_lanes: vec![],
            single_outgoing_edges: vec![],
        };

        for edge in &desc.edges {
            index.add_edge(edge)?;
        }
        for conn in &desc.connections {
            index.add_connection(conn)?;
        }

        let overrides = desc
            .edges
            .iter()
            .filter_map(|e| e.fringe.map(|f| (e.id.as_str(), f)))
            .collect::<HashMap<_, _>>();
        for edge in index.edges.values_mut() {
            edge.fringe = overrides
                .get(edge.name.as_str())
                .copied()
                .unwrap_or(edge.edges_in.is_empty() || edge.edges_out.is_empty());
        }

        let edge_ids = index.edges.keys().collect::<Vec<_>>();
        for edge_id in edge_ids {
            let incoming = index.bounded_incoming(edge_id, incoming_range)?;
            index.incoming_in_range.insert(edge_id, incoming);
        }

        for edge in index.edges.values() {
            if edge.fringe || edge.length < min_edge_length {
                continue;
            }
            match edge.edges_out.len() {
                0 => {}
                1 => index.single_outgoing_edges.push(edge.id),
                _ => index.rerouting_lanes.extend(edge.lanes.iter().copied()),
            }
        }

        Ok(index)
    }

    fn add_edge(&mut self, desc: &EdgeDescription) -> Result<(), RerouteError> {
        if self.names.contains_key(&desc.id) {
            return Err(RerouteError::Network(format!("duplicate edge '{}'", desc.id)));
        }
        if !(desc.length > 0.0) || !(desc.speed_limit > 0.0) {
            return Err(RerouteError::Network(format!(
                "edge '{}' must have a positive length and speed limit",
                desc.id
            )));
        }
        if desc.lanes == 0 {
            return Err(RerouteError::Network(format!("edge '{}' has no lanes", desc.id)));
        }

        let edge_id = self.edges.insert_with_key(|id| Edge {
            id,
            name: desc.id.clone(),
            length: desc.length,
            speed_limit: desc.speed_limit,
            lanes: SmallVec::new(),
            edges_out: vec![],
            edges_in: vec![],
            fringe: false,
        });
        self.names.insert(desc.id.clone(), Segment::Edge(edge_id));

        for idx in 0..desc.lanes {
            let name = format!("{}_{}", desc.id, idx);
            if self.names.contains_key(&name) {
                return Err(RerouteError::Network(format!("duplicate lane '{}'", name)));
            }
            let lane_id = self.lanes.insert_with_key(|id| Lane {
                id,
                name: name.clone(),
                edge: edge_id,
                length: desc.length,
                lanes_out: vec![],
            });
            self.edges[edge_id].lanes.push(lane_id);
            self.names.insert(
                name,
                Segment::Lane {
                    lane: lane_id,
                    edge: edge_id,
                },
            );
        }
        Ok(())
    }

    fn add_connection(&mut self, conn: &ConnectionDescription) -> Result<(), RerouteError> {
        let from = self.lane_of_edge(&conn.from, conn.from_lane)?;
        let to = self.lane_of_edge(&conn.to, conn.to_lane)?;
        let from_edge = self.lanes[from].edge;
        let to_edge = self.lanes[to].edge;

        let lane = &mut self.lanes[from];
        if !lane.lanes_out.contains(&to) {
            lane.lanes_out.push(to);
        }
        if !self.edges[from_edge].edges_out.contains(&to_edge) {
            self.edges[from_edge].edges_out.push(to_edge);
        }
        if !self.edges[to_edge].edges_in.contains(&from_edge) {
            self.edges[to_edge].edges_in.push(from_edge);
        }
        Ok(())
    }

    fn lane_of_edge(&self, edge: &str, idx: usize) -> Result<LaneId, RerouteError> {
        let edge_id = self.edge_by_name(edge).map_err(|_| {
            RerouteError::Network(format!("connection references unknown edge '{}'", edge))
        })?;
        self.edges[edge_id].lanes.get(idx).copied().ok_or_else(|| {
            RerouteError::Network(format!("edge '{}' has no lane {}", edge, idx))
        })
    }

    /// Resolves the name of an edge or lane.
    pub fn resolve(&self, name: &str) -> Result<Segment, RerouteError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| RerouteError::UnknownSegment(name.to_string()))
    }

    /// Resolves the name of an edge.
    pub fn edge_by_name(&self, name: &str) -> Result<EdgeId, RerouteError> {
        match self.resolve(name)? {
            Segment::Edge(edge) => Ok(edge),
            Segment::Lane { .. } => Err(RerouteError::UnknownSegment(name.to_string())),
        }
    }

    /// Converts a lane into a lane-scoped segment.
    pub fn lane_segment(&self, lane: LaneId) -> Result<Segment, RerouteError> {
        let edge = self.lane(lane)?.edge;
        Ok(Segment::Lane { lane, edge })
    }

    pub fn edge(&self, id: EdgeId) -> Result<&Edge, RerouteError> {
        self.edges
            .get(id)
            .ok_or_else(|| RerouteError::UnknownSegment(format!("{:?}", id)))
    }

    pub fn lane(&self, id: LaneId) -> Result<&Lane, RerouteError> {
        self.lanes
            .get(id)
            .ok_or_else(|| RerouteError::UnknownSegment(format!("{:?}", id)))
    }

    /// The lanes of an edge.
    pub fn lanes_of(&self, edge: EdgeId) -> Result<&[LaneId], RerouteError> {
        Ok(self.edge(edge)?.lanes())
    }

    /// The lanes a lane connects to.
    pub fn outgoing_lanes(&self, lane: LaneId) -> Result<&[LaneId], RerouteError> {
        Ok(self.lane(lane)?.lanes_out())
    }

    /// Gets the name of a segment, for diagnostics.
    pub fn segment_name(&self, segment: Segment) -> &str {
        let name = match segment {
            Segment::Edge(edge) => self.edges.get(edge).map(|e| e.name.as_str()),
            Segment::Lane { lane, .. } => self.lanes.get(lane).map(|l| l.name.as_str()),
        };
        name.unwrap_or("<unknown>")
    }

    /// Returns an iterator over all the edges.
    pub fn iter_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn outgoing(&self, edge: EdgeId) -> Result<&[EdgeId], RerouteError> {
        Ok(self.edge(edge)?.edges_out())
    }

    pub fn incoming(&self, edge: EdgeId) -> Result<&[EdgeId], RerouteError> {
        Ok(self.edge(edge)?.edges_in())
    }

    pub fn is_fringe(&self, edge: EdgeId) -> Result<bool, RerouteError> {
        Ok(self.edge(edge)?.fringe)
    }

    /// The edges reachable by following incoming edges up to `depth` hops from `edge`.
    ///
    /// The search is breadth-first, so each edge is recorded at the smallest depth it can be
    /// reached at and is never expanded past that. The start edge is only included when a
    /// cycle within `depth` leads back to it.
    pub fn bounded_incoming(
        &self,
        edge: EdgeId,
        depth: usize,
    ) -> Result<Vec<EdgeId>, RerouteError> {
        self.edge(edge)?;

        let mut visited = HashSet::new();
        let mut reached = vec![];
        let mut frontier = VecDeque::from([(edge, 0)]);

        while let Some((current, dist)) = frontier.pop_front() {
            if dist >= depth {
                continue;
            }
            for &incoming in &self.edges[current].edges_in {
                if visited.insert(incoming) {
                    reached.push(incoming);
                    frontier.push_back((incoming, dist + 1));
                }
            }
        }

        Ok(reached)
    }

    /// The precomputed bounded incoming set of an edge.
    pub fn incoming_in_range(&self, edge: EdgeId) -> Result<&[EdgeId], RerouteError> {
        self.incoming_in_range
            .get(edge)
            .map(|edges| edges.as_slice())
            .ok_or_else(|| RerouteError::UnknownSegment(format!("{:?}", edge)))
    }

    /// The depth of the precomputed bounded incoming sets.
    pub fn incoming_range(&self) -> usize {
        self.incoming_range
    }

    /// Lanes belonging to non-fringe edges with at least two outgoing edges.
    pub fn rerouting_lanes(&self) -> &[LaneId] {
        &self.rerouting_lanes
    }

    /// Non-fringe edges with exactly one outgoing edge.
    pub fn single_outgoing_edges(&self) -> &[EdgeId] {
        &self.single_outgoing_edges
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fixtures::toy_network;

    fn names(index: &RoadNetworkIndex, edges: &[EdgeId]) -> Vec<String> {
        let mut names = edges
            .iter()
            .map(|e| index.edge(*e).unwrap().name().to_string())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    #[test]
    fn derives_edge_adjacency_from_lanes() {
        let index = RoadNetworkIndex::new(&toy_network()).unwrap();
        let b = index.edge_by_name("B").unwrap();
        assert_eq!(names(&index, index.outgoing(b).unwrap()), ["E", "G"]);
        assert_eq!(names(&index, index.incoming(b).unwrap()), ["A", "C"]);
        assert_eq!(index.edge(b).unwrap().lanes().len(), 2);

        let b0 = index.resolve("B_0").unwrap().lane().unwrap();
        let e0 = index.resolve("E_0").unwrap().lane().unwrap();
        assert_eq!(index.lane(b0).unwrap().lanes_out(), &[e0]);
    }

    #[test]
    fn bounded_incoming_respects_depth() {
        let index = RoadNetworkIndex::new(&toy_network()).unwrap();
        let e = index.edge_by_name("E").unwrap();

        assert_eq!(names(&index, &index.bounded_incoming(e, 0).unwrap()), Vec::<String>::new());
        assert_eq!(names(&index, &index.bounded_incoming(e, 1).unwrap()), ["B"]);
        assert_eq!(names(&index, &index.bounded_incoming(e, 2).unwrap()), ["A", "B", "C"]);
        assert_eq!(
            names(&index, &index.bounded_incoming(e, 3).unwrap()),
            ["A", "B", "C", "D"]
        );
        assert_eq!(
            names(&index, index.incoming_in_range(e).unwrap()),
            ["A", "B", "C", "D"]
        );
    }

    #[test]
    fn bounded_incoming_is_monotonic_in_depth() {
        let index = RoadNetworkIndex::new(&toy_network()).unwrap();
        for edge in index.iter_edges() {
            let mut prev: HashSet<EdgeId> = HashSet::new();
            for depth in 0..6 {
                let set = index
                    .bounded_incoming(edge.id(), depth)
                    .unwrap()
                    .into_iter()
                    .collect::<HashSet<_>>();
                assert!(prev.is_subset(&set));
                prev = set;
            }
        }
    }

    #[test]
    fn start_edge_only_included_through_a_cycle() {
        let desc = NetworkDescription::new()
            .edge("X", 50.0, 10.0, 1)
            .edge("Y", 50.0, 10.0, 1)
            .edge("Z", 50.0, 10.0, 1)
            .connect("X", 0, "Y", 0)
            .connect("Y", 0, "Z", 0)
            .connect("Z", 0, "X", 0);
        let index = RoadNetworkIndex::new(&desc).unwrap();
        let x = index.edge_by_name("X").unwrap();

        assert_eq!(names(&index, &index.bounded_incoming(x, 2).unwrap()), ["Y", "Z"]);
        assert_eq!(names(&index, &index.bounded_incoming(x, 3).unwrap()), ["X", "Y", "Z"]);
    }

    #[test]
    fn classifies_fringe_and_monitored_segments() {
        let index = RoadNetworkIndex::new(&toy_network()).unwrap();
        for name in ["C", "D", "F"] {
            assert!(index.is_fringe(index.edge_by_name(name).unwrap()).unwrap());
        }
        for name in ["A", "B", "E", "G", "H"] {
            assert!(!index.is_fringe(index.edge_by_name(name).unwrap()).unwrap());
        }

        assert_eq!(
            names(&index, index.single_outgoing_edges()),
            ["A", "E", "G", "H"]
        );
        let lanes = index
            .rerouting_lanes()
            .iter()
            .map(|l| index.lane(*l).unwrap().name().to_string())
            .collect::<Vec<_>>();
        assert_eq!(lanes, ["B_0", "B_1"]);
    }

    #[test]
    fn short_edges_are_not_monitored() {
        let desc = NetworkDescription::new()
            .edge("in", 100.0, 10.0, 1)
            .edge("short", 10.0, 10.0, 1)
            .edge("out", 100.0, 10.0, 1)
            .connect("in", 0, "short", 0)
            .connect("short", 0, "out", 0);
        let index = RoadNetworkIndex::new(&desc).unwrap();
        assert!(index.single_outgoing_edges().is_empty());
    }

    #[test]
    fn fringe_flag_can_be_overridden() {
        let mut desc = toy_network();
        desc.edges.iter_mut().find(|e| e.id == "E").unwrap().fringe = Some(true);
        let index = RoadNetworkIndex::new(&desc).unwrap();
        assert!(index.is_fringe(index.edge_by_name("E").unwrap()).unwrap());
        assert_eq!(names(&index, index.single_outgoing_edges()), ["A", "G", "H"]);
    }

    #[test]
    fn resolves_lanes_to_their_parent_edge() {
        let index = RoadNetworkIndex::new(&toy_network()).unwrap();
        let b = index.edge_by_name("B").unwrap();
        let segment = index.resolve("B_1").unwrap();
        assert_eq!(segment.parent_edge(), b);
        assert!(segment.lane().is_some());
        assert_eq!(index.segment_name(segment), "B_1");
        assert_eq!(index.resolve("B").unwrap(), Segment::Edge(b));
    }

    #[test]
    fn unknown_segments_are_reported() {
        let index = RoadNetworkIndex::new(&toy_network()).unwrap();
        assert!(matches!(
            index.resolve("nowhere"),
            Err(RerouteError::UnknownSegment(name)) if name == "nowhere"
        ));
        assert!(index.edge_by_name("B_0").is_err());
    }

    #[test]
    fn invalid_descriptions_fail_fast() {
        let duplicate = NetworkDescription::new()
            .edge("A", 10.0, 10.0, 1)
            .edge("A", 10.0, 10.0, 1);
        assert!(matches!(
            RoadNetworkIndex::new(&duplicate),
            Err(RerouteError::Network(_))
        ));

        let dangling = NetworkDescription::new()
            .edge("A", 10.0, 10.0, 1)
            .connect("A", 0, "B", 0);
        assert!(matches!(
            RoadNetworkIndex::new(&dangling),
            Err(RerouteError::Network(_))
        ));

        let bad_lane = NetworkDescription::new()
            .edge("A", 10.0, 10.0, 1)
            .edge("B", 10.0, 10.0, 1)
            .connect("A", 1, "B", 0);
        assert!(RoadNetworkIndex::new(&bad_lane).is_err());

        let no_speed = NetworkDescription::new().edge("A", 10.0, 0.0, 1);
        assert!(RoadNetworkIndex::new(&no_speed).is_err());
    }
}
