use crate::network::{RoadNetworkIndex, Segment};
use crate::simulator::Simulator;
use crate::util::mean;
use crate::RerouteError;
use log::debug;

/// The default occupancy at or above which a segment is considered congested.
pub const CONGESTION_THRESHOLD: f64 = 0.5;

/// Classifies road segments as congested once per rerouting period.
#[derive(Clone, Debug)]
pub struct CongestionMonitor {
    threshold: f64,
    /// The occupancy of every segment scanned this period.
    levels: Vec<(Segment, f64)>,
}

impl Default for CongestionMonitor {
    fn default() -> Self {
        Self::new(CONGESTION_THRESHOLD)
    }
}

impl CongestionMonitor {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            levels: vec![],
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// The fraction of the segment occupied by vehicles.
    pub fn occupancy(&self, sim: &impl Simulator, segment: Segment) -> Result<f64, RerouteError> {
        sim.occupancy(segment)
    }

    pub fn is_congested(
        &self,
        sim: &impl Simulator,
        segment: Segment,
    ) -> Result<bool, RerouteError> {
        Ok(self.occupancy(sim, segment)? >= self.threshold)
    }

    /// Scans the monitored segments of the network and returns the congested ones:
    /// first the lanes of edges with several outgoing edges, then the edges with a single
    /// outgoing edge. The occupancy of every scanned segment is recorded.
    pub fn scan(
        &mut self,
        sim: &impl Simulator,
        network: &RoadNetworkIndex,
    ) -> Result<Vec<Segment>, RerouteError> {
        let lanes = network
            .rerouting_lanes()
            .iter()
            .map(|lane| network.lane_segment(*lane))
            .collect::<Result<Vec<_>, _>>()?;
        let edges = network.single_outgoing_edges().iter().map(|e| Segment::Edge(*e));

        let mut congested = vec![];
        for segment in lanes.into_iter().chain(edges) {
            let occupancy = self.occupancy(sim, segment)?;
            self.levels.push((segment, occupancy));
            if occupancy >= self.threshold {
                debug!(
                    "{} is congested (occupancy {:.3})",
                    network.segment_name(segment),
                    occupancy
                );
                congested.push(segment);
            }
        }
        Ok(congested)
    }

    /// The occupancy of each segment scanned since the last reset.
    pub fn levels(&self) -> &[(Segment, f64)] {
        &self.levels
    }

    /// The mean occupancy of the segments scanned since the last reset, or zero if none were.
    pub fn mean_congestion(&self) -> f64 {
        let levels = self.levels.iter().map(|(_, level)| *level).collect::<Vec<_>>();
        mean(&levels)
    }

    /// Forgets the recorded occupancies, ready for a new period.
    pub fn reset(&mut self) {
        self.levels.clear();
    }
}
