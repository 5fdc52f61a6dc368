pub use config::RerouteConfig;
pub use congestion::CongestionMonitor;
pub use error::RerouteError;
pub use fairness::{FairnessIndex, FairnessRanking, FairnessScorer};
pub use kpaths::{KShortestPaths, RouteCandidate, RouteChoice};
pub use network::{NetworkDescription, RoadNetworkIndex, Segment};
pub use rerouter::{Algorithm, EndReason, Rerouter, StepOutcome};
pub use simulation::Simulation;
pub use simulator::{Simulator, TravelTimeView};
use slotmap::new_key_type;
pub use slotmap::{Key, KeyData};
pub use state::{ReroutedThisPeriod, SimulationState, VehicleFairnessRecord};
pub use storage::{JsonStore, MemoryStore, MetricsStore, PeriodMetrics, Row, Table, VehicleMetrics};
pub use vehicle::Vehicle;

pub mod config;
pub mod congestion;
mod error;
pub mod fairness;
#[cfg(test)]
mod fixtures;
pub mod kpaths;
pub mod network;
pub mod rerouter;
pub mod retry;
pub mod selection;
mod simulation;
pub mod simulator;
pub mod state;
pub mod storage;
pub mod travel_time;
mod util;
mod vehicle;

new_key_type! {
    /// Unique ID of a road network edge.
    pub struct EdgeId;
    /// Unique ID of a lane of an edge.
    pub struct LaneId;
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
}
