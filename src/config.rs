//! Run configuration, read from TOML.

use crate::congestion::{CongestionMonitor, CONGESTION_THRESHOLD};
use crate::fairness::{FairnessScorer, FAIRNESS_WEIGHTING, PERCENTILE};
use crate::kpaths::{KShortestPaths, KPATH_MAX_ALLOWED_TIME, KPATH_TIMEOUT, K_MAX, PENALISATION};
use crate::network::{MAX_EDGE_RECURSIONS_RANGE, MIN_EDGE_LENGTH};
use crate::rerouter::{Algorithm, END_TIME, REROUTING_PERIOD};
use crate::travel_time::FREE_FLOW_TRAVEL_TIME_MAXIMUM;
use crate::RerouteError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The parameters of a rerouting run. Every field is optional in the TOML file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RerouteConfig {
    /// The rerouting algorithm.
    pub algorithm: Algorithm,
    /// The occupancy at or above which a segment is congested.
    pub congestion_threshold: f64,
    /// The number of steps between rerouting periods.
    pub rerouting_period: usize,
    /// The largest number of routes in a k-paths pool.
    pub k_max: usize,
    /// Alternative routes may take at most this many times as long as the best route.
    pub kpath_max_allowed_time: f64,
    /// The number of consecutive unusable routes after which a k-paths search gives up.
    pub kpath_timeout: usize,
    /// The factor applied to a route's travel times once it is in the pool.
    pub penalisation: f64,
    /// The fraction of the highest QOE a vehicle needs in order to be rerouted.
    pub percentile: f64,
    /// The weight of the reroute count in a vehicle's QOE.
    pub fairness_weighting: f64,
    /// How many edges upstream of a congested edge vehicles are looked for.
    pub max_edge_recursions_range: usize,
    /// Travel times are capped at this many times the free flow travel time.
    pub travel_time_bound_factor: f64,
    /// Edges shorter than this, in m, aren't monitored for congestion.
    pub min_edge_length: f64,
    /// The step at which the run ends.
    pub end_time: usize,
    /// The seed for route choices.
    pub seed: u64,
    /// Prefixed to the step number to form the key of each period's metrics.
    pub simulation_reference: String,
}

impl Default for RerouteConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::KPathsFairness,
            congestion_threshold: CONGESTION_THRESHOLD,
            rerouting_period: REROUTING_PERIOD,
            k_max: K_MAX,
            kpath_max_allowed_time: KPATH_MAX_ALLOWED_TIME,
            kpath_timeout: KPATH_TIMEOUT,
            penalisation: PENALISATION,
            percentile: PERCENTILE,
            fairness_weighting: FAIRNESS_WEIGHTING,
            max_edge_recursions_range: MAX_EDGE_RECURSIONS_RANGE,
            travel_time_bound_factor: FREE_FLOW_TRAVEL_TIME_MAXIMUM,
            min_edge_length: MIN_EDGE_LENGTH,
            end_time: END_TIME,
            seed: 0,
            simulation_reference: String::new(),
        }
    }
}

impl RerouteConfig {
    /// Parses and validates a configuration.
    pub fn from_toml(toml: &str) -> Result<Self, RerouteError> {
        let config: Self = toml::from_str(toml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self, RerouteError> {
        let content = std::fs::read_to_string(path).map_err(|e| RerouteError::io(path, e))?;
        Self::from_toml(&content)
    }

    /// Checks that every parameter is in range.
    pub fn validate(&self) -> Result<(), RerouteError> {
        let unit = |name: &str, value: f64| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(RerouteError::Config(format!("{} must be in [0, 1], got {}", name, value)))
            }
        };
        unit("congestion_threshold", self.congestion_threshold)?;
        unit("percentile", self.percentile)?;
        unit("fairness_weighting", self.fairness_weighting)?;

        if self.rerouting_period == 0 {
            return Err(RerouteError::Config("rerouting_period must be positive".into()));
        }
        if self.k_max == 0 {
            return Err(RerouteError::Config("k_max must be positive".into()));
        }
        if !(self.kpath_max_allowed_time >= 1.0) {
            return Err(RerouteError::Config(format!(
                "kpath_max_allowed_time must be at least 1, got {}",
                self.kpath_max_allowed_time
            )));
        }
        if !(self.penalisation > 1.0) {
            return Err(RerouteError::Config(format!(
                "penalisation must be greater than 1, got {}",
                self.penalisation
            )));
        }
        if !(self.travel_time_bound_factor > 0.0) {
            return Err(RerouteError::Config(format!(
                "travel_time_bound_factor must be positive, got {}",
                self.travel_time_bound_factor
            )));
        }
        Ok(())
    }

    pub fn monitor(&self) -> CongestionMonitor {
        CongestionMonitor::new(self.congestion_threshold)
    }

    pub fn scorer(&self) -> FairnessScorer {
        FairnessScorer::new(self.fairness_weighting, self.percentile)
    }

    pub fn kpaths(&self) -> KShortestPaths {
        KShortestPaths {
            k_max: self.k_max,
            max_allowed_time: self.kpath_max_allowed_time,
            timeout: self.kpath_timeout,
            penalisation: self.penalisation,
        }
    }
}
