//! Quality of experience (QOE) scoring, which measures how fairly each vehicle has been treated.
//!
//! A vehicle's raw burden combines how often it has been rerouted and how much extra travel
//! time that has cost it, each relative to the worst-off vehicle being compared, and is then
//! divided by its relative exposure to the network. Raw values are normalised onto `[0, 10]`
//! with the scale inverted, so the vehicle carrying the most burden per unit of exposure gets
//! a QOE of 0 and the one carrying the least gets 10.

use crate::state::VehicleFairnessRecord;
use crate::util::{approx_eq, is_near_zero, std_dev};
use crate::VehicleId;
use itertools::Itertools;
use std::collections::HashMap;

/// The default weight given to the reroute count relative to the extra travel time.
pub const FAIRNESS_WEIGHTING: f64 = 0.6;

/// The default fraction of the highest QOE a vehicle needs in order to be selected.
pub const PERCENTILE: f64 = 0.6;

/// The highest normalised QOE.
const MAX_QOE: f64 = 10.0;

/// The outcome of scoring a set of vehicles.
#[derive(Clone, Debug, Default)]
pub struct FairnessRanking {
    /// The vehicles selected for rerouting, in the order they were given.
    pub selected: Vec<VehicleId>,
    /// The normalised QOE of every vehicle, in `[0, 10]`.
    pub qoe: HashMap<VehicleId, f64>,
    /// The highest normalised QOE, divided by 10.
    pub max_norm_qoe: f64,
    /// The lowest normalised QOE, divided by 10.
    pub min_norm_qoe: f64,
}

/// A measure of how fairly a group of vehicles is treated as a whole.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FairnessIndex {
    /// 1 when every vehicle has the same QOE, and lower the more spread out they are.
    pub index: f64,
    /// The standard deviation of the non-zero normalised QOE values.
    pub std_dev: f64,
}

/// Scores vehicles by the burden rerouting has placed on them.
#[derive(Clone, Copy, Debug)]
pub struct FairnessScorer {
    /// The weight of the reroute count. The extra travel time gets `1 - weighting`.
    weighting: f64,
    /// The fraction of the highest QOE needed to be selected.
    percentile: f64,
}

impl Default for FairnessScorer {
    fn default() -> Self {
        Self::new(FAIRNESS_WEIGHTING, PERCENTILE)
    }
}

impl FairnessScorer {
    pub fn new(weighting: f64, percentile: f64) -> Self {
        Self {
            weighting,
            percentile,
        }
    }

    /// Computes each vehicle's normalised QOE and selects the vehicles whose QOE
    /// is at least `percentile` times the highest. If every vehicle has the same QOE,
    /// they are all selected.
    pub fn rank(&self, vehicles: &[(VehicleId, VehicleFairnessRecord)]) -> FairnessRanking {
        if vehicles.is_empty() {
            return FairnessRanking::default();
        }

        let largest = |f: fn(&VehicleFairnessRecord) -> f64| {
            vehicles.iter().map(|(_, r)| f(r)).fold(0.0, f64::max)
        };
        let largest_vra = largest(|r| r.rerouted_count as f64);
        let largest_cet = largest(|r| r.cumulative_extra_time);
        let most_time = largest(|r| r.time_in_network);

        let raw = vehicles
            .iter()
            .map(|(id, r)| {
                let vra = fraction_of(r.rerouted_count as f64, largest_vra);
                let cet = fraction_of(r.cumulative_extra_time, largest_cet);
                let exposure = fraction_of(r.time_in_network, most_time);
                let burden = vra * self.weighting + cet * (1.0 - self.weighting);
                let value = if exposure == 0.0 { 0.0 } else { burden / exposure };
                (*id, value)
            })
            .collect::<Vec<_>>();

        let Some((min_raw, max_raw)) = extremes(raw.iter().map(|(_, v)| *v)) else {
            return FairnessRanking::default();
        };
        let all_equal = approx_eq(max_raw, min_raw);

        let qoe = raw
            .iter()
            .map(|(id, value)| {
                let norm = if all_equal {
                    MAX_QOE
                } else {
                    MAX_QOE - (value - min_raw) / (max_raw - min_raw) * MAX_QOE
                };
                (*id, norm)
            })
            .collect::<Vec<_>>();

        let (min_qoe, max_qoe) = extremes(qoe.iter().map(|(_, q)| *q)).unwrap_or((0.0, 0.0));
        let cutoff = max_qoe * self.percentile;
        let selected = qoe
            .iter()
            .filter(|(_, q)| all_equal || *q >= cutoff)
            .map(|(id, _)| *id)
            .collect();

        FairnessRanking {
            selected,
            qoe: qoe.into_iter().collect(),
            max_norm_qoe: max_qoe / MAX_QOE,
            min_norm_qoe: min_qoe / MAX_QOE,
        }
    }

    /// Computes the fairness index of a group of vehicles.
    pub fn fairness_index(&self, vehicles: &[(VehicleId, VehicleFairnessRecord)]) -> FairnessIndex {
        fairness_index(&self.rank(vehicles))
    }
}

/// Computes the fairness index from a ranking: `1 - 2σ / (max - min)`, where σ is the
/// standard deviation of the non-zero QOE values and the extremes are on the `[0, 1]` scale.
/// A ranking with no spread, or no vehicles, is perfectly fair.
pub fn fairness_index(ranking: &FairnessRanking) -> FairnessIndex {
    let values = ranking
        .qoe
        .values()
        .copied()
        .filter(|q| !is_near_zero(*q))
        .collect::<Vec<_>>();
    let std_dev = std_dev(&values);
    let range = ranking.max_norm_qoe - ranking.min_norm_qoe;
    let index = if ranking.qoe.is_empty() || is_near_zero(range) {
        1.0
    } else {
        1.0 - 2.0 * std_dev / range
    };
    FairnessIndex { index, std_dev }
}

/// The smallest and largest values, if there are any.
fn extremes(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.minmax_by(|a, b| a.total_cmp(b)).into_option()
}

/// `value` as a fraction of `largest`, or zero if the largest value is zero.
fn fraction_of(value: f64, largest: f64) -> f64 {
    if largest == 0.0 {
        0.0
    } else {
        value / largest
    }
}
