//! The k-shortest-paths route search.
//!
//! A pool of alternative routes is built by repeatedly penalising the vehicle's own estimate of
//! the travel time along the last route found and asking the simulator for a new shortest path.
//! One route from the pool is then picked at random, which spreads vehicles over several routes
//! instead of sending all of them down the same one.

use crate::retry::{bounded_retry, Attempt};
use crate::simulator::{Simulator, TravelTimeView};
use crate::travel_time::TravelTimeTable;
use crate::util::{closest_to_one, ratio};
use crate::{EdgeId, RerouteError, VehicleId};
use log::{trace, warn};
use rand::Rng;
use std::collections::HashMap;

/// The default factor by which travel times are penalised.
pub const PENALISATION: f64 = 2.0;
/// The default longest an alternative route may take, relative to the best route.
pub const KPATH_MAX_ALLOWED_TIME: f64 = 1.2;
/// The default number of consecutive rejected routes before the search gives up.
pub const KPATH_TIMEOUT: usize = 15;
/// The default size of the route pool.
pub const K_MAX: usize = 3;

/// A route along with its estimated travel time.
#[derive(Clone, Debug, PartialEq)]
pub struct RouteCandidate {
    /// The estimated travel time in s.
    pub time: f64,
    /// The edges of the route, starting with the vehicle's current edge.
    pub route: Vec<EdgeId>,
}

/// The result of a k-shortest-paths search.
#[derive(Clone, Debug)]
pub struct RouteChoice {
    /// The accepted routes, best first.
    pub pool: Vec<RouteCandidate>,
    /// The index of the route assigned to the vehicle.
    pub chosen: usize,
    /// How much longer the chosen route is expected to take than the best route, in s.
    /// Never negative.
    pub extra_time: f64,
}

impl RouteChoice {
    /// The route assigned to the vehicle.
    pub fn chosen_route(&self) -> &[EdgeId] {
        &self.pool[self.chosen].route
    }
}

/// Penalises a single vehicle's travel time estimates, and undoes it afterwards.
///
/// Only the vehicle's adapted travel times are touched; the network-wide estimates
/// and every other vehicle's estimates are left as they are.
#[derive(Clone, Debug)]
pub struct VehiclePenalty {
    vehicle: VehicleId,
    factor: f64,
    /// The vehicle's current estimate of each penalised edge.
    local: HashMap<EdgeId, f64>,
    /// Every edge penalised so far, in the order first touched.
    touched: Vec<EdgeId>,
}

impl VehiclePenalty {
    pub fn new(vehicle: VehicleId, factor: f64) -> Self {
        Self {
            vehicle,
            factor,
            local: HashMap::new(),
            touched: vec![],
        }
    }

    /// Multiplies the vehicle's estimate of every edge along the route by the penalty factor.
    /// An edge's first penalty is applied to its travel time in `table`.
    pub fn penalise(
        &mut self,
        sim: &mut impl Simulator,
        table: &TravelTimeTable,
        route: &[EdgeId],
    ) -> Result<(), RerouteError> {
        for &edge in route {
            let current = match self.local.get(&edge) {
                Some(time) => *time,
                None => {
                    self.touched.push(edge);
                    base_time(&*sim, table, edge)?
                }
            };
            let penalised = current * self.factor;
            self.local.insert(edge, penalised);
            sim.set_adapted_travel_time(self.vehicle, edge, penalised)?;
        }
        Ok(())
    }

    /// The vehicle's penalised estimate of an edge, if it has been penalised.
    pub fn local_time(&self, edge: EdgeId) -> Option<f64> {
        self.local.get(&edge).copied()
    }

    /// Resets the vehicle's estimate of every penalised edge back to its travel time in `table`.
    pub fn reset(
        self,
        sim: &mut impl Simulator,
        table: &TravelTimeTable,
    ) -> Result<(), RerouteError> {
        for edge in self.touched {
            let time = base_time(&*sim, table, edge)?;
            sim.set_adapted_travel_time(self.vehicle, edge, time)?;
        }
        Ok(())
    }
}

fn base_time(
    sim: &impl Simulator,
    table: &TravelTimeTable,
    edge: EdgeId,
) -> Result<f64, RerouteError> {
    match table.get(edge) {
        Some(time) => Ok(time),
        None => sim.global_travel_time(edge),
    }
}

/// The parameters of the k-shortest-paths search.
#[derive(Clone, Copy, Debug)]
pub struct KShortestPaths {
    /// The largest number of routes in the pool.
    pub k_max: usize,
    /// Alternatives must take no longer than the best route times this.
    pub max_allowed_time: f64,
    /// The number of consecutive unusable routes after which the search gives up.
    pub timeout: usize,
    /// The factor by which a route's travel times are penalised after it is found.
    pub penalisation: f64,
}

impl Default for KShortestPaths {
    fn default() -> Self {
        Self {
            k_max: K_MAX,
            max_allowed_time: KPATH_MAX_ALLOWED_TIME,
            timeout: KPATH_TIMEOUT,
            penalisation: PENALISATION,
        }
    }
}

impl KShortestPaths {
    /// Finds up to `k_max` routes for the vehicle from its current edge, assigns one of them
    /// at random and returns the pool it was chosen from.
    ///
    /// # Parameters
    /// * `sim` - The simulator the vehicle is in
    /// * `table` - The clamped travel times used to estimate route times
    /// * `vehicle` - The vehicle to reroute
    /// * `current_edge` - The edge the vehicle is on
    /// * `rng` - The source of randomness for the route choice
    pub fn find_routes(
        &self,
        sim: &mut impl Simulator,
        table: &TravelTimeTable,
        vehicle: VehicleId,
        current_edge: EdgeId,
        rng: &mut impl Rng,
    ) -> Result<RouteChoice, RerouteError> {
        let best_route = sim.shortest_path(vehicle, TravelTimeView::Global)?;
        let best_route = starting_at(&best_route, current_edge).ok_or_else(|| {
            RerouteError::Simulator(format!(
                "shortest path for {} does not pass through its current edge",
                sim.vehicle_name(vehicle).unwrap_or_default()
            ))
        })?;

        let mut pool = vec![RouteCandidate {
            time: table.route_time(&best_route),
            route: best_route.clone(),
        }];
        let mut penalty = VehiclePenalty::new(vehicle, self.penalisation);
        let mut current_route = best_route;

        bounded_retry(self.timeout, || -> Result<_, RerouteError> {
            if pool.len() >= self.k_max {
                return Ok(Attempt::Done(()));
            }
            penalty.penalise(sim, table, &current_route)?;
            let new_route = sim.shortest_path(vehicle, TravelTimeView::VehicleLocal)?;
            let Some(new_route) = starting_at(&new_route, current_edge) else {
                current_route = new_route;
                return Ok(Attempt::Reject);
            };
            current_route = new_route.clone();
            if pool.iter().any(|c| c.route == new_route) {
                trace!("k-paths: found a route already in the pool");
                return Ok(Attempt::Reject);
            }

            let mut best_time = pool[0].time;
            let mut new_time = table.route_time(&new_route);
            if new_time < best_time {
                let (raw_ratio, smoothed_ratio) =
                    self.estimate_ratios(&*sim, vehicle, &pool[0].route, &new_route)?;
                if raw_ratio < 1.0 && smoothed_ratio < 1.0 {
                    // The new route really is faster, so it becomes the best route
                    warn!(
                        "k-paths: found a route faster than the shortest path ({:.1}s < {:.1}s)",
                        new_time, best_time
                    );
                    pool.push(RouteCandidate {
                        time: new_time,
                        route: new_route,
                    });
                    pool.sort_by(|a, b| a.time.total_cmp(&b.time));
                    best_time = pool[0].time;
                    let bound = best_time * self.max_allowed_time;
                    pool.retain(|c| c.time <= bound);
                    return Ok(Attempt::Done(()));
                }
                let correction = closest_to_one(raw_ratio, smoothed_ratio);
                warn!(
                    "k-paths: correcting route time {:.1}s by a factor of {:.3}",
                    new_time, correction
                );
                new_time = best_time * correction;
            }

            if new_time <= best_time * self.max_allowed_time {
                trace!("k-paths: accepted a route taking {:.1}s", new_time);
                pool.push(RouteCandidate {
                    time: new_time,
                    route: new_route,
                });
                Ok(Attempt::Progress)
            } else {
                trace!("k-paths: {:.1}s exceeds the allowed route time", new_time);
                Ok(Attempt::Done(()))
            }
        })?;

        let (chosen, extra_time) = self.choose(&pool, rng)?;
        sim.set_route(vehicle, &pool[chosen].route)?;
        penalty.reset(sim, table)?;

        Ok(RouteChoice {
            pool,
            chosen,
            extra_time,
        })
    }

    /// Compares the new route with the best route using the simulator's live estimates
    /// and the vehicle's smoothed estimates, returning `(live, smoothed)` ratios of new to best.
    fn estimate_ratios(
        &self,
        sim: &impl Simulator,
        vehicle: VehicleId,
        best: &[EdgeId],
        new: &[EdgeId],
    ) -> Result<(f64, f64), RerouteError> {
        let live = |route: &[EdgeId]| -> Result<f64, RerouteError> {
            route.iter().map(|e| sim.global_travel_time(*e)).sum()
        };
        let smoothed = |route: &[EdgeId]| -> Result<f64, RerouteError> {
            route.iter().map(|e| sim.device_travel_time(vehicle, *e)).sum()
        };
        Ok((
            ratio(live(new)?, live(best)?),
            ratio(smoothed(new)?, smoothed(best)?),
        ))
    }

    /// Picks a route from the pool uniformly at random. A route estimated to be faster than
    /// the best route is redrawn; if the redraws run out its extra time is counted as zero.
    fn choose(
        &self,
        pool: &[RouteCandidate],
        rng: &mut impl Rng,
    ) -> Result<(usize, f64), RerouteError> {
        let best_time = pool[0].time;
        let mut chosen = rng.gen_range(0..pool.len());
        let mut extra_time = pool[chosen].time - best_time;
        if extra_time >= 0.0 {
            return Ok((chosen, extra_time));
        }

        let redraw = bounded_retry(self.timeout, || {
            chosen = rng.gen_range(0..pool.len());
            extra_time = pool[chosen].time - best_time;
            Ok::<_, RerouteError>(if extra_time >= 0.0 {
                Attempt::Done(extra_time)
            } else {
                Attempt::Reject
            })
        })?;
        match redraw {
            Some(extra_time) => Ok((chosen, extra_time)),
            None => {
                warn!("k-paths: clamping extra time of {:.1}s to zero", extra_time);
                Ok((chosen, 0.0))
            }
        }
    }
}

/// The part of the route starting at `edge`, if the route passes through it.
fn starting_at(route: &[EdgeId], edge: EdgeId) -> Option<Vec<EdgeId>> {
    let idx = route.iter().position(|e| *e == edge)?;
    Some(route[idx..].to_vec())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fixtures::toy_network;
    use crate::network::{NetworkDescription, RoadNetworkIndex, Segment};
    use crate::simulation::Simulation;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    struct Setup {
        network: Rc<RoadNetworkIndex>,
        sim: Simulation,
        table: TravelTimeTable,
        veh: VehicleId,
    }

    impl Setup {
        fn new(desc: NetworkDescription, jam: usize) -> Self {
            let mut desc = desc.trip("veh", 0, &["A", "B", "E", "F"]);
            for i in 0..jam {
                desc = desc.trip(&format!("jam{}", i), 0, &["E", "F"]);
            }
            let network = Rc::new(RoadNetworkIndex::new(&desc).unwrap());
            let mut sim = Simulation::with_trips(network.clone(), &desc.trips).unwrap();
            sim.advance_step().unwrap();
            let veh = sim.vehicle_by_name("veh").unwrap();
            for i in 0..jam {
                let id = sim.vehicle_by_name(&format!("jam{}", i)).unwrap();
                sim.set_vehicle_stopped(id, true).unwrap();
            }
            sim.advance_step().unwrap();
            let mut table = TravelTimeTable::new();
            table.refresh(&mut sim, &network, 5.0).unwrap();
            Self {
                network,
                sim,
                table,
                veh,
            }
        }

        fn edge(&self, name: &str) -> EdgeId {
            self.network.edge_by_name(name).unwrap()
        }
    }

    /// Wraps a simulation, replaying a fixed sequence of vehicle-local shortest paths and
    /// overriding the live and smoothed estimates of chosen edges.
    struct Scripted {
        inner: Simulation,
        local_paths: RefCell<VecDeque<Vec<EdgeId>>>,
        local_calls: Cell<usize>,
        live: HashMap<EdgeId, f64>,
        device: HashMap<EdgeId, f64>,
    }

    impl Scripted {
        fn new(inner: Simulation, local_paths: Vec<Vec<EdgeId>>) -> Self {
            Self {
                inner,
                local_paths: RefCell::new(local_paths.into()),
                local_calls: Cell::new(0),
                live: HashMap::new(),
                device: HashMap::new(),
            }
        }
    }

    impl Simulator for Scripted {
        fn advance_step(&mut self) -> Result<(), RerouteError> {
            self.inner.advance_step()
        }

        fn current_step(&self) -> usize {
            self.inner.current_step()
        }

        fn occupancy(&self, segment: Segment) -> Result<f64, RerouteError> {
            self.inner.occupancy(segment)
        }

        fn vehicles_on(&self, edge: EdgeId) -> Result<Vec<VehicleId>, RerouteError> {
            self.inner.vehicles_on(edge)
        }

        fn vehicle_ids(&self) -> Vec<VehicleId> {
            self.inner.vehicle_ids()
        }

        fn vehicle_name(&self, vehicle: VehicleId) -> Result<String, RerouteError> {
            self.inner.vehicle_name(vehicle)
        }

        fn route(&self, vehicle: VehicleId) -> Result<Vec<EdgeId>, RerouteError> {
            self.inner.route(vehicle)
        }

        fn set_route(
            &mut self,
            vehicle: VehicleId,
            route: &[EdgeId],
        ) -> Result<(), RerouteError> {
            self.inner.set_route(vehicle, route)
        }

        /// Once the script runs out, the global shortest path is returned again.
        fn shortest_path(
            &self,
            vehicle: VehicleId,
            view: TravelTimeView,
        ) -> Result<Vec<EdgeId>, RerouteError> {
            if view == TravelTimeView::Global {
                return self.inner.shortest_path(vehicle, view);
            }
            self.local_calls.set(self.local_calls.get() + 1);
            match self.local_paths.borrow_mut().pop_front() {
                Some(route) => Ok(route),
                None => self.inner.shortest_path(vehicle, TravelTimeView::Global),
            }
        }

        fn adapted_travel_time(
            &self,
            vehicle: VehicleId,
            edge: EdgeId,
        ) -> Result<Option<f64>, RerouteError> {
            self.inner.adapted_travel_time(vehicle, edge)
        }

        fn set_adapted_travel_time(
            &mut self,
            vehicle: VehicleId,
            edge: EdgeId,
            time: f64,
        ) -> Result<(), RerouteError> {
            self.inner.set_adapted_travel_time(vehicle, edge, time)
        }

        fn global_travel_time(&self, edge: EdgeId) -> Result<f64, RerouteError> {
            match self.live.get(&edge) {
                Some(time) => Ok(*time),
                None => self.inner.global_travel_time(edge),
            }
        }

        fn adapt_global_travel_time(
            &mut self,
            edge: EdgeId,
            time: f64,
        ) -> Result<(), RerouteError> {
            self.inner.adapt_global_travel_time(edge, time)
        }

        fn device_travel_time(
            &self,
            vehicle: VehicleId,
            edge: EdgeId,
        ) -> Result<f64, RerouteError> {
            match self.device.get(&edge) {
                Some(time) => Ok(*time),
                None => self.inner.device_travel_time(vehicle, edge),
            }
        }

        fn is_stopped(&self, vehicle: VehicleId) -> Result<bool, RerouteError> {
            self.inner.is_stopped(vehicle)
        }

        fn departed_vehicles(&self) -> &[VehicleId] {
            self.inner.departed_vehicles()
        }

        fn arrived_vehicles(&self) -> &[VehicleId] {
            self.inner.arrived_vehicles()
        }
    }

    /// A vehicle on `A` of a free-flowing toy network, where the table says `G` and `H` take
    /// `gh_time` each and the vehicle-local shortest paths follow `local_paths`.
    fn scripted(
        gh_time: f64,
        local_paths: &[&[&str]],
    ) -> (Scripted, TravelTimeTable, VehicleId) {
        let Setup {
            network,
            sim,
            mut table,
            veh,
        } = Setup::new(toy_network(), 0);
        let edge = |name: &str| network.edge_by_name(name).unwrap();
        table.set(edge("G"), gh_time);
        table.set(edge("H"), gh_time);
        let paths = local_paths
            .iter()
            .map(|route| route.iter().map(|n| edge(*n)).collect())
            .collect();
        let mut sim = Scripted::new(sim, paths);
        for name in ["A", "B", "E", "F", "G", "H"] {
            sim.live.insert(edge(name), 10.0);
            sim.device.insert(edge(name), 10.0);
        }
        (sim, table, veh)
    }

    fn edges(sim: &Scripted, names: &[&str]) -> Vec<EdgeId> {
        names.iter().map(|n| scripted_edge(sim, n)).collect()
    }

    fn scripted_edge(sim: &Scripted, name: &str) -> EdgeId {
        sim.inner.network().edge_by_name(name).unwrap()
    }

    #[test]
    fn penalties_compound_and_stay_local() {
        let mut s = Setup::new(toy_network(), 0);
        let e = s.edge("E");
        s.table.set(e, 100.0);
        let mut penalty = VehiclePenalty::new(s.veh, PENALISATION);

        penalty.penalise(&mut s.sim, &s.table, &[e]).unwrap();
        penalty.penalise(&mut s.sim, &s.table, &[e]).unwrap();
        assert_approx_eq!(penalty.local_time(e).unwrap(), 400.0);
        assert_eq!(s.sim.adapted_travel_time(s.veh, e).unwrap(), Some(400.0));
        assert_eq!(s.table.get(e), Some(100.0));
        assert_approx_eq!(s.sim.global_travel_time(e).unwrap(), 10.0);

        penalty.reset(&mut s.sim, &s.table).unwrap();
        assert_eq!(s.sim.adapted_travel_time(s.veh, e).unwrap(), Some(100.0));
    }

    #[test]
    fn congested_edge_is_avoided() {
        let mut s = Setup::new(toy_network(), 7);
        let [a, b, e, f, g, h] = ["A", "B", "E", "F", "G", "H"].map(|n| s.edge(n));
        assert_approx_eq!(s.table.get(e).unwrap(), 50.0);

        let mut rng = StdRng::seed_from_u64(0);
        let choice = KShortestPaths::default()
            .find_routes(&mut s.sim, &s.table, s.veh, a, &mut rng)
            .unwrap();

        // The route through E takes too long to join the pool
        assert_eq!(choice.pool.len(), 1);
        assert_eq!(choice.chosen_route(), [a, b, g, h, f]);
        assert_eq!(choice.extra_time, 0.0);
        assert_eq!(s.sim.route(s.veh).unwrap(), [a, b, g, h, f]);

        // Penalties are undone
        for edge in [a, b, g, h, f] {
            assert_eq!(s.sim.adapted_travel_time(s.veh, edge).unwrap(), s.table.get(edge));
        }
    }

    #[test]
    fn pool_respects_the_acceptance_bound() {
        // Two equally good ways around, so both join the pool
        let desc = toy_network()
            .edge("I", 100.0, 10.0, 1)
            .edge("J", 100.0, 10.0, 1)
            .connect("B", 1, "I", 0)
            .connect("I", 0, "J", 0)
            .connect("J", 0, "F", 0);
        let mut s = Setup::new(desc, 0);
        let a = s.edge("A");

        let params = KShortestPaths {
            max_allowed_time: 1.5,
            ..Default::default()
        };
        for seed in 0..8 {
            let mut rng = StdRng::seed_from_u64(seed);
            let choice = params
                .find_routes(&mut s.sim, &s.table, s.veh, a, &mut rng)
                .unwrap();

            let best = choice.pool[0].time;
            assert_eq!(choice.pool.len(), 3);
            for candidate in &choice.pool {
                assert_eq!(candidate.route[0], a);
                assert!(candidate.time <= best * 1.5);
                assert!(candidate.time >= best);
            }
            assert!(choice.extra_time >= 0.0);
            assert_eq!(s.sim.route(s.veh).unwrap(), choice.chosen_route());
        }
    }

    #[test]
    fn only_one_route_available() {
        let desc = NetworkDescription::new()
            .edge("A", 100.0, 10.0, 1)
            .edge("B", 100.0, 10.0, 1)
            .edge("E", 100.0, 10.0, 1)
            .edge("F", 100.0, 10.0, 1)
            .connect("A", 0, "B", 0)
            .connect("B", 0, "E", 0)
            .connect("E", 0, "F", 0);
        let mut s = Setup::new(desc, 0);
        let a = s.edge("A");
        let mut rng = StdRng::seed_from_u64(1);
        let choice = KShortestPaths::default()
            .find_routes(&mut s.sim, &s.table, s.veh, a, &mut rng)
            .unwrap();
        assert_eq!(choice.pool.len(), 1);
        assert_eq!(choice.extra_time, 0.0);
    }

    #[test]
    fn negative_extra_time_is_never_reported() {
        let pool = vec![
            RouteCandidate {
                time: 50.0,
                route: vec![],
            },
            RouteCandidate {
                time: 45.0,
                route: vec![],
            },
        ];
        let params = KShortestPaths::default();
        for seed in 0..16 {
            let mut rng = StdRng::seed_from_u64(seed);
            let (chosen, extra) = params.choose(&pool, &mut rng).unwrap();
            assert!(extra >= 0.0);
            if chosen == 0 {
                assert_eq!(extra, 0.0);
            }
        }

        let params = KShortestPaths {
            timeout: 1,
            ..Default::default()
        };
        let mut clamped = false;
        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let (chosen, extra) = params.choose(&pool, &mut rng).unwrap();
            assert!(extra >= 0.0);
            clamped |= chosen == 1 && extra == 0.0;
        }
        assert!(clamped);
    }

    #[test]
    fn routes_missing_the_current_edge_are_rejected() {
        let paths: &[&[&str]] = &[&["B", "G", "H", "F"], &["A", "B", "G", "H", "F"]];
        let (mut sim, table, veh) = scripted(10.0, paths);
        let a = scripted_edge(&sim, "A");
        let params = KShortestPaths {
            max_allowed_time: 1.5,
            timeout: 2,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(0);
        let choice = params
            .find_routes(&mut sim, &table, veh, a, &mut rng)
            .unwrap();

        // One rejection, one accepted route, then two duplicates of the best route
        assert_eq!(sim.local_calls.get(), 4);
        let routes = choice.pool.iter().map(|c| c.route.clone()).collect::<Vec<_>>();
        assert_eq!(
            routes,
            [edges(&sim, &["A", "B", "E", "F"]), edges(&sim, &["A", "B", "G", "H", "F"])]
        );
        assert_approx_eq!(choice.pool[1].time, 50.0);
    }

    #[test]
    fn faster_route_confirmed_by_both_estimates_becomes_best() {
        // The table says the way round is 32s against 40s, and so do both live estimates
        let (mut sim, table, veh) = scripted(1.0, &[&["A", "B", "G", "H", "F"]]);
        for name in ["G", "H"] {
            let edge = scripted_edge(&sim, name);
            sim.live.insert(edge, 1.0);
            sim.device.insert(edge, 1.0);
        }
        let a = scripted_edge(&sim, "A");
        let mut rng = StdRng::seed_from_u64(0);
        let choice = KShortestPaths::default()
            .find_routes(&mut sim, &table, veh, a, &mut rng)
            .unwrap();

        // The old best route is over the new bound of 38.4s, and the search stops
        assert_eq!(sim.local_calls.get(), 1);
        assert_eq!(choice.pool.len(), 1);
        assert_approx_eq!(choice.pool[0].time, 32.0);
        assert_eq!(choice.chosen_route(), edges(&sim, &["A", "B", "G", "H", "F"]));
        assert_eq!(choice.extra_time, 0.0);
        assert_eq!(sim.route(veh).unwrap(), choice.chosen_route());

        // A looser bound keeps the old best route, ranked second
        let (mut sim, table, veh) = scripted(1.0, &[&["A", "B", "G", "H", "F"]]);
        for name in ["G", "H"] {
            let edge = scripted_edge(&sim, name);
            sim.live.insert(edge, 1.0);
            sim.device.insert(edge, 1.0);
        }
        let a = scripted_edge(&sim, "A");
        let params = KShortestPaths {
            max_allowed_time: 1.5,
            ..Default::default()
        };
        let choice = params
            .find_routes(&mut sim, &table, veh, a, &mut rng)
            .unwrap();
        assert_eq!(sim.local_calls.get(), 1);
        let times = choice.pool.iter().map(|c| c.time).collect::<Vec<_>>();
        assert_eq!(times.len(), 2);
        assert_approx_eq!(times[0], 32.0);
        assert_approx_eq!(times[1], 40.0);
        assert_eq!(choice.pool[1].route, edges(&sim, &["A", "B", "E", "F"]));
    }

    #[test]
    fn disputed_faster_route_is_rescaled() {
        // The table says 38s against 40s, the live estimates 60s and the smoothed ones 42s
        let (mut sim, table, veh) = scripted(4.0, &[&["A", "B", "G", "H", "F"]]);
        for name in ["G", "H"] {
            let edge = scripted_edge(&sim, name);
            sim.live.insert(edge, 15.0);
            sim.device.insert(edge, 6.0);
        }
        let a = scripted_edge(&sim, "A");
        let mut rng = StdRng::seed_from_u64(0);
        let choice = KShortestPaths::default()
            .find_routes(&mut sim, &table, veh, a, &mut rng)
            .unwrap();

        // The smoothed ratio of 1.05 is closer to 1, so the route is taken to last 42s
        assert_eq!(choice.pool.len(), 2);
        assert_approx_eq!(choice.pool[0].time, 40.0);
        assert_approx_eq!(choice.pool[1].time, 42.0);
        assert_eq!(choice.pool[1].route, edges(&sim, &["A", "B", "G", "H", "F"]));
        let expected_extra = if choice.chosen == 0 { 0.0 } else { 2.0 };
        assert_approx_eq!(choice.extra_time, expected_extra);
        assert_eq!(sim.route(veh).unwrap(), choice.chosen_route());

        // Rescaled past the bound, the route is dropped and the search ends
        let (mut sim, table, veh) = scripted(4.0, &[&["A", "B", "G", "H", "F"]]);
        for name in ["G", "H"] {
            let edge = scripted_edge(&sim, name);
            sim.live.insert(edge, 15.0);
            sim.device.insert(edge, 16.0);
        }
        let a = scripted_edge(&sim, "A");
        let choice = KShortestPaths::default()
            .find_routes(&mut sim, &table, veh, a, &mut rng)
            .unwrap();
        assert_eq!(sim.local_calls.get(), 1);
        assert_eq!(choice.pool.len(), 1);
        assert_eq!(choice.chosen_route(), edges(&sim, &["A", "B", "E", "F"]));
    }
}
