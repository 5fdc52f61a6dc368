use crate::{EdgeId, VehicleId};

pub(crate) mod pathfinding;

/// The length of every simulated vehicle in m.
pub const VEHICLE_LENGTH: f64 = 5.0;

/// The minimum gap to maintain between vehicles in m.
const MIN_GAP: f64 = 2.5;

/// The slowest a moving vehicle will drive, as a fraction of its desired speed.
const MIN_SPEED_FRACTION: f64 = 0.05;

/// A simulated vehicle.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The vehicle's ID
    pub(crate) id: VehicleId,
    /// The vehicle's name.
    name: String,
    /// The vehicle's route, including the edge it's currently on.
    route: Vec<EdgeId>,
    /// The longitudinal position along the current edge, in m.
    pos: f64,
    /// The velocity in m/s.
    vel: f64,
    /// The desired velocity adjustment factor.
    vel_adjust: f64,
    /// Whether the vehicle is stopped. Stopped vehicles do not move.
    stopped: bool,
}

impl Vehicle {
    /// Creates a new vehicle at the start of the first edge of its route.
    pub(crate) fn new(id: VehicleId, name: String, route: Vec<EdgeId>) -> Self {
        Self {
            id,
            name,
            route,
            pos: 0.0,
            vel: 0.0,
            vel_adjust: 1.0,
            stopped: false,
        }
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ID of the edge the vehicle is currently travelling on.
    pub fn edge_id(&self) -> EdgeId {
        self.route[0]
    }

    /// The vehicle's route, starting with its current edge.
    pub fn route(&self) -> &[EdgeId] {
        &self.route
    }

    /// The last edge of the vehicle's route.
    pub fn destination(&self) -> EdgeId {
        self.route[self.route.len() - 1]
    }

    /// The edge following the current one, if there is one.
    pub fn next_edge(&self) -> Option<EdgeId> {
        self.route.get(1).copied()
    }

    /// The longitudinal position along the current edge in m.
    pub fn pos(&self) -> f64 {
        self.pos
    }

    /// The vehicle's velocity in m/s.
    pub fn vel(&self) -> f64 {
        self.vel
    }

    /// Whether the vehicle is in a stopped state.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// The length of lane the vehicle takes up, in m.
    pub fn footprint(&self) -> f64 {
        VEHICLE_LENGTH + MIN_GAP
    }

    /// Set the desired velocity adjustment factor for the vehicle, a scalar which is
    /// multiplied with the speed limit to obtain the vehicle's desired speed.
    pub fn set_velocity_adjust(&mut self, factor: f64) {
        self.vel_adjust = factor;
    }

    pub(crate) fn set_stopped(&mut self, stopped: bool) {
        self.stopped = stopped;
        if stopped {
            self.vel = 0.0;
        }
    }

    /// Replaces the vehicle's route. The caller ensures it starts at the current edge.
    pub(crate) fn set_route(&mut self, route: &[EdgeId]) {
        self.route.clear();
        self.route.extend_from_slice(route);
    }

    /// Drives the vehicle along its edge for `dt` seconds.
    /// The vehicle slows down as the lane fills up, and waits at the end of the edge.
    ///
    /// # Parameters
    /// * `dt` - The time step in seconds
    /// * `speed_limit` - The speed limit of the edge in m/s
    /// * `occupancy` - The occupancy of the vehicle's lane
    /// * `length` - The length of the edge in m
    pub(crate) fn drive(&mut self, dt: f64, speed_limit: f64, occupancy: f64, length: f64) {
        if self.stopped {
            self.vel = 0.0;
            return;
        }
        let factor = f64::max(1.0 - occupancy, MIN_SPEED_FRACTION);
        let desired = speed_limit * self.vel_adjust * factor;
        let pos = f64::min(self.pos + desired * dt, length);
        self.vel = (pos - self.pos) / dt;
        self.pos = pos;
    }

    /// Whether the vehicle has reached the end of its current edge.
    pub(crate) fn at_end(&self, length: f64) -> bool {
        self.pos >= length
    }

    /// Moves the vehicle onto the next edge of its route.
    pub(crate) fn advance(&mut self) {
        self.route.remove(0);
        self.pos = 0.0;
    }
}
