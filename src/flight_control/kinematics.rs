use super::{target_spec::TargetSpec, telemetry_state::TelemetryState};
use crate::util::{GeoPoint, SimConfig, geo};

/// Arrival conditions raised by a single kinematics step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArrivalEvents {
    pub altitude_arrived: bool,
    pub position_arrived: bool,
}

impl ArrivalEvents {
    #[cfg(test)]
    pub fn any(&self) -> bool { self.altitude_arrived || self.position_arrived }
}

/// Advances a [`TelemetryState`] by one fixed tick towards a [`TargetSpec`].
///
/// The updater is stateless apart from its constants. It never touches `mode` or `armed`;
/// arrivals are only reported so the mode state machine can act on them.
#[derive(Debug, Clone)]
pub struct KinematicsUpdater {
    dt: f64,
    vertical_rate: f64,
    horizontal_speed: f64,
    yaw_rate: f64,
    heading_tolerance: f64,
    altitude_tolerance: f64,
    arrival_radius: f64,
    wind_offset: f64,
}

impl KinematicsUpdater {
    /// Bank angle shown while yawing at the full yaw rate.
    const MAX_COSMETIC_ROLL: f64 = 15.0;
    /// Nose-down pitch shown while translating at cruise speed.
    const MAX_COSMETIC_PITCH: f64 = 10.0;

    pub fn new(config: &SimConfig) -> Self {
        Self {
            dt: config.dt(),
            vertical_rate: config.vertical_rate,
            horizontal_speed: config.horizontal_speed,
            yaw_rate: config.yaw_rate,
            heading_tolerance: config.heading_tolerance,
            altitude_tolerance: config.altitude_tolerance,
            arrival_radius: config.arrival_radius,
            wind_offset: config.wind_offset,
        }
    }

    /// Computes the state one tick ahead.
    ///
    /// Both axes are advanced in the same tick and independently of each other.
    ///
    /// # Arguments
    /// * `state` – The current vehicle state.
    /// * `target` – The active objective, `None` if no maneuver is running.
    ///
    /// # Returns
    /// * `(TelemetryState, ArrivalEvents)` – The successor state and the arrivals detected on the way.
    pub fn step(
        &self,
        state: &TelemetryState,
        target: Option<&TargetSpec>,
    ) -> (TelemetryState, ArrivalEvents) {
        let mut next = *state;
        let mut events = ArrivalEvents::default();

        match target.and_then(|t| t.altitude) {
            Some(alt) => events.altitude_arrived = self.step_vertical(&mut next, alt),
            None => next.vertical_speed = 0.0,
        }
        match target.and_then(|t| t.position) {
            Some(pos) => events.position_arrived = self.step_horizontal(&mut next, pos),
            None => {
                next.ground_speed = 0.0;
                next.airspeed = 0.0;
                next.roll = 0.0;
                next.pitch = 0.0;
            }
        }
        (next, events)
    }

    fn step_vertical(&self, next: &mut TelemetryState, target_alt: f64) -> bool {
        let diff = target_alt - next.altitude;
        if diff.abs() < self.altitude_tolerance {
            next.altitude = target_alt;
            next.vertical_speed = 0.0;
            return true;
        }
        let dir = diff.signum();
        // never overshoot, otherwise a diff of exactly the tolerance oscillates forever
        let climb = (self.vertical_rate * self.dt).min(diff.abs());
        next.altitude = (next.altitude + dir * climb).max(0.0);
        next.vertical_speed = dir * self.vertical_rate;
        false
    }

    fn step_horizontal(&self, next: &mut TelemetryState, target_pos: GeoPoint) -> bool {
        if next.position.distance_to(target_pos) < self.arrival_radius {
            next.position = target_pos;
            next.ground_speed = 0.0;
            next.airspeed = 0.0;
            next.roll = 0.0;
            next.pitch = 0.0;
            return true;
        }

        let target_bearing = next.position.bearing_to(target_pos);
        let max_yaw = self.yaw_rate * self.dt;
        let yaw = geo::wrap_180(target_bearing - next.heading).clamp(-max_yaw, max_yaw);
        next.heading = geo::wrap_360(next.heading + yaw);
        next.roll = if max_yaw > 0.0 { Self::MAX_COSMETIC_ROLL * yaw / max_yaw } else { 0.0 };

        let heading_error = geo::wrap_180(target_bearing - next.heading).abs();
        if heading_error < self.heading_tolerance {
            let hop = self.horizontal_speed * self.dt;
            next.position = geo::offset(next.position, next.heading, hop);
            next.ground_speed = self.horizontal_speed;
            next.airspeed = self.horizontal_speed + self.wind_offset;
            next.pitch = -Self::MAX_COSMETIC_PITCH;
        } else {
            // yawing in place, air still flows over the airframe
            next.ground_speed = 0.0;
            next.airspeed = self.wind_offset;
            next.pitch = 0.0;
        }
        false
    }
}
