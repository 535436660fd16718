//! Model-predictive controller.
//!
//! Deterministic function of the current state and a fixed horizon: a grid
//! of steering candidates is rolled forward `steps_ahead` ticks through a
//! kinematic model along the track, and the candidate with the lowest
//! cross-track-plus-progress cost wins. `steps_ahead` is the only
//! lookahead/compute knob; there is no mutable state across calls.

use crate::core::state::VehicleState;
use crate::core::track::Track;
use crate::core::transition::{Action, Control};

use super::{require_well_formed, ControlError, Controller};

/// Steering candidates evaluated each step.
const STEER_CANDIDATES: [f32; 9] = [-1.0, -0.6, -0.3, -0.1, 0.0, 0.1, 0.3, 0.6, 1.0];
/// Yaw rate at full steer in the rollout model, rad per tick-second.
const TURN_RATE: f32 = 1.2;
/// Throttle proportional gain per unit of speed error.
const THROTTLE_GAIN: f32 = 0.05;
/// Weight of remaining track distance in the candidate cost.
const PROGRESS_WEIGHT: f32 = 0.5;

/// Deterministic lookahead controller.
pub struct MpcController {
    track: Track,
    target_speed: f32,
    steps_ahead: usize,
    dt: f32,
}

impl MpcController {
    /// Controller following `track` at `target_speed`, rolling candidates
    /// forward `steps_ahead` ticks.
    pub fn new(track: Track, target_speed: f32, steps_ahead: usize) -> Self {
        Self {
            track,
            target_speed,
            steps_ahead: steps_ahead.max(1),
            dt: 0.1,
        }
    }

    /// Cost of one steering candidate over the horizon.
    fn candidate_cost(&self, state: &VehicleState, steer: f32) -> f32 {
        let mut location = state.location;
        let mut yaw = state.yaw;
        // Rollout speed in m/s from the reported km/h.
        let speed = (state.velocity / 3.6).max(1.0);

        let mut cost = 0.0;
        for _ in 0..self.steps_ahead {
            yaw += steer * TURN_RATE * self.dt;
            let (sin, cos) = yaw.sin_cos();
            location[0] += cos * speed * self.dt;
            location[1] += sin * speed * self.dt;

            let cross = self.track.cross_track_distance(location);
            cost += cross * cross;
        }
        cost + self.track.remaining(location) * PROGRESS_WEIGHT
    }
}

impl Controller for MpcController {
    fn decide(&mut self, state: &VehicleState) -> Result<Action, ControlError> {
        require_well_formed(state)?;

        let mut best_steer = STEER_CANDIDATES[0];
        let mut best_cost = f32::INFINITY;
        for &steer in &STEER_CANDIDATES {
            let cost = self.candidate_cost(state, steer);
            // Strict less-than keeps the tie-break deterministic.
            if cost < best_cost {
                best_cost = cost;
                best_steer = steer;
            }
        }

        let gas_brake = ((self.target_speed - state.velocity) * THROTTLE_GAIN).clamp(-1.0, 1.0);

        Ok(Action::plain(
            Control {
                steer: best_steer,
                gas_brake,
            }
            .clamped(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn state_at(location: [f32; 3], yaw: f32, velocity: f32) -> VehicleState {
        VehicleState {
            step: 0,
            velocity,
            location,
            yaw,
            distance_to_target: 100.0,
            collisions: 0,
            target_offset: [8.0, 0.0, 0.0],
            sensors: HashMap::new(),
        }
    }

    fn straight_track() -> Track {
        Track::new(vec![[0.0, 0.0, 0.0], [200.0, 0.0, 0.0]])
    }

    #[test]
    fn test_deterministic() {
        let mut a = MpcController::new(straight_track(), 50.0, 10);
        let mut b = MpcController::new(straight_track(), 50.0, 10);
        let s = state_at([10.0, 2.0, 0.0], 0.1, 30.0);
        assert_eq!(a.decide(&s).unwrap(), b.decide(&s).unwrap());
    }

    #[test]
    fn test_steers_back_toward_track() {
        let mut mpc = MpcController::new(straight_track(), 50.0, 10);
        // Offset to the left of the track, heading straight: expect a
        // right-hand (negative) steering correction.
        let s = state_at([10.0, 5.0, 0.0], 0.0, 30.0);
        let action = mpc.decide(&s).unwrap();
        assert!(action.control.steer < 0.0);
        assert!(action.index.is_none());
        assert!(action.state_value.is_none());
    }

    #[test]
    fn test_throttle_tracks_target_speed() {
        let mut mpc = MpcController::new(straight_track(), 50.0, 5);
        let slow = mpc.decide(&state_at([0.0, 0.0, 0.0], 0.0, 10.0)).unwrap();
        assert!(slow.control.gas_brake > 0.0);

        let fast = mpc.decide(&state_at([0.0, 0.0, 0.0], 0.0, 90.0)).unwrap();
        assert!(fast.control.gas_brake < 0.0);
    }

    #[test]
    fn test_rejects_invalid_state() {
        let mut mpc = MpcController::new(straight_track(), 50.0, 5);
        let mut s = state_at([0.0, 0.0, 0.0], 0.0, 10.0);
        s.velocity = f32::NAN;
        assert_eq!(
            mpc.decide(&s),
            Err(ControlError::InvalidState { field: "velocity" })
        );
    }
}
