//! Per-tick state snapshots captured by the episode runner.

use std::collections::HashMap;

/// Size of the feature vector fed to the learned controller:
/// `[velocity, x, y, z, distance_to_target, tx, ty, tz]`.
pub const OBS_SIZE: usize = 8;

/// Snapshot of the vehicle at one simulation step.
///
/// Immutable once captured. Raw sensor payloads are opaque to the core;
/// they are persisted and forwarded but never interpreted here.
#[derive(Debug, Clone)]
pub struct VehicleState {
    /// Step index within the episode.
    pub step: usize,
    /// Scalar speed.
    pub velocity: f32,
    /// World location.
    pub location: [f32; 3],
    /// Heading in the XY plane, radians.
    pub yaw: f32,
    /// Remaining arc length to the final waypoint.
    pub distance_to_target: f32,
    /// Cumulative collision count reported by the simulator.
    pub collisions: u32,
    /// Offset to the lookahead waypoint, relative to `location`.
    pub target_offset: [f32; 3],
    /// Raw sensor payloads keyed by sensor name.
    pub sensors: HashMap<String, Vec<f32>>,
}

impl VehicleState {
    /// Feature vector for the policy network.
    pub fn features(&self) -> [f32; OBS_SIZE] {
        [
            self.velocity,
            self.location[0],
            self.location[1],
            self.location[2],
            self.distance_to_target,
            self.target_offset[0],
            self.target_offset[1],
            self.target_offset[2],
        ]
    }

    /// Whether the required fields carry usable values.
    ///
    /// A non-finite velocity or location means the sensor/environment
    /// contract was violated upstream.
    pub fn is_well_formed(&self) -> bool {
        self.velocity.is_finite() && self.location.iter().all(|c| c.is_finite())
    }
}

/// The next-state snapshot captured right after a tick.
///
/// Only the fields the reward function compares are carried.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateDelta {
    /// Scalar speed after the tick.
    pub velocity: f32,
    /// World location after the tick.
    pub location: [f32; 3],
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> VehicleState {
        VehicleState {
            step: 3,
            velocity: 12.5,
            location: [1.0, 2.0, 0.5],
            yaw: 0.1,
            distance_to_target: 40.0,
            collisions: 0,
            target_offset: [7.0, 1.0, 0.0],
            sensors: HashMap::new(),
        }
    }

    #[test]
    fn test_features_layout() {
        let f = state().features();
        assert_eq!(f.len(), OBS_SIZE);
        assert_eq!(f[0], 12.5);
        assert_eq!(f[4], 40.0);
        assert_eq!(f[5], 7.0);
    }

    #[test]
    fn test_well_formed() {
        assert!(state().is_well_formed());

        let mut bad = state();
        bad.velocity = f32::NAN;
        assert!(!bad.is_well_formed());

        let mut bad = state();
        bad.location[1] = f32::INFINITY;
        assert!(!bad.is_well_formed());
    }
}
