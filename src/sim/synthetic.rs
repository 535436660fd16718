//! Built-in kinematic simulator backend.
//!
//! A minimal corridor-following world implementing the [`SimWorld`] traits,
//! used by the test suite and for offline runs without a real simulator.
//! The vehicle is a point mass on the ground plane; leaving the corridor
//! around the track polyline counts as a collision event. Spawning drops
//! the vehicle from slightly above the ground so the runner's settle loop
//! is exercised the same way as against real spawn physics.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::core::track::Track;
use crate::core::transition::Control;

use super::{SimError, SimVehicle, SimWorld, Transform};

const SPAWN_DROP: f32 = 0.3;
const SETTLE_STEP: f32 = 0.12;
/// Full-throttle acceleration, m/s^2.
const MAX_ACCEL: f32 = 4.0;
/// Velocity-proportional drag, 1/s.
const DRAG: f32 = 0.12;
/// Yaw rate at full steer and reference speed, rad/s.
const TURN_RATE: f32 = 1.2;
const REFERENCE_SPEED: f32 = 10.0;

struct VehicleBody {
    transform: Transform,
    ground_z: f32,
    /// Internal speed in m/s; reported to the core in km/h.
    speed: f32,
    control: Control,
    handbrake: bool,
    collisions: u32,
    sensors: Vec<String>,
    settle_remaining: usize,
}

/// Handle to the synthetic world's single vehicle.
pub struct SyntheticVehicle {
    body: Rc<RefCell<VehicleBody>>,
}

impl SimVehicle for SyntheticVehicle {
    fn transform(&self) -> Transform {
        self.body.borrow().transform
    }

    fn velocity(&self) -> f32 {
        self.body.borrow().speed * 3.6
    }

    fn collision_count(&self) -> u32 {
        self.body.borrow().collisions
    }

    fn apply_control(&mut self, control: Control) {
        self.body.borrow_mut().control = control.clamped();
    }

    fn release_handbrake(&mut self) {
        self.body.borrow_mut().handbrake = false;
    }

    fn attach_sensors(&mut self, names: &[String]) -> Result<(), SimError> {
        self.body.borrow_mut().sensors = names.to_vec();
        Ok(())
    }

    fn read_sensors(&mut self) -> HashMap<String, Vec<f32>> {
        let body = self.body.borrow();
        body.sensors
            .iter()
            .map(|name| {
                let payload = match name.as_str() {
                    "speedometer" => vec![body.speed * 3.6],
                    "imu" => vec![body.transform.yaw],
                    "collision" => vec![body.collisions as f32],
                    // Unknown sensors produce an opaque placeholder payload.
                    _ => vec![0.0; 4],
                };
                (name.clone(), payload)
            })
            .collect()
    }
}

/// Kinematic corridor world around a waypoint track.
pub struct SyntheticTrack {
    track: Track,
    corridor_half_width: f32,
    dt: f32,
    body: Option<Rc<RefCell<VehicleBody>>>,
    spectator: Option<Transform>,
    spectator_moves: usize,
    ticks: u64,
    fail_after: Option<u64>,
}

impl SyntheticTrack {
    /// World around `track` with collisions beyond `corridor_half_width`.
    pub fn new(track: Track, corridor_half_width: f32) -> Self {
        Self {
            track,
            corridor_half_width,
            dt: 0.1,
            body: None,
            spectator: None,
            spectator_moves: 0,
            ticks: 0,
            fail_after: None,
        }
    }

    /// Make `tick` fail once the given tick count is reached. Emulates a
    /// simulator that stops responding.
    pub fn fail_after_ticks(&mut self, n: u64) {
        self.fail_after = Some(n);
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    /// Whether a vehicle actor is currently alive in the world.
    pub fn has_vehicle(&self) -> bool {
        self.body.is_some()
    }

    /// Last spectator pose set, if any.
    pub fn spectator(&self) -> Option<Transform> {
        self.spectator
    }

    /// Number of spectator repositions issued.
    pub fn spectator_moves(&self) -> usize {
        self.spectator_moves
    }

}

impl SimWorld for SyntheticTrack {
    type Vehicle = SyntheticVehicle;

    fn tick(&mut self) -> Result<(), SimError> {
        if let Some(limit) = self.fail_after {
            if self.ticks >= limit {
                return Err(SimError::Unavailable("tick deadline exceeded".into()));
            }
        }
        self.ticks += 1;

        let Some(body) = &self.body else {
            return Ok(());
        };
        let mut body = body.borrow_mut();

        // Spawn settling: the body sinks onto the ground over a few ticks,
        // after which consecutive transforms compare exactly equal.
        if body.settle_remaining > 0 {
            body.settle_remaining -= 1;
            let z = (body.transform.location[2] - SETTLE_STEP).max(body.ground_z);
            body.transform.location[2] = z;
            return Ok(());
        }

        if body.handbrake {
            body.speed = 0.0;
            return Ok(());
        }

        let accel = body.control.gas_brake * MAX_ACCEL - DRAG * body.speed;
        body.speed = (body.speed + accel * self.dt).max(0.0);

        let steer_scale = (body.speed / REFERENCE_SPEED).min(1.0);
        body.transform.yaw += body.control.steer * TURN_RATE * steer_scale * self.dt;

        let (sin, cos) = body.transform.yaw.sin_cos();
        body.transform.location[0] += cos * body.speed * self.dt;
        body.transform.location[1] += sin * body.speed * self.dt;

        if self.track.cross_track_distance(body.transform.location) > self.corridor_half_width {
            body.collisions += 1;
        }

        Ok(())
    }

    fn spawn_vehicle(&mut self, at: Transform) -> Result<SyntheticVehicle, SimError> {
        if self.body.is_some() {
            return Err(SimError::Actor("vehicle already spawned".into()));
        }

        let body = Rc::new(RefCell::new(VehicleBody {
            transform: Transform {
                location: [at.location[0], at.location[1], at.location[2] + SPAWN_DROP],
                yaw: at.yaw,
            },
            ground_z: at.location[2],
            speed: 0.0,
            control: Control::neutral(),
            handbrake: true,
            collisions: 0,
            sensors: Vec::new(),
            settle_remaining: 5,
        }));
        self.body = Some(Rc::clone(&body));

        Ok(SyntheticVehicle { body })
    }

    fn destroy_vehicle(&mut self, vehicle: SyntheticVehicle) {
        drop(vehicle);
        self.body = None;
    }

    fn move_spectator_above(&mut self, pose: Transform) {
        self.spectator = Some(Transform {
            location: [pose.location[0], pose.location[1], pose.location[2] + 30.0],
            yaw: pose.yaw,
        });
        self.spectator_moves += 1;
    }
}
