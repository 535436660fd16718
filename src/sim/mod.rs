//! Simulator adapter traits.
//!
//! The episode runner only depends on these primitives being available and
//! tick-synchronous: a blocking `tick`, actor spawn/destroy, transform and
//! velocity queries, sensor attach/read, and a collision-event counter.
//! Concrete backends (a remote simulator client, or the built-in
//! [`synthetic::SyntheticTrack`]) implement them.

pub mod synthetic;

use std::collections::HashMap;

use crate::core::transition::Control;

/// Actor pose: world location plus heading in the XY plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub location: [f32; 3],
    pub yaw: f32,
}

/// Simulator-side failures.
#[derive(Debug)]
pub enum SimError {
    /// The simulator stopped responding to a tick or spawn call.
    /// Fatal to the current run; no automatic reconnection.
    Unavailable(String),
    /// The spawned actor's transform never stabilized within the bound.
    SpawnStalled { ticks: usize },
    /// Actor-level operation failed (spawn rejected, sensor attach failed).
    Actor(String),
}

impl std::fmt::Display for SimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimError::Unavailable(msg) => write!(f, "simulator unavailable: {}", msg),
            SimError::SpawnStalled { ticks } => {
                write!(f, "spawn transform did not stabilize within {} ticks", ticks)
            }
            SimError::Actor(msg) => write!(f, "actor operation failed: {}", msg),
        }
    }
}

impl std::error::Error for SimError {}

/// Handle to a spawned vehicle actor.
pub trait SimVehicle {
    /// Current pose as of the last completed tick.
    fn transform(&self) -> Transform;

    /// Scalar speed as of the last completed tick.
    fn velocity(&self) -> f32;

    /// Cumulative collision events since spawn.
    fn collision_count(&self) -> u32;

    /// Apply an actuator command; takes effect on the next tick.
    fn apply_control(&mut self, control: Control);

    /// Release the parking brake engaged at spawn.
    fn release_handbrake(&mut self);

    /// Attach the named sensors. No control may be applied before this
    /// completes.
    fn attach_sensors(&mut self, names: &[String]) -> Result<(), SimError>;

    /// Latest payload from each attached sensor. Only data from completed
    /// ticks is returned.
    fn read_sensors(&mut self) -> HashMap<String, Vec<f32>>;
}

/// A simulator world advancing in synchronous ticks.
pub trait SimWorld {
    type Vehicle: SimVehicle;

    /// Advance simulated time by one step.
    ///
    /// Blocking rendezvous: returns only once the simulator acknowledges
    /// the tick, so every subsequent state read observes completed data.
    fn tick(&mut self) -> Result<(), SimError>;

    /// Spawn a vehicle at the given pose, parking brake engaged.
    fn spawn_vehicle(&mut self, at: Transform) -> Result<Self::Vehicle, SimError>;

    /// Release a vehicle and its attached sensors.
    ///
    /// Must be called on every episode exit path; an abandoned actor is a
    /// resource leak in the simulator.
    fn destroy_vehicle(&mut self, vehicle: Self::Vehicle);

    /// Reposition the overhead observation viewpoint above a pose.
    fn move_spectator_above(&mut self, pose: Transform);
}
