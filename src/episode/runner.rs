//! Per-episode control loop.
//!
//! Drives one episode through its phases:
//! `SPAWNING -> STABILIZING -> SENSOR_INIT -> RUNNING -> terminal`.
//! The simulator's tick is the only suspension point; every state read
//! observes a completed tick. Simulator resources are released on every
//! exit path, including errors and interrupts.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::DriveConfig;
use crate::control::{ControlError, Controller};
use crate::core::state::{StateDelta, VehicleState};
use crate::core::track::Track;
use crate::core::transition::{Action, Transition};
use crate::episode::record::{RecordError, RecordWriter};
use crate::episode::{EpisodeOutcome, EpisodeStatus};
use crate::reward::progress_reward;
use crate::sim::{SimError, SimVehicle, SimWorld, Transform};

/// Failures while running one episode.
#[derive(Debug)]
pub enum EpisodeError {
    /// The controller rejected the state: sensor/environment contract
    /// violation. Aborts the episode, not the session.
    InvalidState {
        episode_id: u64,
        step: usize,
        source: ControlError,
    },
    /// Simulator failure; fatal to the run.
    Sim(SimError),
    /// Record file failure; aborts the episode.
    Record(RecordError),
    Io(io::Error),
}

impl std::fmt::Display for EpisodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EpisodeError::InvalidState {
                episode_id,
                step,
                source,
            } => write!(f, "episode {} step {}: {}", episode_id, step, source),
            EpisodeError::Sim(e) => write!(f, "{}", e),
            EpisodeError::Record(e) => write!(f, "{}", e),
            EpisodeError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for EpisodeError {}

impl From<SimError> for EpisodeError {
    fn from(e: SimError) -> Self {
        EpisodeError::Sim(e)
    }
}

impl From<RecordError> for EpisodeError {
    fn from(e: RecordError) -> Self {
        EpisodeError::Record(e)
    }
}

impl From<io::Error> for EpisodeError {
    fn from(e: io::Error) -> Self {
        EpisodeError::Io(e)
    }
}

/// Runs a single episode against a simulator world.
pub struct EpisodeRunner<'a, W: SimWorld, C: Controller> {
    world: &'a mut W,
    controller: &'a mut C,
    track: &'a Track,
    config: &'a DriveConfig,
    episode_id: u64,
    interrupt: Option<&'a AtomicBool>,
}

impl<'a, W: SimWorld, C: Controller> EpisodeRunner<'a, W, C> {
    pub fn new(
        world: &'a mut W,
        controller: &'a mut C,
        track: &'a Track,
        config: &'a DriveConfig,
        episode_id: u64,
    ) -> Self {
        Self {
            world,
            controller,
            track,
            config,
            episode_id,
            interrupt: None,
        }
    }

    /// Attach an external interrupt flag. A set flag finalizes the
    /// episode as truncated instead of abandoning the actor.
    pub fn with_interrupt(mut self, flag: &'a AtomicBool) -> Self {
        self.interrupt = Some(flag);
        self
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Run the episode to a terminal phase.
    pub fn run(&mut self) -> Result<EpisodeOutcome, EpisodeError> {
        // SPAWNING
        let spawn = Transform {
            location: self.track.point(0),
            yaw: self.track.initial_yaw(),
        };
        let mut vehicle = self.world.spawn_vehicle(spawn)?;

        if let Err(e) = self.settle(&vehicle) {
            self.world.destroy_vehicle(vehicle);
            return Err(e);
        }

        let result = self.drive(&mut vehicle);
        self.world.destroy_vehicle(vehicle);
        result
    }

    /// Wait until the spawned actor's transform stops changing between
    /// consecutive ticks. Exact equality, no tolerance; bounded by
    /// `max_settle_ticks` so a stalled spawn fails instead of hanging.
    fn settle(&mut self, vehicle: &W::Vehicle) -> Result<(), EpisodeError> {
        self.world.tick()?;
        self.world.tick()?;
        let mut prev = vehicle.transform();
        for _ in 0..self.config.max_settle_ticks {
            self.world.tick()?;
            let cur = vehicle.transform();
            if cur == prev {
                return Ok(());
            }
            prev = cur;
        }
        Err(EpisodeError::Sim(SimError::SpawnStalled {
            ticks: self.config.max_settle_ticks,
        }))
    }

    /// Capture the state as of the last completed tick.
    fn observe(&self, vehicle: &mut W::Vehicle, step: usize) -> VehicleState {
        let pose = vehicle.transform();
        VehicleState {
            step,
            velocity: vehicle.velocity(),
            location: pose.location,
            yaw: pose.yaw,
            distance_to_target: self.track.remaining(pose.location),
            collisions: vehicle.collision_count(),
            target_offset: self
                .track
                .target_offset(pose.location, self.config.waypoint_lookahead),
            sensors: vehicle.read_sensors(),
        }
    }

    fn drive(&mut self, vehicle: &mut W::Vehicle) -> Result<EpisodeOutcome, EpisodeError> {
        // STABILIZING: free the brake and let physics settle before
        // control begins.
        vehicle.release_handbrake();
        self.world.tick()?;
        if !self.config.stabilize_delay.is_zero() {
            std::thread::sleep(self.config.stabilize_delay);
        }

        // SENSOR_INIT
        vehicle.attach_sensors(&self.config.sensors)?;

        // RUNNING
        let record_path = self
            .config
            .data_dir
            .join(format!("episode_{:06}.csv", self.episode_id));
        let mut writer = RecordWriter::create(&record_path)?;
        let gamma = self.config.gamma;
        let mut status = EpisodeStatus::Truncated;
        let mut final_distance = self.track.remaining(vehicle.transform().location);

        for step in 0..self.config.max_steps {
            if self.interrupted() {
                log::warn!(
                    "episode {} interrupted at step {}, finalizing",
                    self.episode_id,
                    step
                );
                break;
            }

            let state = self.observe(vehicle, step);
            final_distance = state.distance_to_target;

            if state.distance_to_target < self.config.success_distance {
                writer.append(&Transition::terminal(
                    state,
                    Action::coast(),
                    self.config.success_reward,
                ))?;
                status = EpisodeStatus::Succeeded;
                break;
            }

            let action = self.controller.decide(&state).map_err(|source| {
                EpisodeError::InvalidState {
                    episode_id: self.episode_id,
                    step,
                    source,
                }
            })?;
            vehicle.apply_control(action.control);

            self.world.tick()?;
            let pose = vehicle.transform();
            let next = StateDelta {
                velocity: vehicle.velocity(),
                location: pose.location,
            };

            if vehicle.collision_count() > state.collisions {
                // Terminal override: the computed progress is discarded.
                let reward = self.config.negative_reward * gamma.powi(step as i32);
                writer.append(&Transition::terminal(state, action, reward))?;
                status = EpisodeStatus::Failed;
                break;
            }

            let reward = progress_reward(self.track, &state, &next, gamma, step);
            writer.append(&Transition::step(state, action, reward, next))?;

            // Follow closely during slow maneuvering, loosely otherwise.
            if (vehicle.velocity() < self.config.low_speed_threshold && step % 10 == 0)
                || step % 50 == 0
            {
                self.world.move_spectator_above(pose);
            }
        }

        let steps = writer.len();
        let returns = writer.finalize(gamma)?;
        self.world.tick()?;

        Ok(EpisodeOutcome {
            episode_id: self.episode_id,
            status,
            steps,
            total_return: returns.first().copied().unwrap_or(0.0),
            final_distance,
            record_path,
        })
    }
}
