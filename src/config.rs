//! Run configuration.
//!
//! One immutable `DriveConfig` is handed to the episode runner and the
//! trainer at construction; nothing in the call graph reads process-wide
//! state. Defaults mirror the values the system was tuned with.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Which controller variant drives the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerKind {
    /// Deterministic model-predictive controller.
    Mpc,
    /// Learned actor-critic policy.
    Policy,
}

/// Configuration validation error.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A count parameter must be positive.
    InvalidCount { field: &'static str, value: usize },
    /// A parameter is outside its valid range.
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidCount { field, value } => {
                write!(f, "{} must be > 0, got {}", field, value)
            }
            ConfigError::OutOfRange {
                field,
                value,
                min,
                max,
            } => {
                write!(f, "{} must be in [{}, {}], got {}", field, min, max, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Immutable configuration for episode collection and training.
#[derive(Debug, Clone)]
pub struct DriveConfig {
    /// Controller variant used for rollout.
    pub controller: ControllerKind,
    /// Simulator host.
    pub host: String,
    /// Simulator port.
    pub port: u16,
    /// Target speed for the MPC variant, km/h.
    pub target_speed: f32,
    /// MPC lookahead horizon in ticks.
    pub steps_ahead: usize,
    /// Maximum steps per episode before truncation.
    pub max_steps: usize,
    /// Distance-to-target below which the episode succeeds.
    ///
    /// Configurable because observed call sites disagree on the cutoff.
    pub success_distance: f32,
    /// Terminal override reward on success.
    pub success_reward: f32,
    /// Terminal override reward on collision (before `gamma^step` scaling).
    pub negative_reward: f32,
    /// Discount factor.
    pub gamma: f32,
    /// Distance ahead on the track used as the steering target, meters.
    pub waypoint_lookahead: f32,
    /// Speed below which the spectator follows more frequently, km/h.
    pub low_speed_threshold: f32,
    /// Bound on the spawn settle wait, in ticks.
    pub max_settle_ticks: usize,
    /// Real-time pause after releasing the handbrake.
    pub stabilize_delay: Duration,
    /// Sensors attached before control begins.
    pub sensors: Vec<String>,
    /// Directory receiving per-episode record files.
    pub data_dir: PathBuf,
    /// Episode files per training batch.
    pub batch_size: usize,
    /// Optimizer learning rate.
    pub learning_rate: f64,
    /// Entropy bonus coefficient.
    pub entropy_coef: f32,
    /// Value loss coefficient.
    pub value_coef: f32,
    /// Training epochs per `train` call.
    pub epochs: usize,
    /// Epochs between checkpoints.
    pub checkpoint_interval: usize,
    /// Seed for batch shuffling and policy sampling.
    pub seed: u64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            controller: ControllerKind::Mpc,
            host: "localhost".to_string(),
            port: 2000,
            target_speed: 90.0,
            steps_ahead: 10,
            max_steps: 10_000,
            success_distance: 5.0,
            success_reward: 0.0,
            negative_reward: -100.0,
            gamma: 0.99,
            waypoint_lookahead: 8.0,
            low_speed_threshold: 20.0,
            max_settle_ticks: 120,
            stabilize_delay: Duration::from_secs(1),
            sensors: vec!["speedometer".to_string(), "imu".to_string()],
            data_dir: PathBuf::from("./data/experiments"),
            batch_size: 32,
            learning_rate: 1e-3,
            entropy_coef: 0.01,
            value_coef: 0.5,
            epochs: 20,
            checkpoint_interval: 5,
            seed: 42,
        }
    }
}

impl DriveConfig {
    pub fn with_controller(mut self, controller: ControllerKind) -> Self {
        self.controller = controller;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_success_distance(mut self, distance: f32) -> Self {
        self.success_distance = distance;
        self
    }

    pub fn with_gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_stabilize_delay(mut self, delay: Duration) -> Self {
        self.stabilize_delay = delay;
        self
    }

    /// Validate parameter ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_steps == 0 {
            return Err(ConfigError::InvalidCount {
                field: "max_steps",
                value: self.max_steps,
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidCount {
                field: "batch_size",
                value: self.batch_size,
            });
        }
        if self.epochs == 0 {
            return Err(ConfigError::InvalidCount {
                field: "epochs",
                value: self.epochs,
            });
        }
        if self.checkpoint_interval == 0 {
            return Err(ConfigError::InvalidCount {
                field: "checkpoint_interval",
                value: self.checkpoint_interval,
            });
        }
        if self.max_settle_ticks == 0 {
            return Err(ConfigError::InvalidCount {
                field: "max_settle_ticks",
                value: self.max_settle_ticks,
            });
        }
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "gamma",
                value: self.gamma as f64,
                min: 0.0,
                max: 1.0,
            });
        }
        if self.learning_rate <= 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "learning_rate",
                value: self.learning_rate,
                min: 0.0,
                max: f64::INFINITY,
            });
        }
        if self.success_distance <= 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "success_distance",
                value: self.success_distance as f64,
                min: 0.0,
                max: f64::INFINITY,
            });
        }
        Ok(())
    }
}
