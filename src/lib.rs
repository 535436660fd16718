//! # drive_rl: Simulator Driving with Learned Control
//!
//! Episode collection and actor-critic training for a vehicle following a
//! waypoint track in a tick-synchronous simulator.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Rollout                              Training                   │
//! │  ┌──────────────┐                     ┌────────────────┐        │
//! │  │EpisodeRunner │                     │  A2cTrainer    │        │
//! │  │ SimWorld     │   record files      │  batches of    │        │
//! │  │ Controller   │ ──────────────────► │  episode files │        │
//! │  │ (MPC/Policy) │   data_dir/*.csv    │  Bellman + PG  │        │
//! │  └──────┬───────┘                     └───────┬────────┘        │
//! │         │                                     │                  │
//! │         │        ┌──────────────┐             │                  │
//! │         └───────►│ PolicySlot   │◄────────────┘                  │
//! │   snapshot per   │ (swap sync)  │  publish per epoch             │
//! │   episode        └──────────────┘                                │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rollout and training share parameters only through [`PolicySlot`]: the
//! trainer publishes a frozen copy after each epoch, and the rollout side
//! snapshots it between episodes, never mid-episode.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use drive_rl::{DriveConfig, EpisodeRunner, MpcController, Track};
//!
//! let track = Track::new(waypoints);
//! let config = DriveConfig::default().with_max_steps(5_000);
//! let mut controller = MpcController::new(track.clone(), config.target_speed, config.steps_ahead);
//!
//! let outcome = EpisodeRunner::new(&mut world, &mut controller, &track, &config, 0)
//!     .run()?;
//! ```

pub mod checkpoint;
pub mod config;
pub mod control;
pub mod core;
pub mod episode;
pub mod metrics;
pub mod reward;
pub mod sim;
pub mod training;

// Re-export commonly used types
pub use checkpoint::{CheckpointConfig, CheckpointError, Checkpointer};
pub use config::{ConfigError, ControllerKind, DriveConfig};
pub use control::mpc::MpcController;
pub use control::policy::{ActionGrid, PolicyController, PolicyNet};
pub use control::{ControlError, Controller};
pub use core::policy_slot::{policy_slot, PolicySlot, SharedPolicySlot};
pub use core::state::{StateDelta, VehicleState, OBS_SIZE};
pub use core::track::Track;
pub use core::transition::{discounted_returns, Action, Control, Transition};
pub use episode::{
    run_episodes, EpisodeError, EpisodeOutcome, EpisodeRunner, EpisodeStatus, RecordRow,
    RecordWriter,
};
pub use metrics::{ConsoleLogger, CsvLogger, EpisodeSummary, MetricsLogger, TrainingSnapshot};
pub use reward::progress_reward;
pub use sim::{SimError, SimVehicle, SimWorld, Transform};
pub use training::{build_batches, create_optimizer, A2cTrainer, TrainError};
