//! Offline training over recorded episodes.
//!
//! [`batch`] turns a directory of record files into shuffled exact-size
//! batches; [`trainer`] replays them through the actor-critic update.

pub mod batch;
pub mod trainer;

pub use batch::{build_batches, discover_records};
pub use trainer::{create_optimizer, A2cTrainer, TrainError};
