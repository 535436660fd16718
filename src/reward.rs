//! Progress-based per-step reward.
//!
//! The reward compares the agent's advancement along the track polyline
//! between two consecutive states, discounted by `gamma^step` to favor
//! early progress. Terminal overrides (collision penalty, success bonus)
//! are applied by the episode runner, never here; this function is not
//! called on a terminal tick.

use crate::core::state::{StateDelta, VehicleState};
use crate::core::track::Track;

/// Arc-length progress between `state` and `next`, scaled by `gamma^step`.
///
/// Pure and total: defined for every reachable state pair, deterministic
/// for identical inputs. Driving backwards yields a negative value.
pub fn progress_reward(
    track: &Track,
    state: &VehicleState,
    next: &StateDelta,
    gamma: f32,
    step: usize,
) -> f32 {
    let before = track.project(state.location);
    let after = track.project(next.location);
    (after - before) * gamma.powi(step as i32)
}
