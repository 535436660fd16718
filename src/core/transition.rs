//! Transition types recorded during an episode.
//!
//! One `Transition` is produced per RUNNING tick. A transition with
//! `next == None` is terminal (success or collision); a truncated episode
//! simply ends without one.

use crate::core::state::{StateDelta, VehicleState};

/// Normalized actuator command for one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Control {
    /// Steering in `[-1, 1]`.
    pub steer: f32,
    /// Combined throttle/brake in `[-1, 1]` (negative brakes).
    pub gas_brake: f32,
}

impl Control {
    /// Coasting command: no steering, no throttle.
    pub fn neutral() -> Self {
        Self {
            steer: 0.0,
            gas_brake: 0.0,
        }
    }

    /// Clamp both channels into their normalized range.
    pub fn clamped(self) -> Self {
        Self {
            steer: self.steer.clamp(-1.0, 1.0),
            gas_brake: self.gas_brake.clamp(-1.0, 1.0),
        }
    }
}

/// Controller output for one step.
///
/// Both controller variants satisfy the same contract; the learned variant
/// additionally fills the discrete grid `index` it sampled and its value
/// head's `state_value` estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    /// Actuator command applied to the vehicle.
    pub control: Control,
    /// Discrete action-grid cell, learned controller only.
    pub index: Option<u32>,
    /// Value estimate V(s), learned controller only.
    pub state_value: Option<f32>,
}

impl Action {
    /// Plain action without policy extras (MPC variant).
    pub fn plain(control: Control) -> Self {
        Self {
            control,
            index: None,
            state_value: None,
        }
    }

    /// Neutral action used when a terminal state is reached before the
    /// controller is invoked.
    pub fn coast() -> Self {
        Self::plain(Control::neutral())
    }
}

/// One step's (state, action, reward, next_state) tuple.
#[derive(Debug, Clone)]
pub struct Transition {
    /// State the action was decided from.
    pub state: VehicleState,
    /// Action applied.
    pub action: Action,
    /// Reward received (terminal overrides already applied).
    pub reward: f32,
    /// Post-tick snapshot; `None` marks a terminal transition.
    pub next: Option<StateDelta>,
}

impl Transition {
    /// Non-terminal step transition.
    pub fn step(state: VehicleState, action: Action, reward: f32, next: StateDelta) -> Self {
        Self {
            state,
            action,
            reward,
            next: Some(next),
        }
    }

    /// Terminal transition (success or collision), reward already overridden.
    pub fn terminal(state: VehicleState, action: Action, reward: f32) -> Self {
        Self {
            state,
            action,
            reward,
            next: None,
        }
    }

    /// Whether this transition ends the episode.
    pub fn is_terminal(&self) -> bool {
        self.next.is_none()
    }
}

/// Single backward pass `G_t = r_t + gamma * G_{t+1}`.
///
/// Pure function of the rewards and the discount; used for reporting, not
/// as the gradient target.
pub fn discounted_returns(rewards: &[f32], gamma: f32) -> Vec<f32> {
    let mut returns = vec![0.0; rewards.len()];
    let mut acc = 0.0;
    for (i, &r) in rewards.iter().enumerate().rev() {
        acc = r + gamma * acc;
        returns[i] = acc;
    }
    returns
}
