//! Learned actor-critic controller.
//!
//! `PolicyNet` maps the 8-dim state feature vector to logits over a
//! discrete steering/throttle grid plus a scalar value estimate.
//! `PolicyController` wraps a parameter snapshot for rollout: it samples
//! an action from the categorical distribution with a seeded generator,
//! so a fixed seed reproduces the same action sequence.

use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation::{relu, softmax};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::core::state::{VehicleState, OBS_SIZE};
use crate::core::transition::{Action, Control};

use super::{require_well_formed, ControlError, Controller};

const HIDDEN_0: usize = 75;
const HIDDEN_1: usize = 100;

/// Discrete steering x throttle grid the policy samples from.
#[derive(Debug, Clone)]
pub struct ActionGrid {
    steer_levels: Vec<f32>,
    gas_levels: Vec<f32>,
}

impl Default for ActionGrid {
    fn default() -> Self {
        Self {
            steer_levels: vec![-0.8, -0.4, -0.15, 0.0, 0.15, 0.4, 0.8],
            gas_levels: vec![-0.5, 0.3, 0.8],
        }
    }
}

impl ActionGrid {
    /// Number of discrete actions.
    pub fn len(&self) -> usize {
        self.steer_levels.len() * self.gas_levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steer_levels.is_empty() || self.gas_levels.is_empty()
    }

    /// Control for a grid cell index.
    pub fn decode(&self, index: u32) -> Control {
        let i = index as usize % self.len();
        Control {
            steer: self.steer_levels[i % self.steer_levels.len()],
            gas_brake: self.gas_levels[i / self.steer_levels.len()],
        }
    }

    /// Nearest grid cell for an arbitrary control. Used to train the
    /// discrete policy from MPC-collected records.
    ///
    /// Total over all inputs: a non-finite channel (a corrupt record
    /// column, for instance) still maps to some cell instead of failing,
    /// since `total_cmp` orders NaN distances too.
    pub fn encode(&self, control: Control) -> u32 {
        let nearest = |levels: &[f32], v: f32| {
            levels
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| (*a - v).abs().total_cmp(&(*b - v).abs()))
                .map(|(i, _)| i)
                .unwrap_or(0)
        };
        let si = nearest(&self.steer_levels, control.steer);
        let gi = nearest(&self.gas_levels, control.gas_brake);
        (gi * self.steer_levels.len() + si) as u32
    }
}

/// Actor-critic network: shared trunk, policy head over the action grid,
/// scalar value head.
#[derive(burn::module::Module, Debug)]
pub struct PolicyNet<B: Backend> {
    fc0: Linear<B>,
    fc1: Linear<B>,
    policy_head: Linear<B>,
    value_head: Linear<B>,
}

impl<B: Backend> PolicyNet<B> {
    /// Network sized for the default action grid.
    pub fn new(device: &B::Device) -> Self {
        Self::with_actions(device, ActionGrid::default().len())
    }

    /// Network with an explicit action count.
    pub fn with_actions(device: &B::Device, n_actions: usize) -> Self {
        Self {
            fc0: LinearConfig::new(OBS_SIZE, HIDDEN_0).init(device),
            fc1: LinearConfig::new(HIDDEN_0, HIDDEN_1).init(device),
            policy_head: LinearConfig::new(HIDDEN_1, n_actions).init(device),
            value_head: LinearConfig::new(HIDDEN_1, 1).init(device),
        }
    }

    /// Forward pass returning `(logits [batch, n_actions], values [batch, 1])`.
    pub fn forward(&self, obs: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let x = relu(self.fc0.forward(obs));
        let x = relu(self.fc1.forward(x));
        (self.policy_head.forward(x.clone()), self.value_head.forward(x))
    }

    /// Number of actions in the policy head.
    pub fn n_actions(&self) -> usize {
        self.policy_head.weight.val().dims()[1]
    }
}

/// Rollout-side learned controller over a parameter snapshot.
pub struct PolicyController<B: Backend> {
    model: PolicyNet<B>,
    grid: ActionGrid,
    device: B::Device,
    rng: Xoshiro256PlusPlus,
}

impl<B: Backend> PolicyController<B> {
    /// Controller over a parameter snapshot, sampling with the given seed.
    pub fn new(model: PolicyNet<B>, grid: ActionGrid, device: B::Device, seed: u64) -> Self {
        Self {
            model,
            grid,
            device,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        }
    }

    /// Replace the parameter snapshot (between episodes only).
    pub fn swap_model(&mut self, model: PolicyNet<B>) {
        self.model = model;
    }
}

impl<B: Backend> Controller for PolicyController<B> {
    fn decide(&mut self, state: &VehicleState) -> Result<Action, ControlError> {
        require_well_formed(state)?;

        let features = state.features();
        let obs = Tensor::<B, 1>::from_floats(features.as_slice(), &self.device)
            .reshape([1, OBS_SIZE]);
        let (logits, values) = self.model.forward(obs);

        let probs = softmax(logits, 1);
        let probs_data = probs.into_data();
        let probs_slice: &[f32] = probs_data.as_slice().expect("probs layout");
        let n_actions = probs_slice.len();

        // Categorical sampling via cumulative sum; the final cell absorbs
        // floating-point remainder so a draw can never fall through.
        let draw: f32 = self.rng.gen();
        let mut cumsum = 0.0;
        let mut index = (n_actions - 1) as u32;
        for (a, &p) in probs_slice.iter().enumerate() {
            cumsum += p;
            if draw < cumsum || a == n_actions - 1 {
                index = a as u32;
                break;
            }
        }

        let value = values.into_data().as_slice::<f32>().expect("value layout")[0];

        Ok(Action {
            control: self.grid.decode(index),
            index: Some(index),
            state_value: Some(value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use std::collections::HashMap;

    type B = NdArray<f32>;

    fn state() -> VehicleState {
        VehicleState {
            step: 0,
            velocity: 25.0,
            location: [10.0, 1.0, 0.0],
            yaw: 0.05,
            distance_to_target: 150.0,
            collisions: 0,
            target_offset: [7.5, 0.5, 0.0],
            sensors: HashMap::new(),
        }
    }

    #[test]
    fn test_grid_roundtrip() {
        let grid = ActionGrid::default();
        for index in 0..grid.len() as u32 {
            let control = grid.decode(index);
            assert_eq!(grid.encode(control), index);
        }
    }

    #[test]
    fn test_grid_encode_nearest() {
        let grid = ActionGrid::default();
        let control = Control {
            steer: 0.17,
            gas_brake: 0.9,
        };
        let decoded = grid.decode(grid.encode(control));
        assert_eq!(decoded.steer, 0.15);
        assert_eq!(decoded.gas_brake, 0.8);
    }

    #[test]
    fn test_encode_tolerates_non_finite_control() {
        let grid = ActionGrid::default();
        let index = grid.encode(Control {
            steer: f32::NAN,
            gas_brake: 0.8,
        });
        assert!((index as usize) < grid.len());

        let index = grid.encode(Control {
            steer: 0.0,
            gas_brake: f32::INFINITY,
        });
        assert!((index as usize) < grid.len());
    }

    #[test]
    fn test_forward_shapes() {
        let device = Default::default();
        let net = PolicyNet::<B>::new(&device);
        let obs = Tensor::<B, 2>::zeros([3, OBS_SIZE], &device);
        let (logits, values) = net.forward(obs);
        assert_eq!(logits.dims(), [3, ActionGrid::default().len()]);
        assert_eq!(values.dims(), [3, 1]);
    }

    #[test]
    fn test_decide_fills_policy_extras() {
        let device = Default::default();
        let net = PolicyNet::<B>::new(&device);
        let mut controller = PolicyController::new(net, ActionGrid::default(), device, 7);
        let action = controller.decide(&state()).unwrap();
        assert!(action.index.is_some());
        assert!(action.state_value.is_some());
        assert!((action.index.unwrap() as usize) < ActionGrid::default().len());
    }

    #[test]
    fn test_sampling_reproducible_under_seed() {
        let device: <B as Backend>::Device = Default::default();
        let net = PolicyNet::<B>::new(&device);

        let mut a = PolicyController::new(net.clone(), ActionGrid::default(), device.clone(), 42);
        let mut b = PolicyController::new(net, ActionGrid::default(), device, 42);

        for _ in 0..10 {
            let left = a.decide(&state()).unwrap();
            let right = b.decide(&state()).unwrap();
            assert_eq!(left.index, right.index);
        }
    }

    #[test]
    fn test_decide_rejects_nan_location() {
        let device = Default::default();
        let net = PolicyNet::<B>::new(&device);
        let mut controller = PolicyController::new(net, ActionGrid::default(), device, 0);
        let mut s = state();
        s.location[0] = f32::NAN;
        assert_eq!(
            controller.decide(&s),
            Err(ControlError::InvalidState { field: "location" })
        );
    }
}
