//! Actor-critic training over recorded episodes.
//!
//! The trainer replays finalized episode record files in shuffled batches.
//! Value targets use a one-step Bellman bootstrap: `r + gamma * V(s')` for
//! rows with a successor, the bare reward for terminal and truncated rows.
//! `V(s')` comes from a frozen copy of the current network, so the target
//! does not carry gradients.

use std::io;
use std::path::PathBuf;

use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::activation::softmax;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{Int, Tensor};

use crate::checkpoint::{CheckpointConfig, CheckpointError, Checkpointer};
use crate::config::DriveConfig;
use crate::control::policy::{ActionGrid, PolicyNet};
use crate::core::policy_slot::SharedPolicySlot;
use crate::core::state::OBS_SIZE;
use crate::core::transition::Control;
use crate::episode::record::read_record;
use crate::metrics::{MetricsLogger, TrainingSnapshot};
use crate::training::batch::build_batches;

/// Training failures.
#[derive(Debug)]
pub enum TrainError {
    Io(io::Error),
    Checkpoint(CheckpointError),
}

impl std::fmt::Display for TrainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrainError::Io(e) => write!(f, "IO error: {}", e),
            TrainError::Checkpoint(e) => write!(f, "checkpoint error: {}", e),
        }
    }
}

impl std::error::Error for TrainError {}

impl From<io::Error> for TrainError {
    fn from(e: io::Error) -> Self {
        TrainError::Io(e)
    }
}

impl From<CheckpointError> for TrainError {
    fn from(e: CheckpointError) -> Self {
        TrainError::Checkpoint(e)
    }
}

/// Flattened tensors for one batch of episode files.
struct BatchData<B: AutodiffBackend> {
    states: Tensor<B, 2>,
    /// Chosen action index per row, `[n, 1]`.
    actions: Tensor<B, 2, Int>,
    rewards: Vec<f32>,
    /// Row indices that have a successor state to bootstrap from.
    bootstrap_idx: Vec<usize>,
    /// Successor features for `bootstrap_idx` rows, on the inference
    /// backend since the frozen network evaluates them.
    next_states: Option<Tensor<B::InnerBackend, 2>>,
    len: usize,
}

/// Per-batch loss components, for logging.
struct StepLosses {
    policy: f32,
    value: f32,
    entropy: f32,
}

/// Adam with the epsilon the value head was tuned with.
pub fn create_optimizer<B: AutodiffBackend>() -> impl Optimizer<PolicyNet<B>, B> {
    AdamConfig::new().with_epsilon(1e-3).init()
}

/// Batch trainer for [`PolicyNet`].
pub struct A2cTrainer<B: AutodiffBackend> {
    config: DriveConfig,
    device: B::Device,
    grid: ActionGrid,
    checkpointer: Checkpointer,
    slot: Option<SharedPolicySlot<PolicyNet<B::InnerBackend>>>,
}

impl<B: AutodiffBackend> A2cTrainer<B> {
    /// Trainer reading records from `config.data_dir` and writing
    /// checkpoints next to them.
    pub fn new(config: DriveConfig, device: B::Device) -> Result<Self, TrainError> {
        let checkpoint_config = CheckpointConfig::new(config.data_dir.join("checkpoints"))
            .with_save_interval(config.checkpoint_interval);
        Ok(Self {
            config,
            device,
            grid: ActionGrid::default(),
            checkpointer: Checkpointer::new(checkpoint_config)?,
            slot: None,
        })
    }

    /// Publish a frozen copy of the network here after every epoch, so
    /// concurrent rollout picks up new parameters at episode boundaries.
    pub fn with_policy_slot(mut self, slot: SharedPolicySlot<PolicyNet<B::InnerBackend>>) -> Self {
        self.slot = Some(slot);
        self
    }

    pub fn checkpointer(&self) -> &Checkpointer {
        &self.checkpointer
    }

    /// Run `config.epochs` epochs over the record files and return the
    /// trained network.
    pub fn train<O: Optimizer<PolicyNet<B>, B>>(
        &mut self,
        mut model: PolicyNet<B>,
        optimizer: &mut O,
        logger: &mut dyn MetricsLogger,
    ) -> Result<PolicyNet<B>, TrainError> {
        for epoch in 1..=self.config.epochs {
            // Reshuffle per epoch, deterministically under the run seed.
            let batches = build_batches(
                &self.config.data_dir,
                self.config.batch_size,
                self.config.seed.wrapping_add(epoch as u64),
            )?;
            if batches.is_empty() {
                log::warn!(
                    "epoch {}: fewer than {} record files, nothing to train on",
                    epoch,
                    self.config.batch_size
                );
                continue;
            }

            let mut policy_sum = 0.0;
            let mut value_sum = 0.0;
            let mut entropy_sum = 0.0;
            let mut reward_sum = 0.0f32;
            let mut steps = 0usize;
            let mut transitions = 0usize;

            for files in &batches {
                let batch = self.load_batch(files);
                if batch.len == 0 {
                    log::warn!("epoch {}: skipping batch with no transitions", epoch);
                    continue;
                }
                transitions += batch.len;
                reward_sum += batch.rewards.iter().sum::<f32>();

                let (updated, losses) = self.step(model, optimizer, &batch);
                model = updated;
                policy_sum += losses.policy;
                value_sum += losses.value;
                entropy_sum += losses.entropy;
                steps += 1;
            }

            // An epoch that consumed nothing changed nothing: no snapshot
            // to publish, no checkpoint worth keeping.
            if steps == 0 {
                continue;
            }

            let n = steps as f32;
            logger.log_training(
                &TrainingSnapshot::new(epoch, steps, transitions)
                    .with_losses(policy_sum / n, value_sum / n, entropy_sum / n)
                    .with_learning_rate(self.config.learning_rate),
            );

            if let Some(slot) = &self.slot {
                slot.publish(model.valid());
            }

            if self.checkpointer.should_save(epoch) {
                // Mean per-transition reward ranks checkpoints for best-model
                // tracking.
                let avg_reward = reward_sum / transitions as f32;
                self.checkpointer
                    .save(&model.valid(), epoch, Some(avg_reward))?;
            }
        }

        logger.flush();
        Ok(model)
    }

    /// One gradient step over a batch.
    fn step<O: Optimizer<PolicyNet<B>, B>>(
        &self,
        model: PolicyNet<B>,
        optimizer: &mut O,
        batch: &BatchData<B>,
    ) -> (PolicyNet<B>, StepLosses) {
        let targets = self.bellman_targets(&model, batch);
        let targets = Tensor::<B, 1>::from_floats(targets.as_slice(), &self.device);

        let (logits, values) = model.forward(batch.states.clone());
        let values: Tensor<B, 1> = values.flatten(0, 1);

        let value_loss = (values.clone() - targets.clone()).powf_scalar(2.0).mean();

        let probs = softmax(logits, 1);
        let log_probs = probs.clone().clamp(1e-8, 1.0).log();
        let chosen_log_probs: Tensor<B, 1> = log_probs
            .clone()
            .gather(1, batch.actions.clone())
            .flatten(0, 1);

        // Advantage is a weight on the log-prob, not a gradient path.
        let advantages = (targets - values).detach();
        let policy_loss = -(chosen_log_probs * advantages).mean();

        let per_row_entropy: Tensor<B, 1> = (-(probs * log_probs).sum_dim(1)).flatten(0, 1);
        let entropy = per_row_entropy.mean();

        let losses = StepLosses {
            policy: scalar(&policy_loss),
            value: scalar(&value_loss),
            entropy: scalar(&entropy),
        };

        let total = policy_loss
            + value_loss.mul_scalar(self.config.value_coef)
            - entropy.mul_scalar(self.config.entropy_coef);

        let grads = total.backward();
        let grads = GradientsParams::from_grads(grads, &model);
        let model = optimizer.step(self.config.learning_rate, model, grads);

        (model, losses)
    }

    /// One-step Bellman targets: `r + gamma * V(s')` for rows with a
    /// successor, the bare reward otherwise. The successor values come
    /// from a frozen copy of the network.
    fn bellman_targets(&self, model: &PolicyNet<B>, batch: &BatchData<B>) -> Vec<f32> {
        let mut targets = batch.rewards.clone();
        if let Some(next_states) = &batch.next_states {
            let frozen = model.valid();
            let (_, next_values) = frozen.forward(next_states.clone());
            let next_values = next_values.into_data();
            let next_values: &[f32] = next_values.as_slice().expect("value layout");
            for (k, &i) in batch.bootstrap_idx.iter().enumerate() {
                targets[i] += self.config.gamma * next_values[k];
            }
        }
        targets
    }

    /// Read a batch of record files into flat tensors. Unreadable files
    /// are skipped with a warning; the batch shrinks accordingly.
    fn load_batch(&self, files: &[PathBuf]) -> BatchData<B> {
        let mut features: Vec<f32> = Vec::new();
        let mut actions: Vec<i32> = Vec::new();
        let mut rewards: Vec<f32> = Vec::new();
        let mut bootstrap_idx: Vec<usize> = Vec::new();
        let mut next_features: Vec<f32> = Vec::new();

        for path in files {
            let rows = match read_record(path) {
                Ok(rows) => rows,
                Err(e) => {
                    log::warn!("skipping unreadable record {}: {}", path.display(), e);
                    continue;
                }
            };
            for (i, row) in rows.iter().enumerate() {
                // MPC-collected rows carry no action index; snap the raw
                // control to the nearest grid cell.
                let action = row.action_idx.unwrap_or_else(|| {
                    self.grid.encode(Control {
                        steer: row.steer,
                        gas_brake: row.gas_brake,
                    })
                });

                features.extend_from_slice(&row.features());
                actions.push(action as i32);
                rewards.push(row.reward);

                if !row.done {
                    if let Some(next) = rows.get(i + 1) {
                        bootstrap_idx.push(rewards.len() - 1);
                        next_features.extend_from_slice(&next.features());
                    }
                }
            }
        }

        let len = rewards.len();
        if len == 0 {
            let device = &self.device;
            return BatchData {
                states: Tensor::zeros([1, OBS_SIZE], device),
                actions: Tensor::zeros([1, 1], device),
                rewards,
                bootstrap_idx,
                next_states: None,
                len: 0,
            };
        }

        let states = Tensor::<B, 1>::from_floats(features.as_slice(), &self.device)
            .reshape([len, OBS_SIZE]);
        let actions = Tensor::<B, 1, Int>::from_ints(actions.as_slice(), &self.device)
            .reshape([len, 1]);
        let next_states = if bootstrap_idx.is_empty() {
            None
        } else {
            Some(
                Tensor::<B::InnerBackend, 1>::from_floats(next_features.as_slice(), &self.device)
                    .reshape([bootstrap_idx.len(), OBS_SIZE]),
            )
        };

        BatchData {
            states,
            actions,
            rewards,
            bootstrap_idx,
            next_states,
            len,
        }
    }
}

fn scalar<B: burn::tensor::backend::Backend>(t: &Tensor<B, 1>) -> f32 {
    t.clone().into_data().as_slice::<f32>().expect("scalar layout")[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy_slot::policy_slot;
    use crate::core::state::{StateDelta, VehicleState};
    use crate::core::transition::{Action, Transition};
    use crate::episode::record::RecordWriter;
    use crate::metrics::NullLogger;
    use burn::backend::{Autodiff, NdArray};
    use std::collections::HashMap;

    type TB = Autodiff<NdArray<f32>>;

    fn state(step: usize, x: f32) -> VehicleState {
        VehicleState {
            step,
            velocity: 12.0,
            location: [x, 0.0, 0.0],
            yaw: 0.0,
            distance_to_target: 100.0 - x,
            collisions: 0,
            target_offset: [8.0, 0.0, 0.0],
            sensors: HashMap::new(),
        }
    }

    fn write_episode(dir: &std::path::Path, id: usize, n_steps: usize, terminal: bool) {
        let path = dir.join(format!("episode_{:06}.csv", id));
        let mut writer = RecordWriter::create(&path).unwrap();
        let action = Action {
            control: Control {
                steer: 0.0,
                gas_brake: 0.8,
            },
            index: Some(3),
            state_value: Some(0.5),
        };
        for step in 0..n_steps {
            let x = step as f32 * 2.0;
            let last = step == n_steps - 1;
            if last && terminal {
                writer
                    .append(&Transition::terminal(state(step, x), action.clone(), -100.0))
                    .unwrap();
            } else {
                let next = StateDelta {
                    velocity: 12.0,
                    location: [x + 2.0, 0.0, 0.0],
                };
                writer
                    .append(&Transition::step(state(step, x), action.clone(), 2.0, next))
                    .unwrap();
            }
        }
        writer.finalize(0.99).unwrap();
    }

    fn config(dir: &std::path::Path) -> DriveConfig {
        DriveConfig::default()
            .with_data_dir(dir)
            .with_batch_size(2)
            .with_epochs(5)
            .with_seed(11)
    }

    #[test]
    fn test_train_runs_and_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        for id in 0..4 {
            write_episode(dir.path(), id, 6, true);
        }

        let device = Default::default();
        let mut trainer = A2cTrainer::<TB>::new(config(dir.path()), device).unwrap();
        let model = PolicyNet::<TB>::new(&Default::default());
        let mut optimizer = create_optimizer::<TB>();

        let trained = trainer
            .train(model, &mut optimizer, &mut NullLogger)
            .unwrap();
        assert_eq!(trained.n_actions(), ActionGrid::default().len());

        // checkpoint_interval is 5 and we ran 5 epochs.
        let checkpoints = trainer.checkpointer().list().unwrap();
        assert_eq!(checkpoints.len(), 1);
        assert_eq!(checkpoints[0].epoch, 5);

        // The save carries the epoch's average reward, so a best model
        // is tracked alongside the interval checkpoints.
        assert!(dir.path().join("checkpoints/best.bin").exists());
    }

    #[test]
    fn test_terminal_rows_have_no_bootstrap() {
        let dir = tempfile::tempdir().unwrap();
        // Single-row terminal episodes: nothing to bootstrap from.
        write_episode(dir.path(), 0, 1, true);

        let device = Default::default();
        let trainer = A2cTrainer::<TB>::new(config(dir.path()), device).unwrap();
        let files = crate::training::batch::discover_records(dir.path()).unwrap();
        let batch = trainer.load_batch(&files);

        assert_eq!(batch.len, 1);
        assert!(batch.bootstrap_idx.is_empty());
        assert!(batch.next_states.is_none());

        let model = PolicyNet::<TB>::new(&Default::default());
        let targets = trainer.bellman_targets(&model, &batch);
        assert_eq!(targets, batch.rewards);
    }

    #[test]
    fn test_bootstrap_adds_discounted_next_value() {
        let dir = tempfile::tempdir().unwrap();
        write_episode(dir.path(), 0, 3, true);

        let device: <TB as burn::tensor::backend::Backend>::Device = Default::default();
        let trainer = A2cTrainer::<TB>::new(config(dir.path()), device.clone()).unwrap();
        let files = crate::training::batch::discover_records(dir.path()).unwrap();
        let batch = trainer.load_batch(&files);

        assert_eq!(batch.len, 3);
        assert_eq!(batch.bootstrap_idx, vec![0, 1]);

        let model = PolicyNet::<TB>::new(&device);
        let targets = trainer.bellman_targets(&model, &batch);

        // Recompute V(s') by hand with the frozen network.
        let frozen = model.valid();
        let (_, next_values) = frozen.forward(batch.next_states.clone().unwrap());
        let next_values = next_values.into_data();
        let next_values = next_values.as_slice::<f32>().unwrap();

        let gamma = trainer.config.gamma;
        assert!((targets[0] - (2.0 + gamma * next_values[0])).abs() < 1e-5);
        assert!((targets[1] - (2.0 + gamma * next_values[1])).abs() < 1e-5);
        // Terminal row keeps the raw reward.
        assert_eq!(targets[2], -100.0);
    }

    #[test]
    fn test_non_finite_control_rows_still_load() {
        let dir = tempfile::tempdir().unwrap();
        // A corrupt record can carry NaN controls with no action index;
        // loading must snap them to some grid cell, not panic.
        let path = dir.path().join("episode_000000.csv");
        std::fs::write(
            &path,
            "step,velocity,x,y,z,yaw,distance,collisions,tx,ty,tz,steer,gas_brake,action_idx,state_value,reward,done,q\n\
             0,10,0,0,0,0,50,0,8,0,0,NaN,0.8,,,0.5,0,\n",
        )
        .unwrap();

        let device = Default::default();
        let trainer = A2cTrainer::<TB>::new(config(dir.path()), device).unwrap();
        let batch = trainer.load_batch(&[path]);
        assert_eq!(batch.len, 1);
    }

    #[test]
    fn test_empty_records_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        // Header-only files: batches form but carry no transitions.
        for id in 0..4 {
            let path = dir.path().join(format!("episode_{:06}.csv", id));
            drop(RecordWriter::create(&path).unwrap());
        }

        let device = Default::default();
        let mut trainer = A2cTrainer::<TB>::new(config(dir.path()), device).unwrap();
        let model = PolicyNet::<TB>::new(&Default::default());
        let mut optimizer = create_optimizer::<TB>();

        // Must not panic or step; just skips every batch.
        trainer
            .train(model, &mut optimizer, &mut NullLogger)
            .unwrap();
        assert!(trainer.checkpointer().list().unwrap().is_empty());
    }

    #[test]
    fn test_publishes_snapshot_each_epoch() {
        let dir = tempfile::tempdir().unwrap();
        for id in 0..2 {
            write_episode(dir.path(), id, 4, false);
        }

        let device: <TB as burn::tensor::backend::Backend>::Device = Default::default();
        let slot = policy_slot(PolicyNet::<NdArray<f32>>::new(&device));
        let mut trainer = A2cTrainer::<TB>::new(config(dir.path()).with_epochs(3), device.clone())
            .unwrap()
            .with_policy_slot(slot.clone());

        let model = PolicyNet::<TB>::new(&device);
        let mut optimizer = create_optimizer::<TB>();
        trainer
            .train(model, &mut optimizer, &mut NullLogger)
            .unwrap();

        // Initial snapshot is version 1; one publish per epoch follows.
        assert_eq!(slot.version(), 4);
    }
}
