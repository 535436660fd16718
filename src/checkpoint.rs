//! Policy checkpointing.
//!
//! Saves the policy network at a fixed epoch interval, keeps a bounded
//! history on disk, and tracks the best model by a caller-supplied metric
//! (average episode return).

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Checkpointer configuration.
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    /// Directory to store checkpoints.
    pub checkpoint_dir: PathBuf,
    /// Epochs between checkpoint saves.
    pub save_interval: usize,
    /// Number of recent checkpoints to keep (0 = keep all).
    pub keep_last_n: usize,
    /// Whether to track and save the best model.
    pub save_best: bool,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("./checkpoints"),
            save_interval: 5,
            keep_last_n: 10,
            save_best: true,
        }
    }
}

impl CheckpointConfig {
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_save_interval(mut self, interval: usize) -> Self {
        self.save_interval = interval;
        self
    }

    pub fn with_keep_last_n(mut self, n: usize) -> Self {
        self.keep_last_n = n;
        self
    }

    pub fn with_save_best(mut self, save_best: bool) -> Self {
        self.save_best = save_best;
        self
    }
}

/// Checkpointing failures.
#[derive(Debug)]
pub enum CheckpointError {
    Io(io::Error),
    /// Burn recorder error.
    Recorder(String),
    /// No checkpoints found in the directory.
    NoCheckpoints,
}

impl std::fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointError::Io(e) => write!(f, "IO error: {}", e),
            CheckpointError::Recorder(e) => write!(f, "recorder error: {}", e),
            CheckpointError::NoCheckpoints => write!(f, "no checkpoints found"),
        }
    }
}

impl std::error::Error for CheckpointError {}

impl From<io::Error> for CheckpointError {
    fn from(e: io::Error) -> Self {
        CheckpointError::Io(e)
    }
}

/// Checkpoint metadata.
#[derive(Debug, Clone)]
pub struct CheckpointInfo {
    pub path: PathBuf,
    /// Epoch at which the checkpoint was saved.
    pub epoch: usize,
    /// Metric value at save time, if provided.
    pub metric: Option<f32>,
}

const PREFIX: &str = "policy_";
const SUFFIX: &str = ".bin";

/// Saves policy snapshots during training and reloads them for rollout.
pub struct Checkpointer {
    config: CheckpointConfig,
    best_metric: f32,
    history: Vec<CheckpointInfo>,
}

impl Checkpointer {
    /// Create the checkpoint directory if needed.
    pub fn new(config: CheckpointConfig) -> Result<Self, CheckpointError> {
        fs::create_dir_all(&config.checkpoint_dir)?;
        Ok(Self {
            config,
            best_metric: f32::NEG_INFINITY,
            history: Vec::new(),
        })
    }

    pub fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    /// Whether the given epoch is on the save interval.
    pub fn should_save(&self, epoch: usize) -> bool {
        epoch > 0 && epoch % self.config.save_interval == 0
    }

    /// Save a policy snapshot for an epoch.
    pub fn save<B: Backend, M: Module<B>>(
        &mut self,
        model: &M,
        epoch: usize,
        metric: Option<f32>,
    ) -> Result<PathBuf, CheckpointError> {
        let path = self
            .config
            .checkpoint_dir
            .join(format!("{}{:05}{}", PREFIX, epoch, SUFFIX));

        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        model
            .clone()
            .save_file(&path, &recorder)
            .map_err(|e| CheckpointError::Recorder(e.to_string()))?;

        self.history.push(CheckpointInfo {
            path: path.clone(),
            epoch,
            metric,
        });

        if self.config.save_best {
            if let Some(m) = metric {
                if m > self.best_metric {
                    self.best_metric = m;
                    let best_path = self.config.checkpoint_dir.join("best.bin");
                    model
                        .clone()
                        .save_file(&best_path, &recorder)
                        .map_err(|e| CheckpointError::Recorder(e.to_string()))?;
                }
            }
        }

        self.cleanup_old();
        Ok(path)
    }

    /// Load a policy from a checkpoint file into a freshly built template.
    pub fn load<B: Backend, M: Module<B>>(
        &self,
        model_template: M,
        path: &Path,
        device: &B::Device,
    ) -> Result<M, CheckpointError> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        model_template
            .load_file(path, &recorder, device)
            .map_err(|e| CheckpointError::Recorder(e.to_string()))
    }

    /// Load the best-metric policy.
    pub fn load_best<B: Backend, M: Module<B>>(
        &self,
        model_template: M,
        device: &B::Device,
    ) -> Result<M, CheckpointError> {
        let best_path = self.config.checkpoint_dir.join("best.bin");
        if !best_path.exists() {
            return Err(CheckpointError::NoCheckpoints);
        }
        self.load(model_template, &best_path, device)
    }

    /// Load the most recent epoch checkpoint, returning it with its epoch.
    pub fn load_latest<B: Backend, M: Module<B>>(
        &self,
        model_template: M,
        device: &B::Device,
    ) -> Result<(M, usize), CheckpointError> {
        let latest = self
            .list()?
            .pop()
            .ok_or(CheckpointError::NoCheckpoints)?;
        let model = self.load(model_template, &latest.path, device)?;
        Ok((model, latest.epoch))
    }

    /// All epoch checkpoints on disk, oldest first.
    pub fn list(&self) -> Result<Vec<CheckpointInfo>, CheckpointError> {
        let mut checkpoints: Vec<CheckpointInfo> = fs::read_dir(&self.config.checkpoint_dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                let filename = path.file_name()?.to_str()?;
                let epoch = filename
                    .strip_prefix(PREFIX)?
                    .strip_suffix(SUFFIX)?
                    .parse()
                    .ok()?;
                Some(CheckpointInfo {
                    path,
                    epoch,
                    metric: None,
                })
            })
            .collect();
        checkpoints.sort_by_key(|c| c.epoch);
        Ok(checkpoints)
    }

    fn cleanup_old(&mut self) {
        if self.config.keep_last_n == 0 {
            return;
        }
        while self.history.len() > self.config.keep_last_n {
            let old = self.history.remove(0);
            let _ = fs::remove_file(&old.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::policy::PolicyNet;
    use crate::core::state::OBS_SIZE;
    use burn::backend::NdArray;
    use burn::tensor::Tensor;
    use tempfile::tempdir;

    type B = NdArray<f32>;

    // Logits on a fixed input, to compare model parameters by behavior.
    fn fingerprint(model: &PolicyNet<B>, device: &<B as Backend>::Device) -> Vec<f32> {
        let obs = Tensor::<B, 2>::ones([1, OBS_SIZE], device);
        let (logits, _) = model.forward(obs);
        logits.into_data().as_slice::<f32>().unwrap().to_vec()
    }

    #[test]
    fn test_config_builders() {
        let config = CheckpointConfig::new("./ckpts")
            .with_save_interval(3)
            .with_keep_last_n(2)
            .with_save_best(false);
        assert_eq!(config.checkpoint_dir, PathBuf::from("./ckpts"));
        assert_eq!(config.save_interval, 3);
        assert_eq!(config.keep_last_n, 2);
        assert!(!config.save_best);
    }

    #[test]
    fn test_should_save_on_interval() {
        let dir = tempdir().unwrap();
        let checkpointer =
            Checkpointer::new(CheckpointConfig::new(dir.path()).with_save_interval(5)).unwrap();

        assert!(!checkpointer.should_save(0));
        assert!(!checkpointer.should_save(4));
        assert!(checkpointer.should_save(5));
        assert!(!checkpointer.should_save(7));
        assert!(checkpointer.should_save(10));
    }

    #[test]
    fn test_creates_nested_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("runs/ckpts");
        let _checkpointer = Checkpointer::new(CheckpointConfig::new(&nested)).unwrap();
        assert!(nested.exists());
    }

    #[test]
    fn test_list_is_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("policy_00010.bin"), b"x").unwrap();
        std::fs::write(dir.path().join("policy_00005.bin"), b"x").unwrap();
        std::fs::write(dir.path().join("best.bin"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let checkpointer = Checkpointer::new(CheckpointConfig::new(dir.path())).unwrap();
        let list = checkpointer.list().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].epoch, 5);
        assert_eq!(list[1].epoch, 10);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let mut checkpointer = Checkpointer::new(CheckpointConfig::new(dir.path())).unwrap();

        let model = PolicyNet::<B>::new(&device);
        let saved = fingerprint(&model, &device);
        let path = checkpointer.save(&model, 5, None).unwrap();

        // Full-precision records restore the exact parameters.
        let template = PolicyNet::<B>::new(&device);
        let loaded = checkpointer.load(template, &path, &device).unwrap();
        assert_eq!(fingerprint(&loaded, &device), saved);
    }

    #[test]
    fn test_load_latest_picks_newest_epoch() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let mut checkpointer = Checkpointer::new(CheckpointConfig::new(dir.path())).unwrap();

        let old = PolicyNet::<B>::new(&device);
        let new = PolicyNet::<B>::new(&device);
        checkpointer.save(&old, 5, None).unwrap();
        checkpointer.save(&new, 10, None).unwrap();

        let template = PolicyNet::<B>::new(&device);
        let (loaded, epoch) = checkpointer.load_latest(template, &device).unwrap();
        assert_eq!(epoch, 10);
        assert_eq!(fingerprint(&loaded, &device), fingerprint(&new, &device));
    }

    #[test]
    fn test_load_best_keeps_highest_metric() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let mut checkpointer = Checkpointer::new(CheckpointConfig::new(dir.path())).unwrap();

        let strong = PolicyNet::<B>::new(&device);
        let weak = PolicyNet::<B>::new(&device);
        checkpointer.save(&strong, 5, Some(1.0)).unwrap();
        // A later save with a worse metric must not displace the best model.
        checkpointer.save(&weak, 10, Some(0.5)).unwrap();

        let template = PolicyNet::<B>::new(&device);
        let best = checkpointer.load_best(template, &device).unwrap();
        assert_eq!(fingerprint(&best, &device), fingerprint(&strong, &device));
    }

    #[test]
    fn test_load_best_without_saves_errors() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let checkpointer = Checkpointer::new(CheckpointConfig::new(dir.path())).unwrap();

        let template = PolicyNet::<B>::new(&device);
        assert!(matches!(
            checkpointer.load_best(template, &device),
            Err(CheckpointError::NoCheckpoints)
        ));
    }
}
