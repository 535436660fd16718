//! Run metrics and logging backends.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use crate::episode::{EpisodeOutcome, EpisodeStatus};

/// Per-episode summary for logging.
#[derive(Debug, Clone)]
pub struct EpisodeSummary {
    pub episode_id: u64,
    pub status: EpisodeStatus,
    /// Transitions recorded.
    pub steps: usize,
    /// Discounted return from the first step.
    pub total_return: f32,
    /// Distance to target at the last observed state.
    pub final_distance: f32,
}

impl From<&EpisodeOutcome> for EpisodeSummary {
    fn from(outcome: &EpisodeOutcome) -> Self {
        Self {
            episode_id: outcome.episode_id,
            status: outcome.status,
            steps: outcome.steps,
            total_return: outcome.total_return,
            final_distance: outcome.final_distance,
        }
    }
}

/// Per-epoch training snapshot for logging.
#[derive(Debug, Clone)]
pub struct TrainingSnapshot {
    pub epoch: usize,
    /// Batches consumed this epoch.
    pub batches: usize,
    /// Transitions consumed this epoch.
    pub transitions: usize,
    pub policy_loss: f32,
    pub value_loss: f32,
    pub entropy: f32,
    pub learning_rate: f64,
}

impl TrainingSnapshot {
    pub fn new(epoch: usize, batches: usize, transitions: usize) -> Self {
        Self {
            epoch,
            batches,
            transitions,
            policy_loss: 0.0,
            value_loss: 0.0,
            entropy: 0.0,
            learning_rate: 0.0,
        }
    }

    pub fn with_losses(mut self, policy_loss: f32, value_loss: f32, entropy: f32) -> Self {
        self.policy_loss = policy_loss;
        self.value_loss = value_loss;
        self.entropy = entropy;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }
}

/// Logging backend for episode and training metrics.
pub trait MetricsLogger {
    fn log_episode(&mut self, summary: &EpisodeSummary);

    fn log_training(&mut self, snapshot: &TrainingSnapshot);

    /// Flush any buffered output.
    fn flush(&mut self);
}

/// Logger that routes through the `log` facade.
pub struct ConsoleLogger {
    start_time: Instant,
}

impl ConsoleLogger {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsLogger for ConsoleLogger {
    fn log_episode(&mut self, summary: &EpisodeSummary) {
        log::info!(
            "episode {:>5} {:>9} steps={:>5} return={:>10.2} final_distance={:>8.2} elapsed={:.1}s",
            summary.episode_id,
            summary.status,
            summary.steps,
            summary.total_return,
            summary.final_distance,
            self.start_time.elapsed().as_secs_f32(),
        );
    }

    fn log_training(&mut self, snapshot: &TrainingSnapshot) {
        log::info!(
            "epoch {:>4} batches={:>4} transitions={:>7} policy={:>10.4} value={:>10.4} entropy={:>8.4}",
            snapshot.epoch,
            snapshot.batches,
            snapshot.transitions,
            snapshot.policy_loss,
            snapshot.value_loss,
            snapshot.entropy,
        );
    }

    fn flush(&mut self) {}
}

/// CSV file logger for offline analysis. Episodes and training epochs go
/// to separate files since their columns differ.
pub struct CsvLogger {
    episodes: BufWriter<File>,
    training: BufWriter<File>,
    start_time: Instant,
}

impl CsvLogger {
    /// Create `episodes.csv` and `training.csv` under `dir`.
    pub fn new(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let mut episodes = BufWriter::new(File::create(dir.join("episodes.csv"))?);
        writeln!(
            episodes,
            "episode_id,status,steps,total_return,final_distance,elapsed_secs"
        )?;

        let mut training = BufWriter::new(File::create(dir.join("training.csv"))?);
        writeln!(
            training,
            "epoch,batches,transitions,policy_loss,value_loss,entropy,learning_rate,elapsed_secs"
        )?;

        Ok(Self {
            episodes,
            training,
            start_time: Instant::now(),
        })
    }
}

impl MetricsLogger for CsvLogger {
    fn log_episode(&mut self, summary: &EpisodeSummary) {
        let _ = writeln!(
            self.episodes,
            "{},{},{},{:.4},{:.4},{:.2}",
            summary.episode_id,
            summary.status,
            summary.steps,
            summary.total_return,
            summary.final_distance,
            self.start_time.elapsed().as_secs_f32(),
        );
    }

    fn log_training(&mut self, snapshot: &TrainingSnapshot) {
        let _ = writeln!(
            self.training,
            "{},{},{},{:.6},{:.6},{:.6},{:.8},{:.2}",
            snapshot.epoch,
            snapshot.batches,
            snapshot.transitions,
            snapshot.policy_loss,
            snapshot.value_loss,
            snapshot.entropy,
            snapshot.learning_rate,
            self.start_time.elapsed().as_secs_f32(),
        );
    }

    fn flush(&mut self) {
        let _ = self.episodes.flush();
        let _ = self.training.flush();
    }
}

impl Drop for CsvLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Logger that discards everything.
pub struct NullLogger;

impl MetricsLogger for NullLogger {
    fn log_episode(&mut self, _summary: &EpisodeSummary) {}

    fn log_training(&mut self, _snapshot: &TrainingSnapshot) {}

    fn flush(&mut self) {}
}

/// Fan-out to several backends.
pub struct MultiLogger {
    loggers: Vec<Box<dyn MetricsLogger>>,
}

impl MultiLogger {
    pub fn new() -> Self {
        Self {
            loggers: Vec::new(),
        }
    }

    pub fn add<L: MetricsLogger + 'static>(mut self, logger: L) -> Self {
        self.loggers.push(Box::new(logger));
        self
    }
}

impl Default for MultiLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsLogger for MultiLogger {
    fn log_episode(&mut self, summary: &EpisodeSummary) {
        for logger in &mut self.loggers {
            logger.log_episode(summary);
        }
    }

    fn log_training(&mut self, snapshot: &TrainingSnapshot) {
        for logger in &mut self.loggers {
            logger.log_training(snapshot);
        }
    }

    fn flush(&mut self) {
        for logger in &mut self.loggers {
            logger.flush();
        }
    }
}
