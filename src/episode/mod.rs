//! Episode execution.
//!
//! [`runner::EpisodeRunner`] drives a single episode; [`run_episodes`]
//! collects a session of them, logging each outcome. Controller and record
//! failures abort only the episode they occur in; simulator failures end
//! the session.

pub mod record;
pub mod runner;

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::DriveConfig;
use crate::control::Controller;
use crate::core::track::Track;
use crate::metrics::{EpisodeSummary, MetricsLogger};
use crate::sim::SimWorld;

pub use record::{read_record, update_returns, RecordError, RecordRow, RecordWriter};
pub use runner::{EpisodeError, EpisodeRunner};

/// Terminal status of a finished episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeStatus {
    /// Distance to target dropped below the success threshold.
    Succeeded,
    /// A collision ended the episode.
    Failed,
    /// Step budget exhausted or interrupted; no terminal transition.
    Truncated,
}

impl fmt::Display for EpisodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EpisodeStatus::Succeeded => "succeeded",
            EpisodeStatus::Failed => "failed",
            EpisodeStatus::Truncated => "truncated",
        };
        f.write_str(name)
    }
}

/// Result of one finished episode.
#[derive(Debug, Clone)]
pub struct EpisodeOutcome {
    pub episode_id: u64,
    pub status: EpisodeStatus,
    /// Transitions recorded.
    pub steps: usize,
    /// Discounted return from the first step.
    pub total_return: f32,
    /// Distance to target at the last observed state.
    pub final_distance: f32,
    /// Finalized record file.
    pub record_path: PathBuf,
}

/// Collect `n_episodes` episodes back to back with one controller.
///
/// Episode-local failures (controller rejection, record IO) are logged and
/// skipped; the next episode starts fresh. Simulator failures propagate,
/// since nothing further can run against a dead world. An interrupt flag
/// set between episodes stops the session early.
pub fn run_episodes<W: SimWorld, C: Controller>(
    world: &mut W,
    controller: &mut C,
    track: &Track,
    config: &DriveConfig,
    n_episodes: usize,
    interrupt: Option<&AtomicBool>,
    logger: &mut dyn MetricsLogger,
) -> Result<Vec<EpisodeOutcome>, EpisodeError> {
    let mut outcomes = Vec::with_capacity(n_episodes);

    for episode_id in 0..n_episodes as u64 {
        if let Some(flag) = interrupt {
            if flag.load(Ordering::Relaxed) {
                log::info!("interrupted after {} episodes", outcomes.len());
                break;
            }
        }

        let mut runner = EpisodeRunner::new(world, controller, track, config, episode_id);
        if let Some(flag) = interrupt {
            runner = runner.with_interrupt(flag);
        }

        match runner.run() {
            Ok(outcome) => {
                logger.log_episode(&EpisodeSummary::from(&outcome));
                outcomes.push(outcome);
            }
            Err(fatal @ EpisodeError::Sim(_)) => {
                logger.flush();
                return Err(fatal);
            }
            Err(recoverable) => {
                log::error!("episode {} aborted: {}", episode_id, recoverable);
            }
        }
    }

    logger.flush();
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlError;
    use crate::core::state::VehicleState;
    use crate::core::transition::{Action, Control};
    use crate::metrics::NullLogger;
    use crate::sim::synthetic::SyntheticTrack;
    use crate::sim::SimError;
    use std::time::Duration;

    struct StraightDriver;

    impl Controller for StraightDriver {
        fn decide(&mut self, _state: &VehicleState) -> Result<Action, ControlError> {
            Ok(Action::plain(Control {
                steer: 0.0,
                gas_brake: 0.8,
            }))
        }
    }

    /// Fails every decision in one chosen episode, succeeds otherwise.
    struct FlakyDriver {
        episode: u64,
        current: u64,
        calls_this_episode: usize,
    }

    impl Controller for FlakyDriver {
        fn decide(&mut self, state: &VehicleState) -> Result<Action, ControlError> {
            if state.step == 0 && self.calls_this_episode > 0 {
                self.current += 1;
                self.calls_this_episode = 0;
            }
            self.calls_this_episode += 1;
            if self.current == self.episode {
                return Err(ControlError::InvalidState { field: "velocity" });
            }
            Ok(Action::plain(Control {
                steer: 0.0,
                gas_brake: 0.8,
            }))
        }
    }

    fn config(dir: &std::path::Path) -> DriveConfig {
        DriveConfig::default()
            .with_max_steps(50)
            .with_data_dir(dir)
            .with_stabilize_delay(Duration::ZERO)
    }

    #[test]
    fn test_collects_requested_episode_count() {
        let dir = tempfile::tempdir().unwrap();
        let track = Track::new(vec![[0.0, 0.0, 0.0], [400.0, 0.0, 0.0]]);
        let mut world = SyntheticTrack::new(track.clone(), 4.0);
        let mut controller = StraightDriver;

        let outcomes = run_episodes(
            &mut world,
            &mut controller,
            &track,
            &config(dir.path()),
            3,
            None,
            &mut NullLogger,
        )
        .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(
            outcomes.iter().map(|o| o.episode_id).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        for outcome in &outcomes {
            assert!(outcome.record_path.exists());
        }
    }

    #[test]
    fn test_controller_failure_skips_only_that_episode() {
        let dir = tempfile::tempdir().unwrap();
        let track = Track::new(vec![[0.0, 0.0, 0.0], [400.0, 0.0, 0.0]]);
        let mut world = SyntheticTrack::new(track.clone(), 4.0);
        let mut controller = FlakyDriver {
            episode: 1,
            current: 0,
            calls_this_episode: 0,
        };

        let outcomes = run_episodes(
            &mut world,
            &mut controller,
            &track,
            &config(dir.path()),
            3,
            None,
            &mut NullLogger,
        )
        .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert_eq!(
            outcomes.iter().map(|o| o.episode_id).collect::<Vec<_>>(),
            vec![0, 2]
        );
        assert!(!world.has_vehicle());
    }

    #[test]
    fn test_simulator_failure_ends_session() {
        let dir = tempfile::tempdir().unwrap();
        let track = Track::new(vec![[0.0, 0.0, 0.0], [400.0, 0.0, 0.0]]);
        let mut world = SyntheticTrack::new(track.clone(), 4.0);
        world.fail_after_ticks(20);
        let mut controller = StraightDriver;

        let err = run_episodes(
            &mut world,
            &mut controller,
            &track,
            &config(dir.path()),
            5,
            None,
            &mut NullLogger,
        )
        .unwrap_err();

        assert!(matches!(err, EpisodeError::Sim(SimError::Unavailable(_))));
    }
}
