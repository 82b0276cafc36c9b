use core::fmt::Debug;

use crate::{env::base::EnvObservation, runner::EpisodeStats};

/// Hooks called at fixed points of a run. Callbacks allow extra
/// functionality (recording, assertions, live plots) without
/// modifying the core loop.
pub trait RunCallback<O: Clone + Debug> {
    fn on_run_start(&mut self, _steps: usize) {}

    fn on_step(&mut self, _step: usize, _env_obs: &EnvObservation<O>) {}

    fn on_episode_end(&mut self, _episode: usize, _stats: &EpisodeStats) {}

    fn on_run_end(&mut self, _steps_taken: usize) {}
}

// A stub callback that does nothing.
pub struct EmptyCallback {}

impl<O: Clone + Debug> RunCallback<O> for EmptyCallback {}
