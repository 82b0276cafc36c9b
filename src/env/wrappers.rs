use crate::{
    common::spaces::Space,
    env::{
        base::{Env, EnvError, EnvObservation, Info, ResetOptions, RewardRange},
        render::{RenderFrame, RenderMode},
    },
};

/// Truncates episodes once `max_steps` steps have been taken since the
/// last reset.
pub struct TimeLimitWrapper<O, A> {
    env: Box<dyn Env<O, A>>,
    max_steps: usize,
    curr_steps: usize,
}

impl<O, A> TimeLimitWrapper<O, A> {
    pub fn new(env: Box<dyn Env<O, A>>, max_steps: usize) -> Self {
        Self {
            env,
            max_steps,
            curr_steps: 0,
        }
    }

    pub fn elapsed_steps(&self) -> usize {
        self.curr_steps
    }
}

impl<O, A> Env<O, A> for TimeLimitWrapper<O, A> {
    fn step(&mut self, action: &A) -> Result<EnvObservation<O>, EnvError> {
        let mut step_result = self.env.step(action)?;

        self.curr_steps += 1;
        step_result.truncated |= self.curr_steps >= self.max_steps;

        Ok(step_result)
    }

    fn reset(
        &mut self,
        seed: Option<u64>,
        options: Option<ResetOptions>,
    ) -> Result<(O, Info<O>), EnvError> {
        self.curr_steps = 0;

        self.env.reset(seed, options)
    }

    fn action_space(&self) -> Box<dyn Space<A>> {
        self.env.action_space()
    }

    fn observation_space(&self) -> Box<dyn Space<O>> {
        self.env.observation_space()
    }

    fn reward_range(&self) -> RewardRange {
        self.env.reward_range()
    }

    fn render(&mut self) -> Result<Option<RenderFrame>, EnvError> {
        self.env.render()
    }

    fn render_mode(&self) -> Option<RenderMode> {
        self.env.render_mode()
    }

    fn close(&mut self) {
        self.env.close()
    }

    fn unwrapped(&self) -> &dyn Env<O, A> {
        self.env.unwrapped()
    }
}
