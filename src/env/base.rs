use std::collections::HashMap;

use thiserror::Error;

use crate::{
    common::{logger::LogData, spaces::Space},
    env::render::{RenderFrame, RenderMode},
};

#[derive(Debug, Clone)]
pub enum InfoData<O> {
    String(String),
    Float(f32),
    Int(i32),
    Obs(O),
    InfoDict(Info<O>),
}

pub type ResetOptions = HashMap<String, LogData>;
pub type Info<O> = HashMap<String, InfoData<O>>;

#[derive(Clone, Debug)]
pub struct EnvObservation<O> {
    pub obs: O,
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
    pub info: Info<O>,
}

impl<O> EnvObservation<O> {
    /// The episode is over, whether by reaching a terminal state or by
    /// being cut short.
    pub fn done(&self) -> bool {
        self.terminated | self.truncated
    }
}

#[derive(Clone, Debug, Copy, PartialEq)]
pub struct RewardRange {
    pub low: f32,
    pub high: f32,
}

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("cannot call step() before reset() or after the episode is done")]
    ResetNeeded,
    #[error("invalid action {0}")]
    InvalidAction(String),
    #[error("unknown environment id \"{0}\"")]
    UnknownEnv(String),
    #[error("render mode \"{0}\" is not supported")]
    UnsupportedRenderMode(String),
    #[error("render failed: {0}")]
    Render(String),
    #[error("environment has been closed")]
    Closed,
    #[error("invalid reset option \"{0}\"")]
    InvalidResetOption(String),
}

pub trait Env<O, A> {
    /// Advances the environment by one timestep.
    fn step(&mut self, action: &A) -> Result<EnvObservation<O>, EnvError>;

    /// Starts a new episode. A `seed` reseeds the environment's generator.
    fn reset(
        &mut self,
        seed: Option<u64>,
        options: Option<ResetOptions>,
    ) -> Result<(O, Info<O>), EnvError>;

    fn action_space(&self) -> Box<dyn Space<A>>;

    fn observation_space(&self) -> Box<dyn Space<O>>;

    fn reward_range(&self) -> RewardRange;

    /// Renders the current state according to `render_mode`. Returns
    /// `None` when no render mode is set or the mode has no return value.
    fn render(&mut self) -> Result<Option<RenderFrame>, EnvError>;

    fn render_mode(&self) -> Option<RenderMode>;

    /// Releases rendering resources. Safe to call more than once.
    fn close(&mut self);

    fn unwrapped(&self) -> &dyn Env<O, A>;
}
