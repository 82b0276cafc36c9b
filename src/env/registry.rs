use std::path::PathBuf;

use crate::env::{
    base::{Env, EnvError},
    classic_control::cartpole::CartpoleEnv,
    render::RenderMode,
    wrappers::TimeLimitWrapper,
};

/// Registration data for a named environment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvSpec {
    pub id: &'static str,
    pub max_episode_steps: usize,
    pub reward_threshold: f32,
}

pub const CARTPOLE_V0: EnvSpec = EnvSpec {
    id: "CartPole-v0",
    max_episode_steps: 200,
    reward_threshold: 195.0,
};

pub const CARTPOLE_V1: EnvSpec = EnvSpec {
    id: "CartPole-v1",
    max_episode_steps: 500,
    reward_threshold: 475.0,
};

const REGISTRY: [EnvSpec; 2] = [CARTPOLE_V0, CARTPOLE_V1];

pub fn spec(id: &str) -> Result<EnvSpec, EnvError> {
    REGISTRY
        .iter()
        .find(|s| s.id == id)
        .copied()
        .ok_or_else(|| EnvError::UnknownEnv(id.to_string()))
}

pub fn registered_ids() -> Vec<&'static str> {
    REGISTRY.iter().map(|s| s.id).collect()
}

/// Optional settings for `make_with`.
#[derive(Debug, Clone)]
pub struct MakeOptions {
    pub render_mode: Option<RenderMode>,
    /// Overrides the registered step limit
    pub max_episode_steps: Option<usize>,
    pub sutton_barto_reward: bool,
    pub euler_integration: bool,
    pub frame_dir: Option<PathBuf>,
}

impl Default for MakeOptions {
    fn default() -> Self {
        Self {
            render_mode: None,
            max_episode_steps: None,
            sutton_barto_reward: false,
            euler_integration: true,
            frame_dir: None,
        }
    }
}

impl MakeOptions {
    pub fn with_render_mode(mut self, render_mode: Option<RenderMode>) -> Self {
        self.render_mode = render_mode;
        self
    }

    pub fn with_max_episode_steps(mut self, max_episode_steps: Option<usize>) -> Self {
        self.max_episode_steps = max_episode_steps;
        self
    }

    pub fn with_sutton_barto_reward(mut self, sutton_barto_reward: bool) -> Self {
        self.sutton_barto_reward = sutton_barto_reward;
        self
    }

    pub fn with_euler_integration(mut self, euler_integration: bool) -> Self {
        self.euler_integration = euler_integration;
        self
    }

    pub fn with_frame_dir(mut self, frame_dir: Option<PathBuf>) -> Self {
        self.frame_dir = frame_dir;
        self
    }
}

/// Builds a registered environment, wrapped in its time limit.
pub fn make(
    id: &str,
    render_mode: Option<RenderMode>,
) -> Result<Box<dyn Env<Vec<f32>, usize>>, EnvError> {
    make_with(id, MakeOptions::default().with_render_mode(render_mode))
}

pub fn make_with(
    id: &str,
    options: MakeOptions,
) -> Result<Box<dyn Env<Vec<f32>, usize>>, EnvError> {
    let spec = spec(id)?;
    let max_steps = options
        .max_episode_steps
        .unwrap_or(spec.max_episode_steps);

    log::debug!(
        "making {} (render mode {:?}, step limit {})",
        spec.id,
        options.render_mode,
        max_steps
    );

    let env = CartpoleEnv::new(options.render_mode)
        .with_sutton_barto_reward(options.sutton_barto_reward)
        .with_euler_integration(options.euler_integration)
        .with_frame_dir(options.frame_dir);
    let env = TimeLimitWrapper::new(Box::new(env), max_steps);

    Ok(Box::new(env))
}
