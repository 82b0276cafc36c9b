//! Run configuration
//!
//! Sources, lowest to highest priority:
//! 1. built-in defaults (CartPole-v1, 1000 steps, seed 42, human rendering)
//! 2. `cartpole.toml`, or the file named by `CARTPOLE_CONFIG`
//! 3. environment variables (`CARTPOLE_STEPS=200`, `CARTPOLE_RENDER_MODE=none`, ...)

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    env::{
        base::EnvError,
        registry::{self, MakeOptions},
        render::{parse_render_mode, RenderMode},
    },
    runner::RunConfig,
};

pub const DEFAULT_CONFIG_FILE: &str = "cartpole.toml";
pub const ENV_PREFIX: &str = "CARTPOLE_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] EnvError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub env_id: String,
    pub steps: usize,
    pub seed: Option<u64>,
    /// `human`, `ansi`, `rgb_array` or `none`
    pub render_mode: String,
    pub reset_pause_ms: u64,
    /// Overrides the registered episode step limit
    pub max_episode_steps: Option<usize>,
    pub sutton_barto_reward: bool,
    pub euler_integration: bool,
    /// Human rendering also writes every frame as a png here
    pub frame_dir: Option<PathBuf>,
    /// Per-episode csv log, plus one plot per column next to it
    pub log_path: Option<PathBuf>,
    pub overwrite_log: bool,
    pub progress: bool,
    pub profile_timers: bool,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            env_id: "CartPole-v1".to_string(),
            steps: 1000,
            seed: Some(42),
            render_mode: "human".to_string(),
            reset_pause_ms: 1000,
            max_episode_steps: None,
            sutton_barto_reward: false,
            euler_integration: true,
            frame_dir: None,
            log_path: None,
            overwrite_log: true,
            progress: false,
            profile_timers: false,
        }
    }
}

impl DemoConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(format!("{ENV_PREFIX}CONFIG"))
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        Self::load_from(path)
    }

    /// Loads `path` (when it exists) over the defaults, then applies
    /// `CARTPOLE_*` environment variables.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if path.exists() {
            log::debug!("reading config from {}", path.display());
            figment = figment.merge(Toml::file(path));
        } else {
            log::debug!("no config file at {}, using defaults", path.display());
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]));

        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let cfg: Self = figment.extract()?;
        cfg.validate()?;

        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        registry::spec(&self.env_id)?;
        self.render_mode()?;

        Ok(())
    }

    pub fn render_mode(&self) -> Result<Option<RenderMode>, ConfigError> {
        Ok(parse_render_mode(&self.render_mode)?)
    }

    pub fn make_options(&self) -> Result<MakeOptions, ConfigError> {
        Ok(MakeOptions::default()
            .with_render_mode(self.render_mode()?)
            .with_max_episode_steps(self.max_episode_steps)
            .with_sutton_barto_reward(self.sutton_barto_reward)
            .with_euler_integration(self.euler_integration)
            .with_frame_dir(self.frame_dir.clone()))
    }

    pub fn run_config(&self) -> Result<RunConfig, ConfigError> {
        Ok(RunConfig::default()
            .with_steps(self.steps)
            .with_seed(self.seed)
            .with_reset_pause(Duration::from_millis(self.reset_pause_ms))
            .with_render(self.render_mode()?.is_some())
            .with_progress(self.progress)
            .with_profile_timers(self.profile_timers))
    }
}
