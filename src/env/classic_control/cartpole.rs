use std::path::PathBuf;

use rand::{rngs::StdRng, SeedableRng};

use crate::{
    common::{
        logger::LogData,
        spaces::{BoxSpace, Discrete, Space},
        utils::generate_random_vector,
    },
    env::{
        base::{Env, EnvError, EnvObservation, Info, ResetOptions, RewardRange},
        render::{ansi_frame, rgb_frame, CartpoleScene, HumanViewer, RenderFrame, RenderMode},
    },
};

const THETA_THRESHOLD_RADIANS: f32 = 12.0 * 2.0 * std::f32::consts::PI / 360.0;
const X_THRESHOLD: f32 = 2.4;
const RESET_BOUND: f32 = 0.05;

/// A pole attached by an un-actuated joint to a cart moving along a
/// frictionless track. The pole starts upright and the goal is to keep it
/// balanced by pushing the cart left (action 0) or right (action 1).
///
/// Observation: `[cart position, cart velocity, pole angle, pole angular velocity]`.
///
/// The episode terminates once the pole leans more than 12 degrees or the
/// cart leaves `[-2.4, 2.4]`. Time limits are applied by `TimeLimitWrapper`.
pub struct CartpoleEnv {
    sutton_barto_reward: bool,
    euler_integration: bool,
    gravity: f32,
    masspole: f32,
    total_mass: f32,
    length: f32,
    polemass_length: f32,
    force_mag: f32,
    tau: f32,
    obs_space: BoxSpace<Vec<f32>>,
    action_space: Discrete,
    render_mode: Option<RenderMode>,
    viewer: Option<HumanViewer>,
    frame_dir: Option<PathBuf>,
    rng: StdRng,

    state: Vec<f32>,
    needs_reset: bool,
    steps_beyond_terminated: Option<usize>,
    closed: bool,
}

impl Default for CartpoleEnv {
    fn default() -> Self {
        let masscart = 1.0;
        let masspole = 0.1;
        let length = 0.5;
        let highs = [
            X_THRESHOLD * 2.0,
            f32::MAX,
            THETA_THRESHOLD_RADIANS * 2.0,
            f32::MAX,
        ];
        let lows = highs.map(|h| -h);

        Self {
            sutton_barto_reward: false,
            euler_integration: true,
            gravity: 9.8,
            masspole,
            total_mass: masscart + masspole,
            length,
            polemass_length: masspole * length,
            force_mag: 10.0,
            tau: 0.02,
            obs_space: BoxSpace::from((lows, highs)),
            action_space: Discrete::from(2),
            render_mode: None,
            viewer: None,
            frame_dir: None,
            rng: StdRng::from_entropy(),
            state: vec![0.0; 4],
            needs_reset: true,
            steps_beyond_terminated: None,
            closed: false,
        }
    }
}

impl CartpoleEnv {
    pub fn new(render_mode: Option<RenderMode>) -> Self {
        Self {
            render_mode,
            ..Default::default()
        }
    }

    /// Reward 0 on every step and -1 on termination, instead of 1 per step.
    pub fn with_sutton_barto_reward(mut self, sutton_barto_reward: bool) -> Self {
        self.sutton_barto_reward = sutton_barto_reward;
        self
    }

    /// Euler (default) or semi-implicit Euler integration.
    pub fn with_euler_integration(mut self, euler_integration: bool) -> Self {
        self.euler_integration = euler_integration;
        self
    }

    /// Every human-mode frame is also written as a png into this directory.
    pub fn with_frame_dir(mut self, frame_dir: Option<PathBuf>) -> Self {
        self.frame_dir = frame_dir;
        self
    }

    pub fn state(&self) -> &[f32] {
        &self.state
    }

    /// Overrides the physical state, e.g. to test the dynamics from a known point.
    pub fn set_state(&mut self, state: [f32; 4]) {
        self.state = state.to_vec();
        self.needs_reset = false;
        self.steps_beyond_terminated = None;
    }

    fn get_obs(&self) -> Vec<f32> {
        self.state.clone()
    }

    fn scene(&self) -> CartpoleScene {
        CartpoleScene {
            x: self.state[0],
            theta: self.state[2],
            x_threshold: X_THRESHOLD,
            half_length: self.length,
        }
    }

    fn bounds_from_options(options: &Option<ResetOptions>) -> Result<(f32, f32), EnvError> {
        let read = |key: &str, default: f32| -> Result<f32, EnvError> {
            match options.as_ref().and_then(|o| o.get(key)) {
                Some(v) => v
                    .as_f32()
                    .ok_or_else(|| EnvError::InvalidResetOption(key.to_string())),
                None => Ok(default),
            }
        };

        Ok((read("low", -RESET_BOUND)?, read("high", RESET_BOUND)?))
    }
}

impl Env<Vec<f32>, usize> for CartpoleEnv {
    fn step(&mut self, action: &usize) -> Result<EnvObservation<Vec<f32>>, EnvError> {
        if self.closed {
            return Err(EnvError::Closed);
        }
        if !self.action_space.contains(action) {
            return Err(EnvError::InvalidAction(format!(
                "{action} (expected 0 or 1)"
            )));
        }
        if self.needs_reset {
            return Err(EnvError::ResetNeeded);
        }

        let mut x = self.state[0];
        let mut x_dot = self.state[1];
        let mut theta = self.state[2];
        let mut theta_dot = self.state[3];

        let force = if *action == 1 {
            self.force_mag
        } else {
            -self.force_mag
        };

        let (sin_theta, cos_theta) = theta.sin_cos();

        // https://coneural.org/florian/papers/05_cart_pole.pdf
        let temp =
            (force + self.polemass_length * theta_dot.powi(2) * sin_theta) / self.total_mass;
        let theta_acc = (self.gravity * sin_theta - cos_theta * temp)
            / (self.length * (4.0 / 3.0 - self.masspole * cos_theta.powi(2) / self.total_mass));
        let x_acc = temp - self.polemass_length * theta_acc * cos_theta / self.total_mass;

        if self.euler_integration {
            x += self.tau * x_dot;
            x_dot += self.tau * x_acc;
            theta += self.tau * theta_dot;
            theta_dot += self.tau * theta_acc;
        } else {
            x_dot += self.tau * x_acc;
            x += self.tau * x_dot;
            theta_dot += self.tau * theta_acc;
            theta += self.tau * theta_dot;
        }

        self.state = vec![x, x_dot, theta, theta_dot];

        let terminated = (x < -X_THRESHOLD)
            | (x > X_THRESHOLD)
            | (theta < -THETA_THRESHOLD_RADIANS)
            | (theta > THETA_THRESHOLD_RADIANS);

        let reward = if !terminated {
            if self.sutton_barto_reward {
                0.0
            } else {
                1.0
            }
        } else {
            match self.steps_beyond_terminated {
                None => {
                    // pole just fell
                    self.steps_beyond_terminated = Some(0);

                    if self.sutton_barto_reward {
                        -1.0
                    } else {
                        1.0
                    }
                }
                Some(s) => {
                    if s == 0 {
                        log::warn!(
                            "step() called after the episode terminated; call reset() first"
                        );
                    }
                    self.steps_beyond_terminated = Some(s + 1);

                    if self.sutton_barto_reward {
                        -1.0
                    } else {
                        0.0
                    }
                }
            }
        };

        Ok(EnvObservation {
            obs: self.get_obs(),
            reward,
            terminated,
            truncated: false,
            info: Default::default(),
        })
    }

    fn reset(
        &mut self,
        seed: Option<u64>,
        options: Option<ResetOptions>,
    ) -> Result<(Vec<f32>, Info<Vec<f32>>), EnvError> {
        if self.closed {
            return Err(EnvError::Closed);
        }

        if let Some(seed) = seed {
            self.rng = StdRng::seed_from_u64(seed);
        }

        let (low, high) = Self::bounds_from_options(&options)?;
        self.state = generate_random_vector(&mut self.rng, &[low; 4], &[high; 4])
            .ok_or_else(|| EnvError::InvalidResetOption(format!("low {low} > high {high}")))?;

        self.needs_reset = false;
        self.steps_beyond_terminated = None;

        Ok((self.get_obs(), Info::new()))
    }

    fn action_space(&self) -> Box<dyn Space<usize>> {
        Box::new(self.action_space.clone())
    }

    fn observation_space(&self) -> Box<dyn Space<Vec<f32>>> {
        Box::new(self.obs_space.clone())
    }

    fn reward_range(&self) -> RewardRange {
        if self.sutton_barto_reward {
            RewardRange {
                low: -1.0,
                high: 0.0,
            }
        } else {
            RewardRange {
                low: 0.0,
                high: 1.0,
            }
        }
    }

    fn render(&mut self) -> Result<Option<RenderFrame>, EnvError> {
        if self.closed {
            return Err(EnvError::Closed);
        }

        match self.render_mode {
            None => {
                log::warn!("render() called without a render mode; nothing to draw");
                Ok(None)
            }
            Some(RenderMode::Ansi) => Ok(Some(RenderFrame::Text(ansi_frame(&self.scene())))),
            Some(RenderMode::RgbArray) => rgb_frame(&self.scene()).map(Some),
            Some(RenderMode::Human) => {
                let scene = self.scene();
                let frame_dir = self.frame_dir.clone();
                self.viewer
                    .get_or_insert_with(|| HumanViewer::new(frame_dir))
                    .show(&scene)?;
                Ok(None)
            }
        }
    }

    fn render_mode(&self) -> Option<RenderMode> {
        self.render_mode
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }

        // dropping the viewer closes its window
        if let Some(viewer) = self.viewer.take() {
            log::debug!("closing viewer after {} frames", viewer.frames_shown());
            drop(viewer);
        }
        self.closed = true;
    }

    fn unwrapped(&self) -> &dyn Env<Vec<f32>, usize> {
        self
    }
}

/// Reset options that start every state component in `[low, high]`.
pub fn reset_bounds(low: f32, high: f32) -> ResetOptions {
    ResetOptions::from([
        ("low".to_string(), LogData::Float(low)),
        ("high".to_string(), LogData::Float(high)),
    ])
}

#[cfg(test)]
mod test {
    use assert_approx_eq::assert_approx_eq;

    use crate::env::{
        base::{Env, EnvError},
        render::{HumanViewer, RenderFrame, RenderMode},
    };

    use super::{reset_bounds, CartpoleEnv};

    #[test]
    fn test_cartpole_random_episode_terminates() {
        let mut env = CartpoleEnv::default();
        let mut space = env.action_space();
        let mut done = false;
        let mut steps = 0;
        env.reset(Some(0), None).unwrap();

        while !done {
            let result = env.step(&space.sample()).unwrap();
            done = result.truncated | result.terminated;
            steps += 1;
            assert!(steps < 10_000);
        }
    }

    #[test]
    fn test_reset_state_in_bounds() {
        let mut env = CartpoleEnv::default();
        let (obs, info) = env.reset(Some(42), None).unwrap();

        assert_eq!(obs.len(), 4);
        assert!(obs.iter().all(|v| (-0.05..=0.05).contains(v)));
        assert!(info.is_empty());
    }

    #[test]
    fn test_seeded_reset_is_reproducible() {
        let mut a = CartpoleEnv::default();
        let mut b = CartpoleEnv::default();

        let (obs_a, _) = a.reset(Some(42), None).unwrap();
        let (obs_b, _) = b.reset(Some(42), None).unwrap();
        assert_eq!(obs_a, obs_b);

        // unseeded resets continue the seeded stream
        let (obs_a, _) = a.reset(None, None).unwrap();
        let (obs_b, _) = b.reset(None, None).unwrap();
        assert_eq!(obs_a, obs_b);
    }

    #[test]
    fn test_reset_options() {
        let mut env = CartpoleEnv::default();
        let (obs, _) = env.reset(None, Some(reset_bounds(0.01, 0.02))).unwrap();
        assert!(obs.iter().all(|v| (0.01..=0.02).contains(v)));

        let bad = env.reset(None, Some(reset_bounds(0.5, -0.5)));
        assert!(matches!(bad, Err(EnvError::InvalidResetOption(_))));
    }

    #[test]
    fn test_step_dynamics_from_rest() {
        let mut env = CartpoleEnv::default();
        env.set_state([0.0, 0.0, 0.0, 0.0]);

        // push right from rest: euler integration only moves the velocities
        let res = env.step(&1).unwrap();
        let s = res.obs;

        let total_mass = 1.1_f32;
        let temp = 10.0 / total_mass;
        let theta_acc = -temp / (0.5 * (4.0 / 3.0 - 0.1 / total_mass));
        let x_acc = temp - 0.05 * theta_acc / total_mass;

        assert_approx_eq!(s[0], 0.0);
        assert_approx_eq!(s[1], 0.02 * x_acc);
        assert_approx_eq!(s[2], 0.0);
        assert_approx_eq!(s[3], 0.02 * theta_acc);
        assert_approx_eq!(s[1], 0.19512, 1e-4);
        assert_approx_eq!(s[3], -0.29268, 1e-4);
        assert_eq!(res.reward, 1.0);
        assert!(!res.terminated);
    }

    #[test]
    fn test_semi_implicit_moves_position_immediately() {
        let mut env = CartpoleEnv::default().with_euler_integration(false);
        env.set_state([0.0, 0.0, 0.0, 0.0]);

        let s = env.step(&0).unwrap().obs;

        assert!(s[0] < 0.0);
        assert_approx_eq!(s[0], 0.02 * s[1]);
        assert_approx_eq!(s[2], 0.02 * s[3]);
    }

    #[test]
    fn test_terminates_past_angle_threshold() {
        let mut env = CartpoleEnv::default();
        env.set_state([0.0, 0.0, 0.2, 2.0]);

        let res = env.step(&1).unwrap();
        assert!(res.terminated);
        assert_eq!(res.reward, 1.0);

        // stepping on after termination gives no more reward
        let res = env.step(&1).unwrap();
        assert!(res.terminated);
        assert_eq!(res.reward, 0.0);
    }

    #[test]
    fn test_terminates_past_position_threshold() {
        let mut env = CartpoleEnv::default().with_sutton_barto_reward(true);
        env.set_state([2.39, 1.0, 0.0, 0.0]);

        let res = env.step(&1).unwrap();
        assert!(res.terminated);
        assert_eq!(res.reward, -1.0);
        assert_eq!(env.reward_range().low, -1.0);
    }

    #[test]
    fn test_step_before_reset_fails() {
        let mut env = CartpoleEnv::default();

        assert!(matches!(env.step(&0), Err(EnvError::ResetNeeded)));
    }

    #[test]
    fn test_invalid_action() {
        let mut env = CartpoleEnv::default();
        env.reset(None, None).unwrap();

        assert!(matches!(env.step(&2), Err(EnvError::InvalidAction(_))));
    }

    #[test]
    fn test_render_modes() {
        let mut env = CartpoleEnv::new(Some(RenderMode::Ansi));
        env.reset(Some(1), None).unwrap();
        assert!(matches!(env.render().unwrap(), Some(RenderFrame::Text(_))));

        let mut env = CartpoleEnv::new(Some(RenderMode::RgbArray));
        env.reset(Some(1), None).unwrap();
        assert!(matches!(
            env.render().unwrap(),
            Some(RenderFrame::Pixels { .. })
        ));

        let mut env = CartpoleEnv::new(None);
        env.reset(Some(1), None).unwrap();
        assert!(env.render().unwrap().is_none());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut env = CartpoleEnv::default();
        env.reset(None, None).unwrap();
        env.close();
        env.close();

        assert!(matches!(env.step(&0), Err(EnvError::Closed)));
        assert!(matches!(env.reset(None, None), Err(EnvError::Closed)));
    }

    #[test]
    fn test_close_drops_viewer() {
        let mut env = CartpoleEnv::new(Some(RenderMode::Human));
        env.viewer = Some(HumanViewer::terminal(
            Box::new(std::io::sink()),
            false,
            None,
            1000,
        ));
        env.reset(Some(3), None).unwrap();
        assert!(env.render().unwrap().is_none());
        assert_eq!(env.viewer.as_ref().map(|v| v.frames_shown()), Some(1));

        env.close();
        assert!(env.viewer.is_none());
        assert!(matches!(env.render(), Err(EnvError::Closed)));
    }

    #[test]
    fn test_spaces() {
        let env = CartpoleEnv::default();

        assert_eq!(env.action_space().shape(), 2);
        let obs_space = env.observation_space();
        assert!(obs_space.contains(&vec![0.0, 100.0, 0.1, -100.0]));
        assert!(!obs_space.contains(&vec![5.0, 0.0, 0.0, 0.0]));
    }
}
