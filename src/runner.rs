use std::{
    fmt::Debug,
    io::Write,
    thread,
    time::{Duration, Instant},
};

use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

use crate::{
    common::{
        callback::{EmptyCallback, RunCallback},
        logger::{LogData, LogItem, Logger},
        timer::Profiler,
        utils::mean,
    },
    env::{
        base::{Env, EnvError},
        render::{RenderFrame, RenderMode},
    },
};

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Env(#[from] EnvError),
    #[error("could not write run output: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not dump logs")]
    Log(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub steps: usize,
    /// Seeds the first reset and the action space
    pub seed: Option<u64>,
    /// Pause after each reset so it can be seen when rendering
    pub reset_pause: Duration,
    pub render: bool,
    pub progress: bool,
    /// Enable per-phase timing
    pub profile_timers: bool,
    /// Log timing averages every N steps (when profiling)
    pub profile_log_every_steps: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            steps: 1000,
            seed: Some(42),
            reset_pause: Duration::from_secs(1),
            render: true,
            progress: false,
            profile_timers: false,
            profile_log_every_steps: 250,
        }
    }
}

impl RunConfig {
    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_reset_pause(mut self, reset_pause: Duration) -> Self {
        self.reset_pause = reset_pause;
        self
    }

    pub fn with_render(mut self, render: bool) -> Self {
        self.render = render;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_profile_timers(mut self, profile_timers: bool) -> Self {
        self.profile_timers = profile_timers;
        self
    }

    pub fn with_profile_log_every_steps(mut self, every: usize) -> Self {
        self.profile_log_every_steps = every.max(1);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeStats {
    pub length: usize,
    pub reward: f32,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub steps: usize,
    /// Finished episodes only; a trailing partial episode is not included
    pub episodes: Vec<EpisodeStats>,
    pub total_reward: f32,
}

impl RunSummary {
    pub fn mean_reward(&self) -> f32 {
        mean(&self.episodes.iter().map(|e| e.reward).collect::<Vec<_>>())
    }

    pub fn mean_len(&self) -> f32 {
        mean(
            &self
                .episodes
                .iter()
                .map(|e| e.length as f32)
                .collect::<Vec<_>>(),
        )
    }
}

/// Drives an environment with uniformly random actions for a fixed number
/// of steps, resetting whenever an episode ends.
///
/// `run` consumes the runner and always closes the environment, exactly
/// once, whether or not the loop succeeded.
pub struct RandomRunner<O: Clone + Debug, A: Clone + Debug> {
    pub cfg: RunConfig,
    env: Box<dyn Env<O, A>>,
    logger: Option<Box<dyn Logger>>,
    callback: Box<dyn RunCallback<O>>,
}

impl<O: Clone + Debug, A: Clone + Debug> RandomRunner<O, A> {
    pub fn new(env: Box<dyn Env<O, A>>, cfg: RunConfig) -> Self {
        Self {
            cfg,
            env,
            logger: None,
            callback: Box::new(EmptyCallback {}),
        }
    }

    /// Episode statistics (and timings, when profiling) are logged here and
    /// dumped at the end of the run.
    pub fn with_logger(mut self, logger: Box<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_callback(mut self, callback: Box<dyn RunCallback<O>>) -> Self {
        self.callback = callback;
        self
    }

    pub fn run<W: Write>(mut self, out: &mut W) -> Result<RunSummary, RunError> {
        let result = self.run_steps(out);

        self.env.close();
        log::debug!("environment closed");

        let summary = result?;

        if let Some(logger) = &self.logger {
            logger.dump().map_err(RunError::Log)?;
        }

        Ok(summary)
    }

    fn log(&mut self, item: LogItem) {
        if let Some(logger) = &mut self.logger {
            logger.log(item);
        }
    }

    fn progress_bar(&self) -> ProgressBar {
        // the human viewer owns the terminal
        let draws_to_terminal =
            self.cfg.render && self.env.render_mode() == Some(RenderMode::Human);
        if !self.cfg.progress || draws_to_terminal {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(self.cfg.steps as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{pos:>7}/{len:7} {bar} [{elapsed_precise}], eta: [{eta}]")
        {
            pb.set_style(style);
        }
        pb
    }

    fn run_steps<W: Write>(&mut self, out: &mut W) -> Result<RunSummary, RunError> {
        log::info!(
            "starting random run: {} steps, seed {:?}, render mode {:?}",
            self.cfg.steps,
            self.cfg.seed,
            self.env.render_mode()
        );
        self.callback.on_run_start(self.cfg.steps);

        let mut action_space = self.env.action_space();
        if let Some(seed) = self.cfg.seed {
            action_space.seed(seed);
        }

        self.env.reset(self.cfg.seed, None)?;

        let mut summary = RunSummary::default();
        let mut prof = Profiler::new(self.cfg.profile_timers);
        let mut ep_reward = 0.0;
        let mut ep_len = 0;
        let pb = self.progress_bar();

        for i in 0..self.cfg.steps {
            let loop_start = Instant::now();

            if self.cfg.render {
                let env = &mut self.env;
                match prof.time("render", || env.render())? {
                    Some(RenderFrame::Text(text)) => write!(out, "{text}")?,
                    Some(RenderFrame::Pixels { width, height, .. }) => {
                        log::trace!("rendered {width}x{height} frame")
                    }
                    None => {}
                }
            }

            let action = prof.time("sample", || action_space.sample());

            let env = &mut self.env;
            let step = prof.time("env_step", || env.step(&action))?;

            writeln!(out, "Reward for this step: {:?}", step.reward)?;

            summary.steps += 1;
            summary.total_reward += step.reward;
            ep_reward += step.reward;
            ep_len += 1;

            self.callback.on_step(i, &step);

            if step.done() {
                writeln!(out, "Episode finished. Resetting environment.")?;

                let stats = EpisodeStats {
                    length: ep_len,
                    reward: ep_reward,
                };
                let ep_num = summary.episodes.len();
                log::debug!(
                    "episode {ep_num} finished after {ep_len} steps (terminated: {}, truncated: {})",
                    step.terminated,
                    step.truncated
                );

                self.callback.on_episode_end(ep_num, &stats);
                self.log(
                    LogItem::default()
                        .push("global_step".to_string(), LogData::Int(i as i32))
                        .push("ep_num".to_string(), LogData::Int(ep_num as i32))
                        .push("ep_reward".to_string(), LogData::Float(ep_reward))
                        .push("ep_len".to_string(), LogData::Int(ep_len as i32)),
                );
                summary.episodes.push(stats);

                ep_reward = 0.0;
                ep_len = 0;

                self.env.reset(None, None)?;

                if !self.cfg.reset_pause.is_zero() {
                    thread::sleep(self.cfg.reset_pause);
                }
            }

            if prof.enabled() {
                prof.record("loop", loop_start.elapsed().as_secs_f64());

                if (i + 1) % self.cfg.profile_log_every_steps.max(1) == 0 {
                    if let Some(item) = prof.to_logitem(i) {
                        self.log(item);
                    }
                    prof.reset();
                }
            }

            pb.inc(1);
        }

        pb.finish_and_clear();
        self.callback.on_run_end(summary.steps);

        log::info!(
            "run complete: {} steps, {} finished episodes, total reward {}",
            summary.steps,
            summary.episodes.len(),
            summary.total_reward
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod test {
    use std::{cell::RefCell, rc::Rc, time::Duration};

    use crate::{
        common::{
            callback::RunCallback,
            logger::{LogItem, Logger},
            spaces::{BoxSpace, Discrete, Space},
        },
        env::{
            base::{Env, EnvError, EnvObservation, Info, ResetOptions, RewardRange},
            make,
            render::{RenderFrame, RenderMode},
        },
    };

    use super::{EpisodeStats, RandomRunner, RunConfig, RunError};

    #[derive(Debug, Default)]
    struct Counters {
        steps: usize,
        resets: usize,
        renders: usize,
        closes: usize,
        // every step and reset, in call order
        calls: Vec<&'static str>,
    }

    // Fixed-length episodes of +1 reward, terminated at `episode_len` or
    // truncated at `truncate_len`; steps fail unless the previous episode
    // was reset.
    struct MockEnv {
        episode_len: usize,
        truncate_len: Option<usize>,
        fail_at_step: Option<usize>,
        t: usize,
        needs_reset: bool,
        counters: Rc<RefCell<Counters>>,
    }

    impl MockEnv {
        fn new(episode_len: usize) -> (Self, Rc<RefCell<Counters>>) {
            let counters = Rc::new(RefCell::new(Counters::default()));
            (
                Self {
                    episode_len,
                    truncate_len: None,
                    fail_at_step: None,
                    t: 0,
                    needs_reset: true,
                    counters: counters.clone(),
                },
                counters,
            )
        }
    }

    impl Env<Vec<f32>, usize> for MockEnv {
        fn step(&mut self, _action: &usize) -> Result<EnvObservation<Vec<f32>>, EnvError> {
            let mut c = self.counters.borrow_mut();
            if self.needs_reset {
                return Err(EnvError::ResetNeeded);
            }
            if Some(c.steps) == self.fail_at_step {
                return Err(EnvError::Render("mock failure".to_string()));
            }

            c.steps += 1;
            c.calls.push("step");
            self.t += 1;
            let terminated = self.t == self.episode_len;
            let truncated = !terminated && Some(self.t) == self.truncate_len;
            self.needs_reset = terminated || truncated;

            Ok(EnvObservation {
                obs: vec![self.t as f32],
                reward: 1.0,
                terminated,
                truncated,
                info: Info::new(),
            })
        }

        fn reset(
            &mut self,
            _seed: Option<u64>,
            _options: Option<ResetOptions>,
        ) -> Result<(Vec<f32>, Info<Vec<f32>>), EnvError> {
            let mut c = self.counters.borrow_mut();
            c.resets += 1;
            c.calls.push("reset");
            self.t = 0;
            self.needs_reset = false;
            Ok((vec![0.0], Info::new()))
        }

        fn action_space(&self) -> Box<dyn Space<usize>> {
            Box::new(Discrete::from(2))
        }

        fn observation_space(&self) -> Box<dyn Space<Vec<f32>>> {
            Box::new(BoxSpace::from(([0.0], [100.0])))
        }

        fn reward_range(&self) -> RewardRange {
            RewardRange {
                low: 0.0,
                high: 1.0,
            }
        }

        fn render(&mut self) -> Result<Option<RenderFrame>, EnvError> {
            self.counters.borrow_mut().renders += 1;
            Ok(None)
        }

        fn render_mode(&self) -> Option<RenderMode> {
            None
        }

        fn close(&mut self) {
            self.counters.borrow_mut().closes += 1;
        }

        fn unwrapped(&self) -> &dyn Env<Vec<f32>, usize> {
            self
        }
    }

    fn quick_cfg(steps: usize) -> RunConfig {
        RunConfig::default()
            .with_steps(steps)
            .with_reset_pause(Duration::ZERO)
    }

    fn reward_lines(out: &[u8]) -> usize {
        String::from_utf8_lossy(out)
            .lines()
            .filter(|l| l.starts_with("Reward for this step: "))
            .count()
    }

    #[test]
    fn test_runs_exact_step_count() {
        let (env, counters) = MockEnv::new(7);
        let mut out = Vec::new();

        let summary = RandomRunner::new(Box::new(env), quick_cfg(25))
            .run(&mut out)
            .unwrap();

        assert_eq!(summary.steps, 25);
        assert_eq!(counters.borrow().steps, 25);
        assert_eq!(counters.borrow().renders, 25);
        assert_eq!(reward_lines(&out), 25);
        assert_eq!(summary.total_reward, 25.0);
    }

    #[test]
    fn test_resets_after_every_episode() {
        let (env, counters) = MockEnv::new(4);
        let mut out = Vec::new();

        let summary = RandomRunner::new(Box::new(env), quick_cfg(10))
            .run(&mut out)
            .unwrap();

        // two full episodes, two steps into the third
        assert_eq!(
            summary.episodes,
            vec![
                EpisodeStats {
                    length: 4,
                    reward: 4.0
                };
                2
            ]
        );
        assert_eq!(counters.borrow().resets, 3);

        let mut expected = Vec::new();
        for _ in 0..2 {
            expected.push("reset");
            expected.extend(["step"; 4]);
        }
        expected.extend(["reset", "step", "step"]);
        assert_eq!(counters.borrow().calls, expected);

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text.matches("Episode finished. Resetting environment.")
                .count(),
            2
        );
        assert!(text.starts_with("Reward for this step: 1.0\n"));
    }

    #[test]
    fn test_resets_after_truncation() {
        let (mut env, counters) = MockEnv::new(100);
        env.truncate_len = Some(3);
        let mut out = Vec::new();

        let summary = RandomRunner::new(Box::new(env), quick_cfg(7))
            .run(&mut out)
            .unwrap();

        assert_eq!(
            summary.episodes,
            vec![
                EpisodeStats {
                    length: 3,
                    reward: 3.0
                };
                2
            ]
        );
        let mut expected = Vec::new();
        for _ in 0..2 {
            expected.push("reset");
            expected.extend(["step"; 3]);
        }
        expected.extend(["reset", "step"]);
        assert_eq!(counters.borrow().calls, expected);
    }

    #[test]
    fn test_closes_once() {
        let (env, counters) = MockEnv::new(3);
        let mut out = Vec::new();

        RandomRunner::new(Box::new(env), quick_cfg(5))
            .run(&mut out)
            .unwrap();

        assert_eq!(counters.borrow().closes, 1);
    }

    #[test]
    fn test_closes_once_on_failure() {
        let (mut env, counters) = MockEnv::new(3);
        env.fail_at_step = Some(2);
        let mut out = Vec::new();

        let res = RandomRunner::new(Box::new(env), quick_cfg(5)).run(&mut out);

        assert!(matches!(res, Err(RunError::Env(EnvError::Render(_)))));
        assert_eq!(counters.borrow().closes, 1);
        assert_eq!(reward_lines(&out), 2);
    }

    #[test]
    fn test_zero_steps() {
        let (env, counters) = MockEnv::new(3);
        let mut out = Vec::new();

        let summary = RandomRunner::new(Box::new(env), quick_cfg(0))
            .run(&mut out)
            .unwrap();

        assert_eq!(summary.steps, 0);
        assert!(out.is_empty());
        assert_eq!(counters.borrow().resets, 1);
        assert_eq!(counters.borrow().closes, 1);
    }

    #[derive(Default)]
    struct Recorder {
        started: Option<usize>,
        steps: usize,
        episodes: Vec<(usize, EpisodeStats)>,
        ended: Option<usize>,
    }

    struct RecordingCallback(Rc<RefCell<Recorder>>);

    impl RunCallback<Vec<f32>> for RecordingCallback {
        fn on_run_start(&mut self, steps: usize) {
            self.0.borrow_mut().started = Some(steps);
        }

        fn on_step(&mut self, _step: usize, _env_obs: &EnvObservation<Vec<f32>>) {
            self.0.borrow_mut().steps += 1;
        }

        fn on_episode_end(&mut self, episode: usize, stats: &EpisodeStats) {
            self.0.borrow_mut().episodes.push((episode, *stats));
        }

        fn on_run_end(&mut self, steps_taken: usize) {
            self.0.borrow_mut().ended = Some(steps_taken);
        }
    }

    #[test]
    fn test_callback_hooks() {
        let (env, _) = MockEnv::new(2);
        let rec = Rc::new(RefCell::new(Recorder::default()));
        let mut out = Vec::new();

        RandomRunner::new(Box::new(env), quick_cfg(5))
            .with_callback(Box::new(RecordingCallback(rec.clone())))
            .run(&mut out)
            .unwrap();

        let rec = rec.borrow();
        assert_eq!(rec.started, Some(5));
        assert_eq!(rec.steps, 5);
        assert_eq!(rec.episodes.len(), 2);
        assert_eq!(rec.episodes[1].0, 1);
        assert_eq!(rec.ended, Some(5));
    }

    struct MemLogger(Rc<RefCell<Vec<LogItem>>>);

    impl Logger for MemLogger {
        fn log(&mut self, data: LogItem) {
            self.0.borrow_mut().push(data);
        }

        fn dump(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Ok(())
        }

        fn check_can_log(&self, _try_to_fix: bool) -> Result<(), &'static str> {
            Ok(())
        }
    }

    struct FailingLogger;

    impl Logger for FailingLogger {
        fn log(&mut self, _data: LogItem) {}

        fn dump(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only log dir",
            )))
        }

        fn check_can_log(&self, _try_to_fix: bool) -> Result<(), &'static str> {
            Ok(())
        }
    }

    #[test]
    fn test_log_dump_failure_keeps_source() {
        let (env, counters) = MockEnv::new(3);
        let mut out = Vec::new();

        let err = RandomRunner::new(Box::new(env), quick_cfg(4))
            .with_logger(Box::new(FailingLogger))
            .run(&mut out)
            .unwrap_err();

        assert!(matches!(err, RunError::Log(_)));
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "read-only log dir");
        assert_eq!(counters.borrow().closes, 1);
    }

    #[test]
    fn test_episodes_and_timings_are_logged() {
        let (env, _) = MockEnv::new(3);
        let items = Rc::new(RefCell::new(Vec::new()));
        let mut out = Vec::new();

        RandomRunner::new(
            Box::new(env),
            quick_cfg(8)
                .with_profile_timers(true)
                .with_profile_log_every_steps(4),
        )
        .with_logger(Box::new(MemLogger(items.clone())))
        .run(&mut out)
        .unwrap();

        let items = items.borrow();
        let episodes = items.iter().filter(|i| i.get("ep_num").is_some()).count();
        let timings = items
            .iter()
            .filter(|i| i.get("avg_env_step_ms").is_some())
            .count();

        assert_eq!(episodes, 2);
        assert_eq!(timings, 2);
    }

    #[test]
    fn test_cartpole_run_is_reproducible() {
        let run = || {
            let env = make("CartPole-v1", Some(RenderMode::Ansi)).unwrap();
            let mut out = Vec::new();
            let summary = RandomRunner::new(env, quick_cfg(300).with_seed(Some(42)))
                .run(&mut out)
                .unwrap();
            (summary, String::from_utf8(out).unwrap())
        };

        let (a, text_a) = run();
        let (b, text_b) = run();

        assert_eq!(a.steps, 300);
        assert_eq!(reward_lines(text_a.as_bytes()), 300);
        // random play rarely keeps the pole up for long
        assert!(!a.episodes.is_empty());
        assert!(a.episodes.iter().all(|e| e.length <= 500));
        assert_eq!(a.episodes, b.episodes);
        assert_eq!(text_a, text_b);
    }
}
