use std::{
    error::Error,
    io::{self, Write},
    process::ExitCode,
};

use cartpole_demo::{
    common::logger::{CsvLogger, Logger},
    config::DemoConfig,
    env::make_with,
    runner::RandomRunner,
};

fn run() -> Result<(), Box<dyn Error>> {
    let cfg = DemoConfig::load()?;
    log::debug!("{cfg:?}");

    let env = make_with(&cfg.env_id, cfg.make_options()?)?;
    let mut runner = RandomRunner::new(env, cfg.run_config()?);

    if let Some(path) = &cfg.log_path {
        let logger = CsvLogger::new(path.clone(), cfg.overwrite_log);
        logger.check_can_log(true)?;
        runner = runner.with_logger(Box::new(logger));
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();

    let summary = runner.run(&mut out)?;
    writeln!(out, "Simulation finished and environment closed.")?;

    if !summary.episodes.is_empty() {
        log::info!(
            "{} episodes, mean length {:.1}, mean reward {:.1}",
            summary.episodes.len(),
            summary.mean_len(),
            summary.mean_reward()
        );
    }

    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            eprintln!("error: {err}");
            let mut source = err.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
