use std::collections::HashMap;
use std::time::Instant;

use crate::common::logger::{LogData, LogItem};

/// Per-phase wall clock timings, averaged over a logging interval.
///
/// `time(name, || ...)` measures a closure, `record(name, secs)` adds a
/// manual sample. A disabled profiler runs closures without timing them.
#[derive(Default, Debug, Clone)]
pub struct Profiler {
    enabled: bool,
    sums: HashMap<&'static str, f64>,
    counts: HashMap<&'static str, usize>,
}

impl Profiler {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Default::default()
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&mut self, name: &'static str, secs: f64) {
        if !self.enabled {
            return;
        }
        *self.sums.entry(name).or_insert(0.0) += secs;
        *self.counts.entry(name).or_insert(0) += 1;
    }

    pub fn time<T, F: FnOnce() -> T>(&mut self, name: &'static str, f: F) -> T {
        if !self.enabled {
            return f();
        }
        let t0 = Instant::now();
        let out = f();
        self.record(name, t0.elapsed().as_secs_f64());
        out
    }

    /// Average milliseconds per phase, keyed `avg_<phase>_ms`.
    /// A `loop` phase also yields `steps_per_sec`.
    pub fn to_logitem(&self, step: usize) -> Option<LogItem> {
        if !self.enabled || self.counts.is_empty() {
            return None;
        }

        let mut item =
            LogItem::default().push("global_step".to_string(), LogData::Int(step as i32));

        for (name, sum) in &self.sums {
            let count = *self.counts.get(name).unwrap_or(&1) as f64;
            let avg_ms = (sum / count) * 1000.0;
            item = item.push(format!("avg_{name}_ms"), LogData::Float(avg_ms as f32));

            if *name == "loop" && avg_ms > 0.0 {
                item = item.push(
                    "steps_per_sec".to_string(),
                    LogData::Float((1000.0 / avg_ms) as f32),
                );
            }
        }

        Some(item)
    }

    pub fn reset(&mut self) {
        self.sums.clear();
        self.counts.clear();
    }
}
