use csv::Writer;
use plotters::prelude::*;
use std::error::Error;
use std::ffi::OsStr;
use std::{collections::HashMap, path::PathBuf};

// Logger for run statistics, e.g. per-episode reward and length
pub trait Logger {
    // log a piece of data
    fn log(&mut self, data: LogItem);

    // dump all logged data
    fn dump(&self) -> Result<(), Box<dyn Error + Send + Sync>>;

    // check whether logging is possible, e.g. whether the destination
    // directory exists. if try_to_fix, then the Logger will try to
    // resolve the issue, e.g. by creating the dir
    fn check_can_log(&self, try_to_fix: bool) -> Result<(), &'static str>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogData {
    String(String),
    Float(f32),
    Int(i32),
}

impl LogData {
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            LogData::String(_) => None,
            LogData::Float(f) => Some(*f),
            LogData::Int(i) => Some(*i as f32),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogItem {
    items: HashMap<String, LogData>,
}

impl LogItem {
    pub fn push(mut self, k: String, v: LogData) -> Self {
        self.items.insert(k, v);

        self
    }

    pub fn get(&self, k: &str) -> Option<&LogData> {
        self.items.get(k)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Keeps logged items in memory and writes them out as a csv on `dump`,
/// alongside one line plot per logged key.
pub struct CsvLogger {
    overwrite: bool,
    dump_path: PathBuf,
    keys: Vec<String>,
    data: Vec<LogItem>,
}

impl CsvLogger {
    pub fn new(dump_path: PathBuf, overwrite: bool) -> Self {
        Self {
            dump_path,
            data: Vec::new(),
            keys: Vec::new(),
            overwrite,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn dump_dir(&self) -> PathBuf {
        match self.dump_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

impl Logger for CsvLogger {
    fn log(&mut self, data: LogItem) {
        if data.is_empty() {
            return;
        }

        for key in data.items.keys() {
            if !self.keys.contains(key) {
                self.keys.push(key.clone());
            }
        }

        self.data.push(data);
    }

    fn dump(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        log::info!(
            "Dumping logs to {:?}. {} items to dump",
            self.dump_path,
            self.data.len()
        );

        let mut wtr = Writer::from_path(&self.dump_path)?;

        // columns keep the order in which keys were first logged
        wtr.write_record(&self.keys)?;

        for record in &self.data {
            let mut row = Vec::with_capacity(self.keys.len());
            for key in &self.keys {
                match record.items.get(key) {
                    Some(LogData::String(s)) => row.push(s.clone()),
                    Some(LogData::Float(f)) => row.push(f.to_string()),
                    Some(LogData::Int(i)) => row.push(i.to_string()),
                    None => row.push(String::new()),
                }
            }
            wtr.write_record(&row)?;
        }

        wtr.flush()?;

        if let Err(err) = create_plots(&self.data, &self.keys, self.dump_dir()) {
            log::warn!("could not create log plots: {err}");
        }

        Ok(())
    }

    fn check_can_log(&self, try_to_fix: bool) -> Result<(), &'static str> {
        let dir = self.dump_dir();

        if self.dump_path.exists() && !self.overwrite {
            Err("logger dump file already exists")
        } else if self.dump_path.extension() != Some(OsStr::new("csv")) {
            Err("logger dump path should be a csv")
        } else if !dir.exists() {
            if try_to_fix {
                std::fs::create_dir_all(&dir).map_err(|_| "Couldn't create directory")
            } else {
                Err("logger dump path dir does not exist")
            }
        } else {
            Ok(())
        }
    }

}

/// Writes `<dir>/<key>.png` for every numeric key, plotting the value
/// against the index of the log item it appeared in.
pub fn create_plots(
    data: &[LogItem],
    keys: &[String],
    dir: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    for yvar in keys {
        let mut path = dir.clone();
        path.push(format!("{yvar}.png"));

        let mut ymin = f32::MAX;
        let mut ymax = f32::MIN;
        let mut xmax = 1.0;
        let mut plot_data = Vec::new();
        for (idx, point) in data.iter().enumerate() {
            if let Some(y) = point.items.get(yvar.as_str()).and_then(LogData::as_f32) {
                ymin = ymin.min(y);
                ymax = ymax.max(y);
                xmax = (idx as f32).max(1.0);
                plot_data.push((idx as f32, y));
            }
        }

        if plot_data.is_empty() {
            continue;
        }

        let ymin = ymin.min(0.0);
        let ymax = if ymax > ymin { ymax } else { ymin + 1.0 };

        let root_area = BitMapBackend::new(&path, (600, 400)).into_drawing_area();
        root_area.fill(&WHITE)?;

        let mut ctx = ChartBuilder::on(&root_area)
            .set_label_area_size(LabelAreaPosition::Left, 40)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .caption(yvar.as_str(), ("sans-serif", 40))
            .build_cartesian_2d(0.0..xmax, ymin..ymax)?;

        ctx.configure_mesh().draw()?;

        ctx.draw_series(LineSeries::new(plot_data, &GREEN))?;

        root_area.present()?;
    }

    Ok(())
}
