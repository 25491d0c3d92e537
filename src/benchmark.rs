use chrono::Local;
use std::collections::{BTreeMap, HashMap};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const HEADER: [&str; 5] = ["Date", "Input_Directory", "File_Count", "Step", "Duration_Seconds"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BenchmarkStep {
    Extract,
    Split,
    Align,
    Trim,
    Concatenate,
    Tree,
    Total,
}

impl BenchmarkStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            BenchmarkStep::Extract => "extract",
            BenchmarkStep::Split => "split",
            BenchmarkStep::Align => "align",
            BenchmarkStep::Trim => "trim",
            BenchmarkStep::Concatenate => "concatenate",
            BenchmarkStep::Tree => "tree",
            BenchmarkStep::Total => "total",
        }
    }
}

/// Per-step wall clock timings. A disabled benchmark ignores every call.
#[derive(Debug, Default)]
pub struct Benchmark {
    enabled: bool,
    timings: BTreeMap<BenchmarkStep, Duration>,
    started: HashMap<BenchmarkStep, Instant>,
}

impl Benchmark {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn start(&mut self, step: BenchmarkStep) {
        if self.enabled {
            self.started.insert(step, Instant::now());
        }
    }

    pub fn stop(&mut self, step: BenchmarkStep) {
        if !self.enabled {
            return;
        }
        match self.started.remove(&step) {
            Some(started) => self.record(step, started.elapsed()),
            None => warn!("Benchmark stop called for {} without start", step.as_str()),
        }
    }

    /// Add `elapsed` to `step`; repeated steps accumulate.
    pub fn record(&mut self, step: BenchmarkStep, elapsed: Duration) {
        if !self.enabled {
            return;
        }
        *self.timings.entry(step).or_default() += elapsed;
        info!("Benchmark {}: {:.2}s", step.as_str(), elapsed.as_secs_f64());
    }

    pub fn timings(&self) -> &BTreeMap<BenchmarkStep, Duration> {
        &self.timings
    }

    /// Append one row per step to a TSV file, writing the header only for a new file.
    pub fn save(&self, path: &Path, input_dir: &Path, file_count: usize) -> io::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let is_new = !path.exists();
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if is_new {
            writeln!(file, "{}", HEADER.join("\t"))?;
        }

        let date = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let input_name = std::fs::canonicalize(input_dir)
            .unwrap_or_else(|_| input_dir.to_path_buf())
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        for (step, duration) in &self.timings {
            writeln!(
                file,
                "{}\t{}\t{}\t{}\t{:.4}",
                date,
                input_name,
                file_count,
                step.as_str(),
                duration.as_secs_f64()
            )?;
        }
        info!("Benchmark results saved to {}", path.display());
        Ok(())
    }
}
