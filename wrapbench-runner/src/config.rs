//! Configuration loading from wrapbench.toml
//!
//! A `wrapbench.toml` in the project root is discovered by walking up from
//! the current directory. Every key is optional.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use wrapbench_core::BenchmarkConfig;
use wrapbench_stats::OutlierMethod;

/// File name looked up by [`RunConfig::discover`]
pub const CONFIG_FILE_NAME: &str = "wrapbench.toml";

/// wrapbench configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RunConfig {
    /// Execution settings
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Allocation tracking
    #[serde(default)]
    pub allocator: AllocatorConfig,
    /// Progress, logging and title
    #[serde(default)]
    pub output: OutputConfig,
}

/// Where jobs execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationMode {
    /// Sequentially in the calling process (default)
    #[default]
    InProcess,
    /// In re-executed worker processes
    Process,
}

impl IsolationMode {
    /// Whether jobs run in worker processes
    pub fn is_isolated(self) -> bool {
        matches!(self, IsolationMode::Process)
    }

    /// Name as written in the config file
    pub fn as_str(self) -> &'static str {
        match self {
            IsolationMode::InProcess => "in-process",
            IsolationMode::Process => "process",
        }
    }
}

/// Outlier detection selected in the config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutlierSetting {
    /// Tukey fences at 1.5 IQR
    #[default]
    Iqr,
    /// |z| > 3
    Zscore,
    /// Keep every sample
    None,
}

impl OutlierSetting {
    /// Name as written in the config file
    pub fn as_str(self) -> &'static str {
        match self {
            OutlierSetting::Iqr => "iqr",
            OutlierSetting::Zscore => "zscore",
            OutlierSetting::None => "none",
        }
    }
}

impl From<OutlierSetting> for OutlierMethod {
    fn from(setting: OutlierSetting) -> Self {
        match setting {
            OutlierSetting::Iqr => OutlierMethod::Iqr { k: 1.5 },
            OutlierSetting::Zscore => OutlierMethod::ZScore { threshold: 3.0 },
            OutlierSetting::None => OutlierMethod::None,
        }
    }
}

/// Runner configuration for benchmark execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Warmup duration before measurement (e.g., "1s")
    #[serde(default = "default_warmup")]
    pub warmup_time: String,
    /// Measurement budget (e.g., "3s")
    #[serde(default = "default_measurement")]
    pub measurement_time: String,
    /// Timeout for a single job (e.g., "60s", "5m")
    #[serde(default = "default_timeout")]
    pub timeout: String,
    /// "in-process" or "process"
    #[serde(default)]
    pub isolation: IsolationMode,
    /// Reuse worker processes across jobs
    #[serde(default = "default_persistent")]
    pub persistent: bool,
    /// Number of parallel isolated workers
    #[serde(default)]
    pub jobs: Option<usize>,
    /// Fixed sample count: skip warmup, run exactly N invocations
    #[serde(default)]
    pub samples: Option<u64>,
    /// Minimum measured invocations
    #[serde(default)]
    pub min_iterations: Option<u64>,
    /// Maximum measured invocations
    #[serde(default)]
    pub max_iterations: Option<u64>,
    /// Samples to collect per job
    #[serde(default = "default_target_samples")]
    pub target_samples: u64,
    /// Stop once the relative margin of error is below this (0 disables)
    #[serde(default = "default_max_relative_error")]
    pub max_relative_error: f64,
    /// Bootstrap resamples (0 skips bootstrap)
    #[serde(default = "default_bootstrap_iterations")]
    pub bootstrap_iterations: usize,
    /// Confidence level (e.g., 0.95 for 95%)
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
    /// "iqr", "zscore" or "none"
    #[serde(default)]
    pub outlier_method: OutlierSetting,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            warmup_time: default_warmup(),
            measurement_time: default_measurement(),
            timeout: default_timeout(),
            isolation: IsolationMode::default(),
            persistent: default_persistent(),
            jobs: None,
            samples: None,
            min_iterations: None,
            max_iterations: None,
            target_samples: default_target_samples(),
            max_relative_error: default_max_relative_error(),
            bootstrap_iterations: default_bootstrap_iterations(),
            confidence_level: default_confidence_level(),
            outlier_method: OutlierSetting::default(),
        }
    }
}

fn default_warmup() -> String {
    "1s".to_string()
}
fn default_measurement() -> String {
    "3s".to_string()
}
fn default_timeout() -> String {
    "60s".to_string()
}
fn default_persistent() -> bool {
    true
}
fn default_target_samples() -> u64 {
    100
}
fn default_max_relative_error() -> f64 {
    0.02
}
fn default_bootstrap_iterations() -> usize {
    wrapbench_stats::DEFAULT_BOOTSTRAP_ITERATIONS
}
fn default_confidence_level() -> f64 {
    wrapbench_stats::DEFAULT_CONFIDENCE_LEVEL
}

/// Allocator tracking configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocatorConfig {
    /// Count allocations during measurement (needs [`wrapbench_core::TrackingAllocator`])
    #[serde(default = "default_track")]
    pub track: bool,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            track: default_track(),
        }
    }
}

fn default_track() -> bool {
    true
}

/// Output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Draw a progress bar while jobs run
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
    /// `tracing` filter used when `WRAPBENCH_LOG` is unset
    #[serde(default)]
    pub log_level: Option<String>,
    /// Summary title (defaults to the suite name)
    #[serde(default)]
    pub title: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            show_progress: default_show_progress(),
            log_level: None,
            title: None,
        }
    }
}

fn default_show_progress() -> bool {
    true
}

impl RunConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Find `wrapbench.toml` by walking up from the current directory.
    ///
    /// `Ok(None)` when no file exists; a file that fails to parse is an error.
    pub fn discover() -> anyhow::Result<Option<Self>> {
        let mut dir = std::env::current_dir().context("cannot read current directory")?;
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.is_file() {
                tracing::debug!(path = %config_path.display(), "loading configuration");
                return Self::load(&config_path).map(Some);
            }
            if !dir.pop() {
                return Ok(None);
            }
        }
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# wrapbench configuration

[runner]
# Warmup duration before measurement
warmup_time = "1s"
# Measurement budget per job
measurement_time = "3s"
# Timeout for a single job
timeout = "60s"
# Isolation mode: "in-process" or "process"
isolation = "in-process"
# Reuse worker processes across jobs (process isolation only)
persistent = true
# Number of parallel isolated workers (uncomment to enable)
# jobs = 4
# Fixed sample count: skip warmup, run exactly N invocations (uncomment to enable)
# samples = 5
# Minimum measured invocations (uncomment to enable)
# min_iterations = 100
# Maximum measured invocations (uncomment to enable)
# max_iterations = 1000000
# Samples per job
target_samples = 100
# Stop early once the relative margin of error falls below this (0 disables)
max_relative_error = 0.02
# Bootstrap iterations for confidence intervals (0 disables)
bootstrap_iterations = 10000
# Confidence level (0.0 to 1.0)
confidence_level = 0.95
# Outlier detection: "iqr", "zscore" or "none"
outlier_method = "iqr"

[allocator]
# Track memory allocations during benchmarks
track = true

[output]
# Show a progress bar
show_progress = true
# Log filter used when WRAPBENCH_LOG is unset (uncomment to enable)
# log_level = "wrapbench=debug"
# Summary title (uncomment to enable)
# title = "nightly"
"#
        .to_string()
    }

    /// Parse duration string (e.g., "3s", "500ms", "2m") to nanoseconds
    pub fn parse_duration(s: &str) -> anyhow::Result<u64> {
        let s = s.trim();
        if s.is_empty() {
            anyhow::bail!("empty duration string");
        }

        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic() || *c == 'µ')
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "s"));

        let value: f64 = num_part
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid duration number: {num_part:?}"))?;
        if !value.is_finite() || value < 0.0 {
            anyhow::bail!("duration must be non-negative: {s:?}");
        }

        let multiplier: u64 = match unit_part.to_lowercase().as_str() {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" | "min" => 60_000_000_000,
            _ => anyhow::bail!("unknown duration unit: {unit_part:?}"),
        };

        Ok((value * multiplier as f64) as u64)
    }

    /// Resolve durations and limits into the engine's [`BenchmarkConfig`]
    pub fn execution_config(&self) -> anyhow::Result<BenchmarkConfig> {
        let runner = &self.runner;
        let config = BenchmarkConfig {
            warmup_time_ns: Self::parse_duration(&runner.warmup_time).context("runner.warmup_time")?,
            measurement_time_ns: Self::parse_duration(&runner.measurement_time)
                .context("runner.measurement_time")?,
            timeout_ns: Self::parse_duration(&runner.timeout).context("runner.timeout")?,
            samples: runner.samples,
            min_iterations: runner.min_iterations,
            max_iterations: runner.max_iterations,
            target_samples: runner.target_samples,
            max_relative_error: runner.max_relative_error,
            confidence_level: runner.confidence_level,
            track_allocations: self.allocator.track,
        };
        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }

    /// Outlier detection used by the aggregator
    pub fn outlier_method(&self) -> OutlierMethod {
        self.runner.outlier_method.into()
    }

    /// Worker count for process isolation (at least one)
    pub fn worker_count(&self) -> usize {
        self.runner.jobs.unwrap_or(1).max(1)
    }
}
