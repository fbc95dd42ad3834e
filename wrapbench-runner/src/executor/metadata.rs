//! Run Metadata Collection
//!
//! Git, host and configuration details stored with every summary.
//! Linux-specific data (CPU model, memory, kernel release) degrades to
//! "unknown" or 0 elsewhere.

use crate::config::RunConfig;
use chrono::{DateTime, Utc};
use wrapbench_core::{BenchmarkConfig, HAS_CYCLE_COUNTER};
use wrapbench_report::{HostEnvironment, ReportConfig, RunMeta, SCHEMA_VERSION};

/// Build run metadata for a run that started at `timestamp`
pub fn build_run_meta(
    config: &RunConfig,
    execution: &BenchmarkConfig,
    timestamp: DateTime<Utc>,
) -> RunMeta {
    RunMeta {
        schema_version: SCHEMA_VERSION,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp,
        git_commit: git(&["rev-parse", "HEAD"]),
        git_branch: git(&["rev-parse", "--abbrev-ref", "HEAD"]),
        host: host_environment(),
        config: report_config(config, execution),
    }
}

/// Effective configuration as recorded in the summary
pub fn report_config(config: &RunConfig, execution: &BenchmarkConfig) -> ReportConfig {
    ReportConfig {
        warmup_time_ns: execution.warmup_time_ns,
        measurement_time_ns: execution.measurement_time_ns,
        timeout_ns: execution.timeout_ns,
        samples: execution.samples,
        min_iterations: execution.min_iterations,
        max_iterations: execution.max_iterations,
        target_samples: execution.target_samples,
        max_relative_error: execution.max_relative_error,
        bootstrap_iterations: config.runner.bootstrap_iterations,
        confidence_level: execution.confidence_level,
        outlier_method: config.runner.outlier_method.as_str().to_string(),
        isolation: config.runner.isolation.as_str().to_string(),
        track_allocations: execution.track_allocations,
    }
}

/// Output of a git command, if git is present and the cwd is a repository
fn git(args: &[&str]) -> Option<String> {
    let output = std::process::Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Description of the machine the run executes on
pub fn host_environment() -> HostEnvironment {
    HostEnvironment {
        os: std::env::consts::OS.to_string(),
        os_version: os_release().unwrap_or_else(|| "unknown".to_string()),
        arch: std::env::consts::ARCH.to_string(),
        cpu: cpu_model().unwrap_or_else(|| "unknown".to_string()),
        cpu_cores: num_cpus(),
        memory_gb: memory_gb().unwrap_or(0.0),
        has_cycle_counter: HAS_CYCLE_COUNTER,
    }
}

fn os_release() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/sys/kernel/osrelease")
            .ok()
            .map(|s| s.trim().to_string())
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// CPU model name from /proc/cpuinfo
fn cpu_model() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/cpuinfo")
            .ok()
            .and_then(|content| {
                content
                    .lines()
                    .find(|l| l.starts_with("model name"))
                    .and_then(|l| l.split(':').nth(1))
                    .map(|s| s.trim().to_string())
            })
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

fn num_cpus() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}

/// Total memory from /proc/meminfo
fn memory_gb() -> Option<f64> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/meminfo")
            .ok()
            .and_then(|content| {
                content
                    .lines()
                    .find(|l| l.starts_with("MemTotal"))
                    .and_then(|l| l.split_whitespace().nth(1))
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(|kb| kb as f64 / 1024.0 / 1024.0)
            })
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}
