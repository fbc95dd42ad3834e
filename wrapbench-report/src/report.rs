//! Result Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wrapbench_stats::{CyclesStatistics, SummaryStatistics};

/// Current summary schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Immutable outcome of one suite run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Run title (suite name unless configured)
    pub title: String,
    /// Environment and configuration of the run
    pub meta: RunMeta,
    /// One entry per executed or skipped job, in discovery order
    pub reports: Vec<BenchmarkReport>,
    /// Status counts
    pub totals: SummaryTotals,
}

impl Summary {
    /// Assemble a summary, tallying totals from `reports`
    pub fn new(
        title: impl Into<String>,
        meta: RunMeta,
        reports: Vec<BenchmarkReport>,
        total_duration_ms: f64,
    ) -> Self {
        let totals = SummaryTotals::tally(&reports, total_duration_ms);
        Self {
            title: title.into(),
            meta,
            reports,
            totals,
        }
    }

    /// Look up a report by job id or full id
    pub fn report(&self, id: &str) -> Option<&BenchmarkReport> {
        self.reports
            .iter()
            .find(|r| r.job.id == id || r.job.full_id == id)
    }

    /// Reports that passed
    pub fn successful(&self) -> impl Iterator<Item = &BenchmarkReport> {
        self.reports
            .iter()
            .filter(|r| r.status == BenchmarkStatus::Passed)
    }

    /// Whether any job failed or crashed
    pub fn has_failures(&self) -> bool {
        self.totals.failed + self.totals.crashed > 0
    }
}

/// Run metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    /// Summary schema version
    pub schema_version: u32,
    /// wrapbench version that produced the summary
    pub version: String,
    /// Start of the run
    pub timestamp: DateTime<Utc>,
    /// Git commit of the working directory, if any
    pub git_commit: Option<String>,
    /// Git branch of the working directory, if any
    pub git_branch: Option<String>,
    /// Host the run executed on
    pub host: HostEnvironment,
    /// Effective run configuration
    pub config: ReportConfig,
}

/// Host description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostEnvironment {
    /// Operating system family
    pub os: String,
    /// Kernel or OS release
    pub os_version: String,
    /// CPU architecture
    pub arch: String,
    /// CPU model
    pub cpu: String,
    /// Logical cores
    pub cpu_cores: u32,
    /// Physical memory
    pub memory_gb: f64,
    /// Hardware cycle counter available
    pub has_cycle_counter: bool,
}

/// Run configuration captured in the summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Warmup time per job
    pub warmup_time_ns: u64,
    /// Measurement budget per job
    pub measurement_time_ns: u64,
    /// Per-job timeout
    pub timeout_ns: u64,
    /// Fixed sample count, if any
    pub samples: Option<u64>,
    /// Minimum measured invocations
    pub min_iterations: Option<u64>,
    /// Maximum measured invocations
    pub max_iterations: Option<u64>,
    /// Sample target
    pub target_samples: u64,
    /// Relative error stop threshold
    pub max_relative_error: f64,
    /// Bootstrap resamples
    pub bootstrap_iterations: usize,
    /// Confidence level for error and intervals
    pub confidence_level: f64,
    /// Outlier method name
    pub outlier_method: String,
    /// `in-process` or `process`
    pub isolation: String,
    /// Allocation tracking requested
    pub track_allocations: bool,
}

/// Identity of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    /// Suite name
    pub suite: String,
    /// `method` or `method@name=value,...`
    pub id: String,
    /// `Suite::id`
    pub full_id: String,
    /// Benchmark method name
    pub method: String,
    /// Group, if any
    pub group: Option<String>,
    /// Description, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Parameter values, in declaration order
    #[serde(default)]
    pub params: Vec<ParamEntry>,
    /// Baseline of its group
    pub baseline: bool,
}

/// One parameter value, rendered as text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamEntry {
    /// Parameter name
    pub name: String,
    /// Rendered value
    pub value: String,
}

/// Result of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    /// Which job
    pub job: JobInfo,
    /// How it ended
    pub status: BenchmarkStatus,
    /// Statistics; present only when samples were collected
    pub metrics: Option<Metrics>,
    /// Mean relative to the group's baseline with the same parameters
    pub ratio: Option<f64>,
    /// Invocations including warmup
    pub iterations: u64,
    /// Invocations during measurement, each counted in exactly one sample
    pub measured_iterations: u64,
    /// Stopped on relative-error convergence
    pub stabilized: bool,
    /// Failure details
    pub failure: Option<FailureInfo>,
}

impl BenchmarkReport {
    /// Report for a job that produced no measurement
    pub fn without_metrics(job: JobInfo, status: BenchmarkStatus, failure: Option<FailureInfo>) -> Self {
        Self {
            job,
            status,
            metrics: None,
            ratio: None,
            iterations: 0,
            measured_iterations: 0,
            stabilized: false,
            failure,
        }
    }

    /// Mean time in nanoseconds, if measured
    pub fn mean_ns(&self) -> Option<f64> {
        self.metrics.as_ref().map(|m| m.mean_ns)
    }
}

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BenchmarkStatus {
    /// Measured successfully
    Passed,
    /// Timed out or the worker failed
    Failed,
    /// Panicked or the worker died
    Crashed,
    /// Not run
    Skipped,
}

/// Aggregated statistics for one job (nanoseconds per invocation)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Number of samples
    pub samples: usize,
    /// Mean
    pub mean_ns: f64,
    /// Margin of error of the mean at `ci_level`
    pub error_ns: f64,
    /// Standard deviation
    pub std_dev_ns: f64,
    /// Standard error of the mean
    pub std_error_ns: f64,
    /// Median
    pub median_ns: f64,
    /// Fastest sample
    pub min_ns: f64,
    /// Slowest sample
    pub max_ns: f64,
    /// 50th percentile
    pub p50_ns: f64,
    /// 90th percentile
    pub p90_ns: f64,
    /// 95th percentile
    pub p95_ns: f64,
    /// 99th percentile
    pub p99_ns: f64,
    /// 99.9th percentile
    pub p999_ns: f64,
    /// Skewness
    pub skewness: f64,
    /// Kurtosis
    pub kurtosis: f64,
    /// Samples flagged as outliers
    pub outliers: usize,
    /// Bootstrap CI lower bound of the mean
    pub ci_lower_ns: f64,
    /// Bootstrap CI upper bound of the mean
    pub ci_upper_ns: f64,
    /// Confidence level
    pub ci_level: f64,
    /// Invocations per second at the mean
    pub throughput_ops_sec: Option<f64>,
    /// Mean bytes allocated per invocation
    pub alloc_bytes: u64,
    /// Mean allocations per invocation
    pub alloc_count: u64,
    /// Mean cycles per invocation (0 without a cycle counter)
    pub mean_cycles: f64,
    /// Median cycles per invocation
    pub median_cycles: f64,
    /// Fewest cycles
    pub min_cycles: u64,
    /// Most cycles
    pub max_cycles: u64,
    /// Cycles per nanosecond
    pub cycles_per_ns: f64,
}

impl From<&SummaryStatistics> for Metrics {
    fn from(stats: &SummaryStatistics) -> Self {
        Self {
            samples: stats.sample_count,
            mean_ns: stats.mean,
            error_ns: stats.margin_of_error,
            std_dev_ns: stats.std_dev,
            std_error_ns: stats.standard_error,
            median_ns: stats.median,
            min_ns: stats.min,
            max_ns: stats.max,
            p50_ns: stats.p50,
            p90_ns: stats.p90,
            p95_ns: stats.p95,
            p99_ns: stats.p99,
            p999_ns: stats.p999,
            skewness: stats.skewness,
            kurtosis: stats.kurtosis,
            outliers: stats.outlier_count,
            // Bootstrap fills these when it runs
            ci_lower_ns: stats.mean - stats.margin_of_error,
            ci_upper_ns: stats.mean + stats.margin_of_error,
            ci_level: stats.confidence_level,
            throughput_ops_sec: (stats.mean > 0.0).then(|| 1e9 / stats.mean),
            alloc_bytes: 0,
            alloc_count: 0,
            mean_cycles: 0.0,
            median_cycles: 0.0,
            min_cycles: 0,
            max_cycles: 0,
            cycles_per_ns: 0.0,
        }
    }
}

impl Metrics {
    /// Copy cycle statistics in
    pub fn with_cycles(mut self, cycles: &CyclesStatistics) -> Self {
        self.mean_cycles = cycles.mean_cycles;
        self.median_cycles = cycles.median_cycles;
        self.min_cycles = cycles.min_cycles;
        self.max_cycles = cycles.max_cycles;
        self.cycles_per_ns = cycles.cycles_per_ns;
        self
    }

    /// Relative margin of error (fraction of the mean)
    pub fn relative_error(&self) -> f64 {
        if self.mean_ns == 0.0 {
            0.0
        } else {
            self.error_ns / self.mean_ns
        }
    }
}

/// Why a job has no metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureInfo {
    /// `panic`, `timeout`, `crashed`, `unknown_job`, `ipc`
    pub kind: String,
    /// Human-readable reason
    pub message: String,
}

impl FailureInfo {
    /// Failure of `kind` with `message`
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Status counts for a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryTotals {
    /// Jobs reported
    pub total: usize,
    /// Passed
    pub passed: usize,
    /// Failed
    pub failed: usize,
    /// Crashed
    pub crashed: usize,
    /// Skipped
    pub skipped: usize,
    /// Wall time of the whole run
    pub total_duration_ms: f64,
}

impl SummaryTotals {
    /// Count statuses in `reports`
    pub fn tally(reports: &[BenchmarkReport], total_duration_ms: f64) -> Self {
        let mut totals = SummaryTotals {
            total: reports.len(),
            total_duration_ms,
            ..Default::default()
        };
        for report in reports {
            match report.status {
                BenchmarkStatus::Passed => totals.passed += 1,
                BenchmarkStatus::Failed => totals.failed += 1,
                BenchmarkStatus::Crashed => totals.crashed += 1,
                BenchmarkStatus::Skipped => totals.skipped += 1,
            }
        }
        totals
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn meta() -> RunMeta {
        RunMeta {
            schema_version: SCHEMA_VERSION,
            version: "0.1.0".to_string(),
            timestamp: DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            git_commit: Some("abc123".to_string()),
            git_branch: None,
            host: HostEnvironment {
                os: "linux".to_string(),
                os_version: "6.1".to_string(),
                arch: "x86_64".to_string(),
                cpu: "Test CPU".to_string(),
                cpu_cores: 8,
                memory_gb: 16.0,
                has_cycle_counter: true,
            },
            config: ReportConfig {
                warmup_time_ns: 1_000_000_000,
                measurement_time_ns: 3_000_000_000,
                timeout_ns: 60_000_000_000,
                samples: None,
                min_iterations: None,
                max_iterations: None,
                target_samples: 100,
                max_relative_error: 0.02,
                bootstrap_iterations: 10_000,
                confidence_level: 0.95,
                outlier_method: "iqr".to_string(),
                isolation: "in-process".to_string(),
                track_allocations: true,
            },
        }
    }

    pub fn job(id: &str) -> JobInfo {
        let method = id.split('@').next().unwrap_or(id).to_string();
        JobInfo {
            suite: "Parsing".to_string(),
            id: id.to_string(),
            full_id: format!("Parsing::{id}"),
            method,
            group: None,
            description: None,
            tags: Vec::new(),
            params: Vec::new(),
            baseline: false,
        }
    }

    pub fn passed(id: &str, mean_ns: f64) -> BenchmarkReport {
        let stats = wrapbench_stats::compute_summary(
            &[mean_ns * 0.99, mean_ns, mean_ns * 1.01],
            wrapbench_stats::OutlierMethod::None,
        );
        BenchmarkReport {
            metrics: Some(Metrics::from(&stats)),
            iterations: 300,
            measured_iterations: 3,
            ..BenchmarkReport::without_metrics(job(id), BenchmarkStatus::Passed, None)
        }
    }

    pub fn crashed(id: &str) -> BenchmarkReport {
        BenchmarkReport::without_metrics(
            job(id),
            BenchmarkStatus::Crashed,
            Some(FailureInfo::new("panic", "index out of bounds")),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_totals_and_lookup() {
        let summary = Summary::new(
            "Parsing",
            meta(),
            vec![passed("json@n=10", 120.0), crashed("xml"), passed("csv", 80.0)],
            12.5,
        );

        assert_eq!(summary.totals.total, 3);
        assert_eq!(summary.totals.passed, 2);
        assert_eq!(summary.totals.crashed, 1);
        assert!(summary.has_failures());
        assert_eq!(summary.successful().count(), 2);

        assert!(summary.report("json@n=10").is_some());
        assert!(summary.report("Parsing::csv").is_some());
        assert!(summary.report("yaml").is_none());
        assert_eq!(summary.report("xml").unwrap().metrics, None);
    }

    #[test]
    fn test_metrics_from_summary_statistics() {
        let stats = wrapbench_stats::compute_summary(
            &[10.0, 11.0, 9.0, 10.0, 10.0],
            wrapbench_stats::OutlierMethod::None,
        );
        let metrics = Metrics::from(&stats);

        assert_eq!(metrics.samples, 5);
        assert!((metrics.mean_ns - 10.0).abs() < 1e-9);
        assert!(metrics.error_ns > 0.0);
        assert!(metrics.ci_lower_ns < metrics.mean_ns && metrics.ci_upper_ns > metrics.mean_ns);
        assert!((metrics.throughput_ops_sec.unwrap() - 1e8).abs() < 1.0);
        assert!(metrics.relative_error() > 0.0);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&BenchmarkStatus::Crashed).unwrap();
        assert_eq!(json, "\"crashed\"");
    }
}
