//! Summary Building
//!
//! Turns executions and their statistics into the [`Summary`]:
//!
//! ```text
//! JobExecution + SummaryStatistics
//!              │
//!              ▼
//!   ┌─────────────────────┐
//!   │ Parallel Bootstrap  │  rayon, skipped when bootstrap_iterations = 0
//!   └──────────┬──────────┘
//!              ▼
//!   ┌─────────────────────┐
//!   │      Metrics        │  timing + allocations + cycles
//!   └──────────┬──────────┘
//!              ▼
//!   ┌─────────────────────┐
//!   │  Baseline ratios    │  mean / mean of the group's baseline
//!   └──────────┬──────────┘
//!              ▼
//!           Summary
//! ```

use super::execution::JobExecution;
use crate::planner::ExecutionPlan;
use rayon::prelude::*;
use wrapbench_core::{BenchmarkSuite, Job};
use wrapbench_report::{
    BenchmarkReport, BenchmarkStatus, JobInfo, Metrics, ParamEntry, RunMeta, Summary,
};
use wrapbench_stats::{BootstrapConfig, SummaryStatistics, compute_bootstrap, compute_cycles_stats};

/// Bootstrap settings for the confidence interval of the mean
#[derive(Debug, Clone, Copy)]
pub struct BootstrapSettings {
    /// Resamples; 0 keeps the t-distribution interval
    pub iterations: usize,
    /// Confidence level
    pub confidence_level: f64,
}

/// Identity of `job` as recorded in the summary
pub fn job_info<T: BenchmarkSuite>(job: &Job<T>) -> JobInfo {
    JobInfo {
        suite: T::name().to_string(),
        id: job.id.clone(),
        full_id: job.full_id.clone(),
        method: job.def.name.to_string(),
        group: job.def.group.map(str::to_string),
        description: job.def.description.map(str::to_string),
        tags: job.def.tags.iter().map(|t| t.to_string()).collect(),
        params: job
            .params
            .iter()
            .map(|(name, value)| ParamEntry {
                name: name.to_string(),
                value: value.to_string(),
            })
            .collect(),
        baseline: job.def.baseline,
    }
}

/// Metrics for one execution; bootstrap runs only when asked for.
///
/// The bootstrap resamples the outlier-cleaned set, the same samples the
/// reported mean is computed from.
fn build_metrics(
    execution: &JobExecution,
    stats: &SummaryStatistics,
    bootstrap: BootstrapSettings,
) -> Metrics {
    let timings = execution.timings();
    let mut metrics = Metrics::from(stats).with_cycles(&compute_cycles_stats(&execution.cycles(), &timings));

    if bootstrap.iterations > 0 {
        let config = BootstrapConfig {
            iterations: bootstrap.iterations,
            confidence_level: bootstrap.confidence_level,
            ..Default::default()
        };
        match compute_bootstrap(&stats.outlier_analysis.cleaned_samples, &config) {
            Ok(result) => {
                metrics.ci_lower_ns = result.confidence_interval.lower;
                metrics.ci_upper_ns = result.confidence_interval.upper;
                metrics.ci_level = result.confidence_interval.level;
            }
            Err(e) => tracing::debug!(error = %e, "bootstrap skipped"),
        }
    }

    let (alloc_bytes, alloc_count) = execution.allocations();
    metrics.alloc_bytes = alloc_bytes;
    metrics.alloc_count = alloc_count;
    metrics
}

/// Assemble the summary for `plan`.
///
/// `executions` and `stats` are parallel to `plan.selected`. Jobs filtered
/// out of the plan are reported as skipped. Reports are in discovery order.
pub fn build_summary<T: BenchmarkSuite>(
    title: &str,
    meta: RunMeta,
    plan: &ExecutionPlan<T>,
    executions: &[JobExecution],
    stats: &[Option<SummaryStatistics>],
    bootstrap: BootstrapSettings,
    total_duration_ms: f64,
) -> Summary {
    // Bootstrap dominates the cost, so metrics are built in parallel
    let metrics: Vec<Option<Metrics>> = executions
        .par_iter()
        .zip(stats.par_iter())
        .map(|(execution, stats)| {
            stats
                .as_ref()
                .map(|s| build_metrics(execution, s, bootstrap))
        })
        .collect();

    let mut indexed: Vec<(usize, BenchmarkReport)> = plan
        .selected
        .iter()
        .zip(executions)
        .zip(metrics)
        .map(|((job, execution), metrics)| {
            let report = BenchmarkReport {
                job: job_info(job),
                status: execution.status,
                metrics,
                ratio: None,
                iterations: execution.iterations,
                measured_iterations: execution.measured_iterations,
                stabilized: execution.stabilized,
                failure: execution.failure.clone(),
            };
            (job.index, report)
        })
        .collect();

    indexed.extend(plan.skipped.iter().map(|job| {
        (
            job.index,
            BenchmarkReport::without_metrics(job_info(job), BenchmarkStatus::Skipped, None),
        )
    }));
    indexed.sort_by_key(|(index, _)| *index);

    let mut reports: Vec<BenchmarkReport> = indexed.into_iter().map(|(_, r)| r).collect();
    apply_baseline_ratios(&mut reports);

    Summary::new(title, meta, reports, total_duration_ms)
}

/// Set `ratio` on every measured report that has a measured baseline with
/// the same group and parameters. The baseline's own ratio is 1.0.
pub fn apply_baseline_ratios(reports: &mut [BenchmarkReport]) {
    let ratios: Vec<Option<f64>> = reports
        .iter()
        .map(|report| {
            let mean = report.mean_ns()?;
            let baseline = reports.iter().find(|candidate| {
                candidate.job.baseline
                    && candidate.job.suite == report.job.suite
                    && candidate.job.group == report.job.group
                    && candidate.job.params == report.job.params
                    && candidate.metrics.is_some()
            })?;
            let baseline_mean = baseline.mean_ns()?;
            (baseline_mean > 0.0).then(|| mean / baseline_mean)
        })
        .collect();

    for (report, ratio) in reports.iter_mut().zip(ratios) {
        report.ratio = ratio;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::metadata::build_run_meta;
    use crate::planner::{JobFilter, build_plan};
    use crate::RunConfig;
    use chrono::Utc;
    use wrapbench_core::{BenchmarkDef, ParamDef, ParamSet, discover};
    use wrapbench_ipc::Sample;

    struct Lookup;

    impl BenchmarkSuite for Lookup {
        fn name() -> &'static str {
            "Lookup"
        }

        fn params() -> Vec<ParamDef> {
            vec![ParamDef::new("n", [10i64, 20])]
        }

        fn create(_: &ParamSet) -> Self {
            Lookup
        }

        fn benchmarks() -> Vec<BenchmarkDef<Self>> {
            vec![
                BenchmarkDef::new("linear", |_: &mut Self, b| b.iter(|| 0u8))
                    .group("search")
                    .baseline(),
                BenchmarkDef::new("binary", |_: &mut Self, b| b.iter(|| 0u8)).group("search"),
                BenchmarkDef::new("hashed", |_: &mut Self, b| b.iter(|| 0u8)).tags(&["fast"]),
            ]
        }
    }

    /// Execution whose samples average `mean_ns`
    fn execution(index: usize, mean_ns: f64) -> JobExecution {
        JobExecution {
            index,
            status: BenchmarkStatus::Passed,
            samples: (0..20)
                .map(|i| Sample::new(mean_ns + (i % 5) as f64 - 2.0, 10, 64, 1, 0))
                .collect(),
            iterations: 250,
            measured_iterations: 200,
            stabilized: false,
            duration_ns: 1_000,
            failure: None,
        }
    }

    fn summarize(args: &[&str], means: &[f64], bootstrap_iterations: usize) -> Summary {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let filter = JobFilter::from_args(Some(&args)).unwrap();
        let plan = build_plan(discover::<Lookup>().unwrap(), &filter);

        let executions: Vec<_> = plan
            .selected
            .iter()
            .zip(means)
            .map(|(job, &mean)| execution(job.index, mean))
            .collect();
        let stats = crate::executor::compute_statistics(
            &executions,
            wrapbench_stats::OutlierMethod::default(),
            0.95,
        );

        let config = RunConfig::default();
        let meta = build_run_meta(&config, &config.execution_config().unwrap(), Utc::now());
        build_summary(
            "Lookup",
            meta,
            &plan,
            &executions,
            &stats,
            BootstrapSettings {
                iterations: bootstrap_iterations,
                confidence_level: 0.95,
            },
            5.0,
        )
    }

    #[test]
    fn test_baseline_ratios() {
        // linear@10, linear@20, binary@10, binary@20, hashed@10, hashed@20
        let summary = summarize(&[], &[100.0, 200.0, 50.0, 50.0, 10.0, 10.0], 0);

        let ratio = |id: &str| summary.report(id).and_then(|r| r.ratio);
        assert!((ratio("linear@n=10").unwrap() - 1.0).abs() < 1e-12);
        assert!((ratio("linear@n=20").unwrap() - 1.0).abs() < 1e-12);
        assert!((ratio("binary@n=10").unwrap() - 0.5).abs() < 1e-9);
        assert!((ratio("binary@n=20").unwrap() - 0.25).abs() < 1e-9);
        // Different group, no baseline
        assert_eq!(ratio("hashed@n=10"), None);
    }

    #[test]
    fn test_filtered_jobs_are_skipped_in_discovery_order() {
        let summary = summarize(&["binary"], &[50.0, 60.0], 0);

        let statuses: Vec<_> = summary.reports.iter().map(|r| (r.job.id.as_str(), r.status)).collect();
        assert_eq!(statuses.len(), 6);
        assert_eq!(statuses[0], ("linear@n=10", BenchmarkStatus::Skipped));
        assert_eq!(statuses[2], ("binary@n=10", BenchmarkStatus::Passed));
        assert_eq!(summary.totals.passed, 2);
        assert_eq!(summary.totals.skipped, 4);
        assert!(!summary.has_failures());
        // Baseline not measured, so no ratio
        assert_eq!(summary.report("binary@n=10").unwrap().ratio, None);
    }

    #[test]
    fn test_metrics_with_bootstrap() {
        let summary = summarize(&["^hashed@n=10$"], &[40.0], 500);
        let report = summary.report("Lookup::hashed@n=10").unwrap();
        let metrics = report.metrics.as_ref().unwrap();

        assert_eq!(metrics.samples, 20);
        assert!(metrics.ci_lower_ns <= metrics.mean_ns && metrics.mean_ns <= metrics.ci_upper_ns);
        assert_eq!(metrics.alloc_bytes, 64);
        assert_eq!(metrics.alloc_count, 1);
        assert_eq!(report.job.tags, ["fast"]);
        assert_eq!(report.job.params[0].value, "10");
        assert_eq!(report.measured_iterations, 200);
    }

    #[test]
    fn test_bootstrap_interval_brackets_cleaned_mean() {
        let plan = build_plan(
            discover::<Lookup>().unwrap(),
            &JobFilter::from_args(Some(&["^hashed@n=10$".to_string()])).unwrap(),
        );
        let mut slow = execution(plan.selected[0].index, 100.0);
        // Two stalls far out in the tail
        slow.samples[7] = Sample::new(5_000.0, 10, 64, 1, 0);
        slow.samples[15] = Sample::new(9_000.0, 10, 64, 1, 0);
        let executions = vec![slow];
        let stats = crate::executor::compute_statistics(
            &executions,
            wrapbench_stats::OutlierMethod::default(),
            0.95,
        );

        let config = RunConfig::default();
        let meta = build_run_meta(&config, &config.execution_config().unwrap(), Utc::now());
        let summary = build_summary(
            "Lookup",
            meta,
            &plan,
            &executions,
            &stats,
            BootstrapSettings {
                iterations: 2_000,
                confidence_level: 0.95,
            },
            5.0,
        );
        let metrics = summary.report("hashed@n=10").unwrap().metrics.clone().unwrap();

        assert_eq!(metrics.outliers, 2);
        assert!(metrics.mean_ns < 110.0);
        assert!(metrics.ci_lower_ns <= metrics.mean_ns, "{metrics:?}");
        assert!(metrics.mean_ns <= metrics.ci_upper_ns, "{metrics:?}");
        assert!(metrics.ci_upper_ns < 1_000.0);
    }
}
