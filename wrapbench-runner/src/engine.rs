//! Suite Engine
//!
//! Runs one suite end to end: filter, discover, plan, execute, aggregate,
//! and assemble the [`Summary`].

use crate::RunError;
use crate::config::RunConfig;
use crate::executor::{
    BootstrapSettings, InProcessExecutor, JobExecution, build_run_meta, build_summary,
    compute_statistics,
};
use crate::planner::{JobFilter, build_plan};
use chrono::Utc;
use std::time::Instant;
use wrapbench_core::{BenchmarkConfig, BenchmarkSuite, Job, discover};
use wrapbench_report::Summary;

/// Benchmark engine bound to a resolved configuration
#[derive(Debug, Clone)]
pub struct Engine {
    config: RunConfig,
    execution: BenchmarkConfig,
}

impl Engine {
    /// Engine for `config`; fails when durations or limits are invalid
    pub fn new(config: RunConfig) -> Result<Self, RunError> {
        let execution = config.execution_config().map_err(RunError::Config)?;
        Ok(Self { config, execution })
    }

    /// Configuration this engine runs with
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Global execution settings, before per-benchmark overrides
    pub fn execution_config(&self) -> &BenchmarkConfig {
        &self.execution
    }

    /// Run suite `T`; `args` select jobs by regex.
    pub fn run_suite<T: BenchmarkSuite>(&self, args: Option<&[String]>) -> Result<Summary, RunError> {
        let filter = JobFilter::from_args(args)?;
        let plan = build_plan(discover::<T>()?, &filter);

        let timestamp = Utc::now();
        let start = Instant::now();
        tracing::info!(
            suite = T::name(),
            jobs = plan.selected.len(),
            skipped = plan.skipped.len(),
            isolation = self.config.runner.isolation.as_str(),
            "running suite"
        );

        let executions = self.execute(&plan.selected)?;
        let stats = compute_statistics(
            &executions,
            self.config.outlier_method(),
            self.execution.confidence_level,
        );

        let title = self
            .config
            .output
            .title
            .clone()
            .unwrap_or_else(|| T::name().to_string());
        let meta = build_run_meta(&self.config, &self.execution, timestamp);
        let bootstrap = BootstrapSettings {
            iterations: self.config.runner.bootstrap_iterations,
            confidence_level: self.execution.confidence_level,
        };
        let summary = build_summary(
            &title,
            meta,
            &plan,
            &executions,
            &stats,
            bootstrap,
            start.elapsed().as_secs_f64() * 1e3,
        );

        tracing::info!(
            suite = T::name(),
            passed = summary.totals.passed,
            failed = summary.totals.failed,
            crashed = summary.totals.crashed,
            skipped = summary.totals.skipped,
            duration_ms = summary.totals.total_duration_ms,
            "suite finished"
        );
        Ok(summary)
    }

    fn execute<T: BenchmarkSuite>(&self, jobs: &[Job<T>]) -> Result<Vec<JobExecution>, RunError> {
        let show_progress = self.config.output.show_progress;
        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        if self.config.runner.isolation.is_isolated() {
            #[cfg(unix)]
            {
                let executor = crate::executor::IsolatedExecutor::new(
                    self.execution.clone(),
                    self.config.worker_count(),
                    self.config.runner.persistent,
                    show_progress,
                );
                return Ok(executor.execute(jobs)?);
            }
            #[cfg(not(unix))]
            tracing::warn!("process isolation is only supported on Unix; running in-process");
        }

        Ok(InProcessExecutor::new(self.execution.clone(), show_progress).execute(jobs))
    }
}
