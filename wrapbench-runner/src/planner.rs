//! Benchmark Planner
//!
//! Splits the discovered jobs into those to run and those filtered out.
//!
//! Each argument is a regex matched against the full id (`Suite::job_id`)
//! and the plain job id; a job runs if any pattern matches. No arguments
//! select everything. Discovery order is kept.

use crate::RunError;
use regex::Regex;
use wrapbench_core::{BenchmarkSuite, Job};

/// Job selection built from the argument list
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    patterns: Vec<Regex>,
}

impl JobFilter {
    /// Compile every argument into a pattern.
    ///
    /// Arguments starting with `-` look like CLI flags, which are not
    /// interpreted; they are dropped with a warning.
    pub fn from_args(args: Option<&[String]>) -> Result<Self, RunError> {
        let mut patterns = Vec::new();
        for arg in args.unwrap_or_default() {
            if arg.starts_with('-') {
                tracing::warn!(argument = %arg, "ignoring flag-like argument; arguments are job filters");
                continue;
            }
            let pattern = Regex::new(arg).map_err(|source| RunError::InvalidFilter {
                pattern: arg.clone(),
                source,
            })?;
            patterns.push(pattern);
        }
        Ok(Self { patterns })
    }

    /// Whether every job is selected
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether the job with these ids is selected
    pub fn matches(&self, full_id: &str, id: &str) -> bool {
        self.is_empty()
            || self
                .patterns
                .iter()
                .any(|re| re.is_match(full_id) || re.is_match(id))
    }
}

/// Execution plan for one suite
pub struct ExecutionPlan<T> {
    /// Jobs to run, in discovery order
    pub selected: Vec<Job<T>>,
    /// Jobs excluded by the filter
    pub skipped: Vec<Job<T>>,
}

/// Partition `jobs` with `filter`
pub fn build_plan<T: BenchmarkSuite>(jobs: Vec<Job<T>>, filter: &JobFilter) -> ExecutionPlan<T> {
    let (selected, skipped): (Vec<_>, Vec<_>) = jobs
        .into_iter()
        .partition(|job| filter.matches(&job.full_id, &job.id));

    tracing::debug!(
        selected = selected.len(),
        skipped = skipped.len(),
        "execution plan built"
    );

    ExecutionPlan { selected, skipped }
}
