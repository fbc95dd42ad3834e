//! Job Execution
//!
//! - **In-process (`InProcessExecutor`)**: jobs run one after another on the
//!   calling thread. Panics are caught per job.
//!
//! - **Isolated (`IsolatedExecutor`, Unix)**: jobs run in worker processes
//!   driven by the [`Supervisor`](crate::supervisor::Supervisor); a crash or
//!   timeout only costs the job that caused it.
//!
//! Both produce one [`JobExecution`] per job, in plan order.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;
use wrapbench_core::{
    BenchmarkConfig, BenchmarkResult, BenchmarkSuite, Job, JobOutcome, run_job,
};
use wrapbench_ipc::{FailureKind, Sample};
use wrapbench_report::{BenchmarkStatus, FailureInfo};

/// Raw outcome of one job
#[derive(Debug, Clone)]
pub struct JobExecution {
    /// Position of the job in discovery order
    pub index: usize,
    /// How the job ended
    pub status: BenchmarkStatus,
    /// Collected samples (possibly partial for failed jobs)
    pub samples: Vec<Sample>,
    /// Invocations including warmup
    pub iterations: u64,
    /// Invocations during measurement
    pub measured_iterations: u64,
    /// Stopped on relative-error convergence
    pub stabilized: bool,
    /// Wall time of the job
    pub duration_ns: u64,
    /// Failure details
    pub failure: Option<FailureInfo>,
}

impl JobExecution {
    /// Successful measurement
    pub fn completed(index: usize, result: BenchmarkResult, duration_ns: u64) -> Self {
        Self {
            index,
            status: BenchmarkStatus::Passed,
            samples: result.samples,
            iterations: result.iterations,
            measured_iterations: result.measured_iterations,
            stabilized: result.stabilized,
            duration_ns,
            failure: None,
        }
    }

    /// Job that produced no usable measurement
    pub fn failed(index: usize, kind: FailureKind, message: String, duration_ns: u64) -> Self {
        let status = match kind {
            FailureKind::Panic | FailureKind::Crashed => BenchmarkStatus::Crashed,
            FailureKind::Timeout | FailureKind::UnknownJob => BenchmarkStatus::Failed,
        };
        Self {
            index,
            status,
            samples: Vec::new(),
            iterations: 0,
            measured_iterations: 0,
            stabilized: false,
            duration_ns,
            failure: Some(FailureInfo::new(failure_kind_name(kind), message)),
        }
    }

    /// Outcome of a job run in a worker. Failures keep the supervisor's
    /// wall time; successes keep the worker's measurement time.
    #[cfg(unix)]
    pub(crate) fn from_ipc(index: usize, ipc: crate::supervisor::IpcJobResult) -> Self {
        use crate::supervisor::IpcJobStatus;

        match ipc.status {
            IpcJobStatus::Success => Self {
                index,
                status: BenchmarkStatus::Passed,
                samples: ipc.samples,
                iterations: ipc.total_iterations,
                measured_iterations: ipc.measured_iterations,
                stabilized: ipc.stabilized,
                duration_ns: ipc.total_duration_nanos,
                failure: None,
            },
            IpcJobStatus::Failure { kind, message } => {
                Self::failed(index, kind, message, ipc.wall_time_nanos)
            }
        }
    }

    /// Job whose effective configuration was rejected before running
    pub fn invalid(index: usize, reason: String) -> Self {
        Self {
            status: BenchmarkStatus::Failed,
            failure: Some(FailureInfo::new("config", reason)),
            ..Self::failed(index, FailureKind::UnknownJob, String::new(), 0)
        }
    }

    /// Timing per sample, nanoseconds per invocation
    pub fn timings(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.duration_nanos).collect()
    }

    /// Cycles per sample, per invocation
    pub fn cycles(&self) -> Vec<u64> {
        self.samples.iter().map(|s| s.cpu_cycles).collect()
    }

    /// Mean (bytes, count) allocated per invocation, weighted by sample size
    pub fn allocations(&self) -> (u64, u64) {
        let invocations: u64 = self.samples.iter().map(|s| s.iterations).sum();
        if invocations == 0 {
            return (0, 0);
        }
        let bytes: u64 = self.samples.iter().map(|s| s.alloc_bytes * s.iterations).sum();
        let count: u64 = self.samples.iter().map(|s| s.alloc_count * s.iterations).sum();
        (bytes / invocations, count / invocations)
    }
}

/// Name used in [`FailureInfo::kind`]
pub fn failure_kind_name(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::Panic => "panic",
        FailureKind::Timeout => "timeout",
        FailureKind::UnknownJob => "unknown_job",
        FailureKind::Crashed => "crashed",
    }
}

/// Progress bar over `len` jobs, hidden when `visible` is false
pub(crate) fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Runs jobs sequentially in the calling process
pub struct InProcessExecutor {
    base: BenchmarkConfig,
    show_progress: bool,
}

impl InProcessExecutor {
    /// Executor applying each job's overrides on top of `base`
    pub fn new(base: BenchmarkConfig, show_progress: bool) -> Self {
        Self {
            base,
            show_progress,
        }
    }

    /// Execute `jobs` in order
    pub fn execute<T: BenchmarkSuite>(&self, jobs: &[Job<T>]) -> Vec<JobExecution> {
        let pb = progress_bar(jobs.len(), self.show_progress);
        let mut results = Vec::with_capacity(jobs.len());

        for job in jobs {
            pb.set_message(job.id.clone());
            results.push(self.execute_single(job));
            pb.inc(1);
        }

        pb.finish_with_message("done");
        results
    }

    fn execute_single<T: BenchmarkSuite>(&self, job: &Job<T>) -> JobExecution {
        let config = job.config(&self.base);
        if let Err(reason) = config.validate() {
            tracing::warn!(job = %job.full_id, %reason, "invalid job configuration");
            return JobExecution::invalid(job.index, reason);
        }

        tracing::debug!(job = %job.full_id, "running");
        let start = Instant::now();
        let outcome = run_job(job, &config);
        let duration_ns = start.elapsed().as_nanos() as u64;

        match outcome {
            JobOutcome::Completed(result) => JobExecution::completed(job.index, result, duration_ns),
            JobOutcome::Panicked { message } => {
                tracing::warn!(job = %job.full_id, %message, "benchmark panicked");
                JobExecution::failed(job.index, FailureKind::Panic, message, duration_ns)
            }
        }
    }
}

/// Runs jobs in worker processes
#[cfg(unix)]
pub struct IsolatedExecutor {
    base: BenchmarkConfig,
    num_workers: usize,
    persistent: bool,
    show_progress: bool,
}

#[cfg(unix)]
impl IsolatedExecutor {
    /// Executor with `num_workers` parallel workers
    pub fn new(base: BenchmarkConfig, num_workers: usize, persistent: bool, show_progress: bool) -> Self {
        Self {
            base,
            num_workers: num_workers.max(1),
            persistent,
            show_progress,
        }
    }

    /// Execute `jobs` in worker processes, returning results in plan order.
    pub fn execute<T: BenchmarkSuite>(
        &self,
        jobs: &[Job<T>],
    ) -> Result<Vec<JobExecution>, crate::supervisor::SupervisorError> {
        use crate::supervisor::{IpcJob, IpcJobStatus, Supervisor};

        let supervisor = Supervisor::new(T::name(), self.num_workers, self.persistent)?;
        let pb = progress_bar(jobs.len(), self.show_progress);
        pb.set_message("starting workers");

        let mut results = Vec::with_capacity(jobs.len());
        let mut ipc_jobs = Vec::with_capacity(jobs.len());
        for job in jobs {
            let config = job.config(&self.base);
            match config.validate() {
                Ok(()) => ipc_jobs.push(IpcJob {
                    index: job.index,
                    job_id: job.id.clone(),
                    config,
                }),
                Err(reason) => {
                    tracing::warn!(job = %job.full_id, %reason, "invalid job configuration");
                    results.push(JobExecution::invalid(job.index, reason));
                    pb.inc(1);
                }
            }
        }

        let start = Instant::now();
        let ipc_results = supervisor.run_all(&ipc_jobs)?;
        let elapsed_ns = start.elapsed().as_nanos() as u64;

        for (ipc, job) in ipc_results.into_iter().zip(&ipc_jobs) {
            pb.set_message(job.job_id.clone());
            if let IpcJobStatus::Failure { message, .. } = &ipc.status {
                tracing::warn!(job = %job.job_id, %message, "job failed in worker");
            }
            results.push(JobExecution::from_ipc(job.index, ipc));
            pb.inc(1);
        }

        results.sort_by_key(|r| r.index);
        pb.finish_with_message("done (isolated)");
        tracing::debug!(elapsed_ms = elapsed_ns as f64 / 1e6, "isolated execution finished");
        Ok(results)
    }
}
