//! Benchmark Executor
//!
//! Runs the planned jobs and turns their samples into a [`Summary`].
//!
//! ## Pipeline Overview
//!
//! ```text
//! Job<T> (from discover + planner)
//!       │
//!       ▼
//! ┌─────────────┐
//! │  execution  │  Run jobs in-process or in workers, collect samples
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │ statistics  │  Summary stats per job (parallel)
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │   report    │  Bootstrap CIs, baseline ratios, Summary
//! └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`execution`] - in-process and isolated job execution
//! - [`statistics`] - parallel statistics computation
//! - [`report`] - summary building
//! - [`metadata`] - host, git and configuration metadata
//!
//! [`Summary`]: wrapbench_report::Summary

mod execution;
mod metadata;
mod report;
mod statistics;

#[cfg(unix)]
pub use execution::IsolatedExecutor;
pub use execution::{InProcessExecutor, JobExecution, failure_kind_name};
pub use metadata::{build_run_meta, host_environment, report_config};
pub use report::{BootstrapSettings, apply_baseline_ratios, build_summary, job_info};
pub use statistics::compute_statistics;
