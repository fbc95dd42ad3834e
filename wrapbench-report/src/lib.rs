#![warn(missing_docs)]
//! wrapbench report - the result model
//!
//! A [`Summary`] is the immutable outcome of one suite run: job identity,
//! host and configuration metadata, and per-job [`Metrics`]. Summaries
//! serialize to JSON for baseline files and can be diffed against each
//! other with [`Summary::baseline_comparison`].

mod baseline;
mod json;
mod report;

pub use baseline::{BaselineChange, ChangeVerdict};
pub use json::ReportError;
pub use report::{
    BenchmarkReport, BenchmarkStatus, FailureInfo, HostEnvironment, JobInfo, Metrics, ParamEntry,
    ReportConfig, RunMeta, SCHEMA_VERSION, Summary, SummaryTotals,
};
