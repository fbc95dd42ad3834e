#![warn(missing_docs)]
//! # wrapbench
//!
//! Micro-benchmarking for Rust types, behind a single typed entry point.
//!
//! - **Suites**: a type's methods are benchmarks, swept over parameter
//!   combinations, with untimed setup and teardown
//! - **Adaptive measurement**: warmup, batched samples, stop on sample
//!   target, time budget, iteration caps or relative-error convergence
//! - **Statistics**: outlier filtering, percentiles, t-based error and
//!   bootstrap (BCa) confidence intervals
//! - **Process isolation**: optional worker processes over rkyv IPC; a
//!   panicking or hanging benchmark only costs its own job
//! - **Results**: a serializable [`Summary`] with host metadata, baseline
//!   ratios and baseline-file comparison
//!
//! ## Quick Start
//!
//! ```ignore
//! use wrapbench::prelude::*;
//!
//! #[derive(Default)]
//! struct Parsing;
//!
//! #[wrapbench::suite]
//! impl Parsing {
//!     #[bench(baseline)]
//!     fn parse_u64(&mut self, b: &mut Bencher) {
//!         b.iter(|| "18446744073709551615".parse::<u64>());
//!     }
//! }
//!
//! fn main() -> Result<(), RunError> {
//!     let result = BenchmarkRunner::run::<Parsing>(None, None)?;
//!     for report in &result.summary().reports {
//!         println!("{}: {:?} ns", report.job.id, report.mean_ns());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Async Benchmarks
//!
//! ```ignore
//! #[bench(group = "io")]
//! fn sleep(&mut self, b: &mut Bencher) {
//!     b.iter_async(|| async {
//!         tokio::time::sleep(Duration::from_millis(1)).await;
//!     });
//! }
//! ```

// Entry point
pub use wrapbench_runner::{
    BenchmarkRunner, CONFIG_FILE_NAME, Engine, IsolationMode, OutlierSetting, RunConfig,
    RunError, SuiteType, WrapperResult,
};

// Suites and measurement
pub use wrapbench_core::{
    Bencher, BenchmarkConfig, BenchmarkDef, BenchmarkSuite, DiscoveryError, Job, ParamDef,
    ParamSet, ParamValue, TrackingAllocator, current_allocation, discover,
    reset_allocation_counter,
};

// Attribute macro
pub use wrapbench_macros::suite;

// Results
pub use wrapbench_report::{
    BaselineChange, BenchmarkReport, BenchmarkStatus, ChangeVerdict, FailureInfo, JobInfo,
    Metrics, ReportError, RunMeta, Summary,
};

// Re-export stats
pub use wrapbench_stats::{
    BootstrapConfig, BootstrapResult, ComparisonConfig, ComparisonResult, OutlierMethod,
    SummaryStatistics, compare_distributions, compute_bootstrap, compute_summary,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Bencher, BenchmarkRunner, BenchmarkSuite, ParamSet, RunConfig, RunError, Summary,
        WrapperResult, suite,
    };
}
