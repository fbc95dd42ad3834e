#![warn(missing_docs)]
//! wrapbench core - suites, discovery and the measurement engine
//!
//! - [`BenchmarkSuite`]: a type whose methods are benchmarks, with parameters
//!   and untimed setup/teardown
//! - [`discover`]: expands a suite into ordered, uniquely named [`Job`]s
//! - [`Bencher`] and [`run_benchmark_loop`]: warmup, batched sampling and
//!   the stop conditions (sample target, time budget, iteration caps,
//!   relative-error convergence)
//! - [`run_job`]: one job end to end with panics caught
//! - [`WorkerMain`]: the worker side of process isolation
//! - [`TrackingAllocator`]: opt-in allocation counting

mod allocator;
mod bencher;
mod job;
mod measure;
mod suite;
mod worker;

pub use allocator::{
    TrackingAllocator, current_allocation, reset_allocation_counter, tracking_installed,
};
pub use bencher::{
    Bencher, BenchmarkResult, DEFAULT_SAMPLE_COUNT, MIN_SAMPLE_COUNT, run_benchmark_loop,
};
pub use job::{JobOutcome, panic_message, run_job};
pub use measure::{Elapsed, HAS_CYCLE_COUNTER, Instant, Timer, pin_to_cpu};
pub use suite::{
    BenchmarkDef, BenchmarkOverrides, BenchmarkSuite, DiscoveryError, Job, ParamDef, ParamSet,
    ParamValue, discover, param_combinations, short_type_name,
};
pub use worker::{WorkerError, WorkerMain, is_worker_process, shutdown_requested};

/// Execution configuration shared with the IPC layer
pub use wrapbench_ipc::BenchmarkConfig;
