#![warn(missing_docs)]
//! wrapbench runner
//!
//! The entry point benchmark binaries call. [`BenchmarkRunner::run`] resolves
//! the configuration, hands the suite to the [`Engine`], and returns the
//! [`Summary`] wrapped together with exactly what the caller passed in.
//!
//! # Example
//!
//! ```ignore
//! use wrapbench::prelude::*;
//!
//! fn main() -> Result<(), RunError> {
//!     let result = BenchmarkRunner::run::<Sorting>(None, None)?;
//!     println!("{} passed", result.summary().totals.passed);
//!     Ok(())
//! }
//! ```
//!
//! With `isolation = "process"` the same binary is re-executed as a worker;
//! in that mode `run` serves the supervisor and exits the process.

mod config;
mod engine;
mod executor;
mod planner;
mod supervisor;

pub use config::*;
pub use engine::Engine;
#[cfg(unix)]
pub use executor::IsolatedExecutor;
pub use executor::{
    BootstrapSettings, InProcessExecutor, JobExecution, apply_baseline_ratios, build_run_meta,
    build_summary, compute_statistics, failure_kind_name, host_environment, job_info,
    report_config,
};
pub use planner::{ExecutionPlan, JobFilter, build_plan};
#[cfg(unix)]
pub use supervisor::{IpcJob, Supervisor, WorkerHandle};
pub use supervisor::{IpcJobResult, IpcJobStatus, SupervisorError};

use std::any::TypeId;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use wrapbench_core::{BenchmarkSuite, DiscoveryError, WorkerMain, is_worker_process};
use wrapbench_report::{ReportError, RunMeta, Summary};

/// Environment variable naming the suite a worker process serves
pub const WORKER_SUITE_ENV: &str = "WRAPBENCH_WORKER_SUITE";

/// Environment variable holding a `tracing` filter directive
pub const LOG_ENV: &str = "WRAPBENCH_LOG";

const DEFAULT_LOG_FILTER: &str = "wrapbench=info";

/// Errors from running a suite
#[derive(Debug, Error)]
pub enum RunError {
    /// The configuration could not be loaded or is invalid
    #[error("configuration error: {0:#}")]
    Config(anyhow::Error),

    /// A job filter is not a valid regular expression
    #[error("invalid job filter '{pattern}'")]
    InvalidFilter {
        /// The rejected argument
        pattern: String,
        /// Regex compile error
        #[source]
        source: regex::Error,
    },

    /// The suite could not be expanded into jobs
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Worker processes could not be driven
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    /// Filesystem failure
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Summary serialization failure
    #[error(transparent)]
    Json(#[from] ReportError),
}

/// Handle to the benchmarked type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SuiteType {
    type_id: TypeId,
    type_name: &'static str,
    name: &'static str,
}

impl SuiteType {
    /// Handle for suite `T`
    pub fn of<T: BenchmarkSuite>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            name: T::name(),
        }
    }

    /// `TypeId` of the suite type
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Fully qualified Rust type name
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Suite display name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether this handle refers to `T`
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

/// Summary of a run, kept together with the inputs that produced it
#[derive(Debug, Clone)]
pub struct WrapperResult {
    suite_type: SuiteType,
    summary: Summary,
    config: Option<RunConfig>,
    args: Option<Vec<String>>,
}

impl WrapperResult {
    /// The summary
    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    /// Alias of [`summary`](Self::summary)
    pub fn as_summary(&self) -> &Summary {
        &self.summary
    }

    /// Consume the holder and keep the summary
    pub fn into_summary(self) -> Summary {
        self.summary
    }

    /// The benchmarked type
    pub fn suite_type(&self) -> SuiteType {
        self.suite_type
    }

    /// Configuration as passed to [`BenchmarkRunner::run`]
    pub fn config(&self) -> Option<&RunConfig> {
        self.config.as_ref()
    }

    /// Arguments as passed to [`BenchmarkRunner::run`]
    pub fn args(&self) -> Option<&[String]> {
        self.args.as_deref()
    }
}

impl AsRef<Summary> for WrapperResult {
    fn as_ref(&self) -> &Summary {
        &self.summary
    }
}

/// Entry point for benchmark binaries
pub struct BenchmarkRunner;

impl BenchmarkRunner {
    /// Run suite `T`.
    ///
    /// `config` defaults to `wrapbench.toml` (searched upwards from the
    /// working directory), then to built-in defaults. `args` are job filters.
    /// Both are stored in the result unchanged. Errors from the engine are
    /// returned as is.
    pub fn run<T: BenchmarkSuite>(
        config: Option<RunConfig>,
        args: Option<Vec<String>>,
    ) -> Result<WrapperResult, RunError> {
        if is_worker_process() {
            return Self::run_worker::<T>(config, args);
        }

        let effective = match &config {
            Some(config) => config.clone(),
            None => RunConfig::discover().map_err(RunError::Config)?.unwrap_or_default(),
        };
        init_tracing(&effective);

        let summary = Engine::new(effective)?.run_suite::<T>(args.as_deref())?;

        Ok(WrapperResult {
            suite_type: SuiteType::of::<T>(),
            summary,
            config,
            args,
        })
    }

    /// Worker side of process isolation. Serves and exits when this process
    /// was spawned for `T`; any other suite in the same binary is a no-op.
    fn run_worker<T: BenchmarkSuite>(
        config: Option<RunConfig>,
        args: Option<Vec<String>>,
    ) -> Result<WrapperResult, RunError> {
        let requested = std::env::var(WORKER_SUITE_ENV).ok();
        if requested.as_deref().is_none_or(|name| name == T::name()) {
            let code = match WorkerMain::serve::<T>() {
                Ok(()) => 0,
                Err(e) => {
                    eprintln!("wrapbench worker error: {e}");
                    1
                }
            };
            std::process::exit(code);
        }

        let title = T::name().to_string();
        Ok(WrapperResult {
            suite_type: SuiteType::of::<T>(),
            summary: Summary::new(title, worker_meta(), Vec::new(), 0.0),
            config,
            args,
        })
    }
}

fn worker_meta() -> RunMeta {
    let config = RunConfig::default();
    let execution = config
        .execution_config()
        .unwrap_or_else(|_| wrapbench_core::BenchmarkConfig::default());
    build_run_meta(&config, &execution, chrono::Utc::now())
}

/// Install a fmt subscriber unless the host already has one
fn init_tracing(config: &RunConfig) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        let directive = config
            .output
            .log_level
            .as_deref()
            .unwrap_or(DEFAULT_LOG_FILTER);
        EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use wrapbench_core::{BenchmarkDef, ParamSet};

    struct Noop;

    impl BenchmarkSuite for Noop {
        fn create(_: &ParamSet) -> Self {
            Noop
        }

        fn benchmarks() -> Vec<BenchmarkDef<Self>> {
            vec![BenchmarkDef::new("nothing", |_: &mut Self, b| b.iter(|| ()))]
        }
    }

    fn quick_config() -> RunConfig {
        let mut config = RunConfig::default();
        config.runner.samples = Some(5);
        config.runner.bootstrap_iterations = 0;
        config.allocator.track = false;
        config.output.show_progress = false;
        config.output.log_level = Some("wrapbench=warn".to_string());
        config
    }

    #[test]
    fn test_suite_type() {
        let suite = SuiteType::of::<Noop>();
        assert_eq!(suite.name(), "Noop");
        assert!(suite.type_name().ends_with("Noop"));
        assert!(suite.is::<Noop>());
        assert!(!suite.is::<String>());
        assert_eq!(suite.type_id(), TypeId::of::<Noop>());
    }

    #[test]
    fn test_run_keeps_inputs() {
        let config = quick_config();
        let args = vec!["nothing".to_string()];
        let result = BenchmarkRunner::run::<Noop>(Some(config.clone()), Some(args.clone())).unwrap();

        assert_eq!(result.config(), Some(&config));
        assert_eq!(result.args(), Some(args.as_slice()));
        assert!(result.suite_type().is::<Noop>());
        assert!(std::ptr::eq(result.summary(), result.as_summary()));
        assert!(std::ptr::eq(result.summary(), result.as_ref()));
        assert_eq!(result.into_summary().totals.passed, 1);
    }

    #[test]
    fn test_engine_errors_propagate() {
        let mut config = quick_config();
        config.runner.confidence_level = 1.5;
        let err = BenchmarkRunner::run::<Noop>(Some(config), None).unwrap_err();
        assert!(matches!(err, RunError::Config(_)));

        let err = BenchmarkRunner::run::<Noop>(Some(quick_config()), Some(vec!["[".into()])).unwrap_err();
        assert!(matches!(err, RunError::InvalidFilter { .. }));
    }
}
