//! Job Execution
//!
//! Shared by the in-process executor and the worker: build the suite
//! instance, drive the measurement loop, tear down. Each phase runs under
//! `catch_unwind`, so a panicking benchmark becomes an outcome, not an abort.

use crate::bencher::{Bencher, BenchmarkResult, run_benchmark_loop};
use crate::suite::{BenchmarkSuite, Job};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use wrapbench_ipc::BenchmarkConfig;

/// How a job ended
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// Measurement finished
    Completed(BenchmarkResult),
    /// Setup, benchmark or teardown panicked
    Panicked {
        /// Phase and panic payload
        message: String,
    },
}

/// Run `job` with its effective configuration `config`.
///
/// Teardown still runs when the benchmark body panics.
pub fn run_job<T: BenchmarkSuite>(job: &Job<T>, config: &BenchmarkConfig) -> JobOutcome {
    let mut instance = match catch_unwind(AssertUnwindSafe(|| T::create(&job.params))) {
        Ok(instance) => instance,
        Err(panic) => {
            return JobOutcome::Panicked {
                message: format!("setup panicked: {}", panic_message(panic.as_ref())),
            };
        }
    };

    let runner = job.def.runner;
    let measured = catch_unwind(AssertUnwindSafe(|| {
        run_benchmark_loop(
            Bencher::for_config(config),
            |b| runner(&mut instance, b),
            config,
        )
    }));

    let torn_down = catch_unwind(AssertUnwindSafe(|| instance.teardown()));

    match (measured, torn_down) {
        (Ok(result), Ok(())) => JobOutcome::Completed(result),
        (Err(panic), _) => JobOutcome::Panicked {
            message: panic_message(panic.as_ref()),
        },
        (Ok(_), Err(panic)) => JobOutcome::Panicked {
            message: format!("teardown panicked: {}", panic_message(panic.as_ref())),
        },
    }
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::{BenchmarkDef, ParamDef, ParamSet, discover};
    use std::sync::atomic::{AtomicUsize, Ordering};

    static TEARDOWNS: AtomicUsize = AtomicUsize::new(0);

    struct Fragile {
        fail_setup: bool,
    }

    impl BenchmarkSuite for Fragile {
        fn params() -> Vec<ParamDef> {
            vec![ParamDef::new("fail_setup", [false, true])]
        }

        fn create(params: &ParamSet) -> Self {
            let fail_setup = params.bool("fail_setup").unwrap_or(false);
            assert!(!fail_setup, "refusing to build");
            Fragile { fail_setup }
        }

        fn teardown(&mut self) {
            TEARDOWNS.fetch_add(1, Ordering::SeqCst);
        }

        fn benchmarks() -> Vec<BenchmarkDef<Self>> {
            vec![
                BenchmarkDef::new("ok", |s: &mut Self, b| b.iter(|| s.fail_setup)),
                BenchmarkDef::new("boom", |_, _| panic!("benchmark exploded")),
            ]
        }
    }

    fn config() -> BenchmarkConfig {
        BenchmarkConfig {
            samples: Some(4),
            track_allocations: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_completed_job() {
        let jobs = discover::<Fragile>().unwrap();
        let ok = &jobs[0];
        assert_eq!(ok.id, "ok@fail_setup=false");

        match run_job(ok, &config()) {
            JobOutcome::Completed(result) => assert_eq!(result.samples.len(), 4),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_panicking_benchmark_still_tears_down() {
        let jobs = discover::<Fragile>().unwrap();
        let boom = jobs.iter().find(|j| j.id == "boom@fail_setup=false").unwrap();

        let before = TEARDOWNS.load(Ordering::SeqCst);
        match run_job(boom, &config()) {
            JobOutcome::Panicked { message } => assert_eq!(message, "benchmark exploded"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(TEARDOWNS.load(Ordering::SeqCst) > before);
    }

    #[test]
    fn test_panicking_setup() {
        let jobs = discover::<Fragile>().unwrap();
        let job = jobs.iter().find(|j| j.id == "ok@fail_setup=true").unwrap();

        match run_job(job, &config()) {
            JobOutcome::Panicked { message } => {
                assert!(message.starts_with("setup panicked: refusing to build"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_panic_message_payloads() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u8), "unknown panic");
    }
}
