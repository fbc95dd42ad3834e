//! Integration tests for wrapbench
//!
//! These tests drive suites declared with `#[wrapbench::suite]` through
//! `BenchmarkRunner::run` in-process.

use std::sync::atomic::{AtomicUsize, Ordering};
use wrapbench::prelude::*;
use wrapbench::{
    BenchmarkStatus, BootstrapConfig, ChangeVerdict, ComparisonConfig, IsolationMode,
    OutlierMethod, ParamValue, compare_distributions, compute_bootstrap, compute_summary,
    discover,
};

static HASHING_TEARDOWNS: AtomicUsize = AtomicUsize::new(0);

struct Hashing {
    data: Vec<u64>,
}

#[wrapbench::suite(params(len = [16, 256], seed = [1, 7]))]
impl Hashing {
    #[setup]
    fn new(params: &ParamSet) -> Self {
        let len = params.int("len").unwrap_or(16) as u64;
        let seed = params.int("seed").unwrap_or(1) as u64;
        Hashing {
            data: (0..len).map(|i| i.wrapping_mul(seed)).collect(),
        }
    }

    #[bench(baseline, group = "fold", samples = 8)]
    fn sum(&mut self, b: &mut Bencher) {
        b.iter(|| self.data.iter().fold(0u64, |acc, x| acc.wrapping_add(*x)));
    }

    #[bench(group = "fold", samples = 8, tags = ["bitwise"])]
    fn xor(&mut self, b: &mut Bencher) {
        b.iter(|| self.data.iter().fold(0u64, |acc, x| acc ^ x));
    }

    #[bench(samples = 8, description = "FNV-1a over the input")]
    fn fnv(&mut self, b: &mut Bencher) {
        b.iter(|| {
            self.data.iter().fold(0xcbf29ce484222325u64, |h, x| {
                (h ^ x).wrapping_mul(0x100000001b3)
            })
        });
    }

    #[teardown]
    fn release(&mut self) {
        self.data.clear();
        HASHING_TEARDOWNS.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Fragile;

#[wrapbench::suite(name = "fragile")]
impl Fragile {
    #[bench(samples = 5)]
    fn steady(&mut self, b: &mut Bencher) {
        b.iter(|| std::hint::black_box(3u64).pow(4));
    }

    #[bench(samples = 5)]
    fn explodes(&mut self, b: &mut Bencher) {
        b.iter(|| std::hint::black_box(1u8));
        panic!("lost the plot");
    }

    #[bench(max_iterations = 40)]
    fn capped(&mut self, b: &mut Bencher) {
        b.iter(|| std::hint::black_box(2u64) * 3);
    }
}

#[derive(Default)]
struct Stalls {
    calls: u64,
}

#[wrapbench::suite]
impl Stalls {
    /// Every 20th call stalls for 5ms
    #[bench(samples = 40)]
    fn spiky(&mut self, b: &mut Bencher) {
        b.iter(|| {
            self.calls += 1;
            let pause = if self.calls % 20 == 0 { 5_000 } else { 50 };
            std::thread::sleep(std::time::Duration::from_micros(pause));
        });
    }
}

fn quick_config() -> RunConfig {
    let mut config = RunConfig::default();
    config.runner.isolation = IsolationMode::InProcess;
    config.runner.warmup_time = "1ms".to_string();
    config.runner.measurement_time = "20ms".to_string();
    config.runner.bootstrap_iterations = 200;
    config.allocator.track = false;
    config.output.show_progress = false;
    config
}

/// The holder keeps exactly the type, configuration and arguments passed in
#[test]
fn test_result_retains_inputs() {
    let config = quick_config();
    let args = vec!["^Hashing::sum".to_string(), "xor@len=16".to_string()];

    let result = BenchmarkRunner::run::<Hashing>(Some(config.clone()), Some(args.clone())).unwrap();

    assert!(result.suite_type().is::<Hashing>());
    assert_eq!(result.suite_type().name(), "Hashing");
    assert_eq!(result.config(), Some(&config));
    assert_eq!(result.args(), Some(args.as_slice()));
}

/// The accessor hands out the stored summary itself
#[test]
fn test_summary_accessor_returns_stored_instance() {
    let result = BenchmarkRunner::run::<Fragile>(Some(quick_config()), Some(vec!["steady".into()]))
        .unwrap();

    let first: *const Summary = result.summary();
    assert!(std::ptr::eq(first, result.summary()));
    assert!(std::ptr::eq(first, result.as_summary()));
    assert!(std::ptr::eq(first, AsRef::<Summary>::as_ref(&result)));

    let copy = result.summary().clone();
    assert_eq!(result.into_summary(), copy);
}

/// `run(None, None)` resolves defaults and reaches the engine
#[test]
fn test_run_without_config_or_args() {
    #[derive(Default)]
    struct Tiny;

    #[wrapbench::suite]
    impl Tiny {
        #[bench(samples = 5)]
        fn noop(&mut self, b: &mut Bencher) {
            b.iter(|| ());
        }
    }

    let result = BenchmarkRunner::run::<Tiny>(None, None).unwrap();
    assert!(result.config().is_none());
    assert!(result.args().is_none());

    let summary = result.summary();
    assert_eq!(summary.title, "Tiny");
    assert_eq!(summary.totals.total, 1);
    assert_eq!(summary.reports[0].metrics.as_ref().unwrap().samples, 5);
    assert_eq!(summary.meta.config.isolation, "in-process");
}

#[test]
fn test_discovery_order_and_ids() {
    let jobs = discover::<Hashing>().unwrap();
    let ids: Vec<_> = jobs.iter().map(|j| j.id.as_str()).collect();

    assert_eq!(jobs.len(), 12);
    assert_eq!(
        &ids[..4],
        [
            "sum@len=16,seed=1",
            "sum@len=16,seed=7",
            "sum@len=256,seed=1",
            "sum@len=256,seed=7"
        ]
    );
    assert_eq!(ids[4], "xor@len=16,seed=1");
    assert_eq!(jobs[11].full_id, "Hashing::fnv@len=256,seed=7");
    assert_eq!(jobs[0].params.get("len"), Some(&ParamValue::Int(16)));
    assert!(jobs.iter().enumerate().all(|(i, j)| j.index == i));
}

#[test]
fn test_suite_run_with_baseline_ratios() {
    let before = HASHING_TEARDOWNS.load(Ordering::SeqCst);
    let result = BenchmarkRunner::run::<Hashing>(Some(quick_config()), None).unwrap();
    let summary = result.summary();

    assert_eq!(summary.totals.total, 12);
    assert_eq!(summary.totals.passed, 12);
    assert!(summary.successful());
    // Other tests may run Hashing concurrently
    assert!(HASHING_TEARDOWNS.load(Ordering::SeqCst) >= before + 12);

    for report in &summary.reports {
        let metrics = report.metrics.as_ref().unwrap();
        assert_eq!(metrics.samples, 8);
        assert_eq!(report.measured_iterations, 8);
        assert!(metrics.min_ns <= metrics.median_ns && metrics.median_ns <= metrics.max_ns);
    }

    let sum = summary.report("sum@len=256,seed=7").unwrap();
    assert_eq!(sum.ratio, Some(1.0));
    assert!(sum.job.baseline);
    let xor = summary.report("Hashing::xor@len=256,seed=7").unwrap();
    assert!(xor.ratio.is_some());
    assert_eq!(xor.job.tags, ["bitwise"]);
    let fnv = summary.report("fnv@len=16,seed=1").unwrap();
    assert_eq!(fnv.ratio, None);
    assert_eq!(fnv.job.description.as_deref(), Some("FNV-1a over the input"));
}

#[test]
fn test_filters_skip_unselected_jobs() {
    let args = vec!["^xor@len=16".to_string()];
    let result = BenchmarkRunner::run::<Hashing>(Some(quick_config()), Some(args)).unwrap();
    let summary = result.summary();

    assert_eq!(summary.totals.passed, 2);
    assert_eq!(summary.totals.skipped, 10);
    let skipped = summary.report("sum@len=16,seed=1").unwrap();
    assert_eq!(skipped.status, BenchmarkStatus::Skipped);
    assert!(skipped.metrics.is_none());
    // Baseline was not measured
    assert_eq!(summary.report("xor@len=16,seed=1").unwrap().ratio, None);
}

#[test]
fn test_panicking_benchmark_is_isolated() {
    let result = BenchmarkRunner::run::<Fragile>(Some(quick_config()), None).unwrap();
    let summary = result.summary();

    assert_eq!(summary.title, "fragile");
    assert_eq!(summary.totals.crashed, 1);
    assert_eq!(summary.totals.passed, 2);
    assert!(summary.has_failures());

    let explodes = summary.report("fragile::explodes").unwrap();
    assert_eq!(explodes.status, BenchmarkStatus::Crashed);
    assert!(explodes.metrics.is_none());
    let failure = explodes.failure.as_ref().unwrap();
    assert_eq!(failure.kind, "panic");
    assert!(failure.message.contains("lost the plot"));

    let capped = summary.report("capped").unwrap();
    assert_eq!(capped.status, BenchmarkStatus::Passed);
    assert!(capped.measured_iterations <= 40);
}

#[test]
fn test_invalid_filter_propagates() {
    let err = BenchmarkRunner::run::<Fragile>(Some(quick_config()), Some(vec!["(".into()]))
        .unwrap_err();
    assert!(matches!(err, RunError::InvalidFilter { .. }));
}

#[test]
fn test_summary_json_and_baseline_comparison() {
    let result = BenchmarkRunner::run::<Fragile>(Some(quick_config()), None).unwrap();
    let summary = result.into_summary();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("baselines").join("fragile.json");
    summary.save_json(&path).unwrap();
    let loaded = Summary::load_json(&path).unwrap();
    assert_eq!(loaded.totals.passed, summary.totals.passed);
    assert_eq!(loaded.totals.crashed, summary.totals.crashed);
    assert_eq!(loaded.meta.timestamp, summary.meta.timestamp);
    let statuses = |s: &Summary| -> Vec<_> {
        s.reports.iter().map(|r| (r.job.full_id.clone(), r.status)).collect()
    };
    assert_eq!(statuses(&loaded), statuses(&summary));

    let changes = summary.baseline_comparison(&loaded, 5.0);
    // Only measured jobs are compared
    assert_eq!(changes.len(), 2);
    assert!(changes.iter().all(|c| c.verdict == ChangeVerdict::Unchanged));
}

/// Outlier filtering keeps tail latencies visible
#[test]
fn test_outlier_preserves_tail() {
    let mut samples: Vec<f64> = (0..90).map(|i| 100.0 + (i as f64 * 0.1)).collect();
    samples.extend([500.0, 600.0, 700.0, 800.0, 1000.0]);

    let summary = compute_summary(&samples, OutlierMethod::Iqr { k: 3.0 });

    assert!(summary.mean < 200.0);
    assert_eq!(summary.max, 1000.0);
    assert!(summary.outlier_count > 0);
}

/// With stalls in the tail, the reported interval still brackets the reported mean
#[test]
fn test_reported_interval_contains_reported_mean() {
    let mut config = quick_config();
    config.runner.bootstrap_iterations = 2_000;

    let result = BenchmarkRunner::run::<Stalls>(Some(config), None).unwrap();
    let metrics = result.summary().reports[0].metrics.clone().unwrap();

    assert_eq!(metrics.samples, 40);
    assert!(metrics.outliers >= 2, "{metrics:?}");
    assert!(metrics.ci_lower_ns <= metrics.mean_ns, "{metrics:?}");
    assert!(metrics.mean_ns <= metrics.ci_upper_ns, "{metrics:?}");
    assert!(metrics.max_ns >= 5_000_000.0);
}

#[test]
fn test_bootstrap_confidence_interval_contains_mean() {
    let samples: Vec<f64> = (0..100).map(|i| 100.0 + (i as f64 * 0.1)).collect();

    let config = BootstrapConfig {
        iterations: 1000,
        confidence_level: 0.95,
        ..Default::default()
    };
    let result = compute_bootstrap(&samples, &config).unwrap();

    assert!(result.confidence_interval.lower <= result.point_estimate);
    assert!(result.confidence_interval.upper >= result.point_estimate);
    let width = result.confidence_interval.upper - result.confidence_interval.lower;
    assert!(width > 0.0 && width < 20.0);
}

#[test]
fn test_ab_comparison() {
    let baseline: Vec<f64> = (0..50).map(|i| 100.0 + (i as f64 * 0.1)).collect();
    let candidate: Vec<f64> = (0..50).map(|i| 150.0 + (i as f64 * 0.1)).collect();

    let config = ComparisonConfig {
        bootstrap_iterations: 1000,
        confidence_level: 0.95,
        significance_threshold: 5.0,
        ..Default::default()
    };
    let result = compare_distributions(&baseline, &candidate, &config).unwrap();

    assert!(result.probability_regression > 0.9);
    assert!(result.relative_change > 40.0);
    assert!(result.is_significant);
}
