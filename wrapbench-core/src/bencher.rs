//! Bencher - The Benchmark Iteration API
//!
//! Batched sampling: the warmup phase estimates the cost of one invocation,
//! then measurement folds `iters_per_sample` invocations into each sample.
//! A running mean/variance of sample times (Welford) lets the run loop stop
//! as soon as the margin of error is small enough.

use crate::allocator::{current_allocation, reset_allocation_counter};
use crate::measure::{Elapsed, Instant, Timer};
use wrapbench_ipc::{BenchmarkConfig, Sample};
use wrapbench_stats::normal_quantile;

/// Default number of samples to collect
pub const DEFAULT_SAMPLE_COUNT: usize = 100;

/// Minimum samples before the stabilization check may stop a run
pub const MIN_SAMPLE_COUNT: usize = 10;

/// Result of one measured job
#[derive(Debug, Clone, Default)]
pub struct BenchmarkResult {
    /// Collected samples, each the average of one or more invocations
    pub samples: Vec<Sample>,
    /// Invocations including warmup
    pub iterations: u64,
    /// Invocations during measurement
    pub measured_iterations: u64,
    /// Measurement wall time in nanoseconds
    pub total_time_ns: u64,
    /// Stopped because the relative error converged
    pub stabilized: bool,
}

#[derive(Debug, Default)]
struct Accumulator {
    time_ns: u64,
    cycles: u64,
    iters: u64,
    alloc_bytes: u64,
    alloc_count: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }
}

/// Per-job iteration driver handed to every benchmark method.
///
/// Each call to one of the `iter*` methods is one invocation.
pub struct Bencher {
    current: Accumulator,
    samples: Vec<Sample>,
    running: RunningStats,

    target_samples: usize,
    iters_per_sample: u64,
    track_allocations: bool,

    total_iterations: u64,
    measured_iterations: u64,
    is_warmup: bool,
    warmup_times: Vec<u64>,

    cached_runtime: Option<tokio::runtime::Runtime>,
}

impl Bencher {
    /// Create a Bencher with the default sample target
    pub fn new(track_allocations: bool) -> Self {
        Self::with_config(track_allocations, DEFAULT_SAMPLE_COUNT)
    }

    /// Create a Bencher with a custom sample target
    pub fn with_config(track_allocations: bool, target_samples: usize) -> Self {
        let target_samples = target_samples.max(1);
        Self {
            current: Accumulator::default(),
            samples: Vec::with_capacity(target_samples),
            running: RunningStats::default(),
            target_samples,
            iters_per_sample: 1,
            track_allocations,
            total_iterations: 0,
            measured_iterations: 0,
            is_warmup: true,
            warmup_times: Vec::with_capacity(1024),
            cached_runtime: None,
        }
    }

    /// Create a Bencher for a job's effective configuration
    pub fn for_config(config: &BenchmarkConfig) -> Self {
        Self::with_config(config.track_allocations, config.target_samples as usize)
    }

    /// Mean warmup invocation time in nanoseconds
    pub fn estimated_iter_time_ns(&self) -> Option<u64> {
        if self.warmup_times.is_empty() {
            return None;
        }
        let sum: u64 = self.warmup_times.iter().sum();
        Some(sum / self.warmup_times.len() as u64)
    }

    /// Leave warmup and size samples so `target_samples` fill the budget
    pub fn start_measurement(&mut self, measurement_time_ns: u64) {
        self.iters_per_sample = match self.estimated_iter_time_ns() {
            Some(iter_time) if iter_time > 0 => {
                let time_per_sample = measurement_time_ns / self.target_samples as u64;
                (time_per_sample / iter_time).max(1)
            }
            _ => 1,
        };
        self.enter_measurement();
    }

    /// Leave warmup in fixed-sample mode: one invocation per sample,
    /// exactly `samples` samples.
    pub fn start_fixed(&mut self, samples: u64) {
        self.target_samples = samples.max(1) as usize;
        self.iters_per_sample = 1;
        self.enter_measurement();
    }

    fn enter_measurement(&mut self) {
        self.is_warmup = false;
        self.warmup_times.clear();
        self.warmup_times.shrink_to_fit();
        self.current = Accumulator::default();
    }

    /// Invocations per sample chosen for the measurement phase
    pub fn iters_per_sample(&self) -> u64 {
        self.iters_per_sample
    }

    #[inline]
    fn begin(&self) {
        if self.track_allocations {
            reset_allocation_counter();
        }
    }

    #[inline]
    fn allocations(&self) -> (u64, u64) {
        if self.track_allocations {
            current_allocation()
        } else {
            (0, 0)
        }
    }

    #[inline]
    fn record(&mut self, elapsed: Elapsed, alloc: (u64, u64), invocations: u64) {
        self.total_iterations += invocations;

        if self.is_warmup {
            self.warmup_times.push(elapsed.nanos / invocations.max(1));
            return;
        }

        self.measured_iterations += invocations;
        self.current.time_ns += elapsed.nanos;
        self.current.cycles += elapsed.cycles;
        self.current.iters += invocations;
        self.current.alloc_bytes += alloc.0;
        self.current.alloc_count += alloc.1;

        if self.current.iters >= self.iters_per_sample {
            self.flush_sample();
        }
    }

    /// Time one invocation of `f`
    #[inline]
    pub fn iter<T, F>(&mut self, mut f: F)
    where
        F: FnMut() -> T,
    {
        self.begin();
        let timer = Timer::start();
        std::hint::black_box(f());
        let elapsed = timer.stop();
        let alloc = self.allocations();

        self.record(elapsed, alloc, 1);
    }

    /// Time `routine` on a fresh input from `setup`; setup is untimed
    #[inline]
    pub fn iter_with_setup<T, S, F, R>(&mut self, mut setup: S, mut routine: F)
    where
        S: FnMut() -> T,
        F: FnMut(T) -> R,
    {
        let input = setup();

        self.begin();
        let timer = Timer::start();
        std::hint::black_box(routine(input));
        let elapsed = timer.stop();
        let alloc = self.allocations();

        self.record(elapsed, alloc, 1);
    }

    /// Time `batch_size` calls of `routine` over one shared input.
    ///
    /// Counts as `batch_size` invocations.
    #[inline]
    pub fn iter_batched<T, S, F, R>(&mut self, batch_size: u64, mut setup: S, mut routine: F)
    where
        S: FnMut() -> T,
        F: FnMut(&T) -> R,
    {
        let batch_size = batch_size.max(1);
        let input = setup();

        self.begin();
        let timer = Timer::start();
        for _ in 0..batch_size {
            std::hint::black_box(routine(std::hint::black_box(&input)));
        }
        let elapsed = timer.stop();
        let alloc = self.allocations();

        self.record(elapsed, alloc, batch_size);
    }

    /// Time one invocation of an async closure.
    ///
    /// Inside a multi-thread tokio runtime the future runs on the current
    /// handle; with no runtime a current-thread runtime is built once and cached.
    #[inline]
    pub fn iter_async<T, F, Fut>(&mut self, mut f: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        use tokio::runtime::{Handle, RuntimeFlavor};

        self.begin();

        let (elapsed, alloc) = match Handle::try_current() {
            Ok(handle) => {
                assert!(
                    handle.runtime_flavor() == RuntimeFlavor::MultiThread,
                    "iter_async cannot block inside a current-thread runtime"
                );
                let track = self.track_allocations;
                tokio::task::block_in_place(|| {
                    let timer = Timer::start();
                    std::hint::black_box(handle.block_on(f()));
                    let elapsed = timer.stop();
                    let alloc = if track { current_allocation() } else { (0, 0) };
                    (elapsed, alloc)
                })
            }
            Err(_) => {
                let rt = self.cached_runtime.get_or_insert_with(|| {
                    tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .expect("failed to build tokio runtime")
                });

                let timer = Timer::start();
                std::hint::black_box(rt.block_on(f()));
                let elapsed = timer.stop();
                (elapsed, self.allocations())
            }
        };

        self.record(elapsed, alloc, 1);
    }

    /// Close the current sample. The target only stops the loop; samples
    /// past it are kept so every measured invocation lands in one sample.
    fn flush_sample(&mut self) {
        let acc = std::mem::take(&mut self.current);
        if acc.iters == 0 {
            return;
        }

        let n = acc.iters;
        let sample = Sample::new(
            acc.time_ns as f64 / n as f64,
            n,
            acc.alloc_bytes / n,
            acc.alloc_count / n,
            acc.cycles / n,
        );
        self.running.push(sample.duration_nanos);
        self.samples.push(sample);
    }

    /// Whether the sample target has been reached
    pub fn has_enough_samples(&self) -> bool {
        self.samples.len() >= self.target_samples
    }

    /// Relative margin of error of the mean sample time at `confidence`,
    /// using a normal critical value. `None` below two samples.
    pub fn relative_error(&self, confidence: f64) -> Option<f64> {
        let RunningStats { count, mean, m2 } = self.running;
        if count < 2 || mean <= 0.0 {
            return None;
        }
        let std_err = (m2 / (count - 1) as f64).sqrt() / (count as f64).sqrt();
        let z = normal_quantile((1.0 + confidence) / 2.0);
        Some(z * std_err / mean)
    }

    /// Whether at least `MIN_SAMPLE_COUNT` samples agree within `max_relative_error`
    pub fn is_stable(&self, max_relative_error: f64, confidence: f64) -> bool {
        max_relative_error > 0.0
            && self.samples.len() >= MIN_SAMPLE_COUNT
            && self
                .relative_error(confidence)
                .is_some_and(|e| e <= max_relative_error)
    }

    /// Collected samples
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Invocations so far, warmup included
    pub fn iteration_count(&self) -> u64 {
        self.total_iterations
    }

    /// Invocations during measurement
    pub fn measured_iterations(&self) -> u64 {
        self.measured_iterations
    }

    /// Sample target
    pub fn target_samples(&self) -> usize {
        self.target_samples
    }

    /// Flush the partial sample and return the results
    pub fn finish(mut self) -> BenchmarkResult {
        self.flush_sample();

        let total_time_ns = self.samples.iter().map(|s| s.total_nanos()).sum::<f64>() as u64;

        BenchmarkResult {
            samples: self.samples,
            iterations: self.total_iterations,
            measured_iterations: self.measured_iterations,
            total_time_ns,
            stabilized: false,
        }
    }
}

/// Drive one job: warmup, then measurement until a stop condition holds.
///
/// Stops when max iterations are reached, or once min iterations are met
/// and the sample target is reached, the time budget is spent, or the
/// relative error has converged. Fixed-sample mode skips warmup and runs
/// exactly `samples` invocations.
///
/// A runner that never calls an `iter*` method ends its phase immediately.
pub fn run_benchmark_loop<F>(
    mut bencher: Bencher,
    mut runner_fn: F,
    config: &BenchmarkConfig,
) -> BenchmarkResult
where
    F: FnMut(&mut Bencher),
{
    if let Some(samples) = config.samples {
        bencher.start_fixed(samples);
        while bencher.measured_iterations() < samples {
            let before = bencher.iteration_count();
            runner_fn(&mut bencher);
            if bencher.iteration_count() == before {
                tracing::warn!("benchmark did not call an iter method; stopping");
                break;
            }
        }
        return bencher.finish();
    }

    let warmup_start = Instant::now();
    while warmup_start.elapsed_nanos() < config.warmup_time_ns {
        let before = bencher.iteration_count();
        runner_fn(&mut bencher);
        if bencher.iteration_count() == before {
            break;
        }
    }

    bencher.start_measurement(config.measurement_time_ns);
    tracing::trace!(
        iters_per_sample = bencher.iters_per_sample(),
        "warmup complete"
    );

    let measure_start = Instant::now();
    let min_iterations = config.min_iterations.unwrap_or(0);
    let max_iterations = config.max_iterations.unwrap_or(u64::MAX).max(min_iterations);
    let mut stabilized = false;

    loop {
        let measured = bencher.measured_iterations();
        if measured >= max_iterations {
            break;
        }

        if measured >= min_iterations {
            if bencher.has_enough_samples()
                || measure_start.elapsed_nanos() >= config.measurement_time_ns
            {
                break;
            }
            if bencher.is_stable(config.max_relative_error, config.confidence_level) {
                stabilized = true;
                break;
            }
        }

        let before = bencher.iteration_count();
        runner_fn(&mut bencher);
        if bencher.iteration_count() == before {
            tracing::warn!("benchmark did not call an iter method; stopping");
            break;
        }
    }

    let mut result = bencher.finish();
    result.stabilized = stabilized;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BenchmarkConfig {
        BenchmarkConfig {
            warmup_time_ns: 0,
            measurement_time_ns: 0,
            track_allocations: false,
            ..Default::default()
        }
    }

    fn spin() -> u64 {
        (0..1000u64).fold(0, |acc, i| acc.wrapping_add(std::hint::black_box(i)))
    }

    #[test]
    fn test_warmup_then_measurement() {
        let mut bencher = Bencher::new(false);

        for _ in 0..100 {
            bencher.iter(spin);
        }
        assert!(bencher.samples().is_empty());
        assert!(bencher.estimated_iter_time_ns().is_some());

        bencher.start_measurement(1_000_000_000);
        for _ in 0..1000 {
            bencher.iter(spin);
        }

        let result = bencher.finish();
        assert!(!result.samples.is_empty());
        let sampled: u64 = result.samples.iter().map(|s| s.iterations).sum();
        assert_eq!(sampled, 1000);
        assert_eq!(result.iterations, 1100);
        assert_eq!(result.measured_iterations, 1000);
    }

    #[test]
    fn test_iter_with_setup_during_warmup() {
        let mut bencher = Bencher::new(false);

        for _ in 0..5 {
            bencher.iter_with_setup(|| vec![1, 2, 3, 4, 5], |v| v.iter().sum::<i32>());
        }

        assert!(bencher.samples().is_empty());
        assert_eq!(bencher.warmup_times.len(), 5);
    }

    #[test]
    fn test_sample_batching() {
        let mut bencher = Bencher::with_config(false, 10);
        bencher.is_warmup = false;
        bencher.iters_per_sample = 5;

        for _ in 0..50 {
            bencher.iter(|| 42);
        }

        let result = bencher.finish();
        assert_eq!(result.samples.len(), 10);
        assert!(result.samples.iter().all(|s| s.iterations == 5));
        assert_eq!(result.iterations, 50);
    }

    #[test]
    fn test_iter_batched_counts_every_call() {
        let mut bencher = Bencher::with_config(false, 10);
        bencher.start_fixed(2);

        bencher.iter_batched(8, || vec![3u8; 16], |v| v.len());
        bencher.iter_batched(8, || vec![3u8; 16], |v| v.len());

        let result = bencher.finish();
        assert_eq!(result.measured_iterations, 16);
        assert_eq!(result.samples.len(), 2);
        assert_eq!(result.samples[0].iterations, 8);
    }

    #[test]
    fn test_iter_async_without_runtime() {
        let mut bencher = Bencher::new(false);
        bencher.start_fixed(3);
        for _ in 0..3 {
            bencher.iter_async(|| async { 1 + 1 });
        }
        assert_eq!(bencher.finish().samples.len(), 3);
    }

    #[test]
    fn test_relative_error_of_constant_samples() {
        let mut bencher = Bencher::with_config(false, 100);
        bencher.is_warmup = false;
        for _ in 0..20 {
            bencher.running.push(50.0);
            bencher.samples.push(Sample::timing_only(50.0));
        }

        assert_eq!(bencher.relative_error(0.95), Some(0.0));
        assert!(bencher.is_stable(0.02, 0.95));
        assert!(!bencher.is_stable(0.0, 0.95));
    }

    #[test]
    fn test_relative_error_needs_two_samples() {
        let mut bencher = Bencher::new(false);
        assert_eq!(bencher.relative_error(0.95), None);
        bencher.running.push(10.0);
        assert_eq!(bencher.relative_error(0.95), None);
    }

    #[test]
    fn test_fixed_samples() {
        let config = BenchmarkConfig {
            samples: Some(7),
            ..config()
        };
        let result = run_benchmark_loop(Bencher::for_config(&config), |b| b.iter(spin), &config);

        assert_eq!(result.samples.len(), 7);
        assert_eq!(result.iterations, 7);
        assert!(result.samples.iter().all(|s| s.iterations == 1));
    }

    #[test]
    fn test_run_loop_respects_min_iterations() {
        let config = BenchmarkConfig {
            target_samples: 10,
            min_iterations: Some(100),
            max_iterations: Some(100),
            ..config()
        };
        let result = run_benchmark_loop(Bencher::for_config(&config), |b| b.iter(|| 42_u64), &config);

        assert_eq!(result.measured_iterations, 100);
        // The floor outruns the sample target; nothing is dropped
        assert_eq!(result.samples.len(), 100);
        let sampled: u64 = result.samples.iter().map(|s| s.iterations).sum();
        assert_eq!(sampled, result.measured_iterations);
    }

    #[test]
    fn test_run_loop_clamps_max_to_min() {
        let config = BenchmarkConfig {
            target_samples: 10,
            min_iterations: Some(200),
            max_iterations: Some(50),
            ..config()
        };
        let result = run_benchmark_loop(Bencher::for_config(&config), |b| b.iter(|| 7_u64), &config);

        assert_eq!(result.measured_iterations, 200);
    }

    #[test]
    fn test_run_loop_stops_at_max_iterations() {
        let config = BenchmarkConfig {
            measurement_time_ns: 60_000_000_000,
            max_relative_error: 0.0,
            max_iterations: Some(25),
            target_samples: 1000,
            ..config()
        };
        let result = run_benchmark_loop(Bencher::for_config(&config), |b| b.iter(spin), &config);

        assert_eq!(result.measured_iterations, 25);
        assert!(!result.stabilized);
    }

    #[test]
    fn test_run_loop_stops_when_stable() {
        let config = BenchmarkConfig {
            measurement_time_ns: 60_000_000_000,
            target_samples: 1_000_000,
            max_relative_error: 0.5,
            ..config()
        };
        let result = run_benchmark_loop(
            Bencher::for_config(&config),
            |b| b.iter(|| std::thread::sleep(std::time::Duration::from_micros(200))),
            &config,
        );

        assert!(result.stabilized);
        assert!(result.samples.len() >= MIN_SAMPLE_COUNT);
    }

    #[test]
    fn test_runner_without_iter_terminates() {
        let config = BenchmarkConfig {
            min_iterations: Some(10),
            ..config()
        };
        let result = run_benchmark_loop(Bencher::for_config(&config), |_| {}, &config);

        assert!(result.samples.is_empty());
        assert_eq!(result.iterations, 0);
    }
}
