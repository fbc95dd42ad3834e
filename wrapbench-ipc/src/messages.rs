//! IPC Message Types
//!
//! Everything that crosses the supervisor/worker pipe. All types archive
//! with `check_bytes` so frames are validated before they are trusted.

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};

/// One measurement sample: the average of `iterations` invocations.
#[derive(Debug, Clone, Copy, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct Sample {
    /// Mean nanoseconds per invocation
    pub duration_nanos: f64,
    /// Invocations folded into this sample
    pub iterations: u64,
    /// Mean bytes allocated per invocation
    pub alloc_bytes: u64,
    /// Mean allocations per invocation
    pub alloc_count: u64,
    /// Mean CPU cycles per invocation (0 without a cycle counter)
    pub cpu_cycles: u64,
}

impl Sample {
    /// Create a sample from per-invocation averages
    #[inline]
    pub fn new(
        duration_nanos: f64,
        iterations: u64,
        alloc_bytes: u64,
        alloc_count: u64,
        cpu_cycles: u64,
    ) -> Self {
        Self {
            duration_nanos,
            iterations,
            alloc_bytes,
            alloc_count,
            cpu_cycles,
        }
    }

    /// Timing-only sample of a single invocation
    #[inline]
    pub fn timing_only(duration_nanos: f64) -> Self {
        Self::new(duration_nanos, 1, 0, 0, 0)
    }

    /// Wall time covered by this sample
    pub fn total_nanos(&self) -> f64 {
        self.duration_nanos * self.iterations as f64
    }
}

/// A chunk of samples for one job
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct SampleBatch {
    /// Job the samples belong to
    pub job_id: String,
    /// Position of this batch in the job's stream, starting at 0
    pub sequence: u32,
    /// Samples, in collection order
    pub samples: Vec<Sample>,
}

impl SampleBatch {
    /// Split `samples` into batches of at most `MAX_BATCH_SIZE`
    pub fn chunked(job_id: &str, samples: &[Sample]) -> Vec<SampleBatch> {
        samples
            .chunks(crate::MAX_BATCH_SIZE)
            .enumerate()
            .map(|(i, chunk)| SampleBatch {
                job_id: job_id.to_string(),
                sequence: i as u32,
                samples: chunk.to_vec(),
            })
            .collect()
    }
}

/// Worker capabilities reported during the handshake
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct WorkerCapabilities {
    /// Protocol version spoken by the worker
    pub protocol_version: u32,
    /// Process id of the worker
    pub pid: u32,
    /// Hardware cycle counter available
    pub has_cycle_counter: bool,
    /// Tracking allocator installed in the worker binary
    pub has_alloc_tracking: bool,
    /// Number of logical CPUs
    pub cpu_count: u32,
}

impl WorkerCapabilities {
    /// Capabilities of the current process
    pub fn current(has_cycle_counter: bool, has_alloc_tracking: bool) -> Self {
        Self {
            protocol_version: crate::PROTOCOL_VERSION,
            pid: std::process::id(),
            has_cycle_counter,
            has_alloc_tracking,
            cpu_count: std::thread::available_parallelism()
                .map(|p| p.get() as u32)
                .unwrap_or(1),
        }
    }
}

/// Messages sent from worker to supervisor
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum WorkerMessage {
    /// Handshake, sent once after startup
    Hello(WorkerCapabilities),

    /// Samples for the running job
    SampleBatch(SampleBatch),

    /// Job finished; all batches have been sent
    Complete {
        /// Job that finished
        job_id: String,
        /// Invocations including warmup
        total_iterations: u64,
        /// Invocations during measurement
        measured_iterations: u64,
        /// Measurement wall time in nanoseconds
        total_duration_nanos: u64,
        /// Measurement stopped because the relative error converged
        stabilized: bool,
    },

    /// Job failed
    Failure {
        /// Job that failed
        job_id: String,
        /// Failure category
        kind: FailureKind,
        /// Human-readable reason
        message: String,
    },

    /// Reply to `Ping`
    Pong,
}

/// Categories of job failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum FailureKind {
    /// Panic inside the benchmark, setup or teardown
    Panic,
    /// Timeout exceeded
    Timeout,
    /// Worker does not know the job id
    UnknownJob,
    /// Worker process died
    Crashed,
}

/// Commands sent from supervisor to worker
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum SupervisorCommand {
    /// Run one job
    Run {
        /// Job identifier (`method` or `method@name=value,...`)
        job_id: String,
        /// Effective configuration for the job
        config: BenchmarkConfig,
    },

    /// Exit the serve loop
    Shutdown,

    /// Liveness check, answered with `Pong`
    Ping,
}

/// Effective measurement configuration for one job
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct BenchmarkConfig {
    /// Warmup time in nanoseconds
    pub warmup_time_ns: u64,
    /// Measurement time budget in nanoseconds
    pub measurement_time_ns: u64,
    /// Per-job timeout in nanoseconds (0 = none)
    pub timeout_ns: u64,
    /// Fixed sample mode: exactly this many single-invocation samples
    pub samples: Option<u64>,
    /// Minimum measured invocations
    pub min_iterations: Option<u64>,
    /// Maximum measured invocations
    pub max_iterations: Option<u64>,
    /// Number of samples to aim for
    pub target_samples: u64,
    /// Stop once the relative margin of error falls below this (0 disables)
    pub max_relative_error: f64,
    /// Confidence level for the stabilization check
    pub confidence_level: f64,
    /// Record allocations per invocation
    pub track_allocations: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            warmup_time_ns: 1_000_000_000,
            measurement_time_ns: 3_000_000_000,
            timeout_ns: 60_000_000_000,
            samples: None,
            min_iterations: None,
            max_iterations: None,
            target_samples: 100,
            max_relative_error: 0.02,
            confidence_level: 0.95,
            track_allocations: true,
        }
    }
}

impl BenchmarkConfig {
    /// Validate configuration values, describing the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.samples == Some(0) {
            return Err("samples must be > 0".to_string());
        }
        if self.samples.is_none() && self.measurement_time_ns == 0 {
            return Err("measurement_time_ns must be > 0".to_string());
        }
        if self.target_samples == 0 {
            return Err("target_samples must be > 0".to_string());
        }
        if !(0.0..1.0).contains(&self.max_relative_error) {
            return Err(format!(
                "max_relative_error ({}) must be in [0, 1)",
                self.max_relative_error
            ));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(format!(
                "confidence_level ({}) must be in (0, 1)",
                self.confidence_level
            ));
        }
        if let (Some(min), Some(max)) = (self.min_iterations, self.max_iterations) {
            if max < min {
                return Err(format!(
                    "max_iterations ({max}) must be >= min_iterations ({min})"
                ));
            }
        }
        Ok(())
    }

    /// Whether the job runs in fixed-sample mode
    pub fn is_fixed_samples(&self) -> bool {
        self.samples.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_creation() {
        let sample = Sample::new(12.5, 8, 512, 5, 4000);
        assert_eq!(sample.duration_nanos, 12.5);
        assert_eq!(sample.iterations, 8);
        assert_eq!(sample.total_nanos(), 100.0);
    }

    #[test]
    fn test_sample_timing_only() {
        let sample = Sample::timing_only(5000.0);
        assert_eq!(sample.iterations, 1);
        assert_eq!(sample.alloc_bytes, 0);
        assert_eq!(sample.cpu_cycles, 0);
    }

    #[test]
    fn test_batches_are_chunked_and_sequenced() {
        let samples = vec![Sample::timing_only(1.0); crate::MAX_BATCH_SIZE + 5];
        let batches = SampleBatch::chunked("sum@n=10", &samples);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].samples.len(), crate::MAX_BATCH_SIZE);
        assert_eq!(batches[1].samples.len(), 5);
        assert_eq!(batches[1].sequence, 1);
        assert!(batches.iter().all(|b| b.job_id == "sum@n=10"));
        assert!(SampleBatch::chunked("x", &[]).is_empty());
    }

    #[test]
    fn test_benchmark_config_validate_default() {
        assert!(BenchmarkConfig::default().validate().is_ok());
    }

    #[test]
    fn test_benchmark_config_validate_rejects_bad_values() {
        let zero_samples = BenchmarkConfig {
            samples: Some(0),
            ..Default::default()
        };
        assert!(zero_samples.validate().is_err());

        let inverted = BenchmarkConfig {
            min_iterations: Some(200),
            max_iterations: Some(50),
            ..Default::default()
        };
        assert!(inverted.validate().is_err());

        let bad_confidence = BenchmarkConfig {
            confidence_level: 1.0,
            ..Default::default()
        };
        assert!(bad_confidence.validate().is_err());
    }

    #[test]
    fn test_fixed_samples_skip_time_budget_check() {
        let config = BenchmarkConfig {
            samples: Some(10),
            measurement_time_ns: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.is_fixed_samples());
    }

    #[test]
    fn test_worker_capabilities_current() {
        let caps = WorkerCapabilities::current(true, false);
        assert_eq!(caps.protocol_version, crate::PROTOCOL_VERSION);
        assert_eq!(caps.pid, std::process::id());
        assert!(caps.cpu_count >= 1);
    }
}
