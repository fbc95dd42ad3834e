//! Statistics Computation
//!
//! Per-job summary statistics, computed in parallel with rayon. Jobs without
//! samples (crashed, failed, or a runner that never iterated) get `None`.

use super::execution::JobExecution;
use rayon::prelude::*;
use wrapbench_stats::{OutlierMethod, SummaryStatistics, compute_summary_with_confidence};

/// Summary statistics per execution, in the same order
pub fn compute_statistics(
    executions: &[JobExecution],
    outlier_method: OutlierMethod,
    confidence_level: f64,
) -> Vec<Option<SummaryStatistics>> {
    executions
        .par_iter()
        .map(|execution| {
            if execution.samples.is_empty() {
                None
            } else {
                Some(compute_summary_with_confidence(
                    &execution.timings(),
                    outlier_method,
                    confidence_level,
                ))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wrapbench_ipc::{FailureKind, Sample};
    use wrapbench_report::BenchmarkStatus;

    fn execution(timings: &[f64]) -> JobExecution {
        JobExecution {
            status: BenchmarkStatus::Passed,
            failure: None,
            samples: timings.iter().map(|&t| Sample::timing_only(t)).collect(),
            ..JobExecution::failed(0, FailureKind::Panic, String::new(), 0)
        }
    }

    #[test]
    fn test_statistics_per_execution() {
        let executions = vec![
            execution(&[10.0, 12.0, 11.0, 10.0, 500.0]),
            execution(&[]),
        ];
        let stats = compute_statistics(&executions, OutlierMethod::default(), 0.95);

        assert_eq!(stats.len(), 2);
        let first = stats[0].as_ref().unwrap();
        assert_eq!(first.sample_count, 5);
        assert_eq!(first.outlier_count, 1);
        // Tails stay visible in the extremes
        assert_eq!(first.max, 500.0);
        assert!(first.mean < 20.0);
        assert!(stats[1].is_none());
    }
}
