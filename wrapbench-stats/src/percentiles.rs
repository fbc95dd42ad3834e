//! Percentile Computation
//!
//! Percentiles are always taken over raw samples, never the cleaned set:
//! p99 and p99.9 exist to expose the tail, and the tail is where outliers live.

/// Standard percentiles reported for every job
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Percentiles {
    /// 25th percentile (first quartile)
    pub p25: f64,
    /// 50th percentile (median)
    pub p50: f64,
    /// 75th percentile (third quartile)
    pub p75: f64,
    /// 90th percentile
    pub p90: f64,
    /// 95th percentile
    pub p95: f64,
    /// 99th percentile
    pub p99: f64,
    /// 99.9th percentile
    pub p999: f64,
}

/// Compute a single percentile (0-100) from unsorted samples.
///
/// Linear interpolation between the two nearest ranks. Empty input yields 0.
pub fn compute_percentile(samples: &[f64], percentile: f64) -> f64 {
    match samples.len() {
        0 => 0.0,
        1 => samples[0],
        _ => {
            let sorted = sorted_copy(samples);
            percentile_of_sorted(&sorted, percentile)
        }
    }
}

/// Compute all standard percentiles with a single sort
pub fn compute_percentiles(samples: &[f64]) -> Percentiles {
    let sorted = sorted_copy(samples);
    Percentiles {
        p25: percentile_of_sorted(&sorted, 25.0),
        p50: percentile_of_sorted(&sorted, 50.0),
        p75: percentile_of_sorted(&sorted, 75.0),
        p90: percentile_of_sorted(&sorted, 90.0),
        p95: percentile_of_sorted(&sorted, 95.0),
        p99: percentile_of_sorted(&sorted, 99.0),
        p999: percentile_of_sorted(&sorted, 99.9),
    }
}

pub(crate) fn sorted_copy(samples: &[f64]) -> Vec<f64> {
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Percentile of an already sorted slice
pub(crate) fn percentile_of_sorted(sorted: &[f64], percentile: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        return sorted[0];
    }

    let p = (percentile / 100.0).clamp(0.0, 1.0);
    let rank = p * (n - 1) as f64;
    let lower_idx = rank.floor() as usize;
    let upper_idx = (lower_idx + 1).min(n - 1);
    let fraction = rank - lower_idx as f64;

    sorted[lower_idx] + fraction * (sorted[upper_idx] - sorted[lower_idx])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median() {
        let samples = vec![5.0, 1.0, 3.0, 2.0, 4.0];
        assert!((compute_percentile(&samples, 50.0) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_interpolates_between_ranks() {
        let samples = vec![10.0, 20.0];
        assert!((compute_percentile(&samples, 50.0) - 15.0).abs() < 1e-9);
        assert!((compute_percentile(&samples, 25.0) - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_extreme_percentiles() {
        let samples: Vec<f64> = (1..=1000).map(|x| x as f64).collect();
        let p99 = compute_percentile(&samples, 99.0);
        let p999 = compute_percentile(&samples, 99.9);

        assert!(p99 > 985.0 && p99 < 995.0);
        assert!(p999 > 998.0 && p999 <= 1000.0);
    }

    #[test]
    fn test_out_of_range_percentile_is_clamped() {
        let samples = vec![1.0, 2.0, 3.0];
        assert_eq!(compute_percentile(&samples, 150.0), 3.0);
        assert_eq!(compute_percentile(&samples, -5.0), 1.0);
    }

    #[test]
    fn test_single_and_empty() {
        assert_eq!(compute_percentile(&[42.0], 99.0), 42.0);
        assert_eq!(compute_percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_compute_all_percentiles() {
        let samples: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        let p = compute_percentiles(&samples);

        assert!(p.p25 < p.p50 && p.p50 < p.p75 && p.p75 < p.p90);
        assert!(p.p50 > 49.0 && p.p50 < 51.0);
        assert!(p.p99 > 98.0 && p.p99 <= 100.0);
        assert!(p.p999 >= p.p99);
    }
}
