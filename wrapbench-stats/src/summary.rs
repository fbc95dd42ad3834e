//! Summary Statistics
//!
//! Cleaned vs. raw split:
//! - mean, median, std_dev, standard error, margin of error and shape
//!   (skewness, kurtosis) come from the CLEANED samples
//! - min, max and percentiles come from ALL samples

use crate::DEFAULT_CONFIDENCE_LEVEL;
use crate::distribution::student_t_quantile;
use crate::outliers::{OutlierAnalysis, OutlierMethod, detect_outliers};
use crate::percentiles::{compute_percentiles, percentile_of_sorted, sorted_copy};

/// Summary statistics for one job's samples
#[derive(Debug, Clone)]
pub struct SummaryStatistics {
    // Central tendency (cleaned)
    /// Arithmetic mean
    pub mean: f64,
    /// Median
    pub median: f64,
    /// Sample standard deviation (n - 1)
    pub std_dev: f64,
    /// Standard error of the mean
    pub standard_error: f64,
    /// Half-width of the confidence interval of the mean (t-distribution)
    pub margin_of_error: f64,
    /// Confidence level used for `margin_of_error`
    pub confidence_level: f64,
    /// Adjusted Fisher-Pearson skewness
    pub skewness: f64,
    /// Kurtosis (3.0 for a normal distribution)
    pub kurtosis: f64,

    // Extremes and percentiles (all samples)
    /// Smallest sample
    pub min: f64,
    /// Largest sample
    pub max: f64,
    /// 50th percentile
    pub p50: f64,
    /// 90th percentile
    pub p90: f64,
    /// 95th percentile
    pub p95: f64,
    /// 99th percentile
    pub p99: f64,
    /// 99.9th percentile
    pub p999: f64,

    /// Number of raw samples
    pub sample_count: usize,
    /// Number of samples flagged as outliers
    pub outlier_count: usize,
    /// Full outlier analysis
    pub outlier_analysis: OutlierAnalysis,
}

/// CPU cycles statistics (computed alongside time stats)
#[derive(Debug, Clone, Default)]
pub struct CyclesStatistics {
    /// Mean CPU cycles per invocation
    pub mean_cycles: f64,
    /// Median CPU cycles per invocation
    pub median_cycles: f64,
    /// Standard deviation of cycles
    pub std_dev_cycles: f64,
    /// Minimum cycles observed
    pub min_cycles: u64,
    /// Maximum cycles observed
    pub max_cycles: u64,
    /// Cycles per nanosecond (approximates CPU frequency in GHz)
    pub cycles_per_ns: f64,
}

/// Compute summary statistics at the default 95% confidence level
pub fn compute_summary(samples: &[f64], outlier_method: OutlierMethod) -> SummaryStatistics {
    compute_summary_with_confidence(samples, outlier_method, DEFAULT_CONFIDENCE_LEVEL)
}

/// Compute summary statistics with an explicit confidence level for the
/// margin of error.
pub fn compute_summary_with_confidence(
    samples: &[f64],
    outlier_method: OutlierMethod,
    confidence_level: f64,
) -> SummaryStatistics {
    let analysis = detect_outliers(samples, outlier_method);
    let cleaned = &analysis.cleaned_samples;
    let all = &analysis.all_samples;

    let n = cleaned.len();
    let mean = if n == 0 {
        0.0
    } else {
        cleaned.iter().sum::<f64>() / n as f64
    };

    let median = percentile_of_sorted(&sorted_copy(cleaned), 50.0);

    let std_dev = if n < 2 {
        0.0
    } else {
        let variance = cleaned.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        variance.sqrt()
    };

    let standard_error = if n == 0 { 0.0 } else { std_dev / (n as f64).sqrt() };

    let margin_of_error = if n < 2 {
        0.0
    } else {
        let p = (1.0 + confidence_level) / 2.0;
        student_t_quantile(p, (n - 1) as f64) * standard_error
    };

    let (skewness, kurtosis) = shape(cleaned, mean);

    let min = all.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = all.iter().copied().reduce(f64::max).unwrap_or(0.0);

    let percentiles = compute_percentiles(all);

    SummaryStatistics {
        mean,
        median,
        std_dev,
        standard_error,
        margin_of_error,
        confidence_level,
        skewness,
        kurtosis,
        min,
        max,
        p50: percentiles.p50,
        p90: percentiles.p90,
        p95: percentiles.p95,
        p99: percentiles.p99,
        p999: percentiles.p999,
        sample_count: all.len(),
        outlier_count: analysis.outlier_count(),
        outlier_analysis: analysis,
    }
}

/// Skewness and kurtosis from central moments. Zero variance yields (0, 0).
fn shape(samples: &[f64], mean: f64) -> (f64, f64) {
    let n = samples.len();
    if n < 2 {
        return (0.0, 0.0);
    }

    let nf = n as f64;
    let (m2, m3, m4) = samples.iter().fold((0.0, 0.0, 0.0), |(m2, m3, m4), x| {
        let d = x - mean;
        let d2 = d * d;
        (m2 + d2, m3 + d2 * d, m4 + d2 * d2)
    });
    let (m2, m3, m4) = (m2 / nf, m3 / nf, m4 / nf);

    if m2 <= f64::EPSILON * mean.abs().max(1.0) {
        return (0.0, 0.0);
    }

    let g1 = m3 / m2.powf(1.5);
    let skewness = if n > 2 {
        g1 * (nf * (nf - 1.0)).sqrt() / (nf - 2.0)
    } else {
        g1
    };
    let kurtosis = m4 / (m2 * m2);

    (skewness, kurtosis)
}

impl SummaryStatistics {
    /// Coefficient of variation (relative stddev, percent)
    pub fn coefficient_of_variation(&self) -> f64 {
        if self.mean == 0.0 {
            0.0
        } else {
            (self.std_dev / self.mean) * 100.0
        }
    }

    /// Margin of error relative to the mean (fraction, not percent)
    pub fn relative_error(&self) -> f64 {
        if self.mean == 0.0 {
            0.0
        } else {
            self.margin_of_error / self.mean.abs()
        }
    }

    /// Interquartile range (from all data)
    pub fn iqr(&self) -> f64 {
        let sorted = sorted_copy(&self.outlier_analysis.all_samples);
        percentile_of_sorted(&sorted, 75.0) - percentile_of_sorted(&sorted, 25.0)
    }

    /// Check if distribution appears stable (low CV)
    pub fn is_stable(&self, cv_threshold: f64) -> bool {
        self.coefficient_of_variation() < cv_threshold
    }
}

/// Compute CPU cycles statistics from per-sample cycle counts.
///
/// `nanos` runs parallel to `cycles` and yields the cycles-per-ns ratio.
pub fn compute_cycles_stats(cycles: &[u64], nanos: &[f64]) -> CyclesStatistics {
    if cycles.is_empty() {
        return CyclesStatistics::default();
    }

    let cycles_f64: Vec<f64> = cycles.iter().map(|&c| c as f64).collect();
    let n = cycles_f64.len() as f64;

    let mean_cycles = cycles_f64.iter().sum::<f64>() / n;
    let median_cycles = percentile_of_sorted(&sorted_copy(&cycles_f64), 50.0);

    let std_dev_cycles = if cycles.len() < 2 {
        0.0
    } else {
        let variance = cycles_f64
            .iter()
            .map(|x| (x - mean_cycles).powi(2))
            .sum::<f64>()
            / (n - 1.0);
        variance.sqrt()
    };

    let min_cycles = cycles.iter().copied().min().unwrap_or(0);
    let max_cycles = cycles.iter().copied().max().unwrap_or(0);

    let total_nanos: f64 = nanos.iter().sum();
    let cycles_per_ns = if total_nanos > 0.0 {
        cycles_f64.iter().sum::<f64>() / total_nanos
    } else {
        0.0
    };

    CyclesStatistics {
        mean_cycles,
        median_cycles,
        std_dev_cycles,
        min_cycles,
        max_cycles,
        cycles_per_ns,
    }
}
