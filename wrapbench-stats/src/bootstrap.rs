//! Bootstrap Resampling
//!
//! Confidence intervals for the mean by resampling with replacement.
//! BCa (bias-corrected and accelerated) below [`BCA_THRESHOLD`] samples,
//! plain percentile intervals above it.

use crate::distribution::{normal_cdf, normal_quantile};
use crate::percentiles::sorted_copy;
use crate::{BCA_THRESHOLD, DEFAULT_BOOTSTRAP_ITERATIONS, DEFAULT_CONFIDENCE_LEVEL};
use rand::Rng;
use rand::thread_rng;
use rayon::prelude::*;
use thiserror::Error;

/// Bootstrap configuration
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Number of resamples
    pub iterations: usize,
    /// Confidence level (0.95 for a 95% CI)
    pub confidence_level: f64,
    /// Resample on the rayon pool
    pub parallel: bool,
    /// Force BCa method even for large samples
    pub force_bca: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_BOOTSTRAP_ITERATIONS,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            parallel: true,
            force_bca: false,
        }
    }
}

/// Which bootstrap method was used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapMethod {
    /// Standard percentile method
    Percentile,
    /// BCa method (small samples or forced)
    Bca,
}

/// Confidence interval bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceInterval {
    /// Lower bound
    pub lower: f64,
    /// Upper bound
    pub upper: f64,
    /// Confidence level the bounds were computed at
    pub level: f64,
}

impl ConfidenceInterval {
    /// Whether `value` lies within the bounds (inclusive)
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    /// Width of the interval
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Result of bootstrap analysis
#[derive(Debug, Clone)]
pub struct BootstrapResult {
    /// Point estimate (sample mean)
    pub point_estimate: f64,
    /// Confidence interval
    pub confidence_interval: ConfidenceInterval,
    /// Standard error of the mean, from the bootstrap distribution
    pub standard_error: f64,
    /// Which method was used
    pub method: BootstrapMethod,
    /// Caveat about the estimate, if any
    pub warning: Option<String>,
}

/// Errors that can occur during bootstrap
#[derive(Debug, Error, PartialEq)]
pub enum BootstrapError {
    /// Fewer samples than the resampler needs
    #[error("not enough samples: got {got}, need at least {min}")]
    NotEnoughSamples {
        /// Samples provided
        got: usize,
        /// Minimum required
        min: usize,
    },

    /// Confidence level outside (0, 1)
    #[error("invalid confidence level: {0} (must be between 0 and 1)")]
    InvalidConfidenceLevel(f64),

    /// Zero resamples requested
    #[error("bootstrap needs at least one iteration")]
    NoIterations,
}

/// Minimum number of samples for resampling
const MIN_SAMPLES: usize = 3;

/// Compute a bootstrap confidence interval for the mean
pub fn compute_bootstrap(
    samples: &[f64],
    config: &BootstrapConfig,
) -> Result<BootstrapResult, BootstrapError> {
    if samples.len() < MIN_SAMPLES {
        return Err(BootstrapError::NotEnoughSamples {
            got: samples.len(),
            min: MIN_SAMPLES,
        });
    }
    if !(config.confidence_level > 0.0 && config.confidence_level < 1.0) {
        return Err(BootstrapError::InvalidConfidenceLevel(
            config.confidence_level,
        ));
    }
    if config.iterations == 0 {
        return Err(BootstrapError::NoIterations);
    }

    let n = samples.len();
    let point_estimate = mean(samples);

    let variance = samples
        .iter()
        .map(|x| (x - point_estimate).powi(2))
        .sum::<f64>()
        / n as f64;
    if variance == 0.0 {
        return Ok(BootstrapResult {
            point_estimate,
            confidence_interval: ConfidenceInterval {
                lower: point_estimate,
                upper: point_estimate,
                level: config.confidence_level,
            },
            standard_error: 0.0,
            method: BootstrapMethod::Percentile,
            warning: Some("all samples have identical values".to_string()),
        });
    }

    let use_bca = config.force_bca || n < BCA_THRESHOLD;

    let bootstrap_means = if config.parallel {
        resample_means_parallel(samples, config.iterations)
    } else {
        resample_means_serial(samples, config.iterations)
    };
    let sorted = sorted_copy(&bootstrap_means);

    let ((lower, upper), method) = if use_bca {
        (
            bca_interval(samples, &sorted, config.confidence_level),
            BootstrapMethod::Bca,
        )
    } else {
        (
            percentile_interval(&sorted, config.confidence_level),
            BootstrapMethod::Percentile,
        )
    };

    let bootstrap_mean = mean(&bootstrap_means);
    let standard_error = (bootstrap_means
        .iter()
        .map(|x| (x - bootstrap_mean).powi(2))
        .sum::<f64>()
        / bootstrap_means.len() as f64)
        .sqrt();

    let warning = (n < 10)
        .then(|| "very small sample size may lead to unreliable estimates".to_string());

    Ok(BootstrapResult {
        point_estimate,
        confidence_interval: ConfidenceInterval {
            lower: lower.min(point_estimate),
            upper: upper.max(point_estimate),
            level: config.confidence_level,
        },
        standard_error,
        method,
        warning,
    })
}

fn resample_mean<R: Rng>(samples: &[f64], rng: &mut R) -> f64 {
    let n = samples.len();
    let sum: f64 = (0..n).map(|_| samples[rng.gen_range(0..n)]).sum();
    sum / n as f64
}

fn resample_means_parallel(samples: &[f64], iterations: usize) -> Vec<f64> {
    (0..iterations)
        .into_par_iter()
        .map_init(thread_rng, |rng, _| resample_mean(samples, rng))
        .collect()
}

fn resample_means_serial(samples: &[f64], iterations: usize) -> Vec<f64> {
    let mut rng = thread_rng();
    (0..iterations)
        .map(|_| resample_mean(samples, &mut rng))
        .collect()
}

fn percentile_interval(sorted_means: &[f64], confidence: f64) -> (f64, f64) {
    let b = sorted_means.len();
    let alpha = (1.0 - confidence) / 2.0;

    let lower_idx = ((alpha * b as f64).floor() as usize).min(b - 1);
    let upper_idx = (((1.0 - alpha) * b as f64).floor() as usize).min(b - 1);

    (sorted_means[lower_idx], sorted_means[upper_idx])
}

fn bca_interval(samples: &[f64], sorted_means: &[f64], confidence: f64) -> (f64, f64) {
    let n = samples.len();
    let b = sorted_means.len();
    let theta_hat = mean(samples);

    // Bias correction
    let below = sorted_means.partition_point(|&x| x < theta_hat);
    let z0 = normal_quantile((below as f64 / b as f64).clamp(0.0001, 0.9999));

    // Acceleration via jackknife; leave-one-out mean is (total - x_i) / (n - 1)
    let total: f64 = samples.iter().sum();
    let jackknife: Vec<f64> = samples
        .iter()
        .map(|x| (total - x) / (n - 1) as f64)
        .collect();
    let jack_mean = mean(&jackknife);
    let (num, den) = jackknife.iter().fold((0.0, 0.0), |(num, den), x| {
        let d = jack_mean - x;
        (num + d.powi(3), den + d.powi(2))
    });
    let a = if den.abs() < 1e-10 {
        0.0
    } else {
        num / (6.0 * den.powf(1.5))
    };

    let alpha = (1.0 - confidence) / 2.0;
    let adjust = |z: f64| normal_cdf(z0 + (z0 + z) / (1.0 - a * (z0 + z)));
    let alpha1 = adjust(normal_quantile(alpha));
    let alpha2 = adjust(normal_quantile(1.0 - alpha));

    let lower_idx = ((alpha1 * b as f64).floor() as usize).min(b - 1);
    let upper_idx = ((alpha2 * b as f64).floor() as usize).min(b - 1);

    (sorted_means[lower_idx], sorted_means[upper_idx])
}

fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}
