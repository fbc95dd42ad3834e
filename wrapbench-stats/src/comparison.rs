//! A/B Comparison
//!
//! Compares a candidate sample set against a baseline: relative change,
//! bootstrap probability that the candidate is slower, a confidence interval
//! for the difference of means and Cohen's d.

use crate::bootstrap::ConfidenceInterval;
use crate::outliers::OutlierMethod;
use crate::percentiles::sorted_copy;
use crate::summary::{SummaryStatistics, compute_summary_with_confidence};
use crate::{DEFAULT_BOOTSTRAP_ITERATIONS, DEFAULT_CONFIDENCE_LEVEL};
use rand::Rng;
use rand::thread_rng;
use rayon::prelude::*;
use thiserror::Error;

/// Result of comparing two distributions
#[derive(Debug, Clone)]
pub struct ComparisonResult {
    /// Summary of the baseline samples
    pub baseline_stats: SummaryStatistics,
    /// Summary of the candidate samples
    pub candidate_stats: SummaryStatistics,
    /// Relative change of the mean in percent
    pub relative_change: f64,
    /// Absolute change of the mean
    pub absolute_change: f64,
    /// Probability that the candidate is slower (0.0 to 1.0)
    pub probability_regression: f64,
    /// Confidence interval of `candidate - baseline`
    pub difference_ci: ConfidenceInterval,
    /// CI excludes zero and the change exceeds the threshold
    pub is_significant: bool,
    /// Cohen's d
    pub effect_size: f64,
    /// Magnitude class of `effect_size`
    pub effect_interpretation: EffectInterpretation,
}

impl ComparisonResult {
    /// Significant and slower
    pub fn is_regression(&self) -> bool {
        self.is_significant && self.absolute_change > 0.0
    }

    /// Significant and faster
    pub fn is_improvement(&self) -> bool {
        self.is_significant && self.absolute_change < 0.0
    }
}

/// Interpretation of effect size magnitude (Cohen's conventions)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectInterpretation {
    /// |d| < 0.2
    Negligible,
    /// 0.2 <= |d| < 0.5
    Small,
    /// 0.5 <= |d| < 0.8
    Medium,
    /// |d| >= 0.8
    Large,
}

impl EffectInterpretation {
    fn from_effect_size(d: f64) -> Self {
        match d.abs() {
            x if x < 0.2 => EffectInterpretation::Negligible,
            x if x < 0.5 => EffectInterpretation::Small,
            x if x < 0.8 => EffectInterpretation::Medium,
            _ => EffectInterpretation::Large,
        }
    }
}

impl std::fmt::Display for EffectInterpretation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EffectInterpretation::Negligible => "negligible",
            EffectInterpretation::Small => "small",
            EffectInterpretation::Medium => "medium",
            EffectInterpretation::Large => "large",
        };
        f.write_str(s)
    }
}

/// Configuration for comparison
#[derive(Debug, Clone)]
pub struct ComparisonConfig {
    /// Number of bootstrap resamples
    pub bootstrap_iterations: usize,
    /// Confidence level for the difference interval
    pub confidence_level: f64,
    /// Minimum relative change (percent) to call a difference significant
    pub significance_threshold: f64,
    /// Outlier detection applied to both sides
    pub outlier_method: OutlierMethod,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            bootstrap_iterations: DEFAULT_BOOTSTRAP_ITERATIONS,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            significance_threshold: 5.0,
            outlier_method: OutlierMethod::default(),
        }
    }
}

/// Errors from comparison operations
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ComparisonError {
    /// Baseline sample set is empty
    #[error("baseline samples are empty")]
    EmptyBaseline,
    /// Candidate sample set is empty
    #[error("candidate samples are empty")]
    EmptyCandidate,
    /// Baseline has a single sample
    #[error("baseline needs at least 2 samples")]
    InsufficientBaseline,
    /// Candidate has a single sample
    #[error("candidate needs at least 2 samples")]
    InsufficientCandidate,
    /// Zero bootstrap iterations requested
    #[error("comparison needs at least one bootstrap iteration")]
    NoIterations,
}

/// Compare `candidate` against `baseline`
pub fn compare_distributions(
    baseline: &[f64],
    candidate: &[f64],
    config: &ComparisonConfig,
) -> Result<ComparisonResult, ComparisonError> {
    match (baseline.len(), candidate.len()) {
        (0, _) => return Err(ComparisonError::EmptyBaseline),
        (_, 0) => return Err(ComparisonError::EmptyCandidate),
        (1, _) => return Err(ComparisonError::InsufficientBaseline),
        (_, 1) => return Err(ComparisonError::InsufficientCandidate),
        _ => {}
    }
    if config.bootstrap_iterations == 0 {
        return Err(ComparisonError::NoIterations);
    }

    let baseline_stats =
        compute_summary_with_confidence(baseline, config.outlier_method, config.confidence_level);
    let candidate_stats =
        compute_summary_with_confidence(candidate, config.outlier_method, config.confidence_level);

    let observed_diff = candidate_stats.mean - baseline_stats.mean;
    let relative_change = if baseline_stats.mean > 0.0 {
        (observed_diff / baseline_stats.mean) * 100.0
    } else {
        0.0
    };

    let diffs: Vec<f64> = (0..config.bootstrap_iterations)
        .into_par_iter()
        .map_init(thread_rng, |rng, _| {
            resampled_mean(candidate, rng) - resampled_mean(baseline, rng)
        })
        .collect();

    let b = diffs.len();
    let regressions = diffs.iter().filter(|&&d| d > 0.0).count();
    let probability_regression = regressions as f64 / b as f64;

    let sorted = sorted_copy(&diffs);
    let alpha = (1.0 - config.confidence_level) / 2.0;
    let lower_idx = ((alpha * b as f64) as usize).min(b - 1);
    let upper_idx = (((1.0 - alpha) * b as f64) as usize).min(b - 1);
    let difference_ci = ConfidenceInterval {
        lower: sorted[lower_idx],
        upper: sorted[upper_idx],
        level: config.confidence_level,
    };

    let n1 = baseline.len() as f64;
    let n2 = candidate.len() as f64;
    let var1 = baseline_stats.std_dev.powi(2);
    let var2 = candidate_stats.std_dev.powi(2);
    let pooled_std = (((n1 - 1.0) * var1 + (n2 - 1.0) * var2) / (n1 + n2 - 2.0)).sqrt();
    let effect_size = if pooled_std > 0.0 {
        observed_diff / pooled_std
    } else {
        0.0
    };

    let ci_excludes_zero = !difference_ci.contains(0.0);
    let is_significant =
        ci_excludes_zero && relative_change.abs() >= config.significance_threshold;

    Ok(ComparisonResult {
        baseline_stats,
        candidate_stats,
        relative_change,
        absolute_change: observed_diff,
        probability_regression,
        difference_ci,
        is_significant,
        effect_size,
        effect_interpretation: EffectInterpretation::from_effect_size(effect_size),
    })
}

fn resampled_mean<R: Rng>(samples: &[f64], rng: &mut R) -> f64 {
    let n = samples.len();
    (0..n).map(|_| samples[rng.gen_range(0..n)]).sum::<f64>() / n as f64
}
