#![warn(missing_docs)]
//! wrapbench statistics engine
//!
//! Reduces raw benchmark samples into summary statistics:
//! - Mean, error (margin of error), standard deviation and standard error
//! - Outlier detection via IQR or z-score
//! - Percentiles preserving tail latency signals
//! - Distribution shape (skewness, kurtosis)
//! - Bootstrap confidence intervals (percentile and BCa)
//! - A/B comparison with effect size and probability of regression

mod bootstrap;
mod comparison;
mod distribution;
mod outliers;
mod percentiles;
mod summary;

pub use bootstrap::{
    BootstrapConfig, BootstrapError, BootstrapMethod, BootstrapResult, ConfidenceInterval,
    compute_bootstrap,
};
pub use comparison::{
    ComparisonConfig, ComparisonError, ComparisonResult, EffectInterpretation,
    compare_distributions,
};
pub use distribution::{normal_cdf, normal_quantile, student_t_quantile};
pub use outliers::{OutlierAnalysis, OutlierMethod, detect_outliers};
pub use percentiles::{Percentiles, compute_percentile, compute_percentiles};
pub use summary::{
    CyclesStatistics, SummaryStatistics, compute_cycles_stats, compute_summary,
    compute_summary_with_confidence,
};

/// Threshold below which BCa method is used instead of percentile
pub const BCA_THRESHOLD: usize = 100;

/// Default number of bootstrap iterations
pub const DEFAULT_BOOTSTRAP_ITERATIONS: usize = 10_000;

/// Default confidence level (95%)
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;
