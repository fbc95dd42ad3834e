//! Outlier Detection
//!
//! Outliers are flagged, not discarded. Mean, median and standard deviation
//! are computed on the cleaned set; min, max and percentiles keep every sample.

use crate::percentiles::{percentile_of_sorted, sorted_copy};

/// Method for outlier detection
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutlierMethod {
    /// Tukey fences: outside [Q1 - k*IQR, Q3 + k*IQR]
    Iqr {
        /// Fence multiplier (1.5 is the classic value)
        k: f64,
    },
    /// Outside mean ± threshold standard deviations
    ZScore {
        /// Number of standard deviations
        threshold: f64,
    },
    /// No outlier detection
    None,
}

impl Default for OutlierMethod {
    fn default() -> Self {
        OutlierMethod::Iqr { k: 1.5 }
    }
}

/// Result of outlier analysis
#[derive(Debug, Clone)]
pub struct OutlierAnalysis {
    /// Original samples, in input order
    pub all_samples: Vec<f64>,
    /// Samples inside the fences
    pub cleaned_samples: Vec<f64>,
    /// Indices (into `all_samples`) of flagged samples
    pub outlier_indices: Vec<usize>,
    /// Samples below the lower fence
    pub low_outlier_count: usize,
    /// Samples above the upper fence
    pub high_outlier_count: usize,
    /// Lower fence
    pub lower_bound: f64,
    /// Upper fence
    pub upper_bound: f64,
    /// Detection method used
    pub method: OutlierMethod,
}

impl OutlierAnalysis {
    fn untouched(samples: &[f64], method: OutlierMethod, lower: f64, upper: f64) -> Self {
        Self {
            all_samples: samples.to_vec(),
            cleaned_samples: samples.to_vec(),
            outlier_indices: Vec::new(),
            low_outlier_count: 0,
            high_outlier_count: 0,
            lower_bound: lower,
            upper_bound: upper,
            method,
        }
    }

    /// Number of flagged samples
    pub fn outlier_count(&self) -> usize {
        self.outlier_indices.len()
    }

    /// Percentage of samples that are outliers
    pub fn outlier_percentage(&self) -> f64 {
        if self.all_samples.is_empty() {
            return 0.0;
        }
        (self.outlier_indices.len() as f64 / self.all_samples.len() as f64) * 100.0
    }

    /// Whether the outlier share suggests a noisy machine
    pub fn is_noisy(&self, threshold_pct: f64) -> bool {
        self.outlier_percentage() > threshold_pct
    }
}

/// Detect outliers in samples using the given method
pub fn detect_outliers(samples: &[f64], method: OutlierMethod) -> OutlierAnalysis {
    if samples.is_empty() {
        return OutlierAnalysis::untouched(samples, method, 0.0, 0.0);
    }

    match method {
        OutlierMethod::None => {
            OutlierAnalysis::untouched(samples, method, f64::NEG_INFINITY, f64::INFINITY)
        }
        OutlierMethod::Iqr { k } => {
            let sorted = sorted_copy(samples);
            let q1 = percentile_of_sorted(&sorted, 25.0);
            let q3 = percentile_of_sorted(&sorted, 75.0);
            let iqr = q3 - q1;
            partition(samples, method, q1 - k * iqr, q3 + k * iqr)
        }
        OutlierMethod::ZScore { threshold } => {
            let n = samples.len() as f64;
            let mean = samples.iter().sum::<f64>() / n;
            let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
            let std_dev = variance.sqrt();

            if std_dev == 0.0 {
                return OutlierAnalysis::untouched(samples, method, mean, mean);
            }

            partition(
                samples,
                method,
                mean - threshold * std_dev,
                mean + threshold * std_dev,
            )
        }
    }
}

fn partition(samples: &[f64], method: OutlierMethod, lower: f64, upper: f64) -> OutlierAnalysis {
    let mut outlier_indices = Vec::new();
    let mut low = 0;
    let mut high = 0;
    let mut cleaned = Vec::with_capacity(samples.len());

    for (i, &sample) in samples.iter().enumerate() {
        if sample < lower {
            outlier_indices.push(i);
            low += 1;
        } else if sample > upper {
            outlier_indices.push(i);
            high += 1;
        } else {
            cleaned.push(sample);
        }
    }

    OutlierAnalysis {
        all_samples: samples.to_vec(),
        cleaned_samples: cleaned,
        outlier_indices,
        low_outlier_count: low,
        high_outlier_count: high,
        lower_bound: lower,
        upper_bound: upper,
        method,
    }
}
