//! Baseline Diffing
//!
//! Compares the passed jobs of two summaries by full id.

use crate::report::{Metrics, Summary};
use serde::{Deserialize, Serialize};

/// Direction of a change against a baseline summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeVerdict {
    /// Slower by more than the threshold
    Regression,
    /// Faster by more than the threshold
    Improvement,
    /// Within the threshold
    Unchanged,
}

/// One job's change against a baseline summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineChange {
    /// `Suite::id`
    pub full_id: String,
    /// Mean in the baseline summary
    pub baseline_mean_ns: f64,
    /// Mean in this summary
    pub current_mean_ns: f64,
    /// (current - baseline) / baseline, in percent
    pub change_pct: f64,
    /// Confidence intervals of the two means do not overlap
    pub significant: bool,
    /// Verdict at the requested threshold
    pub verdict: ChangeVerdict,
}

impl BaselineChange {
    fn between(full_id: &str, baseline: &Metrics, current: &Metrics, threshold_pct: f64) -> Self {
        let change_pct = if baseline.mean_ns > 0.0 {
            (current.mean_ns - baseline.mean_ns) / baseline.mean_ns * 100.0
        } else {
            0.0
        };
        let significant =
            current.ci_lower_ns > baseline.ci_upper_ns || current.ci_upper_ns < baseline.ci_lower_ns;

        let verdict = if change_pct > threshold_pct {
            ChangeVerdict::Regression
        } else if change_pct < -threshold_pct {
            ChangeVerdict::Improvement
        } else {
            ChangeVerdict::Unchanged
        };

        Self {
            full_id: full_id.to_string(),
            baseline_mean_ns: baseline.mean_ns,
            current_mean_ns: current.mean_ns,
            change_pct,
            significant,
            verdict,
        }
    }

    /// Slower than the threshold allows
    pub fn is_regression(&self) -> bool {
        self.verdict == ChangeVerdict::Regression
    }
}

impl Summary {
    /// Compare every job measured in both `self` and `baseline`.
    ///
    /// `threshold_pct` is the relative change in percent beyond which a job
    /// counts as regressed or improved. Jobs missing from either side or
    /// without metrics are left out. Order follows `self`.
    pub fn baseline_comparison(&self, baseline: &Summary, threshold_pct: f64) -> Vec<BaselineChange> {
        self.reports
            .iter()
            .filter_map(|current| {
                let current_metrics = current.metrics.as_ref()?;
                let previous = baseline
                    .reports
                    .iter()
                    .find(|r| r.job.full_id == current.job.full_id)?;
                let previous_metrics = previous.metrics.as_ref()?;
                Some(BaselineChange::between(
                    &current.job.full_id,
                    previous_metrics,
                    current_metrics,
                    threshold_pct,
                ))
            })
            .collect()
    }
}
