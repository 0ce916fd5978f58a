//! Severity weights and score shaping for the report.

use crate::core::Severity;
use serde::{Deserialize, Serialize};

fn default_critical() -> f64 {
    10.0
}

fn default_high() -> f64 {
    5.0
}

fn default_medium() -> f64 {
    2.0
}

fn default_low() -> f64 {
    1.0
}

fn default_softness() -> f64 {
    50.0
}

fn default_top_issues() -> usize {
    10
}

/// Scoring configuration.
///
/// The score of a set of issues is `100 * k / (k + w)` where `w` is the sum
/// of severity weights and `k` is `softness`: exactly 100 with no issues,
/// strictly decreasing in `w`, never below zero.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringConfig {
    #[serde(default = "default_critical")]
    pub critical_weight: f64,
    #[serde(default = "default_high")]
    pub high_weight: f64,
    #[serde(default = "default_medium")]
    pub medium_weight: f64,
    #[serde(default = "default_low")]
    pub low_weight: f64,
    #[serde(default = "default_softness")]
    pub softness: f64,
    /// Length of the ranked top-issues list
    #[serde(default = "default_top_issues")]
    pub top_issues: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            critical_weight: default_critical(),
            high_weight: default_high(),
            medium_weight: default_medium(),
            low_weight: default_low(),
            softness: default_softness(),
            top_issues: default_top_issues(),
        }
    }
}

impl ScoringConfig {
    pub fn weight(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Critical => self.critical_weight,
            Severity::High => self.high_weight,
            Severity::Medium => self.medium_weight,
            Severity::Low => self.low_weight,
        }
    }

    /// Reject weights that would break the monotonicity of the score.
    pub fn validate(&self) -> Result<(), String> {
        let ordered = [
            self.low_weight,
            self.medium_weight,
            self.high_weight,
            self.critical_weight,
        ];
        if ordered.iter().any(|w| !w.is_finite() || *w <= 0.0) {
            return Err("severity weights must be positive".into());
        }
        if ordered.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err("severity weights must strictly increase with severity".into());
        }
        if !self.softness.is_finite() || self.softness <= 0.0 {
            return Err("softness must be positive".into());
        }
        Ok(())
    }
}
