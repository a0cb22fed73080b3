use crate::matcher::DEFAULT_SIMILARITY_THRESHOLD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ThresholdError {
    #[error("accuracy feedback must be within [0, 1], got {0}")]
    FeedbackOutOfRange(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub initial: f64,
    pub floor: f64,
    pub ceiling: f64,
    pub step: f64,
    /// Feedback strictly above this loosens matching.
    pub loosen_above: f64,
    /// Feedback strictly below this tightens matching.
    pub tighten_below: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            initial: DEFAULT_SIMILARITY_THRESHOLD,
            floor: 0.6,
            ceiling: 0.9,
            step: 0.05,
            loosen_above: 0.9,
            tighten_below: 0.7,
        }
    }
}

/// Matching threshold tuned from accuracy feedback. Lives only as long as the
/// engine that owns it.
#[derive(Debug, Clone)]
pub struct AdaptiveThreshold {
    config: ThresholdConfig,
    value: f64,
}

impl Default for AdaptiveThreshold {
    fn default() -> Self {
        Self::new(ThresholdConfig::default())
    }
}

impl AdaptiveThreshold {
    pub fn new(config: ThresholdConfig) -> Self {
        let value = bound(config.initial, &config);
        Self { config, value }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Applies one feedback sample and returns the resulting threshold.
    pub fn adjust(&mut self, accuracy_feedback: f64) -> Result<f64, ThresholdError> {
        if !(0.0..=1.0).contains(&accuracy_feedback) {
            return Err(ThresholdError::FeedbackOutOfRange(accuracy_feedback));
        }

        if accuracy_feedback > self.config.loosen_above {
            self.value = bound(self.value - self.config.step, &self.config);
        } else if accuracy_feedback < self.config.tighten_below {
            self.value = bound(self.value + self.config.step, &self.config);
        }
        Ok(self.value)
    }

    pub fn reset(&mut self) {
        self.value = bound(self.config.initial, &self.config);
    }
}

/// Rounds to hundredths, then limits to `[floor, ceiling]`. A misordered range
/// resolves to `ceiling`.
fn bound(value: f64, config: &ThresholdConfig) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    rounded.max(config.floor).min(config.ceiling)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_accuracy_loosens_down_to_floor() {
        let mut threshold = AdaptiveThreshold::default();
        assert_eq!(threshold.adjust(0.95), Ok(0.7));
        assert_eq!(threshold.adjust(0.95), Ok(0.65));
        assert_eq!(threshold.adjust(0.95), Ok(0.6));
        assert_eq!(threshold.adjust(1.0), Ok(0.6));
    }

    #[test]
    fn low_accuracy_tightens_up_to_ceiling() {
        let mut threshold = AdaptiveThreshold::default();
        assert_eq!(threshold.adjust(0.2), Ok(0.8));
        assert_eq!(threshold.adjust(0.2), Ok(0.85));
        assert_eq!(threshold.adjust(0.2), Ok(0.9));
        assert_eq!(threshold.adjust(0.0), Ok(0.9));
    }

    #[test]
    fn band_edges_leave_threshold_alone() {
        let mut threshold = AdaptiveThreshold::default();
        assert_eq!(threshold.adjust(0.9), Ok(0.75));
        assert_eq!(threshold.adjust(0.7), Ok(0.75));
        assert_eq!(threshold.adjust(0.8), Ok(0.75));
    }

    #[test]
    fn invalid_feedback_is_rejected_without_change() {
        let mut threshold = AdaptiveThreshold::default();
        assert_eq!(
            threshold.adjust(1.5),
            Err(ThresholdError::FeedbackOutOfRange(1.5))
        );
        assert!(threshold.adjust(f64::NAN).is_err());
        assert_eq!(threshold.value(), 0.75);
    }

    #[test]
    fn stays_in_range_for_long_mixed_sequences() {
        let mut threshold = AdaptiveThreshold::default();
        let feedback = [0.95, 0.1, 0.99, 0.99, 0.3, 0.5, 0.92, 0.0, 0.6, 1.0, 0.75];
        for round in 0..200 {
            let sample = feedback[round % feedback.len()];
            let value = threshold.adjust(sample).expect("valid feedback");
            assert!((0.6..=0.9).contains(&value), "round {round}: {value}");
        }
        threshold.reset();
        assert_eq!(threshold.value(), 0.75);
    }
}
