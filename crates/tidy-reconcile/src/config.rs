use crate::policy::{default_rules, CompletionRule};
use crate::threshold::ThresholdConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tidy_core::DEFAULT_DETECTION_CONFIDENCE;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("threshold range is empty: floor {floor} > ceiling {ceiling}")]
    EmptyThresholdRange { floor: f64, ceiling: f64 },
    #[error("{field} must be within [0, 1], got {value}")]
    OutOfUnitRange { field: String, value: f64 },
    #[error("threshold step must be positive, got {0}")]
    NonPositiveStep(f64),
    #[error("completion rule names must be unique: {0}")]
    DuplicateRule(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub threshold: ThresholdConfig,
    /// Confidence recorded for new tasks the analysis pass gave no score for.
    pub default_confidence: f64,
    pub completion_rules: Vec<CompletionRule>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            threshold: ThresholdConfig::default(),
            default_confidence: DEFAULT_DETECTION_CONFIDENCE,
            completion_rules: default_rules(),
        }
    }
}

impl ReconcileConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = &self.threshold;
        if threshold.floor > threshold.ceiling {
            return Err(ConfigError::EmptyThresholdRange {
                floor: threshold.floor,
                ceiling: threshold.ceiling,
            });
        }
        if threshold.step.is_nan() || threshold.step <= 0.0 {
            return Err(ConfigError::NonPositiveStep(threshold.step));
        }

        let mut unit_fields = vec![
            ("threshold.initial".to_string(), threshold.initial),
            ("threshold.floor".to_string(), threshold.floor),
            ("threshold.ceiling".to_string(), threshold.ceiling),
            ("default_confidence".to_string(), self.default_confidence),
        ];
        for rule in &self.completion_rules {
            unit_fields.push((format!("{}.confidence", rule.name), rule.confidence));
            unit_fields.push((
                format!("{}.max_similarity", rule.name),
                rule.condition.max_similarity(),
            ));
        }
        for (field, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfUnitRange { field, value });
            }
        }

        let mut seen = std::collections::BTreeSet::new();
        for rule in &self.completion_rules {
            if !seen.insert(rule.name.as_str()) {
                return Err(ConfigError::DuplicateRule(rule.name.clone()));
            }
        }

        Ok(())
    }
}
