use crate::similarity::best_similarity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tidy_core::{Task, TaskId};

pub const STILL_PRESENT_REASON: &str = "Task still appears to be present";

#[derive(Debug, Error, PartialEq)]
pub enum PolicyError {
    #[error("task {task_id} has an unusable confidence score: {value}")]
    InvalidConfidence { task_id: TaskId, value: f64 },
    #[error("task {task_id} was created after the evaluation time ({created_at} > {now})")]
    CreatedInFuture {
        task_id: TaskId,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    },
}

/// What must hold for a tracked task to be considered done. Every condition
/// also requires that no current description scores above `max_similarity`
/// against the task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCondition {
    NotDetectedMultipleCycles {
        min_detections: u32,
        max_similarity: f64,
    },
    HighConfidenceOriginal {
        min_confidence: f64,
        max_similarity: f64,
    },
    LongStandingTask {
        min_age_days: i64,
        max_similarity: f64,
    },
}

impl RuleCondition {
    pub fn max_similarity(&self) -> f64 {
        match self {
            RuleCondition::NotDetectedMultipleCycles { max_similarity, .. }
            | RuleCondition::HighConfidenceOriginal { max_similarity, .. }
            | RuleCondition::LongStandingTask { max_similarity, .. } => *max_similarity,
        }
    }

    /// `best_current` is the highest similarity of any current description
    /// against the candidate.
    pub fn holds(
        &self,
        candidate: &Task,
        best_current: f64,
        now: DateTime<Utc>,
    ) -> Result<bool, PolicyError> {
        if best_current > self.max_similarity() {
            return Ok(false);
        }

        match self {
            RuleCondition::NotDetectedMultipleCycles { min_detections, .. } => {
                Ok(candidate.detection_count >= *min_detections)
            }
            RuleCondition::HighConfidenceOriginal { min_confidence, .. } => {
                let score = candidate.confidence_score;
                if !score.is_finite() || !(0.0..=1.0).contains(&score) {
                    return Err(PolicyError::InvalidConfidence {
                        task_id: candidate.id,
                        value: score,
                    });
                }
                Ok(score > *min_confidence)
            }
            RuleCondition::LongStandingTask { min_age_days, .. } => {
                if candidate.created_at > now {
                    return Err(PolicyError::CreatedInFuture {
                        task_id: candidate.id,
                        created_at: candidate.created_at,
                        now,
                    });
                }
                Ok(candidate.days_since_created(now) >= *min_age_days)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRule {
    pub name: String,
    pub confidence: f64,
    pub description: String,
    pub condition: RuleCondition,
}

impl CompletionRule {
    pub fn new(
        name: impl Into<String>,
        confidence: f64,
        description: impl Into<String>,
        condition: RuleCondition,
    ) -> Self {
        Self {
            name: name.into(),
            confidence,
            description: description.into(),
            condition,
        }
    }
}

/// Rule set in strongest-evidence-first order: repeated detection followed by
/// disappearance, then a confident original detection, then plain age.
pub fn default_rules() -> Vec<CompletionRule> {
    vec![
        CompletionRule::new(
            "not_detected_multiple_cycles",
            0.9,
            "Task was consistently detected before but not found in current analysis",
            RuleCondition::NotDetectedMultipleCycles {
                min_detections: 2,
                max_similarity: 0.6,
            },
        ),
        CompletionRule::new(
            "high_confidence_original",
            0.8,
            "High-confidence task no longer detected",
            RuleCondition::HighConfidenceOriginal {
                min_confidence: 0.8,
                max_similarity: 0.5,
            },
        ),
        CompletionRule::new(
            "long_standing_task",
            0.7,
            "Long-standing task no longer detected",
            RuleCondition::LongStandingTask {
                min_age_days: 7,
                max_similarity: 0.4,
            },
        ),
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionDecision {
    pub should_complete: bool,
    pub confidence: f64,
    /// Name of the rule that fired, or [`STILL_PRESENT_REASON`].
    pub reason: String,
    pub rationale: Option<String>,
}

impl CompletionDecision {
    fn keep() -> Self {
        Self {
            should_complete: false,
            confidence: 0.0,
            reason: STILL_PRESENT_REASON.to_string(),
            rationale: None,
        }
    }

    fn fired(rule: &CompletionRule) -> Self {
        Self {
            should_complete: true,
            confidence: rule.confidence,
            reason: rule.name.clone(),
            rationale: Some(rule.description.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionPolicy {
    rules: Vec<CompletionRule>,
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl CompletionPolicy {
    pub fn new(rules: Vec<CompletionRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[CompletionRule] {
        &self.rules
    }

    /// First rule whose condition holds decides; later rules are not
    /// consulted even when they would also hold.
    pub fn evaluate<S: AsRef<str>>(
        &self,
        candidate: &Task,
        current: &[S],
        now: DateTime<Utc>,
    ) -> Result<CompletionDecision, PolicyError> {
        let best_current = best_similarity(&candidate.description, current);
        for rule in &self.rules {
            if rule.condition.holds(candidate, best_current, now)? {
                return Ok(CompletionDecision::fired(rule));
            }
        }
        Ok(CompletionDecision::keep())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tidy_core::{CompletionMethod, TaskPriority, TaskStatus};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn candidate(description: &str, detections: u32, confidence: f64, age_days: i64) -> Task {
        Task {
            id: TaskId(11),
            zone_id: "living-room".to_string(),
            description: description.to_string(),
            status: TaskStatus::Pending,
            confidence_score: confidence,
            priority: TaskPriority::Low,
            estimated_duration_minutes: None,
            detection_count: detections,
            last_detected_at: None,
            created_at: now() - Duration::days(age_days),
            completed_at: None,
            auto_completed_at: None,
            user_id: None,
            completion_method: CompletionMethod::Pending,
        }
    }

    const NONE: [&str; 0] = [];

    #[test]
    fn repeated_detection_then_absence_fires_first_rule() {
        let policy = CompletionPolicy::default();
        let decision = policy
            .evaluate(&candidate("Wipe down countertops", 3, 0.9, 0), &NONE, now())
            .expect("evaluate");
        assert!(decision.should_complete);
        assert_eq!(decision.reason, "not_detected_multiple_cycles");
        assert_eq!(decision.confidence, 0.9);
    }

    #[test]
    fn first_match_wins_over_higher_later_confidence() {
        let rules = vec![
            CompletionRule::new(
                "age_only",
                0.5,
                "old",
                RuleCondition::LongStandingTask {
                    min_age_days: 1,
                    max_similarity: 0.4,
                },
            ),
            CompletionRule::new(
                "seen_twice",
                0.95,
                "seen",
                RuleCondition::NotDetectedMultipleCycles {
                    min_detections: 2,
                    max_similarity: 0.6,
                },
            ),
        ];
        let policy = CompletionPolicy::new(rules);
        let decision = policy
            .evaluate(&candidate("Dust shelves", 4, 0.5, 3), &NONE, now())
            .expect("evaluate");
        assert_eq!(decision.reason, "age_only");
        assert_eq!(decision.confidence, 0.5);
    }

    #[test]
    fn high_confidence_rule_needs_strictly_greater_score() {
        let policy = CompletionPolicy::default();
        let at_bound = policy
            .evaluate(&candidate("Clean sink", 1, 0.8, 0), &NONE, now())
            .expect("evaluate");
        assert!(!at_bound.should_complete);

        let above = policy
            .evaluate(&candidate("Clean sink", 1, 0.81, 0), &NONE, now())
            .expect("evaluate");
        assert_eq!(above.reason, "high_confidence_original");
        assert_eq!(above.confidence, 0.8);
    }

    #[test]
    fn long_standing_rule_counts_whole_days() {
        let policy = CompletionPolicy::default();
        let six_days = policy
            .evaluate(&candidate("Organize books", 1, 0.5, 6), &NONE, now())
            .expect("evaluate");
        assert!(!six_days.should_complete);

        let seven_days = policy
            .evaluate(&candidate("Organize books", 1, 0.5, 7), &NONE, now())
            .expect("evaluate");
        assert_eq!(seven_days.reason, "long_standing_task");
        assert_eq!(seven_days.confidence, 0.7);
    }

    #[test]
    fn nothing_fires_for_fresh_low_confidence_single_detection() {
        let policy = CompletionPolicy::default();
        let decision = policy
            .evaluate(&candidate("Organize books", 1, 0.5, 1), &NONE, now())
            .expect("evaluate");
        assert!(!decision.should_complete);
        assert_eq!(decision.reason, STILL_PRESENT_REASON);
        assert_eq!(decision.confidence, 0.0);
    }

    #[test]
    fn similar_current_description_blocks_completion() {
        let policy = CompletionPolicy::default();
        let decision = policy
            .evaluate(
                &candidate("Wipe countertops", 5, 0.95, 30),
                &["wipe down the countertops"],
                now(),
            )
            .expect("evaluate");
        assert!(!decision.should_complete);
    }

    #[test]
    fn unusable_confidence_is_a_policy_error() {
        let policy = CompletionPolicy::default();
        let err = policy
            .evaluate(&candidate("Clean sink", 1, f64::NAN, 0), &NONE, now())
            .expect_err("nan confidence");
        assert!(matches!(err, PolicyError::InvalidConfidence { .. }));
    }

    #[test]
    fn future_creation_is_a_policy_error() {
        let policy = CompletionPolicy::default();
        let err = policy
            .evaluate(&candidate("Clean sink", 1, 0.3, -2), &NONE, now())
            .expect_err("future task");
        assert!(matches!(err, PolicyError::CreatedInFuture { .. }));
    }

    #[test]
    fn rules_roundtrip_through_json() {
        let json = serde_json::to_value(default_rules()).expect("serialize");
        assert_eq!(json[0]["condition"]["kind"], "not_detected_multiple_cycles");
        assert_eq!(json[2]["condition"]["min_age_days"], 7);

        let parsed: Vec<CompletionRule> = serde_json::from_value(json).expect("deserialize");
        assert_eq!(parsed, default_rules());
    }
}
