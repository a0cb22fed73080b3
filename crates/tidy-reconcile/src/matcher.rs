use crate::similarity::similarity;
use std::collections::{BTreeMap, BTreeSet};
use tidy_core::{Task, TaskId};
use tracing::debug;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.75;

/// A current description that matched no tracked task, with its position in
/// the analysis output.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDescription {
    pub index: usize,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskComparison {
    pub new_descriptions: Vec<NewDescription>,
    /// Distinct ids, in the order they were first matched.
    pub matched_task_ids: Vec<TaskId>,
    /// Tracked ids no current description matched, in tracked-task order.
    pub completion_candidate_ids: Vec<TaskId>,
    /// Description to matched id; a repeated description keeps its last match.
    pub similarity_matches: BTreeMap<String, TaskId>,
}

/// Partitions `current` descriptions into matches against `existing` tasks and
/// new descriptions.
///
/// A matched task stays available to later descriptions, so several
/// descriptions can land on the same id.
pub fn compare<S: AsRef<str>>(
    current: &[S],
    existing: &[Task],
    threshold: f64,
) -> TaskComparison {
    let mut comparison = TaskComparison::default();
    let mut matched = BTreeSet::new();

    for (index, description) in current.iter().enumerate() {
        let description = description.as_ref();
        match best_match(description, existing, threshold) {
            Some((task, score)) => {
                debug!(
                    event = "task_matched",
                    description,
                    task_id = %task.id,
                    score
                );
                if matched.insert(task.id) {
                    comparison.matched_task_ids.push(task.id);
                }
                comparison
                    .similarity_matches
                    .insert(description.to_string(), task.id);
            }
            None => {
                debug!(event = "task_unmatched", description, index);
                comparison.new_descriptions.push(NewDescription {
                    index,
                    description: description.to_string(),
                });
            }
        }
    }

    comparison.completion_candidate_ids = existing
        .iter()
        .map(|task| task.id)
        .filter(|task_id| !matched.contains(task_id))
        .collect();

    comparison
}

/// Highest-scoring task at or above `threshold`; the earliest task wins ties.
fn best_match<'a>(
    description: &str,
    existing: &'a [Task],
    threshold: f64,
) -> Option<(&'a Task, f64)> {
    let mut best: Option<(&Task, f64)> = None;
    for task in existing {
        let score = similarity(description, &task.description);
        if score < threshold {
            continue;
        }
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((task, score)),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tidy_core::{CompletionMethod, TaskPriority, TaskStatus};

    fn task(id: i64, description: &str) -> Task {
        Task {
            id: TaskId(id),
            zone_id: "kitchen".to_string(),
            description: description.to_string(),
            status: TaskStatus::Pending,
            confidence_score: 0.8,
            priority: TaskPriority::Medium,
            estimated_duration_minutes: None,
            detection_count: 1,
            last_detected_at: None,
            created_at: Utc
                .with_ymd_and_hms(2026, 3, 1, 8, 0, 0)
                .single()
                .expect("valid timestamp"),
            completed_at: None,
            auto_completed_at: None,
            user_id: None,
            completion_method: CompletionMethod::Pending,
        }
    }

    #[test]
    fn partitions_matches_new_and_candidates() {
        let existing = vec![
            task(1, "Wipe countertops"),
            task(2, "Clean the microwave"),
            task(3, "Organize books"),
        ];
        let current = ["Wipe down the countertops", "Take out the trash", "clean the microwave"];

        let comparison = compare(&current, &existing, DEFAULT_SIMILARITY_THRESHOLD);

        assert_eq!(comparison.matched_task_ids, vec![TaskId(1), TaskId(2)]);
        assert_eq!(
            comparison.new_descriptions,
            vec![NewDescription {
                index: 1,
                description: "Take out the trash".to_string(),
            }]
        );
        assert_eq!(comparison.completion_candidate_ids, vec![TaskId(3)]);
        assert_eq!(
            comparison.similarity_matches.get("Wipe down the countertops"),
            Some(&TaskId(1))
        );
        assert_eq!(
            comparison.similarity_matches.get("clean the microwave"),
            Some(&TaskId(2))
        );
    }

    #[test]
    fn picks_highest_scoring_task() {
        let existing = vec![task(1, "Clean the sink"), task(2, "Clean the kitchen sink")];
        let comparison = compare(&["clean the kitchen sink"], &existing, 0.6);
        assert_eq!(comparison.matched_task_ids, vec![TaskId(2)]);
        assert_eq!(comparison.completion_candidate_ids, vec![TaskId(1)]);
    }

    #[test]
    fn several_descriptions_can_share_one_task() {
        let existing = vec![task(7, "Wipe countertops")];
        let current = ["Wipe countertops", "wipe down the countertops"];

        let comparison = compare(&current, &existing, DEFAULT_SIMILARITY_THRESHOLD);

        assert_eq!(comparison.matched_task_ids, vec![TaskId(7)]);
        assert_eq!(comparison.similarity_matches.len(), 2);
        assert!(comparison.new_descriptions.is_empty());
        assert!(comparison.completion_candidate_ids.is_empty());
    }

    #[test]
    fn threshold_is_inclusive_and_gates_matches() {
        let existing = vec![task(1, "Clean the microwave")];
        let strict = compare(&["Clean the microwave door"], &existing, 0.99);
        assert!(strict.matched_task_ids.is_empty());
        assert_eq!(strict.new_descriptions.len(), 1);
        assert_eq!(strict.completion_candidate_ids, vec![TaskId(1)]);

        let exact = compare(&["Clean the microwave"], &existing, 1.0);
        assert_eq!(exact.matched_task_ids, vec![TaskId(1)]);
    }

    #[test]
    fn empty_inputs() {
        let existing = vec![task(1, "Clean sink"), task(2, "Mop floor")];
        let none: [&str; 0] = [];
        let comparison = compare(&none, &existing, DEFAULT_SIMILARITY_THRESHOLD);
        assert_eq!(comparison.completion_candidate_ids, vec![TaskId(1), TaskId(2)]);

        let comparison = compare(&["Clean sink"], &[], DEFAULT_SIMILARITY_THRESHOLD);
        assert_eq!(comparison.new_descriptions.len(), 1);
        assert!(comparison.completion_candidate_ids.is_empty());
    }
}
