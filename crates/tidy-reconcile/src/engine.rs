use crate::config::ReconcileConfig;
use crate::error::{FetchError, MutationError};
use crate::matcher::{compare, TaskComparison};
use crate::policy::CompletionPolicy;
use crate::threshold::{AdaptiveThreshold, ThresholdError};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use tidy_core::{CompletedTask, NewTask, ReconciliationResult, Task, TaskId, TaskStatus};
use tidy_storage::TaskStore;
use tracing::{error, info, warn};

/// One store mutation decided by [`ReconciliationEngine::plan`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileCommand {
    IncrementDetection {
        task_id: TaskId,
    },
    AutoComplete {
        task_id: TaskId,
        description: String,
        confidence: f64,
        reason: String,
    },
    Create {
        task: NewTask,
    },
}

impl fmt::Display for ReconcileCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileCommand::IncrementDetection { task_id } => {
                write!(f, "increment detection count of task {task_id}")
            }
            ReconcileCommand::AutoComplete { task_id, .. } => {
                write!(f, "auto-complete task {task_id}")
            }
            ReconcileCommand::Create { task } => {
                write!(f, "create task {:?}", task.description)
            }
        }
    }
}

/// Everything a cycle will do, decided without touching the store.
///
/// Commands are ordered increments, then completions, then creations.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationPlan {
    pub zone_id: String,
    pub threshold: f64,
    pub comparison: TaskComparison,
    pub commands: Vec<ReconcileCommand>,
    pub total_current_tasks: usize,
    pub total_existing_tasks: usize,
    pub policy_errors: usize,
}

impl ReconciliationPlan {
    pub fn increments(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.commands.iter().filter_map(|command| match command {
            ReconcileCommand::IncrementDetection { task_id } => Some(*task_id),
            _ => None,
        })
    }

    pub fn completions(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.commands.iter().filter_map(|command| match command {
            ReconcileCommand::AutoComplete { task_id, .. } => Some(*task_id),
            _ => None,
        })
    }

    pub fn creations(&self) -> impl Iterator<Item = &NewTask> + '_ {
        self.commands.iter().filter_map(|command| match command {
            ReconcileCommand::Create { task } => Some(task),
            _ => None,
        })
    }
}

enum Applied {
    Incremented,
    Completed(CompletedTask),
    Created(TaskId),
}

/// Reconciles analysis output for a single zone.
///
/// The engine owns the zone's matching threshold; nothing else about it
/// survives between cycles. Callers must not run two cycles for the same zone
/// at once.
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    zone_id: String,
    threshold: AdaptiveThreshold,
    policy: CompletionPolicy,
    default_confidence: f64,
}

impl ReconciliationEngine {
    pub fn new(zone_id: impl Into<String>, config: &ReconcileConfig) -> Self {
        Self {
            zone_id: zone_id.into(),
            threshold: AdaptiveThreshold::new(config.threshold.clone()),
            policy: CompletionPolicy::new(config.completion_rules.clone()),
            default_confidence: config.default_confidence,
        }
    }

    pub fn zone_id(&self) -> &str {
        &self.zone_id
    }

    pub fn threshold(&self) -> f64 {
        self.threshold.value()
    }

    pub fn policy(&self) -> &CompletionPolicy {
        &self.policy
    }

    pub fn adjust_threshold(&mut self, accuracy_feedback: f64) -> Result<f64, ThresholdError> {
        let previous = self.threshold.value();
        let adjusted = self.threshold.adjust(accuracy_feedback)?;
        info!(
            event = "similarity_threshold_adjusted",
            zone_id = %self.zone_id,
            accuracy_feedback,
            previous,
            threshold = adjusted
        );
        Ok(adjusted)
    }

    pub fn reconcile<T, S>(
        &self,
        store: &T,
        current: &[S],
        confidence_scores: &[f64],
    ) -> ReconciliationResult
    where
        T: TaskStore + ?Sized,
        S: AsRef<str>,
    {
        self.reconcile_at(store, current, confidence_scores, Utc::now())
    }

    /// Runs one full cycle: fetch, plan, apply.
    ///
    /// Only a failed fetch ends the cycle early, and then the result carries
    /// nothing but the error. Every other failure is logged, counted in
    /// `failed_mutations`, and skipped.
    pub fn reconcile_at<T, S>(
        &self,
        store: &T,
        current: &[S],
        confidence_scores: &[f64],
        now: DateTime<Utc>,
    ) -> ReconciliationResult
    where
        T: TaskStore + ?Sized,
        S: AsRef<str>,
    {
        info!(
            event = "reconcile_started",
            zone_id = %self.zone_id,
            current_tasks = current.len(),
            threshold = self.threshold.value()
        );

        let existing = match self.fetch_pending(store) {
            Ok(existing) => existing,
            Err(err) => {
                error!(
                    event = "reconcile_fetch_failed",
                    zone_id = %self.zone_id,
                    error = %err
                );
                return ReconciliationResult::failed(self.zone_id.clone(), err.to_string());
            }
        };

        let plan = self.plan(&existing, current, confidence_scores, now);
        let result = self.apply(store, &plan, now);

        info!(
            event = "reconcile_finished",
            zone_id = %self.zone_id,
            created = result.new_tasks_created,
            updated = result.tasks_updated,
            auto_completed = result.tasks_auto_completed,
            failed_mutations = result.failed_mutations,
            policy_errors = plan.policy_errors
        );
        result
    }

    pub fn fetch_pending<T>(&self, store: &T) -> Result<Vec<Task>, FetchError>
    where
        T: TaskStore + ?Sized,
    {
        store
            .pending_tasks(&self.zone_id)
            .map_err(|source| FetchError {
                zone_id: self.zone_id.clone(),
                source,
            })
    }

    /// Decides what a cycle would do given the zone's pending tasks.
    pub fn plan<S: AsRef<str>>(
        &self,
        existing: &[Task],
        current: &[S],
        confidence_scores: &[f64],
        now: DateTime<Utc>,
    ) -> ReconciliationPlan {
        let threshold = self.threshold.value();
        let comparison = compare(current, existing, threshold);
        let mut commands = Vec::with_capacity(
            comparison.matched_task_ids.len()
                + comparison.completion_candidate_ids.len()
                + comparison.new_descriptions.len(),
        );
        let mut policy_errors = 0usize;

        for task_id in &comparison.matched_task_ids {
            commands.push(ReconcileCommand::IncrementDetection { task_id: *task_id });
        }

        let by_id = existing
            .iter()
            .map(|task| (task.id, task))
            .collect::<BTreeMap<_, _>>();
        for task_id in &comparison.completion_candidate_ids {
            let Some(candidate) = by_id.get(task_id) else {
                continue;
            };
            match self.policy.evaluate(candidate, current, now) {
                Ok(decision) if decision.should_complete => {
                    commands.push(ReconcileCommand::AutoComplete {
                        task_id: candidate.id,
                        description: candidate.description.clone(),
                        confidence: decision.confidence,
                        reason: decision.reason,
                    });
                }
                Ok(_) => {}
                Err(err) => {
                    policy_errors += 1;
                    warn!(
                        event = "completion_policy_error",
                        zone_id = %self.zone_id,
                        task_id = %candidate.id,
                        error = %err
                    );
                }
            }
        }

        for new in &comparison.new_descriptions {
            let confidence = confidence_scores
                .get(new.index)
                .copied()
                .filter(|score| score.is_finite())
                .map(|score| score.clamp(0.0, 1.0))
                .unwrap_or(self.default_confidence);
            commands.push(ReconcileCommand::Create {
                task: NewTask::detected(
                    self.zone_id.as_str(),
                    new.description.as_str(),
                    confidence,
                    now,
                ),
            });
        }

        ReconciliationPlan {
            zone_id: self.zone_id.clone(),
            threshold,
            total_current_tasks: current.len(),
            total_existing_tasks: existing.len(),
            comparison,
            commands,
            policy_errors,
        }
    }

    /// Executes a plan's commands in order. A failing command is logged and
    /// counted; it never stops the commands after it.
    pub fn apply<T>(
        &self,
        store: &T,
        plan: &ReconciliationPlan,
        now: DateTime<Utc>,
    ) -> ReconciliationResult
    where
        T: TaskStore + ?Sized,
    {
        let mut result = ReconciliationResult {
            zone_id: plan.zone_id.clone(),
            total_current_tasks: plan.total_current_tasks,
            total_existing_tasks: plan.total_existing_tasks,
            similarity_matches: plan.comparison.similarity_matches.clone(),
            ..ReconciliationResult::default()
        };

        for command in &plan.commands {
            match execute(store, command, now) {
                Ok(Applied::Incremented) => result.tasks_updated += 1,
                Ok(Applied::Completed(completed)) => {
                    info!(
                        event = "task_auto_completed",
                        zone_id = %plan.zone_id,
                        task_id = %completed.id,
                        description = %completed.description,
                        confidence = completed.confidence,
                        reason = %completed.reason
                    );
                    result.tasks_auto_completed += 1;
                    result.completed_tasks.push(completed);
                }
                Ok(Applied::Created(task_id)) => {
                    info!(event = "task_created", zone_id = %plan.zone_id, task_id = %task_id);
                    result.new_tasks_created += 1;
                    result.new_task_ids.push(task_id);
                }
                Err(err) => {
                    result.failed_mutations += 1;
                    warn!(
                        event = "reconcile_mutation_failed",
                        zone_id = %plan.zone_id,
                        error = %err
                    );
                }
            }
        }

        result
    }
}

fn execute<T>(
    store: &T,
    command: &ReconcileCommand,
    now: DateTime<Utc>,
) -> Result<Applied, MutationError>
where
    T: TaskStore + ?Sized,
{
    match command {
        ReconcileCommand::IncrementDetection { task_id } => {
            let changed = store
                .increment_detection_count(*task_id, now)
                .map_err(|err| MutationError::store(command, err))?;
            if !changed {
                return Err(MutationError::not_applied(command));
            }
            Ok(Applied::Incremented)
        }
        ReconcileCommand::AutoComplete {
            task_id,
            description,
            confidence,
            reason,
        } => {
            let changed = store
                .update_status(*task_id, TaskStatus::AutoCompleted, None, now)
                .map_err(|err| MutationError::store(command, err))?;
            if !changed {
                return Err(MutationError::not_applied(command));
            }
            Ok(Applied::Completed(CompletedTask {
                id: *task_id,
                description: description.clone(),
                confidence: *confidence,
                reason: reason.clone(),
            }))
        }
        ReconcileCommand::Create { task } => store
            .create(task)
            .map(Applied::Created)
            .map_err(|err| MutationError::store(command, err)),
    }
}
