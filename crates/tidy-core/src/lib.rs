use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod heuristics;

pub use heuristics::{classify_priority, estimate_duration_minutes};

/// Confidence assigned to a newly detected task when the analysis pass did not
/// report one for it.
pub const DEFAULT_DETECTION_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("unknown task status: {0}")]
    UnknownStatus(String),
    #[error("unknown completion method: {0}")]
    UnknownCompletionMethod(String),
    #[error("unknown priority level: {0}")]
    UnknownPriority(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl TaskId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for TaskId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        input.trim().parse::<i64>().map(TaskId)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Completed,
    AutoCompleted,
    Ignored,
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
            TaskStatus::AutoCompleted => "auto_completed",
            TaskStatus::Ignored => "ignored",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }

    /// Done by a person or inferred done by the tracker; ignored and cancelled
    /// tasks do not count.
    pub fn is_done(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::AutoCompleted)
    }

    /// Pending is the only state with outgoing transitions, and it never
    /// transitions to itself through a status change.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(self, TaskStatus::Pending) && next.is_terminal()
    }

    /// Completion method recorded alongside a transition into this status.
    pub fn completion_method(&self) -> Option<CompletionMethod> {
        match self {
            TaskStatus::Completed => Some(CompletionMethod::Manual),
            TaskStatus::AutoCompleted => Some(CompletionMethod::Auto),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ModelError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "completed" | "done" => Ok(TaskStatus::Completed),
            "auto_completed" | "auto-completed" | "autocompleted" => Ok(TaskStatus::AutoCompleted),
            "ignored" => Ok(TaskStatus::Ignored),
            "cancelled" | "canceled" => Ok(TaskStatus::Cancelled),
            other => Err(ModelError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompletionMethod {
    #[default]
    Pending,
    Manual,
    Auto,
}

impl CompletionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionMethod::Pending => "pending",
            CompletionMethod::Manual => "manual",
            CompletionMethod::Auto => "auto",
        }
    }
}

impl fmt::Display for CompletionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompletionMethod {
    type Err = ModelError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "pending" => Ok(CompletionMethod::Pending),
            "manual" => Ok(CompletionMethod::Manual),
            "auto" => Ok(CompletionMethod::Auto),
            other => Err(ModelError::UnknownCompletionMethod(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Low
    }
}

impl TaskPriority {
    /// Numeric level as persisted: 1 = low, 2 = medium, 3 = high.
    pub fn level(&self) -> i64 {
        match self {
            TaskPriority::Low => 1,
            TaskPriority::Medium => 2,
            TaskPriority::High => 3,
        }
    }

    pub fn from_level(level: i64) -> Result<Self, ModelError> {
        match level {
            1 => Ok(TaskPriority::Low),
            2 => Ok(TaskPriority::Medium),
            3 => Ok(TaskPriority::High),
            other => Err(ModelError::UnknownPriority(other)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub zone_id: String,
    pub description: String,
    pub status: TaskStatus,
    pub confidence_score: f64,
    pub priority: TaskPriority,
    #[serde(default)]
    pub estimated_duration_minutes: Option<u32>,
    pub detection_count: u32,
    #[serde(default)]
    pub last_detected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub auto_completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub completion_method: CompletionMethod,
}

impl Task {
    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }

    /// Whole days elapsed since creation, truncated toward zero.
    pub fn days_since_created(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_days()
    }

    /// Timestamp of whichever terminal completion happened, if any.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at.or(self.auto_completed_at)
    }
}

/// A task as the tracker asks the store to create it; the store assigns the id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTask {
    pub zone_id: String,
    pub description: String,
    pub confidence_score: f64,
    pub priority: TaskPriority,
    pub estimated_duration_minutes: Option<u32>,
    pub detected_at: DateTime<Utc>,
}

impl NewTask {
    /// Builds a freshly detected task, classifying priority and duration from
    /// its wording.
    pub fn detected(
        zone_id: impl Into<String>,
        description: impl Into<String>,
        confidence_score: f64,
        detected_at: DateTime<Utc>,
    ) -> Self {
        let description = description.into();
        Self {
            zone_id: zone_id.into(),
            priority: classify_priority(&description),
            estimated_duration_minutes: Some(estimate_duration_minutes(&description)),
            description,
            confidence_score,
            detected_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletedTask {
    pub id: TaskId,
    pub description: String,
    pub confidence: f64,
    pub reason: String,
}

/// Outcome of one reconciliation cycle for one zone.
///
/// When the pending tasks could not be fetched, only `zone_id` and `error`
/// carry information; every counter stays zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReconciliationResult {
    pub zone_id: String,
    pub new_tasks_created: usize,
    pub tasks_updated: usize,
    pub tasks_auto_completed: usize,
    pub total_current_tasks: usize,
    pub total_existing_tasks: usize,
    pub new_task_ids: Vec<TaskId>,
    pub completed_tasks: Vec<CompletedTask>,
    pub similarity_matches: BTreeMap<String, TaskId>,
    #[serde(default)]
    pub failed_mutations: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReconciliationResult {
    pub fn failed(zone_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ZoneTaskSummary {
    pub zone_id: String,
    pub total_tasks: usize,
    pub pending_tasks: usize,
    pub completed_tasks: usize,
    /// Percentage of all tasks that are done, 0 when the zone has no tasks.
    pub completion_rate: f64,
    pub high_priority_pending: usize,
    #[serde(default)]
    pub oldest_pending_task: Option<DateTime<Utc>>,
}

impl ZoneTaskSummary {
    pub fn from_tasks(zone_id: impl Into<String>, tasks: &[Task]) -> Self {
        let pending = tasks.iter().filter(|task| task.is_pending());
        let pending_tasks = pending.clone().count();
        let high_priority_pending = pending
            .clone()
            .filter(|task| task.priority == TaskPriority::High)
            .count();
        let oldest_pending_task = pending.map(|task| task.created_at).min();
        let completed_tasks = tasks.iter().filter(|task| task.status.is_done()).count();
        let completion_rate = if tasks.is_empty() {
            0.0
        } else {
            completed_tasks as f64 / tasks.len() as f64 * 100.0
        };

        Self {
            zone_id: zone_id.into(),
            total_tasks: tasks.len(),
            pending_tasks,
            completed_tasks,
            completion_rate,
            high_priority_pending,
            oldest_pending_task,
        }
    }
}
