//! Task transitions that happen outside a reconciliation cycle: a person
//! finishing or dismissing a task, and housekeeping over finished ones.

use chrono::{DateTime, Duration, Utc};
use tidy_core::{TaskId, TaskStatus, ZoneTaskSummary};
use tidy_storage::{StoreError, TaskStore};
use tracing::info;

pub const DEFAULT_RETENTION_DAYS: i64 = 30;

pub fn complete_task_manually<T>(
    store: &T,
    task_id: TaskId,
    user_id: Option<&str>,
    at: DateTime<Utc>,
) -> Result<bool, StoreError>
where
    T: TaskStore + ?Sized,
{
    transition(store, task_id, TaskStatus::Completed, user_id, at)
}

pub fn ignore_task<T>(
    store: &T,
    task_id: TaskId,
    user_id: Option<&str>,
    at: DateTime<Utc>,
) -> Result<bool, StoreError>
where
    T: TaskStore + ?Sized,
{
    transition(store, task_id, TaskStatus::Ignored, user_id, at)
}

pub fn cancel_task<T>(
    store: &T,
    task_id: TaskId,
    user_id: Option<&str>,
    at: DateTime<Utc>,
) -> Result<bool, StoreError>
where
    T: TaskStore + ?Sized,
{
    transition(store, task_id, TaskStatus::Cancelled, user_id, at)
}

fn transition<T>(
    store: &T,
    task_id: TaskId,
    status: TaskStatus,
    user_id: Option<&str>,
    at: DateTime<Utc>,
) -> Result<bool, StoreError>
where
    T: TaskStore + ?Sized,
{
    let changed = store.update_status(task_id, status, user_id, at)?;
    if changed {
        info!(
            event = "task_status_changed",
            task_id = %task_id,
            status = %status,
            user_id = user_id.unwrap_or("system")
        );
    }
    Ok(changed)
}

pub fn zone_summary<T>(store: &T, zone_id: &str) -> Result<ZoneTaskSummary, StoreError>
where
    T: TaskStore + ?Sized,
{
    let tasks = store.tasks_for_zone(zone_id)?;
    Ok(ZoneTaskSummary::from_tasks(zone_id, &tasks))
}

/// Deletes completed and auto-completed tasks finished more than
/// `retention_days` before `now`.
pub fn purge_completed<T>(
    store: &T,
    retention_days: i64,
    now: DateTime<Utc>,
) -> Result<usize, StoreError>
where
    T: TaskStore + ?Sized,
{
    let cutoff = now - Duration::days(retention_days.max(0));
    let deleted = store.delete_completed_before(cutoff)?;
    info!(
        event = "completed_tasks_purged",
        retention_days,
        cutoff = %cutoff.to_rfc3339(),
        deleted
    );
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tidy_core::{CompletionMethod, NewTask};
    use tidy_storage::SqliteTaskStore;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 7, 30, 0)
            .single()
            .expect("valid timestamp")
    }

    fn seed(store: &SqliteTaskStore, description: &str) -> TaskId {
        store
            .create(&NewTask::detected("bathroom", description, 0.8, ts()))
            .expect("create")
    }

    #[test]
    fn manual_completion_records_user_and_method() {
        let store = SqliteTaskStore::open_in_memory().expect("open store");
        let id = seed(&store, "Scrub the tub");

        assert!(complete_task_manually(&store, id, Some("jo"), ts()).expect("complete"));
        let task = store.task(id).expect("load").expect("exists");
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.completion_method, CompletionMethod::Manual);
        assert_eq!(task.user_id.as_deref(), Some("jo"));

        assert!(!ignore_task(&store, id, Some("jo"), ts()).expect("terminal no-op"));
    }

    #[test]
    fn ignore_and_cancel_leave_completion_timestamps_empty() {
        let store = SqliteTaskStore::open_in_memory().expect("open store");
        let ignored = seed(&store, "Replace the towel");
        let cancelled = seed(&store, "Restock soap");

        assert!(ignore_task(&store, ignored, None, ts()).expect("ignore"));
        assert!(cancel_task(&store, cancelled, None, ts()).expect("cancel"));

        for id in [ignored, cancelled] {
            let task = store.task(id).expect("load").expect("exists");
            assert!(task.completed_at.is_none());
            assert!(task.auto_completed_at.is_none());
            assert_eq!(task.completion_method, CompletionMethod::Pending);
        }
    }

    #[test]
    fn summary_reflects_store_state() {
        let store = SqliteTaskStore::open_in_memory().expect("open store");
        let done = seed(&store, "Scrub the tub");
        seed(&store, "Wipe up the water spill");
        complete_task_manually(&store, done, None, ts()).expect("complete");

        let summary = zone_summary(&store, "bathroom").expect("summary");
        assert_eq!(summary.total_tasks, 2);
        assert_eq!(summary.pending_tasks, 1);
        assert_eq!(summary.completed_tasks, 1);
        assert_eq!(summary.high_priority_pending, 1);
        assert_eq!(summary.completion_rate, 50.0);
    }

    #[test]
    fn purge_respects_retention_window() {
        let store = SqliteTaskStore::open_in_memory().expect("open store");
        let old = seed(&store, "Scrub the tub");
        let fresh = seed(&store, "Clean the mirror");
        complete_task_manually(&store, old, None, ts() - Duration::days(45)).expect("old");
        complete_task_manually(&store, fresh, None, ts() - Duration::days(3)).expect("fresh");

        let deleted = purge_completed(&store, DEFAULT_RETENTION_DAYS, ts()).expect("purge");
        assert_eq!(deleted, 1);
        assert!(store.task(old).expect("load").is_none());
        assert!(store.task(fresh).expect("load").is_some());
    }
}
