use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use thiserror::Error;
use tidy_core::{CompletionMethod, ModelError, NewTask, Task, TaskId, TaskPriority, TaskStatus};

pub const TASK_SCHEMA_VERSION: i64 = 1;

const TASK_COLUMNS: &str = "
    id,
    zone_id,
    description,
    status,
    confidence_score,
    priority,
    estimated_duration,
    detection_count,
    last_detected_at,
    created_at,
    completed_at,
    auto_completed_at,
    user_id,
    completion_method
";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("model error: {0}")]
    Model(#[from] ModelError),
    #[error("timestamp parse error: {0}")]
    Timestamp(String),
    #[error("invalid status transition for task {task_id}: cannot move to {to}")]
    InvalidTransition { task_id: TaskId, to: TaskStatus },
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence collaborator for zone tasks.
///
/// The `bool` returned by the mutating calls reports whether a pending task
/// was actually changed; `false` means the id is unknown or the task already
/// left the pending state.
pub trait TaskStore {
    fn pending_tasks(&self, zone_id: &str) -> Result<Vec<Task>, StoreError>;

    fn create(&self, task: &NewTask) -> Result<TaskId, StoreError>;

    fn increment_detection_count(
        &self,
        task_id: TaskId,
        detected_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    fn update_status(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        user_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    fn task(&self, task_id: TaskId) -> Result<Option<Task>, StoreError>;

    fn tasks_for_zone(&self, zone_id: &str) -> Result<Vec<Task>, StoreError>;

    /// Deletes done tasks whose completion timestamp is before `cutoff`.
    fn delete_completed_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;
}

pub struct SqliteTaskStore {
    conn: Connection,
}

impl SqliteTaskStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn schema_version(&self) -> Result<i64, StoreError> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    pub fn migrate(&self) -> Result<(), StoreError> {
        let current = self.schema_version()?;
        if current > TASK_SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchemaVersion {
                found: current,
                supported: TASK_SCHEMA_VERSION,
            });
        }

        if current < 1 {
            let sql = include_str!("../migrations/0001_tasks.sql");
            self.conn.execute_batch(sql)?;
            self.conn
                .execute("PRAGMA user_version = 1", [])
                .map(|_| ())?;
        }

        Ok(())
    }

    pub fn table_exists(&self, table_name: &str) -> Result<bool, StoreError> {
        let exists = self
            .conn
            .query_row(
                "
                SELECT 1
                FROM sqlite_master
                WHERE type='table' AND name = ?1
                LIMIT 1
                ",
                [table_name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    /// Inserts a task with an explicit creation time. Reconciliation always
    /// creates tasks "now"; this exists for imports and tests that need aged
    /// tasks.
    pub fn insert_with_created_at(
        &self,
        task: &NewTask,
        created_at: DateTime<Utc>,
    ) -> Result<TaskId, StoreError> {
        self.conn.execute(
            "
            INSERT INTO tasks (
                zone_id,
                description,
                status,
                confidence_score,
                priority,
                estimated_duration,
                detection_count,
                last_detected_at,
                created_at,
                completion_method
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8, ?9)
            ",
            params![
                task.zone_id,
                task.description,
                TaskStatus::Pending.as_str(),
                task.confidence_score,
                task.priority.level(),
                task.estimated_duration_minutes,
                format_timestamp(task.detected_at),
                format_timestamp(created_at),
                CompletionMethod::Pending.as_str(),
            ],
        )?;

        Ok(TaskId(self.conn.last_insert_rowid()))
    }

    fn query_tasks<P: rusqlite::Params>(
        &self,
        filter_sql: &str,
        params: P,
    ) -> Result<Vec<Task>, StoreError> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks {filter_sql}");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params, TaskRow::from_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_task()?);
        }
        Ok(out)
    }
}

impl TaskStore for SqliteTaskStore {
    fn pending_tasks(&self, zone_id: &str) -> Result<Vec<Task>, StoreError> {
        self.query_tasks(
            "WHERE zone_id = ?1 AND status = ?2 ORDER BY created_at ASC, id ASC",
            params![zone_id, TaskStatus::Pending.as_str()],
        )
    }

    fn create(&self, task: &NewTask) -> Result<TaskId, StoreError> {
        self.insert_with_created_at(task, task.detected_at)
    }

    fn increment_detection_count(
        &self,
        task_id: TaskId,
        detected_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let changes = self.conn.execute(
            "
            UPDATE tasks
            SET detection_count = detection_count + 1,
                last_detected_at = ?2
            WHERE id = ?1 AND status = ?3
            ",
            params![
                task_id.get(),
                format_timestamp(detected_at),
                TaskStatus::Pending.as_str(),
            ],
        )?;

        Ok(changes > 0)
    }

    fn update_status(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        user_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        if !TaskStatus::Pending.can_transition_to(status) {
            return Err(StoreError::InvalidTransition { task_id, to: status });
        }

        let changes = self.conn.execute(
            "
            UPDATE tasks
            SET status = ?2,
                user_id = ?3,
                completed_at = CASE WHEN ?2 = 'completed' THEN ?4 ELSE completed_at END,
                auto_completed_at = CASE WHEN ?2 = 'auto_completed' THEN ?4 ELSE auto_completed_at END,
                completion_method = COALESCE(?5, completion_method)
            WHERE id = ?1 AND status = ?6
            ",
            params![
                task_id.get(),
                status.as_str(),
                user_id,
                format_timestamp(at),
                status.completion_method().map(|method| method.as_str()),
                TaskStatus::Pending.as_str(),
            ],
        )?;

        Ok(changes > 0)
    }

    fn task(&self, task_id: TaskId) -> Result<Option<Task>, StoreError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                [task_id.get()],
                TaskRow::from_row,
            )
            .optional()?;

        row.map(TaskRow::into_task).transpose()
    }

    fn tasks_for_zone(&self, zone_id: &str) -> Result<Vec<Task>, StoreError> {
        self.query_tasks(
            "WHERE zone_id = ?1 ORDER BY created_at ASC, id ASC",
            [zone_id],
        )
    }

    fn delete_completed_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let deleted = self.conn.execute(
            "
            DELETE FROM tasks
            WHERE status IN ('completed', 'auto_completed')
              AND COALESCE(completed_at, auto_completed_at) < ?1
            ",
            [format_timestamp(cutoff)],
        )?;
        Ok(deleted)
    }
}

/// Raw column values; conversion to [`Task`] happens outside the rusqlite
/// row callback so parse failures keep their own error variants.
struct TaskRow {
    id: i64,
    zone_id: String,
    description: String,
    status: String,
    confidence_score: f64,
    priority: i64,
    estimated_duration: Option<i64>,
    detection_count: i64,
    last_detected_at: Option<String>,
    created_at: String,
    completed_at: Option<String>,
    auto_completed_at: Option<String>,
    user_id: Option<String>,
    completion_method: String,
}

impl TaskRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            zone_id: row.get(1)?,
            description: row.get(2)?,
            status: row.get(3)?,
            confidence_score: row.get(4)?,
            priority: row.get(5)?,
            estimated_duration: row.get(6)?,
            detection_count: row.get(7)?,
            last_detected_at: row.get(8)?,
            created_at: row.get(9)?,
            completed_at: row.get(10)?,
            auto_completed_at: row.get(11)?,
            user_id: row.get(12)?,
            completion_method: row.get(13)?,
        })
    }

    fn into_task(self) -> Result<Task, StoreError> {
        Ok(Task {
            id: TaskId(self.id),
            zone_id: self.zone_id,
            description: self.description,
            status: self.status.parse()?,
            confidence_score: self.confidence_score,
            priority: TaskPriority::from_level(self.priority)?,
            estimated_duration_minutes: self
                .estimated_duration
                .map(|minutes| minutes.max(0) as u32),
            detection_count: self.detection_count.max(1) as u32,
            last_detected_at: self.last_detected_at.map(parse_timestamp).transpose()?,
            created_at: parse_timestamp(self.created_at)?,
            completed_at: self.completed_at.map(parse_timestamp).transpose()?,
            auto_completed_at: self.auto_completed_at.map(parse_timestamp).transpose()?,
            user_id: self.user_id,
            completion_method: self.completion_method.parse()?,
        })
    }
}

/// Fixed-width UTC text so stored timestamps compare correctly as strings.
fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: String) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|err| StoreError::Timestamp(err.to_string()))
}
