//! SQLite task store.
//!
//! Durable [`TaskStore`] implementation used by the scheduler binary.
//!
//! # Database Schema
//!
//! 1. **tasks** - task instances; `seq` preserves creation order
//! 2. **hire_progress** - aggregate progress per hire, with the "finished" flag
//!    and whether the completion notification went out
//! 3. **schema_version** - schema version for migrations
//!
//! A partial unique index on `(hire_id, template_id, template_task_id)` backs
//! the engine's duplicate check. WAL mode is enabled for file databases.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use onboarding_sdk::{
    async_trait, HireProgress, Priority, TaskCategory, TaskId, TaskInstance, TaskStatus,
    TaskStore, TaskUpdate,
};

const SCHEMA_VERSION: i32 = 2;

const TASK_COLUMNS: &str = "id, hire_id, template_id, template_version, template_task_id, \
     title, description, category, priority, status, due_date, completed_date, \
     assigned_by, notes, depends_on, created_at";

/// Task store backed by a single SQLite connection
pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
}

impl SqliteTaskStore {
    /// Open (or create) the database at `path` and initialize the schema
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// In-memory database, for tests and dry runs
    pub fn new_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow!("Database lock poisoned: {}", e))
    }

    /// Create tables and indexes if missing
    pub fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                hire_id TEXT NOT NULL,

                -- Source template
                template_id TEXT,
                template_version INTEGER,
                template_task_id TEXT,

                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                category TEXT NOT NULL,
                priority TEXT NOT NULL,

                -- Lifecycle
                status TEXT NOT NULL,
                due_date TEXT NOT NULL,
                completed_date TEXT,

                assigned_by TEXT NOT NULL,
                notes TEXT NOT NULL DEFAULT '',
                depends_on TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_hire_id ON tasks(hire_id, seq);
            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_tasks_source
                ON tasks(hire_id, template_id, template_task_id)
                WHERE template_task_id IS NOT NULL;

            CREATE TABLE IF NOT EXISTS hire_progress (
                hire_id TEXT PRIMARY KEY,
                total INTEGER NOT NULL,
                completed INTEGER NOT NULL,
                percent INTEGER NOT NULL,
                finished INTEGER NOT NULL DEFAULT 0,
                completion_notified INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )?;

        // Version 1 databases predate the completion marker
        let has_marker = conn
            .prepare(
                "SELECT 1 FROM pragma_table_info('hire_progress') WHERE name = 'completion_notified'",
            )?
            .exists([])?;
        if !has_marker {
            conn.execute(
                "ALTER TABLE hire_progress ADD COLUMN completion_notified INTEGER NOT NULL DEFAULT 0",
                [],
            )?;
        }

        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
        Ok(())
    }

    /// Get current schema version
    pub fn schema_version(&self) -> Result<i32> {
        let conn = self.conn()?;
        let version: i32 =
            conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
        Ok(version)
    }

    fn query_tasks(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<TaskInstance>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let tasks = stmt
            .query_map(args, map_task_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    fn select_task(conn: &Connection, id: TaskId) -> Result<Option<TaskInstance>> {
        let task = conn
            .query_row(
                &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
                params![id.to_string()],
                map_task_row,
            )
            .optional()?;
        Ok(task)
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn create_task(&self, task: &TaskInstance) -> Result<TaskId> {
        let depends_on = serde_json::to_string(&task.depends_on)?;
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO tasks (
                id, hire_id, template_id, template_version, template_task_id,
                title, description, category, priority, status, due_date, completed_date,
                assigned_by, notes, depends_on, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                task.id.to_string(),
                task.hire_id,
                task.template_id,
                task.template_version,
                task.template_task_id,
                task.title,
                task.description,
                task.category.as_str(),
                task.priority.as_str(),
                task.status.as_str(),
                task.due_date.to_rfc3339(),
                task.completed_date.map(|d| d.to_rfc3339()),
                task.assigned_by,
                task.notes,
                depends_on,
                task.created_at.to_rfc3339(),
            ],
        )
        .with_context(|| format!("Failed to insert task {}", task.id))?;

        Ok(task.id)
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<TaskInstance>> {
        let conn = self.conn()?;
        Self::select_task(&conn, id)
    }

    async fn get_tasks_for_hire(&self, hire_id: &str) -> Result<Vec<TaskInstance>> {
        self.query_tasks(
            &format!(
                "SELECT {} FROM tasks WHERE hire_id = ?1 ORDER BY seq",
                TASK_COLUMNS
            ),
            &[&hire_id],
        )
    }

    async fn update_task_status(
        &self,
        id: TaskId,
        status: TaskStatus,
        update: &TaskUpdate,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let Some(mut task) = Self::select_task(&conn, id)? else {
            return Ok(false);
        };
        update.apply_to(&mut task, status);

        let changed = conn.execute(
            r#"
            UPDATE tasks
            SET status = ?1, due_date = ?2, completed_date = ?3, notes = ?4
            WHERE id = ?5
            "#,
            params![
                task.status.as_str(),
                task.due_date.to_rfc3339(),
                task.completed_date.map(|d| d.to_rfc3339()),
                task.notes,
                id.to_string(),
            ],
        )?;
        Ok(changed > 0)
    }

    async fn list_all_active_tasks(&self) -> Result<Vec<TaskInstance>> {
        self.query_tasks(
            &format!(
                "SELECT {} FROM tasks WHERE status != 'completed' ORDER BY seq",
                TASK_COLUMNS
            ),
            &[],
        )
    }

    async fn delete_task(&self, id: TaskId) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id.to_string()])?;
        Ok(deleted > 0)
    }

    async fn save_progress(&self, progress: &HireProgress) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO hire_progress
                (hire_id, total, completed, percent, finished, completion_notified, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                progress.hire_id,
                progress.total as i64,
                progress.completed as i64,
                progress.percent,
                progress.finished,
                progress.completion_notified,
                progress.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn load_progress(&self, hire_id: &str) -> Result<Option<HireProgress>> {
        let conn = self.conn()?;
        let progress = conn
            .query_row(
                r#"
                SELECT hire_id, total, completed, percent, finished, completion_notified,
                       updated_at
                FROM hire_progress WHERE hire_id = ?1
                "#,
                params![hire_id],
                |row| {
                    let total: i64 = row.get(1)?;
                    let completed: i64 = row.get(2)?;
                    let updated_at: String = row.get(6)?;
                    Ok(HireProgress {
                        hire_id: row.get(0)?,
                        total: total as usize,
                        completed: completed as usize,
                        percent: row.get(3)?,
                        finished: row.get(4)?,
                        completion_notified: row.get(5)?,
                        updated_at: parse_timestamp(6, &updated_at)?,
                    })
                },
            )
            .optional()?;
        Ok(progress)
    }
}

// Helper functions for mapping between database and Rust types

fn conversion_error(
    column: usize,
    error: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(error))
}

fn parse_timestamp(column: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, e))
}

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
struct UnknownValue {
    kind: &'static str,
    value: String,
}

fn unknown(column: usize, kind: &'static str, value: &str) -> rusqlite::Error {
    conversion_error(
        column,
        UnknownValue {
            kind,
            value: value.to_string(),
        },
    )
}

fn string_to_category(s: &str) -> Option<TaskCategory> {
    match s {
        "documentation" => Some(TaskCategory::Documentation),
        "training" => Some(TaskCategory::Training),
        "setup" => Some(TaskCategory::Setup),
        "meeting" => Some(TaskCategory::Meeting),
        "other" => Some(TaskCategory::Other),
        _ => None,
    }
}

fn string_to_priority(s: &str) -> Option<Priority> {
    match s {
        "low" => Some(Priority::Low),
        "medium" => Some(Priority::Medium),
        "high" => Some(Priority::High),
        "critical" => Some(Priority::Critical),
        _ => None,
    }
}

/// Map a database row to TaskInstance (column order of `TASK_COLUMNS`)
fn map_task_row(row: &Row) -> rusqlite::Result<TaskInstance> {
    let id_str: String = row.get(0)?;
    let category_str: String = row.get(7)?;
    let priority_str: String = row.get(8)?;
    let status_str: String = row.get(9)?;
    let due_date_str: String = row.get(10)?;
    let completed_date_str: Option<String> = row.get(11)?;
    let depends_on_str: String = row.get(14)?;
    let created_at_str: String = row.get(15)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| conversion_error(0, e))?;
    let category =
        string_to_category(&category_str).ok_or_else(|| unknown(7, "category", &category_str))?;
    let priority =
        string_to_priority(&priority_str).ok_or_else(|| unknown(8, "priority", &priority_str))?;
    let status = TaskStatus::parse(&status_str).ok_or_else(|| unknown(9, "status", &status_str))?;
    let completed_date = completed_date_str
        .map(|s| parse_timestamp(11, &s))
        .transpose()?;
    let depends_on: Vec<TaskId> =
        serde_json::from_str(&depends_on_str).map_err(|e| conversion_error(14, e))?;

    Ok(TaskInstance {
        id,
        hire_id: row.get(1)?,
        template_id: row.get(2)?,
        template_version: row.get(3)?,
        template_task_id: row.get(4)?,
        title: row.get(5)?,
        description: row.get(6)?,
        category,
        priority,
        status,
        due_date: parse_timestamp(10, &due_date_str)?,
        completed_date,
        assigned_by: row.get(12)?,
        notes: row.get(13)?,
        depends_on,
        created_at: parse_timestamp(15, &created_at_str)?,
    })
}
