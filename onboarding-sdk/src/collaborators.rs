//! Interfaces to the systems the engine consumes but never implements.
//!
//! The engine operates exclusively through these traits, so the same logic
//! runs against in-memory adapters in tests and durable stores in production.

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{
    HireFilter, HireProfile, HireProgress, Notification, TaskId, TaskInstance, TaskStatus,
    TaskUpdate, WorkflowTemplate,
};

/// Single source of truth for task state
#[async_trait]
pub trait TaskStore: Send + Sync {
    // ── Tasks ──

    /// Persist a new task and return its id
    async fn create_task(&self, task: &TaskInstance) -> Result<TaskId>;
    async fn get_task(&self, id: TaskId) -> Result<Option<TaskInstance>>;
    /// All tasks of a hire, in creation order
    async fn get_tasks_for_hire(&self, hire_id: &str) -> Result<Vec<TaskInstance>>;
    /// Returns false when no task has this id
    async fn update_task_status(&self, id: TaskId, status: TaskStatus, update: &TaskUpdate)
        -> Result<bool>;
    /// Every task that is not completed
    async fn list_all_active_tasks(&self) -> Result<Vec<TaskInstance>>;
    /// Returns false when no task has this id
    async fn delete_task(&self, id: TaskId) -> Result<bool>;

    // ── Progress ──

    async fn save_progress(&self, progress: &HireProgress) -> Result<()>;
    async fn load_progress(&self, hire_id: &str) -> Result<Option<HireProgress>>;
}

/// Read-only view of hire profiles
#[async_trait]
pub trait HireDirectory: Send + Sync {
    async fn get_hire(&self, id: &str) -> Result<Option<HireProfile>>;
    async fn list_hires(&self, filter: &HireFilter) -> Result<Vec<HireProfile>>;
}

/// Fire-and-forget notification delivery, at-least-once
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<()>;
}

/// Where workflow templates come from
#[async_trait]
pub trait TemplateSource: Send + Sync {
    /// Active templates in catalog order
    async fn list_active_templates(&self) -> Result<Vec<WorkflowTemplate>>;
    /// Latest published version of a template, active or not
    async fn get_template(&self, id: &str) -> Result<Option<WorkflowTemplate>>;
}

