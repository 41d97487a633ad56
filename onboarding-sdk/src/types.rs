//! Data types shared by the onboarding engine and its collaborators.
//!
//! This module defines the structures that flow through the engine:
//!
//! 1. **Templates** - `WorkflowTemplate` and its ordered `TaskTemplate`s
//! 2. **Task instances** - materialized, hire-specific tasks and their status
//! 3. **Hires** - the read-only `HireProfile` used for matching and dates
//! 4. **Progress** - aggregate completion per hire
//! 5. **Automation** - trigger/condition/action rules
//! 6. **Notifications** - requests handed to the notifier

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type HireId = String;
pub type UserId = String;
pub type TemplateId = String;
pub type TaskId = Uuid;

fn default_version() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_estimated_hours() -> f64 {
    1.0
}

// ============================================================================
// Template Types
// ============================================================================

/// Kind of work a task represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Documentation,
    Training,
    Setup,
    Meeting,
    #[default]
    Other,
}

impl TaskCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskCategory::Documentation => "documentation",
            TaskCategory::Training => "training",
            TaskCategory::Setup => "setup",
            TaskCategory::Meeting => "meeting",
            TaskCategory::Other => "other",
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task and notification priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single task definition inside a workflow template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTemplate {
    /// Stable authoring id, unique within the template
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub category: TaskCategory,

    /// Offset in days from the hire's start date
    #[serde(default)]
    pub days_from_start: u32,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default = "default_estimated_hours")]
    pub estimated_hours: f64,

    /// Ids of tasks in the same template that must be completed first
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default = "default_true")]
    pub auto_assign: bool,

    /// Roles this task applies to (empty = everyone)
    #[serde(default)]
    pub role_specific: Vec<String>,

    /// Departments this task applies to (empty = everyone)
    #[serde(default)]
    pub department_specific: Vec<String>,

    #[serde(default)]
    pub tags: Vec<String>,
}

impl TaskTemplate {
    /// Minimal task template, mostly useful for tests and built-in catalogs
    pub fn new(id: impl Into<String>, title: impl Into<String>, days_from_start: u32) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            category: TaskCategory::Other,
            days_from_start,
            priority: Priority::Medium,
            estimated_hours: default_estimated_hours(),
            dependencies: Vec::new(),
            auto_assign: true,
            role_specific: Vec::new(),
            department_specific: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: TaskCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_hours(mut self, hours: f64) -> Self {
        self.estimated_hours = hours;
        self
    }

    pub fn depends_on(mut self, ids: &[&str]) -> Self {
        self.dependencies = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn for_roles(mut self, roles: &[&str]) -> Self {
        self.role_specific = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn for_departments(mut self, departments: &[&str]) -> Self {
        self.department_specific = departments.iter().map(|d| d.to_string()).collect();
        self
    }
}

/// Named, versioned bundle of task definitions with audience targeting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: TemplateId,

    #[serde(default = "default_version")]
    pub version: u32,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Roles targeted (empty = all roles)
    #[serde(default)]
    pub role_targets: Vec<String>,

    /// Departments targeted (empty = all departments)
    #[serde(default)]
    pub department_targets: Vec<String>,

    #[serde(default)]
    pub tasks: Vec<TaskTemplate>,

    #[serde(default = "default_true")]
    pub is_active: bool,

    /// Apply automatically when a hire is created
    #[serde(default)]
    pub auto_trigger: bool,
}

impl WorkflowTemplate {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: default_version(),
            name: name.into(),
            description: String::new(),
            role_targets: Vec::new(),
            department_targets: Vec::new(),
            tasks: Vec::new(),
            is_active: true,
            auto_trigger: false,
        }
    }

    pub fn for_roles(mut self, roles: &[&str]) -> Self {
        self.role_targets = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn for_departments(mut self, departments: &[&str]) -> Self {
        self.department_targets = departments.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_task(mut self, task: TaskTemplate) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn auto_triggered(mut self) -> Self {
        self.auto_trigger = true;
        self
    }

    pub fn task(&self, id: &str) -> Option<&TaskTemplate> {
        self.tasks.iter().find(|t| t.id == id)
    }
}

// ============================================================================
// Task Instance Types
// ============================================================================

/// Lifecycle state of a materialized task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    #[serde(alias = "in_progress")]
    Active,
    Completed,
    Overdue,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Active => "active",
            TaskStatus::Completed => "completed",
            TaskStatus::Overdue => "overdue",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "active" | "in_progress" => Some(TaskStatus::Active),
            "completed" => Some(TaskStatus::Completed),
            "overdue" => Some(TaskStatus::Overdue),
            _ => None,
        }
    }

    /// Anything that still needs work
    pub fn is_open(&self) -> bool {
        !matches!(self, TaskStatus::Completed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete, hire-specific task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInstance {
    pub id: TaskId,
    pub hire_id: HireId,

    /// Source template, absent for ad-hoc tasks
    #[serde(default)]
    pub template_id: Option<TemplateId>,

    #[serde(default)]
    pub template_version: Option<u32>,

    /// Source task template id; together with `template_id` identifies a
    /// task for duplicate prevention
    #[serde(default)]
    pub template_task_id: Option<String>,

    pub title: String,

    #[serde(default)]
    pub description: String,

    pub category: TaskCategory,
    pub priority: Priority,
    pub status: TaskStatus,
    pub due_date: DateTime<Utc>,

    #[serde(default)]
    pub completed_date: Option<DateTime<Utc>>,

    pub assigned_by: UserId,

    #[serde(default)]
    pub notes: String,

    /// Instance ids of prerequisite tasks
    #[serde(default)]
    pub depends_on: Vec<TaskId>,

    pub created_at: DateTime<Utc>,
}

impl TaskInstance {
    /// Whether this instance came from the given template task
    pub fn is_from(&self, template_id: &str, template_task_id: &str) -> bool {
        self.template_id.as_deref() == Some(template_id)
            && self.template_task_id.as_deref() == Some(template_task_id)
    }

    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        self.due_date < now
    }

    pub fn append_note(&mut self, note: &str) {
        if note.is_empty() {
            return;
        }
        if !self.notes.is_empty() {
            self.notes.push('\n');
        }
        self.notes.push_str(note);
    }
}

/// Field changes that accompany a status update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub due_date: Option<DateTime<Utc>>,
    pub completed_date: Option<DateTime<Utc>>,
    pub clear_completed_date: bool,
    pub note: Option<String>,
}

impl TaskUpdate {
    pub fn completed_at(at: DateTime<Utc>) -> Self {
        Self {
            completed_date: Some(at),
            ..Default::default()
        }
    }

    pub fn rescheduled(due_date: DateTime<Utc>) -> Self {
        Self {
            due_date: Some(due_date),
            clear_completed_date: true,
            ..Default::default()
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        let note = note.into();
        if !note.is_empty() {
            self.note = Some(note);
        }
        self
    }

    /// Apply this update and the new status to a task in place
    pub fn apply_to(&self, task: &mut TaskInstance, status: TaskStatus) {
        task.status = status;
        if let Some(due) = self.due_date {
            task.due_date = due;
        }
        if self.clear_completed_date {
            task.completed_date = None;
        }
        if let Some(at) = self.completed_date {
            task.completed_date = Some(at);
        }
        if let Some(note) = &self.note {
            task.append_note(note);
        }
    }
}

// ============================================================================
// Hire Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HireStatus {
    Pending,
    #[default]
    Active,
    Inactive,
}

/// New hire as seen by the engine (read-only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HireProfile {
    pub id: HireId,

    #[serde(default)]
    pub name: String,

    pub role: String,
    pub department: String,

    #[serde(default)]
    pub start_date: Option<NaiveDate>,

    #[serde(default)]
    pub status: HireStatus,

    /// Escalation target for overdue tasks
    #[serde(default)]
    pub manager_id: Option<UserId>,
}

impl HireProfile {
    pub fn new(id: impl Into<String>, role: impl Into<String>, department: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            role: role.into(),
            department: department.into(),
            start_date: None,
            status: HireStatus::Active,
            manager_id: None,
        }
    }

    pub fn starting(mut self, date: NaiveDate) -> Self {
        self.start_date = Some(date);
        self
    }

    pub fn managed_by(mut self, manager_id: impl Into<String>) -> Self {
        self.manager_id = Some(manager_id.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Name for messages, falling back to the id
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Filter for listing hires
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HireFilter {
    #[serde(default)]
    pub status: Option<HireStatus>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
}

impl HireFilter {
    pub fn matches(&self, hire: &HireProfile) -> bool {
        self.status.map_or(true, |s| s == hire.status)
            && self
                .role
                .as_deref()
                .map_or(true, |r| r.eq_ignore_ascii_case(&hire.role))
            && self
                .department
                .as_deref()
                .map_or(true, |d| d.eq_ignore_ascii_case(&hire.department))
    }
}

// ============================================================================
// Progress Types
// ============================================================================

/// Aggregate completion of a hire's tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HireProgress {
    pub hire_id: HireId,
    pub total: usize,
    pub completed: usize,
    /// Rounded percentage, 0..=100
    pub percent: u8,
    /// Every task is completed
    pub finished: bool,
    /// The completion notification went out. Adding tasks later does not
    /// clear it; only a reset or removal that reopens the workflow does.
    #[serde(default)]
    pub completion_notified: bool,
    pub updated_at: DateTime<Utc>,
}

impl HireProgress {
    /// Count completion over a hire's current task set
    pub fn from_tasks(hire_id: &str, tasks: &[TaskInstance], now: DateTime<Utc>) -> Self {
        let total = tasks.len();
        let completed = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        Self {
            hire_id: hire_id.to_string(),
            total,
            completed,
            percent: percent_complete(completed, total),
            finished: false,
            completion_notified: false,
            updated_at: now,
        }
    }

    /// All tasks completed; `percent` is rounded and only for display
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }
}

/// `completed / total * 100`, rounded to the nearest integer
pub fn percent_complete(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round() as u8
}

// ============================================================================
// Automation Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleTrigger {
    TaskCompleted,
    TaskOverdue,
    UserCreated,
    DeadlineApproaching,
}

impl RuleTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleTrigger::TaskCompleted => "task_completed",
            RuleTrigger::TaskOverdue => "task_overdue",
            RuleTrigger::UserCreated => "user_created",
            RuleTrigger::DeadlineApproaching => "deadline_approaching",
        }
    }
}

impl fmt::Display for RuleTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional filters narrowing when a rule applies
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConditions {
    #[serde(default)]
    pub task_category: Option<TaskCategory>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub days_before_due: Option<u32>,
}

/// Side effects a rule performs when it fires
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleActions {
    #[serde(default)]
    pub send_notification: bool,
    #[serde(default)]
    pub escalate_to_manager: bool,
    /// Title of a follow-up task to create for the same hire
    #[serde(default)]
    pub assign_task: Option<String>,
    #[serde(default)]
    pub update_status: Option<TaskStatus>,
}

/// Trigger/condition/action tuple evaluated against live task state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: String,

    #[serde(default)]
    pub name: String,

    pub trigger: RuleTrigger,

    #[serde(default)]
    pub conditions: RuleConditions,

    #[serde(default)]
    pub actions: RuleActions,

    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl AutomationRule {
    pub fn new(id: impl Into<String>, trigger: RuleTrigger) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            trigger,
            conditions: RuleConditions::default(),
            actions: RuleActions::default(),
            is_active: true,
        }
    }

    pub fn notify(mut self) -> Self {
        self.actions.send_notification = true;
        self
    }

    pub fn escalate(mut self) -> Self {
        self.actions.escalate_to_manager = true;
        self
    }

    pub fn assign_follow_up(mut self, title: impl Into<String>) -> Self {
        self.actions.assign_task = Some(title.into());
        self
    }

    pub fn for_category(mut self, category: TaskCategory) -> Self {
        self.conditions.task_category = Some(category);
        self
    }

    pub fn for_role(mut self, role: impl Into<String>) -> Self {
        self.conditions.role = Some(role.into());
        self
    }

    pub fn days_before_due(mut self, days: u32) -> Self {
        self.conditions.days_before_due = Some(days);
        self
    }
}

// ============================================================================
// Notification Types
// ============================================================================

/// Request handed to the notifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: UserId,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    /// Repeats with the same key may be dropped by the notification layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup_key: Option<String>,
}

impl Notification {
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            title: title.into(),
            message: message.into(),
            priority,
            dedup_key: None,
        }
    }

    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }
}
