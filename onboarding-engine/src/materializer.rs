//! Expands a workflow template into hire-specific task instances.
//!
//! Materialization walks the audience-filtered task list strictly left to
//! right. A task is created only when each of its dependencies has already
//! been created in this run, or when the dependency was filtered out for
//! this hire. Anything else (a forward reference, or a chain hanging off a
//! skipped task) is skipped for the run and reported in the plan.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use uuid::Uuid;

use onboarding_sdk::{
    EngineResult, HireProfile, TaskId, TaskInstance, TaskStatus, TaskStore, TaskTemplate,
    WorkflowTemplate,
};

use crate::targeting::audience_allows;

/// Why a task template did not produce an instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Depends on an applicable task that was not created before it
    BlockedBy(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTask {
    pub template_task_id: String,
    pub title: String,
    pub reason: SkipReason,
}

/// Result of materializing one template for one hire
#[derive(Debug, Clone)]
pub struct MaterializationPlan {
    pub hire_id: String,
    pub template_id: String,
    pub template_version: u32,
    /// Instances in creation order
    pub tasks: Vec<TaskInstance>,
    pub skipped: Vec<SkippedTask>,
    /// Task template ids excluded by role/department filters
    pub filtered: Vec<String>,
}

impl MaterializationPlan {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Outcome of writing a plan to the task store
#[derive(Debug, Clone, Default)]
pub struct PersistOutcome {
    pub created: Vec<TaskInstance>,
    /// Planned tasks that already existed for the hire
    pub existing: usize,
}

pub fn task_applies(task: &TaskTemplate, hire: &HireProfile) -> bool {
    audience_allows(&task.role_specific, &hire.role)
        && audience_allows(&task.department_specific, &hire.department)
}

/// `start_date` at midnight UTC plus `days`; `now` when the hire has no start date
pub fn due_date_for(hire: &HireProfile, days: u32, now: DateTime<Utc>) -> DateTime<Utc> {
    let baseline = hire
        .start_date
        .map(|date| Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
        .unwrap_or(now);
    baseline + Duration::days(i64::from(days))
}

fn creation_note(template: &WorkflowTemplate, task: &TaskTemplate) -> String {
    format!(
        "Created from template '{}' (v{}). Estimated hours: {}. Priority: {}.",
        template.name, template.version, task.estimated_hours, task.priority
    )
}

/// Build the task instances for a hire without touching any store
pub fn materialize(
    hire: &HireProfile,
    template: &WorkflowTemplate,
    actor: &str,
    now: DateTime<Utc>,
) -> MaterializationPlan {
    let (applicable, filtered): (Vec<&TaskTemplate>, Vec<&TaskTemplate>) =
        template.tasks.iter().partition(|t| task_applies(t, hire));

    let applicable_ids: HashSet<&str> = applicable.iter().map(|t| t.id.as_str()).collect();
    let mut created: HashMap<&str, TaskId> = HashMap::new();
    let mut tasks = Vec::new();
    let mut skipped = Vec::new();

    for task in applicable {
        let mut depends_on = Vec::new();
        let mut blocked_by = None;

        for dep in &task.dependencies {
            if let Some(id) = created.get(dep.as_str()) {
                depends_on.push(*id);
            } else if applicable_ids.contains(dep.as_str()) {
                blocked_by = Some(dep.clone());
                break;
            }
            // Filtered out for this hire: treated as satisfied
        }

        if let Some(dep) = blocked_by {
            debug!(
                hire_id = %hire.id,
                task = %task.id,
                dependency = %dep,
                "Skipping task with unmet dependency"
            );
            skipped.push(SkippedTask {
                template_task_id: task.id.clone(),
                title: task.title.clone(),
                reason: SkipReason::BlockedBy(dep),
            });
            continue;
        }

        let instance = TaskInstance {
            id: Uuid::new_v4(),
            hire_id: hire.id.clone(),
            template_id: Some(template.id.clone()),
            template_version: Some(template.version),
            template_task_id: Some(task.id.clone()),
            title: task.title.clone(),
            description: task.description.clone(),
            category: task.category,
            priority: task.priority,
            status: TaskStatus::Pending,
            due_date: due_date_for(hire, task.days_from_start, now),
            completed_date: None,
            assigned_by: actor.to_string(),
            notes: creation_note(template, task),
            depends_on,
            created_at: now,
        };
        created.insert(task.id.as_str(), instance.id);
        tasks.push(instance);
    }

    MaterializationPlan {
        hire_id: hire.id.clone(),
        template_id: template.id.clone(),
        template_version: template.version,
        tasks,
        skipped,
        filtered: filtered.iter().map(|t| t.id.clone()).collect(),
    }
}

/// Create the planned tasks that do not exist yet, in plan order.
///
/// A planned task whose `(template_id, template_task_id)` pair already exists
/// for the hire is not created again; dependents are pointed at the existing
/// instance instead. Callers hold the hire's lock.
pub async fn persist(
    plan: &MaterializationPlan,
    store: &dyn TaskStore,
) -> EngineResult<PersistOutcome> {
    let existing_tasks = store.get_tasks_for_hire(&plan.hire_id).await?;
    let mut remap: HashMap<TaskId, TaskId> = HashMap::new();
    let mut outcome = PersistOutcome::default();

    for planned in &plan.tasks {
        let source = planned.template_task_id.as_deref().unwrap_or_default();
        if let Some(existing) = existing_tasks
            .iter()
            .find(|t| t.is_from(&plan.template_id, source))
        {
            remap.insert(planned.id, existing.id);
            outcome.existing += 1;
            continue;
        }

        let mut task = planned.clone();
        for dep in task.depends_on.iter_mut() {
            if let Some(existing) = remap.get(dep) {
                *dep = *existing;
            }
        }

        let id = store.create_task(&task).await?;
        if id != task.id {
            remap.insert(task.id, id);
            task.id = id;
        }
        outcome.created.push(task);
    }

    debug!(
        hire_id = %plan.hire_id,
        template_id = %plan.template_id,
        created = outcome.created.len(),
        existing = outcome.existing,
        "Persisted materialization plan"
    );
    Ok(outcome)
}
