//! Task state machine and progress tracking.
//!
//! ```text
//! pending ──activate──▶ active ──complete──▶ completed
//!    │                   │  ▲                    │
//!    │               overdue│activate            │
//!    └──mark_overdue──▶ overdue ◀────────────────┘ (reset → pending)
//! ```
//!
//! Every operation takes the owning hire's lock and re-reads the task from
//! the store before deciding, so concurrent callers never act on stale state.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use onboarding_sdk::{
    Clock, EngineError, EngineEvent, EngineResult, EventBus, HireDirectory, HireProfile,
    HireProgress, Notification, Notifier, Priority, TaskId, TaskInstance, TaskStatus, TaskStore,
    TaskUpdate, WorkflowTemplate,
};

use crate::locks::HireLocks;
use crate::materializer::{materialize, persist, MaterializationPlan, PersistOutcome, SkippedTask};

/// Result of applying a template to one hire
#[derive(Debug, Clone)]
pub struct AppliedWorkflow {
    pub hire_id: String,
    pub template_id: String,
    pub template_version: u32,
    pub created: Vec<TaskInstance>,
    /// Planned tasks the hire already had
    pub existing: usize,
    pub skipped: Vec<SkippedTask>,
}

/// Whether a recount may clear the completion marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reopen {
    /// Administrative reset; finishing again notifies again
    Yes,
    /// Tasks added or removed; the hire was already congratulated
    No,
}

/// Task after an operation, and whether the operation changed anything
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub task: TaskInstance,
    pub changed: bool,
}

impl TransitionOutcome {
    fn unchanged(task: TaskInstance) -> Self {
        Self {
            task,
            changed: false,
        }
    }

    fn changed(task: TaskInstance) -> Self {
        Self {
            task,
            changed: true,
        }
    }
}

pub struct LifecycleManager {
    store: Arc<dyn TaskStore>,
    directory: Arc<dyn HireDirectory>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    locks: HireLocks,
    events: EventBus,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<dyn TaskStore>,
        directory: Arc<dyn HireDirectory>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
            clock,
            locks: HireLocks::new(),
            events,
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn locks(&self) -> &HireLocks {
        &self.locks
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// pending/overdue → active
    pub async fn activate(&self, task_id: TaskId) -> EngineResult<TransitionOutcome> {
        let (_guard, task) = self.lock_task(task_id).await?;

        match task.status {
            TaskStatus::Active | TaskStatus::Completed => Ok(TransitionOutcome::unchanged(task)),
            TaskStatus::Pending => {
                self.ensure_dependencies_complete(&task).await?;
                let task = self
                    .transition(&task, TaskStatus::Active, TaskUpdate::default())
                    .await?;
                Ok(TransitionOutcome::changed(task))
            }
            TaskStatus::Overdue => {
                let task = self
                    .transition(&task, TaskStatus::Active, TaskUpdate::default())
                    .await?;
                Ok(TransitionOutcome::changed(task))
            }
        }
    }

    /// Any open state → completed. Completing twice is a no-op.
    pub async fn complete(
        &self,
        task_id: TaskId,
        actor: &str,
        note: Option<&str>,
    ) -> EngineResult<TransitionOutcome> {
        let (_guard, task) = self.lock_task(task_id).await?;

        if task.status == TaskStatus::Completed {
            debug!(task_id = %task_id, "Task already completed");
            return Ok(TransitionOutcome::unchanged(task));
        }
        if task.status == TaskStatus::Pending {
            self.ensure_dependencies_complete(&task).await?;
        }

        let note = match note.filter(|n| !n.trim().is_empty()) {
            Some(note) => format!("Completed by {}: {}", actor, note.trim()),
            None => format!("Completed by {}", actor),
        };
        let update = TaskUpdate::completed_at(self.now()).with_note(note);
        let task = self.transition(&task, TaskStatus::Completed, update).await?;

        self.recompute_progress(&task.hire_id, Reopen::No).await?;
        Ok(TransitionOutcome::changed(task))
    }

    /// pending/active past its due date → overdue.
    ///
    /// `changed` tells the caller whether this call performed the transition,
    /// which is what keeps overdue side effects from firing twice.
    pub async fn mark_overdue(&self, task_id: TaskId) -> EngineResult<TransitionOutcome> {
        let (_guard, task) = self.lock_task(task_id).await?;

        let eligible = matches!(task.status, TaskStatus::Pending | TaskStatus::Active);
        if !eligible || !task.is_past_due(self.now()) {
            return Ok(TransitionOutcome::unchanged(task));
        }

        let task = self
            .transition(&task, TaskStatus::Overdue, TaskUpdate::default())
            .await?;
        Ok(TransitionOutcome::changed(task))
    }

    /// overdue/completed → pending with a new due date
    pub async fn reset(
        &self,
        task_id: TaskId,
        new_due_date: DateTime<Utc>,
    ) -> EngineResult<TransitionOutcome> {
        let (_guard, task) = self.lock_task(task_id).await?;

        if !matches!(task.status, TaskStatus::Overdue | TaskStatus::Completed) {
            return Err(EngineError::InvalidTransition {
                task_id,
                from: task.status,
                action: "reset",
            });
        }

        let update = TaskUpdate::rescheduled(new_due_date).with_note(format!(
            "Reset from {}; due {}",
            task.status,
            new_due_date.format("%Y-%m-%d")
        ));
        let task = self.transition(&task, TaskStatus::Pending, update).await?;

        self.recompute_progress(&task.hire_id, Reopen::Yes).await?;
        Ok(TransitionOutcome::changed(task))
    }

    /// Administrative delete
    pub async fn remove(&self, task_id: TaskId) -> EngineResult<TaskInstance> {
        let (_guard, task) = self.lock_task(task_id).await?;

        if !self.store.delete_task(task_id).await? {
            return Err(EngineError::task_not_found(task_id));
        }
        self.events.publish(EngineEvent::TaskRemoved {
            task_id,
            hire_id: task.hire_id.clone(),
        });

        self.recompute_progress(&task.hire_id, Reopen::No).await?;
        Ok(task)
    }

    /// Current progress of a hire, computed from the live task set
    pub async fn progress(&self, hire_id: &str) -> EngineResult<HireProgress> {
        let tasks = self.store.get_tasks_for_hire(hire_id).await?;
        let stored = self.store.load_progress(hire_id).await?;

        let mut progress = HireProgress::from_tasks(hire_id, &tasks, self.now());
        progress.finished = progress.is_complete();
        progress.completion_notified = stored.map_or(false, |p| p.completion_notified);
        Ok(progress)
    }

    /// Materialize a template for a hire and persist the result
    pub async fn apply_template(
        &self,
        hire: &HireProfile,
        template: &WorkflowTemplate,
        actor: &str,
    ) -> EngineResult<AppliedWorkflow> {
        let plan = materialize(hire, template, actor, self.now());
        let outcome = self.persist_plan(&plan).await?;

        self.events.publish(EngineEvent::WorkflowApplied {
            hire_id: hire.id.clone(),
            template_id: template.id.clone(),
            template_version: template.version,
            tasks_created: outcome.created.len(),
            tasks_skipped: plan.skipped.len(),
        });

        Ok(AppliedWorkflow {
            hire_id: hire.id.clone(),
            template_id: template.id.clone(),
            template_version: template.version,
            created: outcome.created,
            existing: outcome.existing,
            skipped: plan.skipped,
        })
    }

    /// Persist a materialization plan under the hire's lock
    pub async fn persist_plan(&self, plan: &MaterializationPlan) -> EngineResult<PersistOutcome> {
        let _guard = self.locks.acquire(&plan.hire_id).await;

        let outcome = persist(plan, self.store.as_ref()).await?;
        for task in &outcome.created {
            self.events.publish(EngineEvent::TaskCreated {
                task_id: task.id,
                hire_id: task.hire_id.clone(),
                title: task.title.clone(),
            });
        }

        if !outcome.created.is_empty() {
            self.recompute_progress(&plan.hire_id, Reopen::No).await?;
        }
        Ok(outcome)
    }

    /// Create a single task unless one from the same source already exists
    pub async fn add_task(&self, task: TaskInstance) -> EngineResult<TransitionOutcome> {
        let _guard = self.locks.acquire(&task.hire_id).await;

        if let (Some(template_id), Some(source)) = (&task.template_id, &task.template_task_id) {
            let existing = self.store.get_tasks_for_hire(&task.hire_id).await?;
            if let Some(found) = existing.into_iter().find(|t| t.is_from(template_id, source)) {
                return Ok(TransitionOutcome::unchanged(found));
            }
        }

        let mut task = task;
        task.id = self.store.create_task(&task).await?;
        self.events.publish(EngineEvent::TaskCreated {
            task_id: task.id,
            hire_id: task.hire_id.clone(),
            title: task.title.clone(),
        });

        self.recompute_progress(&task.hire_id, Reopen::No).await?;
        Ok(TransitionOutcome::changed(task))
    }

    async fn lock_task(&self, task_id: TaskId) -> EngineResult<(OwnedMutexGuard<()>, TaskInstance)> {
        let task = self.load_task(task_id).await?;
        let guard = self.locks.acquire(&task.hire_id).await;
        // Re-read under the lock
        let task = self.load_task(task_id).await?;
        Ok((guard, task))
    }

    async fn load_task(&self, task_id: TaskId) -> EngineResult<TaskInstance> {
        self.store
            .get_task(task_id)
            .await?
            .ok_or_else(|| EngineError::task_not_found(task_id))
    }

    async fn ensure_dependencies_complete(&self, task: &TaskInstance) -> EngineResult<()> {
        if task.depends_on.is_empty() {
            return Ok(());
        }

        let siblings = self.store.get_tasks_for_hire(&task.hire_id).await?;
        // Prerequisites that were removed no longer block
        let pending: Vec<TaskId> = task
            .depends_on
            .iter()
            .filter(|dep| {
                siblings
                    .iter()
                    .any(|t| t.id == **dep && t.status != TaskStatus::Completed)
            })
            .copied()
            .collect();

        if pending.is_empty() {
            Ok(())
        } else {
            Err(EngineError::DependenciesIncomplete {
                task_id: task.id,
                pending,
            })
        }
    }

    async fn transition(
        &self,
        task: &TaskInstance,
        to: TaskStatus,
        update: TaskUpdate,
    ) -> EngineResult<TaskInstance> {
        if !self.store.update_task_status(task.id, to, &update).await? {
            return Err(EngineError::task_not_found(task.id));
        }

        let mut updated = task.clone();
        update.apply_to(&mut updated, to);

        self.events.publish(EngineEvent::TaskTransitioned {
            task_id: task.id,
            hire_id: task.hire_id.clone(),
            from: task.status,
            to,
        });
        Ok(updated)
    }

    /// Recount a hire's tasks; notifies once when the workflow first finishes.
    /// Callers hold the hire's lock.
    async fn recompute_progress(&self, hire_id: &str, reopen: Reopen) -> EngineResult<HireProgress> {
        let tasks = self.store.get_tasks_for_hire(hire_id).await?;
        let stored = self.store.load_progress(hire_id).await?;
        let was_finished = stored.as_ref().map_or(false, |p| p.finished);
        let notified = stored.map_or(false, |p| p.completion_notified);

        let mut progress = HireProgress::from_tasks(hire_id, &tasks, self.now());
        progress.finished = progress.is_complete();
        progress.completion_notified = match reopen {
            Reopen::Yes => notified && progress.finished,
            Reopen::No => notified,
        };

        let first_finish = progress.finished && !progress.completion_notified;
        if first_finish {
            progress.completion_notified = true;
        }
        self.store.save_progress(&progress).await?;

        self.events.publish(EngineEvent::ProgressUpdated {
            hire_id: hire_id.to_string(),
            percent: progress.percent,
            completed: progress.completed,
            total: progress.total,
        });

        if first_finish {
            self.events.publish(EngineEvent::WorkflowFinished {
                hire_id: hire_id.to_string(),
            });
            self.notify_finished(hire_id).await;
        } else if was_finished && !progress.finished {
            info!(hire_id = %hire_id, percent = progress.percent, "Workflow reopened");
        }

        Ok(progress)
    }

    async fn notify_finished(&self, hire_id: &str) {
        let name = match self.directory.get_hire(hire_id).await {
            Ok(Some(hire)) => hire.display_name().to_string(),
            Ok(None) => hire_id.to_string(),
            Err(e) => {
                warn!(hire_id = %hire_id, error = %e, "Failed to load hire for completion message");
                hire_id.to_string()
            }
        };

        let notification = Notification::new(
            hire_id,
            "Onboarding complete",
            format!(
                "Congratulations {}, you have completed all of your onboarding tasks.",
                name
            ),
            Priority::Medium,
        );
        if let Err(e) = self.notifier.notify(notification).await {
            warn!(hire_id = %hire_id, error = %e, "Failed to send completion notification");
        }
    }
}
