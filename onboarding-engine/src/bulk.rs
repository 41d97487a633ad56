//! Operations over many hires at once.
//!
//! Each hire is processed independently: a failure for one hire becomes a
//! `Failed` entry in the report and never stops its siblings. Hires run
//! concurrently, but each hire's own task set is only touched under its lock.
//! Idle hire locks are pruned once a run finishes.

use chrono::Duration;
use futures::Future;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use onboarding_sdk::{
    EngineError, EngineResult, HireDirectory, HireProfile, Notification, Notifier, Priority,
    TaskInstance, TaskStatus, TemplateSource, WorkflowTemplate,
};

use crate::automation::AutomationEngine;
use crate::batch::{execute_isolated, ItemOutcome};
use crate::lifecycle::LifecycleManager;
use crate::targeting::matches_hire;

/// Per-hire result of a bulk operation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum HireResult {
    Applied {
        template_id: String,
        tasks_created: usize,
        tasks_skipped: usize,
    },
    Updated {
        tasks: usize,
    },
    Skipped {
        reason: String,
    },
    Failed {
        error: String,
    },
    Cancelled,
}

impl HireResult {
    pub fn is_success(&self) -> bool {
        matches!(self, HireResult::Applied { .. } | HireResult::Updated { .. })
    }

    fn failed(error: impl fmt::Display) -> Self {
        HireResult::Failed {
            error: error.to_string(),
        }
    }

    fn skipped(reason: impl Into<String>) -> Self {
        HireResult::Skipped {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for HireResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HireResult::Applied {
                template_id,
                tasks_created,
                ..
            } => write!(f, "applied {} ({} tasks)", template_id, tasks_created),
            HireResult::Updated { tasks } => write!(f, "updated {} tasks", tasks),
            HireResult::Skipped { reason } => write!(f, "skipped: {}", reason),
            HireResult::Failed { error } => write!(f, "failed: {}", error),
            HireResult::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HireOutcome {
    pub hire_id: String,
    #[serde(flatten)]
    pub result: HireResult,
}

/// Outcome of a bulk operation, one entry per input hire in input order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkReport {
    pub operation: &'static str,
    pub outcomes: Vec<HireOutcome>,
}

impl BulkReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_success()).count()
    }

    pub fn failed(&self) -> Vec<&HireOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, HireResult::Failed { .. }))
            .collect()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, HireResult::Skipped { .. }))
            .count()
    }

    pub fn cancelled(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.result == HireResult::Cancelled)
            .count()
    }

    pub fn is_partial_failure(&self) -> bool {
        !self.failed().is_empty()
    }

    pub fn outcome(&self, hire_id: &str) -> Option<&HireResult> {
        self.outcomes
            .iter()
            .find(|o| o.hire_id == hire_id)
            .map(|o| &o.result)
    }

    /// "N of M hires updated"
    pub fn summary(&self) -> String {
        format!("{} of {} hires updated", self.succeeded(), self.total())
    }
}

#[derive(Clone)]
pub struct BulkCoordinator {
    lifecycle: Arc<LifecycleManager>,
    automation: Arc<AutomationEngine>,
    directory: Arc<dyn HireDirectory>,
    notifier: Arc<dyn Notifier>,
    templates: Arc<dyn TemplateSource>,
    concurrency: usize,
    reset_extension_days: u32,
}

impl BulkCoordinator {
    pub fn new(
        automation: Arc<AutomationEngine>,
        directory: Arc<dyn HireDirectory>,
        notifier: Arc<dyn Notifier>,
        templates: Arc<dyn TemplateSource>,
    ) -> Self {
        Self {
            lifecycle: Arc::clone(automation.lifecycle()),
            automation,
            directory,
            notifier,
            templates,
            concurrency: 4,
            reset_extension_days: 7,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_reset_extension_days(mut self, days: u32) -> Self {
        self.reset_extension_days = days;
        self
    }

    pub fn reset_extension_days(&self) -> u32 {
        self.reset_extension_days
    }

    /// Apply one template to many hires. Hires outside the template's
    /// audience are skipped, not failed.
    pub async fn apply_workflow(
        &self,
        template_id: &str,
        hire_ids: Vec<String>,
        actor: &str,
        cancel: &CancellationToken,
    ) -> EngineResult<BulkReport> {
        let template = self
            .templates
            .get_template(template_id)
            .await?
            .ok_or_else(|| EngineError::template_not_found(template_id))?;

        let template = Arc::new(template);
        let actor = actor.to_string();
        let report = self
            .run("apply_workflow", hire_ids, cancel, move |this, hire_id| {
                let template = Arc::clone(&template);
                let actor = actor.clone();
                async move { this.apply_one(&template, &hire_id, &actor).await }
            })
            .await;
        Ok(report)
    }

    /// Complete every open task of each hire
    pub async fn mark_completed(
        &self,
        hire_ids: Vec<String>,
        actor: &str,
        cancel: &CancellationToken,
    ) -> BulkReport {
        let actor = actor.to_string();
        self.run("mark_completed", hire_ids, cancel, move |this, hire_id| {
            let actor = actor.clone();
            async move { this.complete_one(&hire_id, &actor).await }
        })
        .await
    }

    /// Remind each hire about their open tasks
    pub async fn send_reminder(
        &self,
        hire_ids: Vec<String>,
        cancel: &CancellationToken,
    ) -> BulkReport {
        self.run("send_reminder", hire_ids, cancel, |this, hire_id| async move {
            this.remind_one(&hire_id).await
        })
        .await
    }

    /// Move overdue tasks back to pending, due `extension_days` from now
    /// (the configured extension when `None`)
    pub async fn reset_overdue(
        &self,
        hire_ids: Vec<String>,
        extension_days: Option<u32>,
        cancel: &CancellationToken,
    ) -> BulkReport {
        let days = extension_days.unwrap_or(self.reset_extension_days);
        self.run("reset_overdue", hire_ids, cancel, move |this, hire_id| async move {
            this.reset_one(&hire_id, days).await
        })
        .await
    }

    async fn run<F, Fut>(
        &self,
        operation: &'static str,
        hire_ids: Vec<String>,
        cancel: &CancellationToken,
        op: F,
    ) -> BulkReport
    where
        F: Fn(BulkCoordinator, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HireResult> + Send + 'static,
    {
        let this = self.clone();
        let results = execute_isolated(
            hire_ids.clone(),
            self.concurrency,
            cancel.clone(),
            move |hire_id, _ctx| op(this.clone(), hire_id),
        )
        .await;

        let pruned = self.lifecycle.locks().prune().await;
        debug!(operation, pruned, "Pruned idle hire locks");

        let outcomes: Vec<HireOutcome> = hire_ids
            .into_iter()
            .zip(results)
            .map(|(hire_id, outcome)| HireOutcome {
                hire_id,
                result: match outcome {
                    ItemOutcome::Done(result) => result,
                    ItemOutcome::Cancelled => HireResult::Cancelled,
                },
            })
            .collect();

        let report = BulkReport {
            operation,
            outcomes,
        };
        for failed in report.failed() {
            warn!(operation, hire_id = %failed.hire_id, result = %failed.result, "Bulk operation failed for hire");
        }
        info!(
            operation,
            total = report.total(),
            succeeded = report.succeeded(),
            skipped = report.skipped(),
            failed = report.failed().len(),
            cancelled = report.cancelled(),
            "{}",
            report.summary()
        );
        report
    }

    async fn load_hire(&self, hire_id: &str) -> EngineResult<HireProfile> {
        self.directory
            .get_hire(hire_id)
            .await?
            .ok_or_else(|| EngineError::hire_not_found(hire_id))
    }

    async fn open_tasks(&self, hire_id: &str) -> EngineResult<Vec<TaskInstance>> {
        let tasks = self.lifecycle.store().get_tasks_for_hire(hire_id).await?;
        Ok(tasks.into_iter().filter(|t| t.status.is_open()).collect())
    }

    async fn apply_one(&self, template: &WorkflowTemplate, hire_id: &str, actor: &str) -> HireResult {
        let hire = match self.load_hire(hire_id).await {
            Ok(hire) => hire,
            Err(e) => return HireResult::failed(e),
        };
        if !matches_hire(template, &hire) {
            return HireResult::skipped(format!(
                "{} / {} is outside the audience of {}",
                hire.role, hire.department, template.id
            ));
        }

        let applied = match self.lifecycle.apply_template(&hire, template, actor).await {
            Ok(applied) => applied,
            Err(e) => return HireResult::failed(e),
        };

        if !applied.created.is_empty() {
            let notification = Notification::new(
                &hire.id,
                "New onboarding tasks",
                format!(
                    "{} new task(s) from '{}' have been assigned to you.",
                    applied.created.len(),
                    template.name
                ),
                Priority::Medium,
            );
            if let Err(e) = self.notifier.notify(notification).await {
                warn!(hire_id = %hire.id, error = %e, "Failed to notify hire about new workflow");
            }
        }

        HireResult::Applied {
            template_id: applied.template_id,
            tasks_created: applied.created.len(),
            tasks_skipped: applied.skipped.len(),
        }
    }

    async fn complete_one(&self, hire_id: &str, actor: &str) -> HireResult {
        if let Err(e) = self.load_hire(hire_id).await {
            return HireResult::failed(e);
        }
        let open = match self.open_tasks(hire_id).await {
            Ok(open) => open,
            Err(e) => return HireResult::failed(e),
        };
        if open.is_empty() {
            return HireResult::skipped("no open tasks");
        }

        // Creation order puts prerequisites first
        let mut completed = 0;
        let mut errors = Vec::new();
        for task in &open {
            match self
                .automation
                .complete_task(task.id, actor, Some("Completed in bulk"))
                .await
            {
                Ok(outcome) if outcome.changed => completed += 1,
                Ok(_) => {}
                Err(e) => errors.push(e.to_string()),
            }
        }

        if errors.is_empty() {
            HireResult::Updated { tasks: completed }
        } else {
            HireResult::failed(format!(
                "{} of {} tasks failed: {}",
                errors.len(),
                open.len(),
                errors.join("; ")
            ))
        }
    }

    async fn remind_one(&self, hire_id: &str) -> HireResult {
        let hire = match self.load_hire(hire_id).await {
            Ok(hire) => hire,
            Err(e) => return HireResult::failed(e),
        };
        let open = match self.open_tasks(hire_id).await {
            Ok(open) => open,
            Err(e) => return HireResult::failed(e),
        };
        let Some(next) = open.iter().min_by_key(|t| t.due_date) else {
            return HireResult::skipped("no open tasks");
        };

        let any_overdue = open.iter().any(|t| t.status == TaskStatus::Overdue);
        let notification = Notification::new(
            &hire.id,
            "Onboarding reminder",
            format!(
                "Hi {}, you have {} open onboarding task(s). Next up: '{}' due {}.",
                hire.display_name(),
                open.len(),
                next.title,
                next.due_date.format("%Y-%m-%d")
            ),
            if any_overdue {
                Priority::High
            } else {
                Priority::Medium
            },
        );

        match self.notifier.notify(notification).await {
            Ok(()) => HireResult::Updated { tasks: open.len() },
            Err(e) => HireResult::failed(format!("{:#}", e)),
        }
    }

    async fn reset_one(&self, hire_id: &str, extension_days: u32) -> HireResult {
        if let Err(e) = self.load_hire(hire_id).await {
            return HireResult::failed(e);
        }
        let open = match self.open_tasks(hire_id).await {
            Ok(open) => open,
            Err(e) => return HireResult::failed(e),
        };
        let overdue: Vec<&TaskInstance> = open
            .iter()
            .filter(|t| t.status == TaskStatus::Overdue)
            .collect();
        if overdue.is_empty() {
            return HireResult::skipped("no overdue tasks");
        }

        let due = self.lifecycle.now() + Duration::days(i64::from(extension_days));
        let mut reset = 0;
        let mut errors = Vec::new();
        for task in &overdue {
            match self.lifecycle.reset(task.id, due).await {
                Ok(_) => reset += 1,
                Err(e) => errors.push(e.to_string()),
            }
        }

        if errors.is_empty() {
            HireResult::Updated { tasks: reset }
        } else {
            HireResult::failed(format!(
                "{} of {} tasks failed ({} reset): {}",
                errors.len(),
                overdue.len(),
                reset,
                errors.join("; ")
            ))
        }
    }
}
