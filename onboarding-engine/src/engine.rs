//! Engine facade.
//!
//! Wires the catalog, targeting, materialization, lifecycle, automation and
//! bulk components to one set of collaborators. Completing a task through the
//! facade also runs the `task_completed` rules; registering a hire runs the
//! `user_created` path.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use onboarding_sdk::{
    Clock, EngineError, EngineEvent, EngineResult, EventBus, HireDirectory, HireProgress,
    Notifier, SystemClock, TaskId, TaskInstance, TaskStore, TemplateSource, WorkflowTemplate,
};

use crate::automation::{AutomationEngine, ScanReport};
use crate::bulk::BulkCoordinator;
use crate::config::EngineConfig;
use crate::lifecycle::{AppliedWorkflow, LifecycleManager, TransitionOutcome};
use crate::scheduler::AutomationScheduler;
use crate::targeting::select_template;

pub struct EngineBuilder {
    store: Arc<dyn TaskStore>,
    directory: Arc<dyn HireDirectory>,
    notifier: Arc<dyn Notifier>,
    templates: Arc<dyn TemplateSource>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> EngineResult<OnboardingEngine> {
        self.config.validate()?;

        let lifecycle = Arc::new(LifecycleManager::new(
            self.store,
            self.directory.clone(),
            self.notifier.clone(),
            self.clock,
            self.events.clone(),
        ));
        let automation = Arc::new(
            AutomationEngine::new(
                lifecycle.clone(),
                self.directory.clone(),
                self.notifier.clone(),
                self.templates.clone(),
                self.config.rules.clone(),
            )
            .with_default_days_before_due(self.config.default_days_before_due),
        );
        let bulk = BulkCoordinator::new(
            automation.clone(),
            self.directory.clone(),
            self.notifier,
            self.templates.clone(),
        )
        .with_concurrency(self.config.bulk_concurrency)
        .with_reset_extension_days(self.config.reset_extension_days);

        Ok(OnboardingEngine {
            templates: self.templates,
            directory: self.directory,
            lifecycle,
            automation,
            bulk,
            events: self.events,
            config: self.config,
        })
    }
}

pub struct OnboardingEngine {
    templates: Arc<dyn TemplateSource>,
    directory: Arc<dyn HireDirectory>,
    lifecycle: Arc<LifecycleManager>,
    automation: Arc<AutomationEngine>,
    bulk: BulkCoordinator,
    events: EventBus,
    config: EngineConfig,
}

impl OnboardingEngine {
    pub fn builder(
        store: Arc<dyn TaskStore>,
        directory: Arc<dyn HireDirectory>,
        notifier: Arc<dyn Notifier>,
        templates: Arc<dyn TemplateSource>,
    ) -> EngineBuilder {
        EngineBuilder {
            store,
            directory,
            notifier,
            templates,
            clock: Arc::new(SystemClock),
            events: EventBus::default(),
            config: EngineConfig::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn bulk(&self) -> &BulkCoordinator {
        &self.bulk
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Scheduler running this engine's scans at the configured interval
    pub fn scheduler(&self) -> AutomationScheduler {
        AutomationScheduler::new(self.automation.clone(), self.config.scan_interval())
    }

    /// Best template for a hire; `None` when no workflow applies
    pub async fn select_template(&self, hire_id: &str) -> EngineResult<Option<WorkflowTemplate>> {
        let hire = self
            .directory
            .get_hire(hire_id)
            .await?
            .ok_or_else(|| EngineError::hire_not_found(hire_id))?;
        let catalog = self.templates.list_active_templates().await?;
        Ok(select_template(&hire, &catalog).cloned())
    }

    /// Apply `template_id` to a hire, or the best matching template when no
    /// id is given. Returns `None` when no workflow applies.
    pub async fn apply_workflow(
        &self,
        hire_id: &str,
        template_id: Option<&str>,
        actor: &str,
    ) -> EngineResult<Option<AppliedWorkflow>> {
        let hire = self
            .directory
            .get_hire(hire_id)
            .await?
            .ok_or_else(|| EngineError::hire_not_found(hire_id))?;

        let template = match template_id {
            Some(id) => Some(
                self.templates
                    .get_template(id)
                    .await?
                    .ok_or_else(|| EngineError::template_not_found(id))?,
            ),
            None => {
                let catalog = self.templates.list_active_templates().await?;
                select_template(&hire, &catalog).cloned()
            }
        };

        let Some(template) = template else {
            info!(hire_id = %hire_id, role = %hire.role, department = %hire.department, "No workflow applied");
            return Ok(None);
        };

        let applied = self.lifecycle.apply_template(&hire, &template, actor).await?;
        Ok(Some(applied))
    }

    /// New hire registered: apply the auto-trigger workflow and run
    /// `user_created` rules
    pub async fn hire_created(&self, hire_id: &str) -> EngineResult<Option<AppliedWorkflow>> {
        let (applied, _report) = self.automation.on_hire_created(hire_id).await?;
        Ok(applied)
    }

    pub async fn activate_task(&self, task_id: TaskId) -> EngineResult<TransitionOutcome> {
        self.lifecycle.activate(task_id).await
    }

    /// Complete a task and run `task_completed` rules when it changed
    pub async fn complete_task(
        &self,
        task_id: TaskId,
        actor: &str,
        note: Option<&str>,
    ) -> EngineResult<TransitionOutcome> {
        self.automation.complete_task(task_id, actor, note).await
    }

    pub async fn mark_overdue(&self, task_id: TaskId) -> EngineResult<TransitionOutcome> {
        self.lifecycle.mark_overdue(task_id).await
    }

    pub async fn reset_task(
        &self,
        task_id: TaskId,
        new_due_date: DateTime<Utc>,
    ) -> EngineResult<TransitionOutcome> {
        self.lifecycle.reset(task_id, new_due_date).await
    }

    pub async fn remove_task(&self, task_id: TaskId) -> EngineResult<TaskInstance> {
        self.lifecycle.remove(task_id).await
    }

    pub async fn tasks_for_hire(&self, hire_id: &str) -> EngineResult<Vec<TaskInstance>> {
        Ok(self.lifecycle.store().get_tasks_for_hire(hire_id).await?)
    }

    pub async fn progress(&self, hire_id: &str) -> EngineResult<HireProgress> {
        self.lifecycle.progress(hire_id).await
    }

    /// One automation pass
    pub async fn scan(&self) -> EngineResult<ScanReport> {
        self.automation.scan().await
    }
}
