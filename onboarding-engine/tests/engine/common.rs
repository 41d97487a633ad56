//! Common test utilities for onboarding engine tests

#![allow(dead_code)]

use anyhow::Result;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::sync::Arc;

use onboarding_engine::config::EngineConfig;
use onboarding_engine::{
    MemoryHireDirectory, MemoryNotifier, MemoryTaskStore, OnboardingEngine, TemplateCatalog,
};
use onboarding_sdk::{
    async_trait, AutomationRule, HireProfile, HireProgress, ManualClock, TaskId, TaskInstance,
    TaskStatus, TaskStore, TaskTemplate, TaskUpdate, WorkflowTemplate,
};

/// Fixed "now" used across tests: 2024-01-01 09:00 UTC
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn staff_engineer(id: &str) -> HireProfile {
    HireProfile::new(id, "staff", "Engineering")
        .named(format!("Engineer {}", id))
        .starting(date(2024, 1, 1))
        .managed_by("mgr-1")
}

pub fn intern(id: &str) -> HireProfile {
    HireProfile::new(id, "intern", "Marketing")
        .named(format!("Intern {}", id))
        .starting(date(2024, 1, 1))
}

/// Four independent tasks targeting everyone
pub fn four_task_template() -> WorkflowTemplate {
    WorkflowTemplate::new("four", "Four Tasks")
        .with_task(TaskTemplate::new("t1", "First", 0))
        .with_task(TaskTemplate::new("t2", "Second", 1))
        .with_task(TaskTemplate::new("t3", "Third", 2))
        .with_task(TaskTemplate::new("t4", "Fourth", 3))
}

/// Everything a test needs to poke at the engine's collaborators
pub struct Harness {
    pub engine: OnboardingEngine,
    pub store: Arc<MemoryTaskStore>,
    pub directory: Arc<MemoryHireDirectory>,
    pub notifier: Arc<MemoryNotifier>,
    pub catalog: Arc<TemplateCatalog>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn clock_now(&self) -> DateTime<Utc> {
        use onboarding_sdk::Clock;
        self.clock.now()
    }

    pub async fn tasks(&self, hire_id: &str) -> Vec<TaskInstance> {
        self.store.get_tasks_for_hire(hire_id).await.unwrap()
    }

    pub async fn task(&self, hire_id: &str, template_task_id: &str) -> TaskInstance {
        self.tasks(hire_id)
            .await
            .into_iter()
            .find(|t| t.template_task_id.as_deref() == Some(template_task_id))
            .unwrap_or_else(|| panic!("no task {} for {}", template_task_id, hire_id))
    }
}

pub fn harness(
    hires: Vec<HireProfile>,
    templates: Vec<WorkflowTemplate>,
    rules: Vec<AutomationRule>,
) -> Harness {
    harness_with_store(hires, templates, rules, Arc::new(MemoryTaskStore::new()))
}

pub fn harness_with_store(
    hires: Vec<HireProfile>,
    templates: Vec<WorkflowTemplate>,
    rules: Vec<AutomationRule>,
    store: Arc<MemoryTaskStore>,
) -> Harness {
    build_harness(hires, templates, rules, store.clone(), store)
}

/// Harness whose engine writes through `engine_store` while tests inspect `store`
pub fn build_harness(
    hires: Vec<HireProfile>,
    templates: Vec<WorkflowTemplate>,
    rules: Vec<AutomationRule>,
    store: Arc<MemoryTaskStore>,
    engine_store: Arc<dyn TaskStore>,
) -> Harness {
    let directory = Arc::new(MemoryHireDirectory::new(hires));
    let notifier = Arc::new(MemoryNotifier::new());
    let clock = Arc::new(ManualClock::new(fixed_now()));

    let catalog = TemplateCatalog::new();
    for template in templates {
        catalog.publish(template).unwrap();
    }
    let catalog = Arc::new(catalog);

    let config = EngineConfig {
        rules,
        bulk_concurrency: 2,
        ..Default::default()
    };

    let engine = OnboardingEngine::builder(
        engine_store,
        directory.clone(),
        notifier.clone(),
        catalog.clone(),
    )
    .clock(clock.clone())
    .config(config)
    .build()
    .unwrap();

    Harness {
        engine,
        store,
        directory,
        notifier,
        catalog,
        clock,
    }
}

/// Task store that refuses to create tasks for one hire
pub struct FailingStore {
    pub inner: Arc<MemoryTaskStore>,
    pub failing_hire: String,
}

#[async_trait]
impl TaskStore for FailingStore {
    async fn create_task(&self, task: &TaskInstance) -> Result<TaskId> {
        if task.hire_id == self.failing_hire {
            anyhow::bail!("storage unavailable for {}", task.hire_id);
        }
        self.inner.create_task(task).await
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<TaskInstance>> {
        self.inner.get_task(id).await
    }

    async fn get_tasks_for_hire(&self, hire_id: &str) -> Result<Vec<TaskInstance>> {
        self.inner.get_tasks_for_hire(hire_id).await
    }

    async fn update_task_status(
        &self,
        id: TaskId,
        status: TaskStatus,
        update: &TaskUpdate,
    ) -> Result<bool> {
        self.inner.update_task_status(id, status, update).await
    }

    async fn list_all_active_tasks(&self) -> Result<Vec<TaskInstance>> {
        self.inner.list_all_active_tasks().await
    }

    async fn delete_task(&self, id: TaskId) -> Result<bool> {
        self.inner.delete_task(id).await
    }

    async fn save_progress(&self, progress: &HireProgress) -> Result<()> {
        self.inner.save_progress(progress).await
    }

    async fn load_progress(&self, hire_id: &str) -> Result<Option<HireProgress>> {
        self.inner.load_progress(hire_id).await
    }
}
