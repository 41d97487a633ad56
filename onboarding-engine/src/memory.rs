//! In-memory collaborator adapters.
//!
//! Used by the tests and by applications embedding the engine without a
//! database. The template side is covered by [`crate::catalog::TemplateCatalog`].

use anyhow::Result;
use std::collections::{HashMap, HashSet};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use onboarding_sdk::{
    async_trait, HireDirectory, HireFilter, HireProfile, HireProgress, Notification, Notifier,
    TaskId, TaskInstance, TaskStatus, TaskStore, TaskUpdate,
};

// ============================================================================
// Task store
// ============================================================================

#[derive(Default)]
struct TaskTables {
    /// Creation order
    tasks: Vec<TaskInstance>,
    progress: HashMap<String, HireProgress>,
}

/// Task store backed by a vector; keeps creation order
#[derive(Default)]
pub struct MemoryTaskStore {
    inner: RwLock<TaskTables>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored task, including completed ones
    pub async fn all_tasks(&self) -> Vec<TaskInstance> {
        self.inner.read().await.tasks.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.tasks.len()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create_task(&self, task: &TaskInstance) -> Result<TaskId> {
        let mut inner = self.inner.write().await;
        if inner.tasks.iter().any(|t| t.id == task.id) {
            anyhow::bail!("task {} already exists", task.id);
        }
        inner.tasks.push(task.clone());
        Ok(task.id)
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<TaskInstance>> {
        let inner = self.inner.read().await;
        Ok(inner.tasks.iter().find(|t| t.id == id).cloned())
    }

    async fn get_tasks_for_hire(&self, hire_id: &str) -> Result<Vec<TaskInstance>> {
        let inner = self.inner.read().await;
        Ok(inner
            .tasks
            .iter()
            .filter(|t| t.hire_id == hire_id)
            .cloned()
            .collect())
    }

    async fn update_task_status(
        &self,
        id: TaskId,
        status: TaskStatus,
        update: &TaskUpdate,
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.tasks.iter_mut().find(|t| t.id == id) {
            Some(task) => {
                update.apply_to(task, status);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_all_active_tasks(&self) -> Result<Vec<TaskInstance>> {
        let inner = self.inner.read().await;
        Ok(inner
            .tasks
            .iter()
            .filter(|t| t.status.is_open())
            .cloned()
            .collect())
    }

    async fn delete_task(&self, id: TaskId) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let before = inner.tasks.len();
        inner.tasks.retain(|t| t.id != id);
        Ok(inner.tasks.len() != before)
    }

    async fn save_progress(&self, progress: &HireProgress) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .progress
            .insert(progress.hire_id.clone(), progress.clone());
        Ok(())
    }

    async fn load_progress(&self, hire_id: &str) -> Result<Option<HireProgress>> {
        Ok(self.inner.read().await.progress.get(hire_id).cloned())
    }
}

// ============================================================================
// Hire directory
// ============================================================================

/// Hire directory over a fixed list of profiles
#[derive(Default)]
pub struct MemoryHireDirectory {
    hires: RwLock<Vec<HireProfile>>,
}

impl MemoryHireDirectory {
    pub fn new(hires: Vec<HireProfile>) -> Self {
        Self {
            hires: RwLock::new(hires),
        }
    }

    /// Parse a YAML list of hire profiles
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        #[derive(serde::Deserialize)]
        struct HiresFile {
            #[serde(default)]
            hires: Vec<HireProfile>,
        }

        let file: HiresFile = serde_yaml::from_str(yaml)?;
        Ok(Self::new(file.hires))
    }

    /// Add or replace a hire
    pub async fn upsert(&self, hire: HireProfile) {
        let mut hires = self.hires.write().await;
        match hires.iter_mut().find(|h| h.id == hire.id) {
            Some(existing) => *existing = hire,
            None => hires.push(hire),
        }
    }
}

#[async_trait]
impl HireDirectory for MemoryHireDirectory {
    async fn get_hire(&self, id: &str) -> Result<Option<HireProfile>> {
        let hires = self.hires.read().await;
        Ok(hires.iter().find(|h| h.id == id).cloned())
    }

    async fn list_hires(&self, filter: &HireFilter) -> Result<Vec<HireProfile>> {
        let hires = self.hires.read().await;
        Ok(hires.iter().filter(|h| filter.matches(h)).cloned().collect())
    }
}

// ============================================================================
// Notifiers
// ============================================================================

/// Records delivered notifications; drops repeats of a dedup key
#[derive(Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Notification>>,
    seen_keys: Mutex<HashSet<String>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_to(&self, user_id: &str) -> Vec<Notification> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn clear(&self) {
        self.sent.lock().await.clear();
        self.seen_keys.lock().await.clear();
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        if let Some(key) = &notification.dedup_key {
            if !self.seen_keys.lock().await.insert(key.clone()) {
                debug!(dedup_key = %key, "Dropping duplicate notification");
                return Ok(());
            }
        }
        self.sent.lock().await.push(notification);
        Ok(())
    }
}

/// Writes notifications to the log; used by the scheduler binary
#[derive(Default)]
pub struct LogNotifier {
    seen_keys: Mutex<HashSet<String>>,
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        if let Some(key) = &notification.dedup_key {
            if !self.seen_keys.lock().await.insert(key.clone()) {
                return Ok(());
            }
        }
        info!(
            user_id = %notification.user_id,
            priority = %notification.priority,
            title = %notification.title,
            "{}",
            notification.message
        );
        Ok(())
    }
}
