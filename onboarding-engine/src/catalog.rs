//! Versioned template catalog.
//!
//! Templates move through `Draft → Published → Retired`. Published content
//! is immutable: editing a template means publishing a new version, so hires
//! that are mid-workflow keep referring to the version they were given.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::RwLock;
use tracing::{debug, info};

use onboarding_sdk::{
    async_trait, EngineError, EngineResult, Priority, TaskCategory, TaskTemplate,
    TemplateSource, WorkflowTemplate,
};

use crate::dependency::validate_template;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateState {
    Draft,
    Published,
    Retired,
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    template: WorkflowTemplate,
    state: TemplateState,
}

/// On-disk catalog layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub templates: Vec<WorkflowTemplate>,
}

/// In-memory template catalog; entries keep publication order
pub struct TemplateCatalog {
    inner: RwLock<Vec<CatalogEntry>>,
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Vec::new()),
        }
    }

    /// Catalog pre-loaded with the built-in templates
    pub fn with_builtin() -> EngineResult<Self> {
        let catalog = Self::new();
        for template in builtin_templates() {
            catalog.publish(template)?;
        }
        Ok(catalog)
    }

    /// Store a draft without validating it
    pub fn save_draft(&self, template: WorkflowTemplate) -> EngineResult<()> {
        let mut entries = self.write()?;
        if let Some(existing) = entries
            .iter_mut()
            .find(|e| e.template.id == template.id && e.template.version == template.version)
        {
            if existing.state != TemplateState::Draft {
                return Err(already_published(&template));
            }
            existing.template = template;
            return Ok(());
        }

        entries.push(CatalogEntry {
            template,
            state: TemplateState::Draft,
        });
        Ok(())
    }

    /// Validate and publish a template version
    pub fn publish(&self, template: WorkflowTemplate) -> EngineResult<()> {
        let issues = validate_template(&template);
        if !issues.is_empty() {
            return Err(EngineError::InvalidTemplate {
                template_id: template.id.clone(),
                issues: issues.iter().map(|i| i.to_string()).collect(),
            });
        }

        let mut entries = self.write()?;
        match entries
            .iter_mut()
            .find(|e| e.template.id == template.id && e.template.version == template.version)
        {
            Some(existing) if existing.state != TemplateState::Draft => {
                return Err(already_published(&template));
            }
            Some(existing) => {
                existing.template = template.clone();
                existing.state = TemplateState::Published;
            }
            None => entries.push(CatalogEntry {
                template: template.clone(),
                state: TemplateState::Published,
            }),
        }

        info!(
            template_id = %template.id,
            version = template.version,
            tasks = template.tasks.len(),
            "Published workflow template"
        );
        Ok(())
    }

    /// Published → Retired
    pub fn retire(&self, id: &str, version: u32) -> EngineResult<()> {
        let mut entries = self.write()?;
        let entry = entries
            .iter_mut()
            .find(|e| e.template.id == id && e.template.version == version)
            .ok_or_else(|| EngineError::template_not_found(format!("{}:v{}", id, version)))?;

        if entry.state != TemplateState::Published {
            return Err(EngineError::InvalidTemplate {
                template_id: id.to_string(),
                issues: vec![format!(
                    "cannot retire version {} in state {:?}",
                    version, entry.state
                )],
            });
        }

        entry.state = TemplateState::Retired;
        info!(template_id = %id, version, "Retired workflow template");
        Ok(())
    }

    pub fn state(&self, id: &str, version: u32) -> Option<TemplateState> {
        let entries = self.inner.read().ok()?;
        entries
            .iter()
            .find(|e| e.template.id == id && e.template.version == version)
            .map(|e| e.state)
    }

    /// Latest published version of a template
    pub fn get(&self, id: &str) -> EngineResult<WorkflowTemplate> {
        self.latest_published(id)?
            .ok_or_else(|| EngineError::template_not_found(id))
    }

    fn latest_published(&self, id: &str) -> EngineResult<Option<WorkflowTemplate>> {
        let entries = self.read()?;
        Ok(entries
            .iter()
            .filter(|e| e.template.id == id && e.state == TemplateState::Published)
            .max_by_key(|e| e.template.version)
            .map(|e| e.template.clone()))
    }

    /// Latest published, active version of every template, in the order
    /// each template id was first added to the catalog
    pub fn active_templates(&self) -> EngineResult<Vec<WorkflowTemplate>> {
        let entries = self.read()?;
        let mut seen: Vec<&str> = Vec::new();
        for entry in entries.iter() {
            if !seen.contains(&entry.template.id.as_str()) {
                seen.push(entry.template.id.as_str());
            }
        }

        let templates = seen
            .into_iter()
            .filter_map(|id| {
                entries
                    .iter()
                    .filter(|e| e.template.id == id && e.state == TemplateState::Published)
                    .max_by_key(|e| e.template.version)
            })
            .filter(|e| e.template.is_active)
            .map(|e| e.template.clone())
            .collect();
        Ok(templates)
    }

    /// Parse a YAML catalog document and publish every template in it
    pub fn load_yaml(&self, yaml: &str) -> Result<usize> {
        let file: CatalogFile =
            serde_yaml::from_str(yaml).context("Failed to parse template catalog YAML")?;

        let count = file.templates.len();
        for template in file.templates {
            let id = template.id.clone();
            self.publish(template)
                .with_context(|| format!("Failed to publish template '{}'", id))?;
        }

        debug!(count, "Loaded templates from YAML");
        Ok(count)
    }

    pub fn load_file(&self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file {}", path.display()))?;
        self.load_yaml(&content)
    }

    fn read(&self) -> EngineResult<std::sync::RwLockReadGuard<'_, Vec<CatalogEntry>>> {
        self.inner
            .read()
            .map_err(|e| EngineError::Collaborator(anyhow::anyhow!("Lock: {}", e)))
    }

    fn write(&self) -> EngineResult<std::sync::RwLockWriteGuard<'_, Vec<CatalogEntry>>> {
        self.inner
            .write()
            .map_err(|e| EngineError::Collaborator(anyhow::anyhow!("Lock: {}", e)))
    }
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn already_published(template: &WorkflowTemplate) -> EngineError {
    EngineError::InvalidTemplate {
        template_id: template.id.clone(),
        issues: vec![format!(
            "version {} is already published; publish a new version instead",
            template.version
        )],
    }
}

#[async_trait]
impl TemplateSource for TemplateCatalog {
    async fn list_active_templates(&self) -> Result<Vec<WorkflowTemplate>> {
        Ok(self.active_templates()?)
    }

    async fn get_template(&self, id: &str) -> Result<Option<WorkflowTemplate>> {
        Ok(self.latest_published(id)?)
    }
}

/// Default templates used when no catalog file is configured
pub fn builtin_templates() -> Vec<WorkflowTemplate> {
    let engineering = WorkflowTemplate {
        description: "Engineering staff: accounts, environment and codebase walkthrough".to_string(),
        ..WorkflowTemplate::new("engineering-onboarding", "Engineering Onboarding")
            .for_roles(&["staff"])
            .for_departments(&["Engineering"])
            .auto_triggered()
            .with_task(
                TaskTemplate::new("contract", "Sign employment contract", 0)
                    .with_category(TaskCategory::Documentation)
                    .with_priority(Priority::Critical)
                    .with_hours(0.5),
            )
            .with_task(
                TaskTemplate::new("laptop", "Laptop and accounts setup", 1)
                    .with_category(TaskCategory::Setup)
                    .with_priority(Priority::High)
                    .with_hours(2.0)
                    .depends_on(&["contract"]),
            )
            .with_task(
                TaskTemplate::new("dev-env", "Development environment setup", 2)
                    .with_category(TaskCategory::Setup)
                    .with_priority(Priority::High)
                    .with_hours(4.0)
                    .depends_on(&["laptop"]),
            )
            .with_task(
                TaskTemplate::new("security", "Security awareness training", 5)
                    .with_category(TaskCategory::Training)
                    .with_hours(1.5),
            )
            .with_task(
                TaskTemplate::new("walkthrough", "Codebase walkthrough with mentor", 7)
                    .with_category(TaskCategory::Meeting)
                    .with_hours(2.0)
                    .depends_on(&["dev-env"]),
            )
    };

    let intern = WorkflowTemplate {
        description: "Interns: paperwork, buddy introduction and training".to_string(),
        ..WorkflowTemplate::new("intern-onboarding", "Intern Onboarding")
            .for_roles(&["intern"])
            .auto_triggered()
            .with_task(
                TaskTemplate::new("agreement", "Sign internship agreement", 0)
                    .with_category(TaskCategory::Documentation)
                    .with_priority(Priority::Critical)
                    .with_hours(0.5),
            )
            .with_task(
                TaskTemplate::new("buddy", "Meet your onboarding buddy", 1)
                    .with_category(TaskCategory::Meeting)
                    .with_hours(1.0),
            )
            .with_task(
                TaskTemplate::new("training", "Complete intern training track", 10)
                    .with_category(TaskCategory::Training)
                    .with_hours(6.0)
                    .depends_on(&["agreement"]),
            )
    };

    let full = WorkflowTemplate {
        description: "Company-wide onboarding for staff and interns".to_string(),
        ..WorkflowTemplate::new("full-onboarding", "Full Onboarding")
            .for_roles(&["staff", "intern"])
            .auto_triggered()
            .with_task(
                TaskTemplate::new("paperwork", "Complete HR paperwork", 0)
                    .with_category(TaskCategory::Documentation)
                    .with_priority(Priority::High)
                    .with_hours(1.0),
            )
            .with_task(
                TaskTemplate::new("orientation", "Attend company orientation", 1)
                    .with_category(TaskCategory::Meeting)
                    .with_hours(3.0),
            )
            .with_task(
                TaskTemplate::new("handbook", "Read the employee handbook", 3)
                    .with_category(TaskCategory::Training)
                    .with_priority(Priority::Low)
                    .with_hours(2.0)
                    .depends_on(&["paperwork"]),
            )
            .with_task(
                TaskTemplate::new("check-in", "First week check-in with manager", 5)
                    .with_category(TaskCategory::Meeting)
                    .with_hours(0.5)
                    .depends_on(&["orientation"]),
            )
    };

    vec![engineering, intern, full]
}
