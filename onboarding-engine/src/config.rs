//! Engine configuration.
//!
//! Read from a YAML file (`--config`, or `config.yaml` in the platform config
//! directory). Missing fields take their defaults; command-line flags and
//! environment variables are applied on top by the binary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use onboarding_sdk::{AutomationRule, EngineError, EngineResult, RuleTrigger, TaskCategory};

fn default_scan_interval_secs() -> u64 {
    300
}

fn default_bulk_concurrency() -> usize {
    4
}

fn default_days_before_due() -> u32 {
    2
}

fn default_reset_extension_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between automation scans
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,

    /// Hires processed concurrently by bulk operations
    #[serde(default = "default_bulk_concurrency")]
    pub bulk_concurrency: usize,

    /// Deadline reminder lead time for rules that do not set one
    #[serde(default = "default_days_before_due")]
    pub default_days_before_due: u32,

    #[serde(default = "default_reset_extension_days")]
    pub reset_extension_days: u32,

    /// SQLite task database; platform data dir when unset
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// YAML template catalog; built-in templates when unset
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,

    /// YAML hire list for the standalone scheduler
    #[serde(default)]
    pub hires_path: Option<PathBuf>,

    #[serde(default = "default_rules")]
    pub rules: Vec<AutomationRule>,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval_secs(),
            bulk_concurrency: default_bulk_concurrency(),
            default_days_before_due: default_days_before_due(),
            reset_extension_days: default_reset_extension_days(),
            database_path: None,
            catalog_path: None,
            hires_path: None,
            rules: default_rules(),
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("Failed to parse config YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or from the default location when it exists.
    /// Falls back to defaults when no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.scan_interval_secs == 0 {
            return Err(EngineError::Config(
                "scan_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.bulk_concurrency == 0 {
            return Err(EngineError::Config(
                "bulk_concurrency must be greater than zero".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(EngineError::Config(format!("duplicate rule id: {}", rule.id)));
            }
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(default_database_path)
    }
}

/// `config.yaml` in the platform config directory
pub fn default_config_path() -> Option<PathBuf> {
    use directories::ProjectDirs;

    ProjectDirs::from("com", "onboarding", "onboarding-engine")
        .map(|dirs| dirs.config_dir().join("config.yaml"))
}

pub fn default_database_path() -> PathBuf {
    use directories::ProjectDirs;

    if let Some(proj_dirs) = ProjectDirs::from("com", "onboarding", "onboarding-engine") {
        proj_dirs.data_dir().join("tasks.db")
    } else {
        PathBuf::from(".onboarding-tasks.db")
    }
}

/// Rules used when the config file does not list any
pub fn default_rules() -> Vec<AutomationRule> {
    vec![
        AutomationRule {
            name: "Escalate overdue tasks".to_string(),
            ..AutomationRule::new("overdue-escalation", RuleTrigger::TaskOverdue)
                .notify()
                .escalate()
        },
        AutomationRule {
            name: "Deadline reminder".to_string(),
            ..AutomationRule::new("deadline-reminder", RuleTrigger::DeadlineApproaching)
                .notify()
                .days_before_due(default_days_before_due())
        },
        AutomationRule {
            name: "Verify setup".to_string(),
            ..AutomationRule::new("setup-follow-up", RuleTrigger::TaskCompleted)
                .for_category(TaskCategory::Setup)
                .assign_follow_up("Verify workstation access with IT")
        },
        AutomationRule {
            name: "Welcome new hire".to_string(),
            ..AutomationRule::new("welcome", RuleTrigger::UserCreated)
                .notify()
                .escalate()
        },
    ]
}
