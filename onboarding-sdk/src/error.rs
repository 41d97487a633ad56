//! Error taxonomy for engine operations.
//!
//! "No applicable template" and "partial bulk failure" are not errors: the
//! first is an empty `Option`, the second a per-hire report.

use std::fmt;

use crate::types::{TaskId, TaskStatus};

/// Kind of entity an id failed to resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Task,
    Hire,
    Template,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Task => "task",
            EntityKind::Hire => "hire",
            EntityKind::Template => "template",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("invalid template '{template_id}': {}", .issues.join("; "))]
    InvalidTemplate {
        template_id: String,
        issues: Vec<String>,
    },

    #[error("task {task_id} has {} incomplete dependencies", .pending.len())]
    DependenciesIncomplete { task_id: TaskId, pending: Vec<TaskId> },

    #[error("cannot {action} task {task_id} while it is {from}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskStatus,
        action: &'static str,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("collaborator call failed: {0:#}")]
    Collaborator(#[from] anyhow::Error),
}

impl EngineError {
    pub fn task_not_found(id: TaskId) -> Self {
        EngineError::NotFound {
            kind: EntityKind::Task,
            id: id.to_string(),
        }
    }

    pub fn hire_not_found(id: impl Into<String>) -> Self {
        EngineError::NotFound {
            kind: EntityKind::Hire,
            id: id.into(),
        }
    }

    pub fn template_not_found(id: impl Into<String>) -> Self {
        EngineError::NotFound {
            kind: EntityKind::Template,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound { .. })
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
