//! Structured events emitted by the engine.
//!
//! Every event is logged through `tracing` and, when an [`EventBus`] is in
//! use, broadcast to subscribers (audit trails, dashboards, tests).

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{RuleTrigger, TaskId, TaskStatus};

/// Structured engine events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Template applied to a hire
    WorkflowApplied {
        hire_id: String,
        template_id: String,
        template_version: u32,
        tasks_created: usize,
        tasks_skipped: usize,
    },
    /// Task instance persisted
    TaskCreated {
        task_id: TaskId,
        hire_id: String,
        title: String,
    },
    /// Task moved between states
    TaskTransitioned {
        task_id: TaskId,
        hire_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
    /// Task removed by an administrator
    TaskRemoved { task_id: TaskId, hire_id: String },
    /// Aggregate progress recomputed
    ProgressUpdated {
        hire_id: String,
        percent: u8,
        completed: usize,
        total: usize,
    },
    /// Hire reached 100%
    WorkflowFinished { hire_id: String },
    /// Automation rule performed an action
    RuleFired {
        rule_id: String,
        trigger: RuleTrigger,
        task_id: Option<TaskId>,
        action: String,
    },
    /// Automation action failed; the scan carried on
    ActionFailed {
        rule_id: String,
        task_id: Option<TaskId>,
        error: String,
    },
    /// Automation scan finished
    ScanCompleted {
        rules_evaluated: usize,
        actions_fired: usize,
        failures: usize,
    },
}

impl EngineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::WorkflowApplied { .. } => "workflow_applied",
            EngineEvent::TaskCreated { .. } => "task_created",
            EngineEvent::TaskTransitioned { .. } => "task_transitioned",
            EngineEvent::TaskRemoved { .. } => "task_removed",
            EngineEvent::ProgressUpdated { .. } => "progress_updated",
            EngineEvent::WorkflowFinished { .. } => "workflow_finished",
            EngineEvent::RuleFired { .. } => "rule_fired",
            EngineEvent::ActionFailed { .. } => "action_failed",
            EngineEvent::ScanCompleted { .. } => "scan_completed",
        }
    }

    /// Log this event under the `onboarding::events` target
    pub fn emit(&self) {
        let payload = serde_json::to_string(self).unwrap_or_default();
        match self {
            EngineEvent::ActionFailed { .. } => {
                tracing::warn!(target: "onboarding::events", kind = self.kind(), %payload)
            }
            EngineEvent::ProgressUpdated { .. } => {
                tracing::debug!(target: "onboarding::events", kind = self.kind(), %payload)
            }
            _ => tracing::info!(target: "onboarding::events", kind = self.kind(), %payload),
        }
    }
}

/// Fan-out channel for engine events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Log the event and hand it to current subscribers
    pub fn publish(&self, event: EngineEvent) {
        event.emit();
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}
