//! Dependency analysis over a template's task list.
//!
//! This module provides functions for:
//! - Layering task templates into dependency levels
//! - Detecting dependency cycles
//! - Structural validation of a template before it is published

use std::collections::{HashMap, HashSet};
use std::fmt;

use onboarding_sdk::{TaskTemplate, WorkflowTemplate};

/// Task templates grouped so that every task only depends on earlier layers
#[derive(Debug, Clone)]
pub struct DependencyLayers<'a> {
    pub layers: Vec<Vec<&'a TaskTemplate>>,
    /// Tasks that could never be scheduled (cycles or unknown references)
    pub unresolved: Vec<&'a TaskTemplate>,
}

impl DependencyLayers<'_> {
    pub fn is_acyclic(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// Longest dependency chain, in tasks
    pub fn depth(&self) -> usize {
        self.layers.len()
    }
}

/// Build dependency layers for a list of task templates
pub fn build_dependency_layers(tasks: &[TaskTemplate]) -> DependencyLayers<'_> {
    let mut scheduled: HashSet<&str> = HashSet::new();
    let mut layers = Vec::new();

    while scheduled.len() < tasks.len() {
        // Only look at dependencies satisfied by earlier layers
        let current: Vec<&TaskTemplate> = tasks
            .iter()
            .filter(|t| !scheduled.contains(t.id.as_str()))
            .filter(|t| {
                t.dependencies
                    .iter()
                    .all(|dep| scheduled.contains(dep.as_str()))
            })
            .collect();

        if current.is_empty() {
            break;
        }

        for task in &current {
            scheduled.insert(task.id.as_str());
        }
        layers.push(current);
    }

    let unresolved = tasks
        .iter()
        .filter(|t| !scheduled.contains(t.id.as_str()))
        .collect();

    DependencyLayers { layers, unresolved }
}

/// A single problem found while validating a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub rule: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.rule, self.message)
    }
}

fn issue(rule: &'static str, message: String) -> ValidationIssue {
    ValidationIssue { rule, message }
}

/// Validate a template before publishing. Returns all issues found.
pub fn validate_template(template: &WorkflowTemplate) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if template.id.trim().is_empty() {
        issues.push(issue("T1", "template id is empty".to_string()));
    }
    if template.version == 0 {
        issues.push(issue("T2", "template version must be at least 1".to_string()));
    }

    // Task ids must be unique and non-empty
    let mut by_id: HashMap<&str, &TaskTemplate> = HashMap::new();
    for task in &template.tasks {
        if task.id.trim().is_empty() {
            issues.push(issue("T3", format!("task '{}' has an empty id", task.title)));
            continue;
        }
        if by_id.insert(task.id.as_str(), task).is_some() {
            issues.push(issue("T3", format!("duplicate task id: {}", task.id)));
        }
    }

    for task in &template.tasks {
        if !(task.estimated_hours.is_finite() && task.estimated_hours > 0.0) {
            issues.push(issue(
                "T4",
                format!(
                    "task {} has non-positive estimated hours: {}",
                    task.id, task.estimated_hours
                ),
            ));
        }

        for dep in &task.dependencies {
            if dep == &task.id {
                issues.push(issue("T5", format!("task {} depends on itself", task.id)));
            } else if !by_id.contains_key(dep.as_str()) {
                issues.push(issue(
                    "T6",
                    format!("task {} depends on unknown task {}", task.id, dep),
                ));
            }
        }
    }

    // Cycles only make sense once references resolve
    if issues.iter().all(|i| i.rule != "T5" && i.rule != "T6") {
        let analysis = build_dependency_layers(&template.tasks);
        if !analysis.is_acyclic() {
            let ids: Vec<&str> = analysis.unresolved.iter().map(|t| t.id.as_str()).collect();
            issues.push(issue(
                "T7",
                format!("dependency cycle among tasks: {}", ids.join(", ")),
            ));
        }
    }

    issues
}
