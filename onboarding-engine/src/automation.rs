//! Automation rules: overdue escalation, deadline reminders, completion
//! follow-ups and new-hire welcome.
//!
//! Time-based rules run from [`AutomationEngine::scan`]; event rules run
//! from [`AutomationEngine::on_task_completed`] and
//! [`AutomationEngine::on_hire_created`]. An action that fails is logged and
//! counted, and the remaining actions and rules still run.
//!
//! Scans are safe to repeat back to back. Overdue side effects only run for
//! the call that actually moved the task to `overdue`. A deadline rule fires
//! once per task while the task stays inside its reminder window; the dedup
//! key on the reminder covers repeats across process restarts.
//!
//! Every completion made by the engine goes through
//! [`AutomationEngine::complete_task`], so `task_completed` rules see
//! completions from bulk operations and from other rules too.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use onboarding_sdk::{
    AutomationRule, EngineError, EngineEvent, EngineResult, HireDirectory, HireProfile,
    Notification, Notifier, Priority, RuleTrigger, TaskCategory, TaskId, TaskInstance,
    TaskStatus, TemplateSource,
};

use crate::lifecycle::{AppliedWorkflow, LifecycleManager, TransitionOutcome};
use crate::targeting::select_auto_trigger_template;

/// `template_id` given to tasks created by rules
pub const AUTOMATION_SOURCE: &str = "automation";
/// Actor recorded on automated changes
pub const AUTOMATION_ACTOR: &str = "automation";

/// Counters for one scan or one event hook
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub rules_evaluated: usize,
    pub tasks_examined: usize,
    pub overdue_marked: usize,
    /// Actions that ran; a reminder already sent in its window is not rerun
    pub actions_fired: usize,
    pub failures: usize,
}

impl ScanReport {
    fn merge(&mut self, other: ScanReport) {
        self.rules_evaluated += other.rules_evaluated;
        self.tasks_examined += other.tasks_examined;
        self.overdue_marked += other.overdue_marked;
        self.actions_fired += other.actions_fired;
        self.failures += other.failures;
    }
}

/// What a rule is firing about
struct RuleContext<'a> {
    hire_id: &'a str,
    hire: Option<&'a HireProfile>,
    task: Option<&'a TaskInstance>,
    days_before_due: Option<u32>,
}

impl RuleContext<'_> {
    fn hire_name(&self) -> &str {
        self.hire.map_or(self.hire_id, |h| h.display_name())
    }

    fn task_title(&self) -> &str {
        self.task.map_or("", |t| t.title.as_str())
    }

    fn due(&self) -> String {
        self.task
            .map(|t| t.due_date.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    }
}

pub struct AutomationEngine {
    lifecycle: Arc<LifecycleManager>,
    directory: Arc<dyn HireDirectory>,
    notifier: Arc<dyn Notifier>,
    templates: Arc<dyn TemplateSource>,
    rules: Vec<AutomationRule>,
    default_days_before_due: u32,
    /// Per deadline rule, tasks already reminded in their current window
    reminded: Mutex<HashMap<String, HashSet<TaskId>>>,
}

impl AutomationEngine {
    pub fn new(
        lifecycle: Arc<LifecycleManager>,
        directory: Arc<dyn HireDirectory>,
        notifier: Arc<dyn Notifier>,
        templates: Arc<dyn TemplateSource>,
        rules: Vec<AutomationRule>,
    ) -> Self {
        Self {
            lifecycle,
            directory,
            notifier,
            templates,
            rules,
            default_days_before_due: 2,
            reminded: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_default_days_before_due(mut self, days: u32) -> Self {
        self.default_days_before_due = days;
        self
    }

    pub fn rules(&self) -> &[AutomationRule] {
        &self.rules
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    /// Complete a task, then run `task_completed` rules if this call
    /// completed it.
    ///
    /// Boxed because rules may complete tasks themselves.
    pub fn complete_task<'a>(
        &'a self,
        task_id: TaskId,
        actor: &'a str,
        note: Option<&'a str>,
    ) -> BoxFuture<'a, EngineResult<TransitionOutcome>> {
        Box::pin(async move {
            let outcome = self.lifecycle.complete(task_id, actor, note).await?;
            if outcome.changed {
                self.on_task_completed(&outcome.task).await;
            }
            Ok(outcome)
        })
    }

    fn active_rules(&self, trigger: RuleTrigger) -> impl Iterator<Item = &AutomationRule> {
        self.rules
            .iter()
            .filter(move |r| r.is_active && r.trigger == trigger)
    }

    /// One pass over every time-based rule
    pub async fn scan(&self) -> EngineResult<ScanReport> {
        let now = self.lifecycle.now();
        let tasks = self.lifecycle.store().list_all_active_tasks().await?;
        let mut hires = HireCache::default();
        let mut report = ScanReport {
            tasks_examined: tasks.len(),
            ..Default::default()
        };

        for rule in self.rules.iter().filter(|r| r.is_active) {
            match rule.trigger {
                RuleTrigger::TaskOverdue => {
                    report.rules_evaluated += 1;
                    let run = self.run_overdue_rule(rule, &tasks, now, &mut hires).await;
                    report.merge(run);
                }
                RuleTrigger::DeadlineApproaching => {
                    report.rules_evaluated += 1;
                    let run = self.run_deadline_rule(rule, &tasks, now, &mut hires).await;
                    report.merge(run);
                }
                // Event driven
                RuleTrigger::TaskCompleted | RuleTrigger::UserCreated => {}
            }
        }

        self.lifecycle.events().publish(EngineEvent::ScanCompleted {
            rules_evaluated: report.rules_evaluated,
            actions_fired: report.actions_fired,
            failures: report.failures,
        });
        Ok(report)
    }

    async fn run_overdue_rule(
        &self,
        rule: &AutomationRule,
        tasks: &[TaskInstance],
        now: DateTime<Utc>,
        hires: &mut HireCache,
    ) -> ScanReport {
        let mut report = ScanReport::default();
        let candidates = tasks.iter().filter(|t| {
            matches!(t.status, TaskStatus::Pending | TaskStatus::Active) && t.is_past_due(now)
        });

        for task in candidates {
            let hire = match hires.get(self.directory.as_ref(), &task.hire_id).await {
                Ok(hire) => hire,
                Err(e) => {
                    self.record_failure(rule, Some(task), "load_hire", &e, &mut report);
                    continue;
                }
            };
            if !conditions_match(rule, Some(task.category), hire.as_ref()) {
                continue;
            }

            let outcome = match self.lifecycle.mark_overdue(task.id).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.record_failure(rule, Some(task), "mark_overdue", &e, &mut report);
                    continue;
                }
            };
            // Another rule or scan got there first
            if !outcome.changed {
                continue;
            }
            report.overdue_marked += 1;

            let ctx = RuleContext {
                hire_id: &task.hire_id,
                hire: hire.as_ref(),
                task: Some(&outcome.task),
                days_before_due: None,
            };
            self.run_actions(rule, &ctx, &mut report).await;
        }

        report
    }

    async fn run_deadline_rule(
        &self,
        rule: &AutomationRule,
        tasks: &[TaskInstance],
        now: DateTime<Utc>,
        hires: &mut HireCache,
    ) -> ScanReport {
        let mut report = ScanReport::default();
        let days = rule
            .conditions
            .days_before_due
            .unwrap_or(self.default_days_before_due);

        let candidates = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending && days_until(t.due_date, now) == i64::from(days));

        let mut reminded = self.reminded.lock().await;
        let previous = reminded.remove(&rule.id).unwrap_or_default();
        let mut in_window = HashSet::new();

        for task in candidates {
            let hire = match hires.get(self.directory.as_ref(), &task.hire_id).await {
                Ok(hire) => hire,
                Err(e) => {
                    self.record_failure(rule, Some(task), "load_hire", &e, &mut report);
                    continue;
                }
            };
            if !conditions_match(rule, Some(task.category), hire.as_ref()) {
                continue;
            }

            if previous.contains(&task.id) {
                in_window.insert(task.id);
                continue;
            }

            debug!(rule_id = %rule.id, task_id = %task.id, days, "Deadline approaching");
            let ctx = RuleContext {
                hire_id: &task.hire_id,
                hire: hire.as_ref(),
                task: Some(task),
                days_before_due: Some(days),
            };
            let failures = report.failures;
            self.run_actions(rule, &ctx, &mut report).await;
            // Failed reminders are retried on the next scan
            if report.failures == failures {
                in_window.insert(task.id);
            }
        }

        // Tasks that left the window are forgotten
        reminded.insert(rule.id.clone(), in_window);
        report
    }

    /// Run `task_completed` rules for a task that just completed
    pub async fn on_task_completed(&self, task: &TaskInstance) -> ScanReport {
        let mut report = ScanReport::default();
        let mut hires = HireCache::default();

        for rule in self.active_rules(RuleTrigger::TaskCompleted) {
            report.rules_evaluated += 1;
            let hire = match hires.get(self.directory.as_ref(), &task.hire_id).await {
                Ok(hire) => hire,
                Err(e) => {
                    self.record_failure(rule, Some(task), "load_hire", &e, &mut report);
                    continue;
                }
            };
            if !conditions_match(rule, Some(task.category), hire.as_ref()) {
                continue;
            }

            let ctx = RuleContext {
                hire_id: &task.hire_id,
                hire: hire.as_ref(),
                task: Some(task),
                days_before_due: None,
            };
            self.run_actions(rule, &ctx, &mut report).await;
        }

        report
    }

    /// Apply the best auto-trigger template to a new hire, then run
    /// `user_created` rules. Returns `None` when no template applies.
    pub async fn on_hire_created(
        &self,
        hire_id: &str,
    ) -> EngineResult<(Option<AppliedWorkflow>, ScanReport)> {
        let hire = self
            .directory
            .get_hire(hire_id)
            .await?
            .ok_or_else(|| EngineError::hire_not_found(hire_id))?;

        let catalog = self.templates.list_active_templates().await?;
        let applied = match select_auto_trigger_template(&hire, &catalog) {
            Some(template) => Some(
                self.lifecycle
                    .apply_template(&hire, template, AUTOMATION_ACTOR)
                    .await?,
            ),
            None => {
                info!(hire_id = %hire_id, role = %hire.role, department = %hire.department,
                    "No auto-trigger workflow applies");
                None
            }
        };

        let mut report = ScanReport::default();
        for rule in self.active_rules(RuleTrigger::UserCreated) {
            report.rules_evaluated += 1;
            if !conditions_match(rule, None, Some(&hire)) {
                continue;
            }
            let ctx = RuleContext {
                hire_id: &hire.id,
                hire: Some(&hire),
                task: None,
                days_before_due: None,
            };
            self.run_actions(rule, &ctx, &mut report).await;
        }

        Ok((applied, report))
    }

    async fn run_actions(&self, rule: &AutomationRule, ctx: &RuleContext<'_>, report: &mut ScanReport) {
        let actions = &rule.actions;

        if actions.send_notification {
            let result = self
                .notifier
                .notify(hire_notification(rule.trigger, ctx))
                .await
                .map_err(EngineError::from);
            self.record(rule, ctx.task, "send_notification", result, report);
        }

        if actions.escalate_to_manager {
            match ctx.hire.and_then(|h| h.manager_id.as_deref()) {
                Some(manager_id) => {
                    let result = self
                        .notifier
                        .notify(manager_notification(rule.trigger, manager_id, ctx))
                        .await
                        .map_err(EngineError::from);
                    self.record(rule, ctx.task, "escalate_to_manager", result, report);
                }
                None => warn!(
                    rule_id = %rule.id,
                    hire_id = %ctx.hire_id,
                    "No manager to escalate to"
                ),
            }
        }

        if let Some(title) = &actions.assign_task {
            if ctx.task.map_or(false, is_follow_up) {
                debug!(rule_id = %rule.id, hire_id = %ctx.hire_id, "Follow-up tasks do not get follow-ups");
            } else {
                let source = ctx
                    .task
                    .map_or_else(|| ctx.hire_id.to_string(), |t| t.id.to_string());
                let follow_up = follow_up_task(rule, title, ctx, &source, self.lifecycle.now());
                let result = self.lifecycle.add_task(follow_up).await.map(|_| ());
                self.record(rule, ctx.task, "assign_task", result, report);
            }
        }

        if let (Some(status), Some(task)) = (actions.update_status, ctx.task) {
            let result = self.apply_status(task, status).await;
            self.record(rule, ctx.task, "update_status", result, report);
        }
    }

    async fn apply_status(&self, task: &TaskInstance, status: TaskStatus) -> EngineResult<()> {
        match status {
            TaskStatus::Active => self.lifecycle.activate(task.id).await.map(|_| ()),
            TaskStatus::Completed => self
                .complete_task(task.id, AUTOMATION_ACTOR, None)
                .await
                .map(|_| ()),
            TaskStatus::Overdue => self.lifecycle.mark_overdue(task.id).await.map(|_| ()),
            TaskStatus::Pending => {
                warn!(task_id = %task.id, "Rules cannot move tasks back to pending; use reset");
                Ok(())
            }
        }
    }

    fn record(
        &self,
        rule: &AutomationRule,
        task: Option<&TaskInstance>,
        action: &str,
        result: EngineResult<()>,
        report: &mut ScanReport,
    ) {
        match result {
            Ok(()) => {
                report.actions_fired += 1;
                self.lifecycle.events().publish(EngineEvent::RuleFired {
                    rule_id: rule.id.clone(),
                    trigger: rule.trigger,
                    task_id: task.map(|t| t.id),
                    action: action.to_string(),
                });
            }
            Err(e) => self.record_failure(rule, task, action, &e, report),
        }
    }

    fn record_failure(
        &self,
        rule: &AutomationRule,
        task: Option<&TaskInstance>,
        action: &str,
        error: &EngineError,
        report: &mut ScanReport,
    ) {
        report.failures += 1;
        self.lifecycle.events().publish(EngineEvent::ActionFailed {
            rule_id: rule.id.clone(),
            task_id: task.map(|t| t.id),
            error: format!("{}: {}", action, error),
        });
    }
}

/// Hire profiles looked up during one scan
#[derive(Default)]
struct HireCache {
    hires: HashMap<String, Option<HireProfile>>,
}

impl HireCache {
    async fn get(
        &mut self,
        directory: &dyn HireDirectory,
        hire_id: &str,
    ) -> EngineResult<Option<HireProfile>> {
        if let Some(hire) = self.hires.get(hire_id) {
            return Ok(hire.clone());
        }
        let hire = directory.get_hire(hire_id).await?;
        self.hires.insert(hire_id.to_string(), hire.clone());
        Ok(hire)
    }
}

/// Category and role filters. A role filter never matches an unknown hire.
fn conditions_match(
    rule: &AutomationRule,
    category: Option<TaskCategory>,
    hire: Option<&HireProfile>,
) -> bool {
    let conditions = &rule.conditions;
    if let Some(wanted) = conditions.task_category {
        if category != Some(wanted) {
            return false;
        }
    }
    if let Some(role) = &conditions.role {
        return hire.map_or(false, |h| h.role.eq_ignore_ascii_case(role));
    }
    true
}

/// Whole days until `due`, rounded to the nearest day
pub fn days_until(due: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (due - now).num_seconds() as f64;
    (seconds / 86_400.0).round() as i64
}

fn hire_notification(trigger: RuleTrigger, ctx: &RuleContext<'_>) -> Notification {
    match trigger {
        RuleTrigger::TaskOverdue => Notification::new(
            ctx.hire_id,
            "Task overdue",
            format!("'{}' was due on {}.", ctx.task_title(), ctx.due()),
            Priority::High,
        ),
        RuleTrigger::DeadlineApproaching => {
            let days = ctx.days_before_due.unwrap_or_default();
            let mut notification = Notification::new(
                ctx.hire_id,
                "Upcoming deadline",
                format!(
                    "'{}' is due in {} day(s), on {}.",
                    ctx.task_title(),
                    days,
                    ctx.due()
                ),
                ctx.task.map_or(Priority::Medium, |t| t.priority),
            );
            if let Some(task) = ctx.task {
                notification = notification.with_dedup_key(format!("deadline:{}:{}", task.id, days));
            }
            notification
        }
        RuleTrigger::TaskCompleted => Notification::new(
            ctx.hire_id,
            "Task completed",
            format!("'{}' has been completed.", ctx.task_title()),
            Priority::Low,
        ),
        RuleTrigger::UserCreated => Notification::new(
            ctx.hire_id,
            "Welcome aboard",
            format!(
                "Welcome {}! Your onboarding tasks are ready in the portal.",
                ctx.hire_name()
            ),
            Priority::Medium,
        ),
    }
}

fn manager_notification(trigger: RuleTrigger, manager_id: &str, ctx: &RuleContext<'_>) -> Notification {
    let name = ctx.hire_name();
    match trigger {
        RuleTrigger::TaskOverdue => Notification::new(
            manager_id,
            "Overdue onboarding task",
            format!("{}'s task '{}' is overdue (due {}).", name, ctx.task_title(), ctx.due()),
            Priority::High,
        ),
        RuleTrigger::DeadlineApproaching => {
            let mut notification = Notification::new(
                manager_id,
                "Onboarding deadline approaching",
                format!("{}'s task '{}' is due on {}.", name, ctx.task_title(), ctx.due()),
                Priority::Medium,
            );
            if let Some(task) = ctx.task {
                notification = notification.with_dedup_key(format!(
                    "deadline-escalation:{}:{}",
                    task.id,
                    ctx.days_before_due.unwrap_or_default()
                ));
            }
            notification
        }
        RuleTrigger::TaskCompleted => Notification::new(
            manager_id,
            "Onboarding task completed",
            format!("{} completed '{}'.", name, ctx.task_title()),
            Priority::Low,
        ),
        RuleTrigger::UserCreated => Notification::new(
            manager_id,
            "New hire",
            match ctx.hire {
                Some(hire) => format!("{} has joined {} as {}.", name, hire.department, hire.role),
                None => format!("{} has joined.", name),
            },
            Priority::Medium,
        ),
    }
}

fn is_follow_up(task: &TaskInstance) -> bool {
    task.template_id.as_deref() == Some(AUTOMATION_SOURCE)
}

/// Minimal follow-up task, due immediately, deduplicated per rule and source
fn follow_up_task(
    rule: &AutomationRule,
    title: &str,
    ctx: &RuleContext<'_>,
    source: &str,
    now: DateTime<Utc>,
) -> TaskInstance {
    TaskInstance {
        id: Uuid::new_v4(),
        hire_id: ctx.hire_id.to_string(),
        template_id: Some(AUTOMATION_SOURCE.to_string()),
        template_version: None,
        template_task_id: Some(format!("followup:{}:{}", rule.id, source)),
        title: title.to_string(),
        description: match ctx.task {
            Some(task) => format!("Follow-up to '{}'", task.title),
            None => String::new(),
        },
        category: ctx.task.map_or(TaskCategory::Other, |t| t.category),
        priority: ctx.task.map_or(Priority::Medium, |t| t.priority),
        status: TaskStatus::Pending,
        due_date: now,
        completed_date: None,
        assigned_by: AUTOMATION_ACTOR.to_string(),
        notes: format!("Created by automation rule '{}'.", rule.name),
        depends_on: Vec::new(),
        created_at: now,
    }
}
