//! Tests for automation scans and event-driven rules

use super::common::*;
use chrono::{Duration, NaiveTime, TimeZone, Utc};
use onboarding_engine::automation::AUTOMATION_SOURCE;
use onboarding_engine::{builtin_templates, TickOutcome};
use onboarding_sdk::{
    AutomationRule, EngineEvent, RuleTrigger, TaskCategory, TaskStatus, TaskTemplate,
    WorkflowTemplate,
};

fn overdue_escalation() -> AutomationRule {
    AutomationRule::new("overdue-escalation", RuleTrigger::TaskOverdue)
        .notify()
        .escalate()
}

fn deadline_reminder(days: u32) -> AutomationRule {
    AutomationRule::new("deadline-reminder", RuleTrigger::DeadlineApproaching)
        .notify()
        .days_before_due(days)
}

fn verify_setup() -> AutomationRule {
    AutomationRule::new("verify-setup", RuleTrigger::TaskCompleted)
        .for_category(TaskCategory::Setup)
        .assign_follow_up("Verify workstation access")
}

fn setup_template() -> WorkflowTemplate {
    WorkflowTemplate::new("setup", "Setup")
        .with_task(TaskTemplate::new("laptop", "Laptop", 0).with_category(TaskCategory::Setup))
        .with_task(TaskTemplate::new("reading", "Reading", 3).with_category(TaskCategory::Training))
}

/// Clock at midnight of the hires' start date
fn at_start_of_day(h: &Harness) {
    h.clock
        .set(Utc.from_utc_datetime(&date(2024, 1, 1).and_time(NaiveTime::MIN)));
}

// ============================================================================
// Deadline Reminders
// ============================================================================

#[tokio::test]
async fn test_deadline_reminder_fires_once_across_scans() {
    let h = harness(
        vec![staff_engineer("h1")],
        vec![four_task_template()],
        vec![deadline_reminder(2)],
    );
    at_start_of_day(&h);
    h.engine
        .apply_workflow("h1", Some("four"), "admin")
        .await
        .unwrap();

    // t3 is due exactly two days out
    let report = h.engine.scan().await.unwrap();
    assert_eq!(report.rules_evaluated, 1);
    assert_eq!(report.actions_fired, 1);

    // Still inside the window: nothing fires again
    let report = h.engine.scan().await.unwrap();
    assert_eq!(report.actions_fired, 0);
    h.clock.advance(Duration::hours(1));
    let report = h.engine.scan().await.unwrap();
    assert_eq!(report.actions_fired, 0);

    let sent = h.notifier.sent_to("h1").await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].title, "Upcoming deadline");
    assert!(sent[0].message.contains("'Third'"));
    assert!(sent[0].message.contains("2024-01-03"));

    let t3 = h.task("h1", "t3").await;
    assert_eq!(
        sent[0].dedup_key.as_deref(),
        Some(format!("deadline:{}:2", t3.id).as_str())
    );
}

#[tokio::test]
async fn test_deadline_rule_uses_default_lead_time() {
    let rule = AutomationRule::new("reminder", RuleTrigger::DeadlineApproaching).notify();
    let h = harness(vec![staff_engineer("h1")], vec![four_task_template()], vec![rule]);
    at_start_of_day(&h);
    h.engine
        .apply_workflow("h1", Some("four"), "admin")
        .await
        .unwrap();

    h.engine.scan().await.unwrap();
    let sent = h.notifier.sent_to("h1").await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].message.contains("'Third'"));
}

#[tokio::test]
async fn test_deadline_rule_can_activate_task() {
    let rule = AutomationRule {
        actions: onboarding_sdk::RuleActions {
            update_status: Some(TaskStatus::Active),
            ..Default::default()
        },
        ..deadline_reminder(2)
    };
    let h = harness(vec![staff_engineer("h1")], vec![four_task_template()], vec![rule]);
    at_start_of_day(&h);
    h.engine
        .apply_workflow("h1", Some("four"), "admin")
        .await
        .unwrap();

    h.engine.scan().await.unwrap();
    assert_eq!(h.task("h1", "t3").await.status, TaskStatus::Active);
    assert_eq!(h.task("h1", "t4").await.status, TaskStatus::Pending);
    assert!(h.notifier.sent().await.is_empty());
}

// ============================================================================
// Overdue Escalation
// ============================================================================

#[tokio::test]
async fn test_overdue_escalation_fires_once() {
    let h = harness(
        vec![staff_engineer("h1")],
        vec![four_task_template()],
        vec![overdue_escalation()],
    );
    h.engine
        .apply_workflow("h1", Some("four"), "admin")
        .await
        .unwrap();

    // 2024-01-02 09:00: t1 and t2 are past due
    h.clock.advance(Duration::days(1));
    let report = h.engine.scan().await.unwrap();
    assert_eq!(report.overdue_marked, 2);
    assert_eq!(report.actions_fired, 4);

    let report = h.engine.scan().await.unwrap();
    assert_eq!(report.overdue_marked, 0);
    assert_eq!(report.actions_fired, 0);

    assert_eq!(h.task("h1", "t1").await.status, TaskStatus::Overdue);
    assert_eq!(h.task("h1", "t3").await.status, TaskStatus::Pending);

    let to_hire = h.notifier.sent_to("h1").await;
    let to_manager = h.notifier.sent_to("mgr-1").await;
    assert_eq!(to_hire.len(), 2);
    assert_eq!(to_manager.len(), 2);
    assert!(to_manager[0].message.starts_with("Engineer h1's task"));
}

#[tokio::test]
async fn test_first_overdue_rule_wins() {
    let second = AutomationRule::new("overdue-notify", RuleTrigger::TaskOverdue).notify();
    let h = harness(
        vec![staff_engineer("h1")],
        vec![four_task_template()],
        vec![overdue_escalation(), second],
    );
    h.engine
        .apply_workflow("h1", Some("four"), "admin")
        .await
        .unwrap();
    let mut events = h.engine.subscribe();

    h.clock.advance(Duration::hours(12));
    let report = h.engine.scan().await.unwrap();
    assert_eq!(report.rules_evaluated, 2);
    assert_eq!(report.overdue_marked, 1);

    let mut fired_by = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let EngineEvent::RuleFired { rule_id, .. } = event {
            fired_by.push(rule_id);
        }
    }
    assert!(!fired_by.is_empty());
    assert!(fired_by.iter().all(|id| id == "overdue-escalation"));
}

#[tokio::test]
async fn test_escalation_without_manager_only_notifies_hire() {
    let h = harness(vec![intern("i1")], vec![four_task_template()], vec![overdue_escalation()]);
    h.engine
        .apply_workflow("i1", Some("four"), "admin")
        .await
        .unwrap();

    h.clock.advance(Duration::hours(12));
    let report = h.engine.scan().await.unwrap();

    assert_eq!(report.overdue_marked, 1);
    assert_eq!(report.actions_fired, 1);
    assert_eq!(report.failures, 0);
    assert_eq!(h.notifier.sent().await.len(), 1);
}

#[tokio::test]
async fn test_role_condition_limits_overdue_rule() {
    let rule = overdue_escalation().for_role("intern");
    let h = harness(
        vec![staff_engineer("h1"), intern("i1")],
        vec![four_task_template()],
        vec![rule],
    );
    for hire in ["h1", "i1"] {
        h.engine
            .apply_workflow(hire, Some("four"), "admin")
            .await
            .unwrap();
    }

    h.clock.advance(Duration::hours(12));
    let report = h.engine.scan().await.unwrap();

    assert_eq!(report.overdue_marked, 1);
    assert_eq!(h.task("i1", "t1").await.status, TaskStatus::Overdue);
    assert_eq!(h.task("h1", "t1").await.status, TaskStatus::Pending);
}

// ============================================================================
// Event Rules
// ============================================================================

#[tokio::test]
async fn test_completion_follow_up_is_not_duplicated() {
    let h = harness(vec![staff_engineer("h1")], vec![setup_template()], vec![verify_setup()]);
    h.engine
        .apply_workflow("h1", Some("setup"), "admin")
        .await
        .unwrap();

    let laptop = h.task("h1", "laptop").await;
    h.engine.complete_task(laptop.id, "h1", None).await.unwrap();
    h.engine
        .reset_task(laptop.id, fixed_now() + Duration::days(1))
        .await
        .unwrap();
    h.engine.complete_task(laptop.id, "h1", None).await.unwrap();

    // Completing the non-setup task does not match the rule
    let reading = h.task("h1", "reading").await;
    h.engine.complete_task(reading.id, "h1", None).await.unwrap();

    let follow_ups: Vec<_> = h
        .tasks("h1")
        .await
        .into_iter()
        .filter(|t| t.template_id.as_deref() == Some(AUTOMATION_SOURCE))
        .collect();
    assert_eq!(follow_ups.len(), 1);
    assert_eq!(follow_ups[0].title, "Verify workstation access");
    assert_eq!(follow_ups[0].category, TaskCategory::Setup);
    assert_eq!(
        follow_ups[0].template_task_id.as_deref(),
        Some(format!("followup:verify-setup:{}", laptop.id).as_str())
    );
}

#[tokio::test]
async fn test_follow_up_does_not_repeat_completion_notification() {
    // Setup task last, so completing it finishes the workflow
    let template = WorkflowTemplate::new("setup-last", "Setup Last")
        .with_task(TaskTemplate::new("reading", "Reading", 0).with_category(TaskCategory::Training))
        .with_task(TaskTemplate::new("laptop", "Laptop", 1).with_category(TaskCategory::Setup));
    let h = harness(vec![staff_engineer("h1")], vec![template], vec![verify_setup()]);
    h.engine
        .apply_workflow("h1", Some("setup-last"), "admin")
        .await
        .unwrap();

    for id in ["reading", "laptop"] {
        let task = h.task("h1", id).await;
        h.engine.complete_task(task.id, "h1", None).await.unwrap();
    }
    let progress = h.engine.progress("h1").await.unwrap();
    assert_eq!((progress.completed, progress.total), (2, 3));
    assert!(progress.completion_notified);

    let laptop = h.task("h1", "laptop").await;
    let follow_up = h
        .task("h1", &format!("followup:verify-setup:{}", laptop.id))
        .await;
    h.engine.complete_task(follow_up.id, "h1", None).await.unwrap();

    // The follow-up spawns nothing further
    assert_eq!(h.tasks("h1").await.len(), 3);
    let progress = h.engine.progress("h1").await.unwrap();
    assert!(progress.finished);

    let completions = h
        .notifier
        .sent_to("h1")
        .await
        .into_iter()
        .filter(|n| n.title == "Onboarding complete")
        .count();
    assert_eq!(completions, 1);
}

#[tokio::test]
async fn test_rule_completion_runs_completed_rules() {
    let complete_on_due_day = AutomationRule {
        actions: onboarding_sdk::RuleActions {
            update_status: Some(TaskStatus::Completed),
            ..Default::default()
        },
        ..deadline_reminder(0).for_category(TaskCategory::Setup)
    };
    let h = harness(
        vec![staff_engineer("h1")],
        vec![setup_template()],
        vec![complete_on_due_day, verify_setup()],
    );
    at_start_of_day(&h);
    h.engine
        .apply_workflow("h1", Some("setup"), "admin")
        .await
        .unwrap();

    h.engine.scan().await.unwrap();

    let laptop = h.task("h1", "laptop").await;
    assert_eq!(laptop.status, TaskStatus::Completed);
    assert!(laptop.notes.contains("Completed by automation"));
    assert_eq!(h.task("h1", "reading").await.status, TaskStatus::Pending);

    let follow_up = h
        .task("h1", &format!("followup:verify-setup:{}", laptop.id))
        .await;
    assert_eq!(follow_up.assigned_by, "automation");
    assert_eq!(follow_up.status, TaskStatus::Pending);
}

#[tokio::test]
async fn test_hire_created_applies_auto_workflow_and_welcomes() {
    let welcome = AutomationRule::new("welcome", RuleTrigger::UserCreated)
        .notify()
        .escalate();
    let h = harness(vec![staff_engineer("h1")], builtin_templates(), vec![welcome]);

    let applied = h.engine.hire_created("h1").await.unwrap().unwrap();
    assert_eq!(applied.template_id, "engineering-onboarding");
    assert_eq!(applied.created.len(), 5);
    assert!(applied
        .created
        .iter()
        .all(|t| t.assigned_by == "automation"));

    let to_hire = h.notifier.sent_to("h1").await;
    assert_eq!(to_hire.len(), 1);
    assert!(to_hire[0].message.contains("Welcome Engineer h1"));
    assert_eq!(h.notifier.sent_to("mgr-1").await.len(), 1);
}

#[tokio::test]
async fn test_hire_created_without_auto_template() {
    let manual = WorkflowTemplate::new("manual", "Manual")
        .with_task(TaskTemplate::new("t1", "Task", 0));
    let h = harness(vec![staff_engineer("h1")], vec![manual], vec![]);

    assert!(h.engine.hire_created("h1").await.unwrap().is_none());
    assert!(h.tasks("h1").await.is_empty());
}

// ============================================================================
// Scheduler
// ============================================================================

#[tokio::test]
async fn test_scheduler_tick_runs_scan() {
    let h = harness(
        vec![staff_engineer("h1")],
        vec![four_task_template()],
        vec![overdue_escalation()],
    );
    h.engine
        .apply_workflow("h1", Some("four"), "admin")
        .await
        .unwrap();
    h.clock.advance(Duration::days(1));

    match h.engine.scheduler().trigger_now().await {
        TickOutcome::Completed(report) => assert_eq!(report.overdue_marked, 2),
        other => panic!("unexpected tick outcome: {:?}", other),
    }
}
