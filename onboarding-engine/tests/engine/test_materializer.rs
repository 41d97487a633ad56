//! Tests for materializing templates into hire tasks

use super::common::*;
use chrono::{Duration, NaiveTime, TimeZone, Utc};
use onboarding_engine::{builtin_templates, materialize, SkipReason};
use onboarding_sdk::{HireProfile, TaskStatus, TaskTemplate, WorkflowTemplate};

fn midnight(y: i32, m: u32, d: u32) -> chrono::DateTime<Utc> {
    Utc.from_utc_datetime(&date(y, m, d).and_time(NaiveTime::MIN))
}

// ============================================================================
// Full Onboarding Scenario
// ============================================================================

#[tokio::test]
async fn test_full_onboarding_due_dates_from_start_date() {
    let h = harness(vec![staff_engineer("h1")], builtin_templates(), vec![]);

    let applied = h
        .engine
        .apply_workflow("h1", Some("full-onboarding"), "hr-admin")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(applied.created.len(), 4);
    assert!(applied.skipped.is_empty());

    let check_in = h.task("h1", "check-in").await;
    assert_eq!(check_in.due_date, midnight(2024, 1, 6));
    assert_eq!(check_in.due_date.date_naive(), date(2024, 1, 6));

    let paperwork = h.task("h1", "paperwork").await;
    assert_eq!(paperwork.due_date, midnight(2024, 1, 1));
    assert_eq!(paperwork.status, TaskStatus::Pending);
    assert_eq!(paperwork.assigned_by, "hr-admin");
    assert!(paperwork.notes.contains("Full Onboarding"));
}

#[tokio::test]
async fn test_dependencies_link_created_instances() {
    let h = harness(vec![staff_engineer("h1")], builtin_templates(), vec![]);
    h.engine
        .apply_workflow("h1", Some("full-onboarding"), "admin")
        .await
        .unwrap();

    // Index 3 depends on index 1
    let orientation = h.task("h1", "orientation").await;
    let check_in = h.task("h1", "check-in").await;
    assert_eq!(check_in.depends_on, vec![orientation.id]);

    let paperwork = h.task("h1", "paperwork").await;
    let handbook = h.task("h1", "handbook").await;
    assert_eq!(handbook.depends_on, vec![paperwork.id]);
}

#[tokio::test]
async fn test_tasks_keep_template_order() {
    let h = harness(vec![staff_engineer("h1")], builtin_templates(), vec![]);
    h.engine
        .apply_workflow("h1", Some("full-onboarding"), "admin")
        .await
        .unwrap();

    let order: Vec<String> = h
        .tasks("h1")
        .await
        .into_iter()
        .filter_map(|t| t.template_task_id)
        .collect();
    assert_eq!(order, vec!["paperwork", "orientation", "handbook", "check-in"]);
}

// ============================================================================
// Audience Filtering
// ============================================================================

fn template_with_intern_only_prerequisite() -> WorkflowTemplate {
    WorkflowTemplate::new("mixed", "Mixed Audience")
        .with_task(TaskTemplate::new("welcome", "Welcome", 0))
        .with_task(TaskTemplate::new("intern-intro", "Intern intro", 1).for_roles(&["intern"]))
        .with_task(TaskTemplate::new("badge", "Collect badge", 1))
        .with_task(TaskTemplate::new("review", "Review", 5).depends_on(&["intern-intro"]))
}

#[tokio::test]
async fn test_filtered_dependency_is_satisfied() {
    let h = harness(
        vec![staff_engineer("staff"), intern("intern")],
        vec![template_with_intern_only_prerequisite()],
        vec![],
    );

    // Staff hire: prerequisite filtered out, dependent still created
    let applied = h
        .engine
        .apply_workflow("staff", Some("mixed"), "admin")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(applied.created.len(), 3);
    assert!(h.task("staff", "review").await.depends_on.is_empty());

    // Intern: prerequisite applies and is linked
    h.engine
        .apply_workflow("intern", Some("mixed"), "admin")
        .await
        .unwrap();
    let intro = h.task("intern", "intern-intro").await;
    assert_eq!(h.task("intern", "review").await.depends_on, vec![intro.id]);
}

#[test]
fn test_forward_reference_is_skipped() {
    let template = WorkflowTemplate::new("forward", "Forward")
        .with_task(TaskTemplate::new("early", "Early", 0).depends_on(&["late"]))
        .with_task(TaskTemplate::new("late", "Late", 1))
        .with_task(TaskTemplate::new("after-early", "After early", 2).depends_on(&["early"]));

    let plan = materialize(&staff_engineer("h1"), &template, "admin", fixed_now());

    let created: Vec<&str> = plan
        .tasks
        .iter()
        .filter_map(|t| t.template_task_id.as_deref())
        .collect();
    assert_eq!(created, vec!["late"]);

    assert_eq!(plan.skipped.len(), 2);
    assert_eq!(plan.skipped[0].template_task_id, "early");
    assert_eq!(plan.skipped[0].reason, SkipReason::BlockedBy("late".to_string()));
    assert_eq!(
        plan.skipped[1].reason,
        SkipReason::BlockedBy("early".to_string())
    );
}

#[test]
fn test_missing_start_date_uses_now() {
    let template = WorkflowTemplate::new("basic", "Basic")
        .with_task(TaskTemplate::new("t1", "Task", 3));
    let hire = HireProfile::new("h1", "staff", "Engineering");

    let plan = materialize(&hire, &template, "admin", fixed_now());
    assert_eq!(plan.tasks[0].due_date, fixed_now() + Duration::days(3));
    assert!(plan.filtered.is_empty());
}

// ============================================================================
// Duplicate Prevention
// ============================================================================

#[tokio::test]
async fn test_reapplying_creates_no_duplicates() {
    let h = harness(vec![staff_engineer("h1")], builtin_templates(), vec![]);

    let first = h
        .engine
        .apply_workflow("h1", Some("full-onboarding"), "admin")
        .await
        .unwrap()
        .unwrap();
    let second = h
        .engine
        .apply_workflow("h1", Some("full-onboarding"), "admin")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(first.created.len(), 4);
    assert!(second.created.is_empty());
    assert_eq!(second.existing, 4);
    assert_eq!(h.tasks("h1").await.len(), 4);
}

#[tokio::test]
async fn test_concurrent_applies_create_each_task_once() {
    let h = harness(vec![staff_engineer("h1")], builtin_templates(), vec![]);

    let (a, b) = tokio::join!(
        h.engine.apply_workflow("h1", Some("full-onboarding"), "admin"),
        h.engine.apply_workflow("h1", Some("full-onboarding"), "admin"),
    );
    let created = a.unwrap().unwrap().created.len() + b.unwrap().unwrap().created.len();

    assert_eq!(created, 4);
    assert_eq!(h.tasks("h1").await.len(), 4);
}

#[tokio::test]
async fn test_unknown_template_is_not_found() {
    let h = harness(vec![staff_engineer("h1")], builtin_templates(), vec![]);
    let err = h
        .engine
        .apply_workflow("h1", Some("missing"), "admin")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}
