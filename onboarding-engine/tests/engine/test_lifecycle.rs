//! Tests for task state transitions and progress tracking

use super::common::*;
use chrono::Duration;
use onboarding_engine::builtin_templates;
use onboarding_sdk::{EngineError, EngineEvent, TaskStatus};

async fn applied_four(h: &Harness, hire_id: &str) {
    h.engine
        .apply_workflow(hire_id, Some("four"), "admin")
        .await
        .unwrap()
        .unwrap();
}

async fn applied_full(h: &Harness, hire_id: &str) {
    h.engine
        .apply_workflow(hire_id, Some("full-onboarding"), "admin")
        .await
        .unwrap()
        .unwrap();
}

// ============================================================================
// Progress
// ============================================================================

#[tokio::test]
async fn test_progress_quarter_then_full() {
    let h = harness(vec![staff_engineer("h1")], vec![four_task_template()], vec![]);
    applied_four(&h, "h1").await;

    let progress = h.engine.progress("h1").await.unwrap();
    assert_eq!((progress.completed, progress.total, progress.percent), (0, 4, 0));

    let tasks = h.tasks("h1").await;
    h.engine.complete_task(tasks[0].id, "h1", None).await.unwrap();
    let progress = h.engine.progress("h1").await.unwrap();
    assert_eq!(progress.percent, 25);
    assert!(!progress.finished);
    assert!(h.notifier.sent().await.is_empty());

    for task in &tasks[1..] {
        h.engine.complete_task(task.id, "h1", None).await.unwrap();
    }
    let progress = h.engine.progress("h1").await.unwrap();
    assert_eq!(progress.percent, 100);
    assert!(progress.finished);

    let sent = h.notifier.sent_to("h1").await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].title, "Onboarding complete");
    assert!(sent[0].message.contains("Engineer h1"));
}

#[tokio::test]
async fn test_completion_notification_sent_once() {
    let h = harness(vec![staff_engineer("h1")], vec![four_task_template()], vec![]);
    applied_four(&h, "h1").await;

    let tasks = h.tasks("h1").await;
    for task in &tasks {
        h.engine.complete_task(task.id, "h1", None).await.unwrap();
    }
    // Repeated completes after 100% change nothing
    for task in &tasks {
        let outcome = h.engine.complete_task(task.id, "h1", None).await.unwrap();
        assert!(!outcome.changed);
    }

    assert_eq!(h.notifier.sent().await.len(), 1);
}

#[tokio::test]
async fn test_removing_task_recomputes_progress() {
    let h = harness(vec![staff_engineer("h1")], vec![four_task_template()], vec![]);
    applied_four(&h, "h1").await;

    let tasks = h.tasks("h1").await;
    h.engine.complete_task(tasks[0].id, "admin", None).await.unwrap();
    h.engine.remove_task(tasks[3].id).await.unwrap();

    let progress = h.engine.progress("h1").await.unwrap();
    assert_eq!((progress.completed, progress.total, progress.percent), (1, 3, 33));

    let err = h.engine.remove_task(tasks[3].id).await.unwrap_err();
    assert!(err.is_not_found());
}

// ============================================================================
// Completion
// ============================================================================

#[tokio::test]
async fn test_complete_is_idempotent() {
    let h = harness(vec![staff_engineer("h1")], vec![four_task_template()], vec![]);
    applied_four(&h, "h1").await;
    let task = h.tasks("h1").await.remove(0);

    let first = h
        .engine
        .complete_task(task.id, "mgr-1", Some("signed in person"))
        .await
        .unwrap();
    assert!(first.changed);
    assert_eq!(first.task.status, TaskStatus::Completed);
    assert_eq!(first.task.completed_date, Some(fixed_now()));
    assert!(first.task.notes.ends_with("Completed by mgr-1: signed in person"));

    h.clock.advance(Duration::hours(3));
    let second = h.engine.complete_task(task.id, "mgr-1", None).await.unwrap();
    assert!(!second.changed);

    let stored = h.task("h1", "t1").await;
    assert_eq!(stored.completed_date, Some(fixed_now()));
    assert_eq!(stored.notes.matches("Completed by").count(), 1);
}

#[tokio::test]
async fn test_incomplete_dependency_blocks_completion() {
    let h = harness(vec![staff_engineer("h1")], builtin_templates(), vec![]);
    applied_full(&h, "h1").await;

    let paperwork = h.task("h1", "paperwork").await;
    let handbook = h.task("h1", "handbook").await;

    let err = h.engine.complete_task(handbook.id, "h1", None).await.unwrap_err();
    match err {
        EngineError::DependenciesIncomplete { task_id, pending } => {
            assert_eq!(task_id, handbook.id);
            assert_eq!(pending, vec![paperwork.id]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(
        h.engine.activate_task(handbook.id).await,
        Err(EngineError::DependenciesIncomplete { .. })
    ));

    h.engine.complete_task(paperwork.id, "h1", None).await.unwrap();
    let outcome = h.engine.activate_task(handbook.id).await.unwrap();
    assert!(outcome.changed);
    assert_eq!(outcome.task.status, TaskStatus::Active);
}

#[tokio::test]
async fn test_removed_prerequisite_no_longer_blocks() {
    let h = harness(vec![staff_engineer("h1")], builtin_templates(), vec![]);
    applied_full(&h, "h1").await;

    let orientation = h.task("h1", "orientation").await;
    let check_in = h.task("h1", "check-in").await;
    h.engine.remove_task(orientation.id).await.unwrap();

    let outcome = h.engine.complete_task(check_in.id, "h1", None).await.unwrap();
    assert!(outcome.changed);
}

// ============================================================================
// Overdue and Reset
// ============================================================================

#[tokio::test]
async fn test_mark_overdue_only_past_due_once() {
    let h = harness(vec![staff_engineer("h1")], builtin_templates(), vec![]);
    applied_full(&h, "h1").await;
    h.clock.advance(Duration::days(1));

    let paperwork = h.task("h1", "paperwork").await;
    let first = h.engine.mark_overdue(paperwork.id).await.unwrap();
    assert!(first.changed);
    assert_eq!(first.task.status, TaskStatus::Overdue);

    let again = h.engine.mark_overdue(paperwork.id).await.unwrap();
    assert!(!again.changed);

    // Due 2024-01-06, not yet past
    let check_in = h.task("h1", "check-in").await;
    let outcome = h.engine.mark_overdue(check_in.id).await.unwrap();
    assert!(!outcome.changed);
    assert_eq!(outcome.task.status, TaskStatus::Pending);
}

#[tokio::test]
async fn test_overdue_task_can_be_activated_or_completed() {
    let h = harness(vec![staff_engineer("h1")], builtin_templates(), vec![]);
    applied_full(&h, "h1").await;
    h.clock.advance(Duration::days(2));

    let paperwork = h.task("h1", "paperwork").await;
    let orientation = h.task("h1", "orientation").await;
    h.engine.mark_overdue(paperwork.id).await.unwrap();
    h.engine.mark_overdue(orientation.id).await.unwrap();

    let activated = h.engine.activate_task(paperwork.id).await.unwrap();
    assert_eq!(activated.task.status, TaskStatus::Active);

    let completed = h.engine.complete_task(orientation.id, "h1", None).await.unwrap();
    assert_eq!(completed.task.status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_reset_requires_overdue_or_completed() {
    let h = harness(vec![staff_engineer("h1")], builtin_templates(), vec![]);
    applied_full(&h, "h1").await;
    let paperwork = h.task("h1", "paperwork").await;
    let new_due = fixed_now() + Duration::days(7);

    let err = h.engine.reset_task(paperwork.id, new_due).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidTransition {
            from: TaskStatus::Pending,
            action: "reset",
            ..
        }
    ));

    h.clock.advance(Duration::days(1));
    h.engine.mark_overdue(paperwork.id).await.unwrap();
    let outcome = h.engine.reset_task(paperwork.id, new_due).await.unwrap();

    assert_eq!(outcome.task.status, TaskStatus::Pending);
    assert_eq!(outcome.task.due_date, new_due);
    assert!(outcome.task.notes.contains("Reset from overdue"));
}

#[tokio::test]
async fn test_reset_completed_task_reopens_workflow() {
    let h = harness(vec![staff_engineer("h1")], vec![four_task_template()], vec![]);
    applied_four(&h, "h1").await;
    let tasks = h.tasks("h1").await;
    for task in &tasks {
        h.engine.complete_task(task.id, "h1", None).await.unwrap();
    }

    let outcome = h
        .engine
        .reset_task(tasks[0].id, fixed_now() + Duration::days(2))
        .await
        .unwrap();
    assert!(outcome.task.completed_date.is_none());

    let progress = h.engine.progress("h1").await.unwrap();
    assert_eq!(progress.percent, 75);
    assert!(!progress.finished);
    assert!(!progress.completion_notified);

    // Finishing again after a reset is a new completion
    h.engine.complete_task(tasks[0].id, "h1", None).await.unwrap();
    let completions = h
        .notifier
        .sent_to("h1")
        .await
        .into_iter()
        .filter(|n| n.title == "Onboarding complete")
        .count();
    assert_eq!(completions, 2);
}

#[tokio::test]
async fn test_new_tasks_after_completion_do_not_renotify() {
    let mut templates = builtin_templates();
    templates.push(four_task_template());
    let h = harness(vec![staff_engineer("h1")], templates, vec![]);
    applied_four(&h, "h1").await;
    for task in h.tasks("h1").await {
        h.engine.complete_task(task.id, "h1", None).await.unwrap();
    }

    applied_full(&h, "h1").await;
    let progress = h.engine.progress("h1").await.unwrap();
    assert!(!progress.finished);
    assert!(progress.completion_notified);

    for task in h.tasks("h1").await {
        h.engine.complete_task(task.id, "h1", None).await.unwrap();
    }
    assert!(h.engine.progress("h1").await.unwrap().finished);
    assert_eq!(h.notifier.sent_to("h1").await.len(), 1);
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn test_transitions_are_published() {
    let h = harness(vec![staff_engineer("h1")], vec![four_task_template()], vec![]);
    let mut events = h.engine.subscribe();
    applied_four(&h, "h1").await;

    let task = h.tasks("h1").await.remove(0);
    h.engine.activate_task(task.id).await.unwrap();
    h.engine.complete_task(task.id, "h1", None).await.unwrap();

    let mut transitions = Vec::new();
    let mut created = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            EngineEvent::TaskCreated { .. } => created += 1,
            EngineEvent::TaskTransitioned { from, to, .. } => transitions.push((from, to)),
            _ => {}
        }
    }

    assert_eq!(created, 4);
    assert_eq!(
        transitions,
        vec![
            (TaskStatus::Pending, TaskStatus::Active),
            (TaskStatus::Active, TaskStatus::Completed),
        ]
    );
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let h = harness(vec![], vec![], vec![]);
    let err = h
        .engine
        .complete_task(uuid::Uuid::new_v4(), "admin", None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}
