//! Workflow lifecycle integration tests.
//!
//! These tests run full creation and approval flows through the
//! controller and check both local state and what the backend saw.

use std::time::Duration;

use tokio_test::{assert_err, assert_ok};

use flowdeck::core::WorkflowGraph;
use flowdeck::orchestration::{ControllerEvent, NotificationLevel};
use flowdeck::workflow::{StepStatus, Strategy, WorkflowId, WorkflowStatus};
use flowdeck::Error;

use super::fixtures::{chain_graph, Harness};

/// Test: Goal with approval, then rejection
/// Given the goal "install Docker" with approval required
/// When the plan is rejected with reason "test"
/// Then the workflow ends cancelled and moves to history
#[tokio::test]
async fn test_goal_then_reject_scenario() {
    let h = Harness::new();

    let wf = assert_ok!(h.controller.create_from_goal("install Docker", true).await);
    assert_eq!(wf.status, WorkflowStatus::PendingApproval);
    let plan = wf.pending_approval().expect("plan present while pending");
    assert!(plan.total_steps >= 1);

    assert_ok!(h.controller.reject_plan(&wf.id, "test").await);

    let wf = h.controller.workflow(&wf.id).await.unwrap();
    assert_eq!(wf.status, WorkflowStatus::Cancelled);
    assert!(h.controller.active_workflows().await.is_empty());
    assert_eq!(h.controller.history().await.len(), 1);
    assert_eq!(
        h.client.snapshot(&wf.id).unwrap().status,
        WorkflowStatus::Cancelled
    );
}

/// Test: Approve then run through pause and resume
#[tokio::test]
async fn test_approve_pause_resume_cancel() {
    let h = Harness::new();
    let wf = h
        .controller
        .create_from_template("docker-setup")
        .await
        .unwrap();
    assert_eq!(wf.status, WorkflowStatus::PendingApproval);
    assert_eq!(h.controller.pending_approval().await.unwrap().total_steps, 3);

    assert_ok!(h.controller.approve_plan(&wf.id).await);
    let running = h.controller.workflow(&wf.id).await.unwrap();
    assert_eq!(running.status, WorkflowStatus::Running);
    assert!(running.pending_approval().is_none());
    // The backend's snapshot came back with the first step running.
    assert_eq!(running.steps[0].status, StepStatus::Running);

    assert_ok!(h.controller.pause(&wf.id).await);
    assert_err!(h.controller.pause(&wf.id).await);
    assert_ok!(h.controller.resume(&wf.id).await);
    assert_ok!(h.controller.cancel(&wf.id).await);

    assert_eq!(
        h.controller.history().await[0].status,
        WorkflowStatus::Cancelled
    );
}

/// Test: Invalid transitions never reach the backend
/// Given "wf-1" paused
/// When pause is called again
/// Then InvalidTransition is returned, status stays paused, no request is sent
#[tokio::test]
async fn test_pause_while_paused_scenario() {
    let h = Harness::new();
    let wf = h
        .controller
        .create_from_goal("install Docker", false)
        .await
        .unwrap();
    assert_eq!(wf.id, WorkflowId::from("wf-1"));
    h.controller.pause(&wf.id).await.unwrap();
    let sent = h.client.request_count();

    let err = h.controller.pause(&wf.id).await.unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidTransition {
            from: WorkflowStatus::Paused,
            ..
        }
    ));
    assert_eq!(err.to_string(), "Cannot pause workflow wf-1 while paused");
    assert_eq!(
        h.controller.workflow(&wf.id).await.unwrap().status,
        WorkflowStatus::Paused
    );

    assert!(matches!(
        h.controller.approve_plan(&wf.id).await,
        Err(Error::InvalidTransition { .. })
    ));
    assert_eq!(h.client.request_count(), sent);
}

/// Test: Every mutating operation sends exactly one request
#[tokio::test]
async fn test_one_request_per_operation() {
    let h = Harness::new();
    let wf = h
        .controller
        .create_from_goal("update packages, install Docker then reboot", false)
        .await
        .unwrap();
    assert_eq!(wf.steps.len(), 3);

    let before = h.client.request_count();
    h.controller.approve_step(&wf.id, "step-1").await.unwrap();
    h.controller.skip_step(&wf.id, "step-3").await.unwrap();
    h.controller.pause(&wf.id).await.unwrap();
    h.controller.start(&wf.id).await.unwrap();
    assert_eq!(h.client.request_count(), before + 4);

    let wf = h.controller.workflow(&wf.id).await.unwrap();
    assert_eq!(wf.status, WorkflowStatus::Running);
    assert_eq!(wf.step("step-3").unwrap().status, StepStatus::Skipped);
}

/// Test: Backend failure rolls back and notifies
/// Given a pending workflow and a backend that fails the next request
/// When the plan is approved
/// Then the workflow stays pending with its plan and an error notification is emitted
#[tokio::test]
async fn test_failed_approval_rolls_back() {
    let h = Harness::new();
    let wf = h
        .controller
        .create_from_goal("install Docker", true)
        .await
        .unwrap();
    let mut events = h.controller.subscribe();

    h.client.fail_next("planner unavailable");
    let err = h.controller.approve_plan(&wf.id).await.unwrap_err();
    assert!(err.is_retryable());

    let after = h.controller.workflow(&wf.id).await.unwrap();
    assert_eq!(after, wf);

    let events = Harness::drain(&mut events);
    // Optimistic update, its rollback, then the notification.
    assert!(matches!(
        events.first(),
        Some(ControllerEvent::WorkflowUpdated {
            status: WorkflowStatus::Running,
            ..
        })
    ));
    assert!(events.iter().any(|e| matches!(
        e,
        ControllerEvent::WorkflowUpdated {
            status: WorkflowStatus::PendingApproval,
            ..
        }
    )));
    let notification = events
        .iter()
        .find_map(|e| match e {
            ControllerEvent::Notification(n) => Some(n.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(notification.level, NotificationLevel::Error);
    assert!(notification.message.contains("planner unavailable"));

    // The retry goes through.
    assert_ok!(h.controller.approve_plan(&wf.id).await);
}

/// Test: Graph submission
#[tokio::test]
async fn test_create_from_graph_submits_in_dependency_order() {
    let h = Harness::new();
    let wf = h
        .controller
        .create_from_graph(&chain_graph(), Strategy::Pipeline, true)
        .await
        .unwrap();

    assert_eq!(wf.status, WorkflowStatus::PendingApproval);
    assert_eq!(wf.strategy, Strategy::Pipeline);
    let ids: Vec<&str> = wf.steps.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["A", "B", "C"]);
    assert_eq!(wf.pending_approval().unwrap().total_steps, 3);

    let empty = h
        .controller
        .create_from_graph(&WorkflowGraph::new(), Strategy::Sequential, false)
        .await;
    assert!(matches!(empty, Err(Error::Validation(_))));
}

/// Test: Selection follows creation and can be changed
#[tokio::test]
async fn test_selection() {
    let h = Harness::new();
    let first = h.controller.create_from_template("system-update").await.unwrap();
    let second = h.controller.create_from_template("health-check").await.unwrap();
    assert_eq!(h.controller.current_workflow().await.unwrap().id, second.id);

    h.controller.select(Some(first.id.clone())).await;
    assert_eq!(h.controller.current_workflow().await.unwrap().id, first.id);
    assert!(h.controller.pending_approval().await.is_none());

    h.controller.select(None).await;
    assert!(h.controller.current_workflow().await.is_none());

    let active: Vec<WorkflowId> = h
        .controller
        .active_workflows()
        .await
        .into_iter()
        .map(|w| w.id)
        .collect();
    assert_eq!(active, vec![first.id, second.id]);
}

/// Test: Late responses after teardown are discarded
#[tokio::test(start_paused = true)]
async fn test_teardown_discards_late_response() {
    let h = Harness::with_latency(Duration::from_millis(200));
    let wf = h
        .controller
        .create_from_goal("install Docker", false)
        .await
        .unwrap();

    let pausing = {
        let controller = h.controller.clone();
        let id = wf.id.clone();
        tokio::spawn(async move { controller.pause(&id).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.controller.teardown();

    assert_ok!(pausing.await.unwrap());
    assert!(!h.controller.is_mounted());
    // The optimistic write happened before teardown; the response was dropped.
    let local = h.controller.workflow(&wf.id).await.unwrap();
    assert_eq!(local.status, WorkflowStatus::Paused);
    assert_eq!(local.version, Some(1));
    assert_eq!(h.client.snapshot(&wf.id).unwrap().version, Some(2));
}
