//! Polling fallback integration tests.
//!
//! The poller and the push channel both write through the controller.
//! These tests interleave them and check the merge rules.

use std::time::Duration;

use flowdeck::actors::PollingFallback;
use flowdeck::client::OrchestrationClient;
use flowdeck::live::LiveChannel;
use flowdeck::workflow::{SessionId, Workflow, WorkflowStatus};

use super::fixtures::{settle, workflow_update_frame, Harness, ScriptedTransport};

const INTERVAL: Duration = Duration::from_secs(10);

/// Test: Poller picks up backend-side changes
/// Given a running workflow
/// When the backend completes it and the next poll runs
/// Then it moves to history without any push
#[tokio::test(start_paused = true)]
async fn test_poll_archives_finished_workflow() {
    let h = Harness::new();
    let wf = h
        .controller
        .create_from_goal("install Docker", false)
        .await
        .unwrap();

    let poller = PollingFallback::new(h.controller.clone())
        .with_interval(INTERVAL)
        .spawn();
    settle().await;
    assert_eq!(h.controller.active_workflows().await.len(), 1);

    h.client.set_status(&wf.id, WorkflowStatus::Completed);
    tokio::time::sleep(INTERVAL).await;

    assert!(h.controller.active_workflows().await.is_empty());
    assert_eq!(h.controller.history().await[0].status, WorkflowStatus::Completed);
    poller.shutdown();
}

/// Test: Poll discovers workflows created elsewhere
#[tokio::test(start_paused = true)]
async fn test_poll_discovers_new_workflows() {
    let h = Harness::new();
    let poller = PollingFallback::new(h.controller.clone())
        .with_interval(INTERVAL)
        .spawn();
    settle().await;
    assert!(h.controller.active_workflows().await.is_empty());

    // Another client of the same backend creates a workflow.
    h.client
        .create_from_goal("rotate logs", &SessionId::from("other"), false)
        .await
        .unwrap();

    tokio::time::sleep(INTERVAL).await;
    assert_eq!(h.controller.active_workflows().await.len(), 1);
    poller.shutdown();
}

/// Test: Unversioned snapshots, last arrival wins
/// Given a push reporting paused and then a poll reporting running
/// Then the poll result, which arrived last, is kept
#[tokio::test(start_paused = true)]
async fn test_last_arrival_wins_without_versions() {
    let h = Harness::new();
    let transport = ScriptedTransport::new();
    let channel = LiveChannel::new(transport.clone(), h.controller.clone());
    channel.connect(SessionId::from("test-session"));
    settle().await;

    let wf = h
        .controller
        .create_from_goal("install Docker", false)
        .await
        .unwrap();

    let mut pushed = h.controller.workflow(&wf.id).await.unwrap();
    pushed.set_status(WorkflowStatus::Paused);
    pushed.version = None;
    transport.push(workflow_update_frame(&pushed));
    settle().await;
    assert_eq!(
        h.controller.workflow(&wf.id).await.unwrap().status,
        WorkflowStatus::Paused
    );

    let poller = PollingFallback::new(h.controller.clone())
        .with_interval(INTERVAL)
        .spawn();
    settle().await;
    assert_eq!(
        h.controller.workflow(&wf.id).await.unwrap().status,
        WorkflowStatus::Running
    );

    poller.shutdown();
    channel.disconnect();
}

/// Test: Versioned snapshots, older never overwrites newer
/// Given a push carrying version 5
/// When a poll returns the same workflow at version 1
/// Then the pushed snapshot is kept
#[tokio::test(start_paused = true)]
async fn test_stale_poll_result_is_dropped() {
    let h = Harness::new();
    let transport = ScriptedTransport::new();
    let channel = LiveChannel::new(transport.clone(), h.controller.clone());
    channel.connect(SessionId::from("test-session"));
    settle().await;

    let wf = h
        .controller
        .create_from_goal("install Docker", false)
        .await
        .unwrap();
    assert_eq!(wf.version, Some(1));

    let pushed = Workflow::new(wf.id.as_str(), WorkflowStatus::Paused, wf.steps.clone())
        .with_version(5);
    transport.push(workflow_update_frame(&pushed));
    settle().await;

    let poller = PollingFallback::new(h.controller.clone())
        .with_interval(INTERVAL)
        .spawn();
    settle().await;

    let local = h.controller.workflow(&wf.id).await.unwrap();
    assert_eq!(local.status, WorkflowStatus::Paused);
    assert_eq!(local.version, Some(5));

    poller.shutdown();
    channel.disconnect();
}

/// Test: Disabling the poller leaves no timers behind
#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_all_polls() {
    let h = Harness::with_latency(Duration::from_secs(1));
    let poller = PollingFallback::new(h.controller.clone())
        .with_interval(INTERVAL)
        .spawn();

    // Shut down while the first poll is still in flight.
    tokio::time::sleep(Duration::from_millis(500)).await;
    poller.shutdown();
    assert!(poller.is_cancelled());
    let sent = h.client.request_count();
    assert_eq!(sent, 1);

    tokio::time::sleep(INTERVAL * 6).await;
    assert_eq!(h.client.request_count(), sent);
}

/// Test: Poller stops on its own once the controller is torn down
#[tokio::test(start_paused = true)]
async fn test_poller_stops_after_teardown() {
    let h = Harness::new();
    let _poller = PollingFallback::new(h.controller.clone())
        .with_interval(INTERVAL)
        .spawn();
    settle().await;
    let sent = h.client.request_count();

    h.controller.teardown();
    tokio::time::sleep(INTERVAL * 3).await;
    assert_eq!(h.client.request_count(), sent);
}
