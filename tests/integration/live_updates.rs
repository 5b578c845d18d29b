//! Live update channel integration tests.
//!
//! These tests connect a `LiveChannel` to a scripted transport and check
//! message routing into the controller and the reconnect policy.

use std::sync::Arc;
use std::time::Duration;

use flowdeck::live::{ChannelState, LiveChannel, LiveMessage, DEFAULT_RECONNECT_INTERVAL};
use flowdeck::workflow::{SessionId, Workflow, WorkflowStatus};

use super::fixtures::{
    health_frame, settle, workflow_update_frame, Harness, Open, RecordingHandler,
    ScriptedTransport,
};

/// Test: Push of a completed workflow archives it
/// Given a paused workflow (local optimistic state)
/// When the server pushes it as completed
/// Then it leaves the active list and appears in history
#[tokio::test(start_paused = true)]
async fn test_push_completed_moves_to_history() {
    let h = Harness::new();
    let transport = ScriptedTransport::new();
    let channel = LiveChannel::new(transport.clone(), h.controller.clone());
    channel.connect(h.controller.session().clone());
    settle().await;
    assert_eq!(channel.state(), ChannelState::Connected);

    let wf = h
        .controller
        .create_from_goal("install Docker", false)
        .await
        .unwrap();
    h.controller.pause(&wf.id).await.unwrap();

    let completed = h.client.set_status(&wf.id, WorkflowStatus::Completed).unwrap();
    transport.push(workflow_update_frame(&completed));
    settle().await;

    assert!(h.controller.active_workflows().await.is_empty());
    let history = h.controller.history().await;
    assert_eq!(history[0].id, wf.id);
    assert_eq!(history[0].status, WorkflowStatus::Completed);

    channel.disconnect();
}

/// Test: Health and list payloads are merged, junk is dropped
#[tokio::test(start_paused = true)]
async fn test_routes_payloads_and_survives_malformed_frames() {
    let h = Harness::new();
    let transport = ScriptedTransport::new();
    let channel = LiveChannel::new(transport.clone(), h.controller.clone());
    channel.connect(SessionId::from("test-session"));
    settle().await;

    transport.push("{{{ not json");
    transport.push(r#"{"type": "workflow_update", "data": {"id": 3}}"#);
    transport.push(r#"{"type": "agent_heartbeat", "data": {}}"#);
    transport.push(health_frame("degraded"));
    let listed = vec![
        Workflow::new("wf-7", WorkflowStatus::Running, vec![]),
        Workflow::new("wf-8", WorkflowStatus::Paused, vec![]),
    ];
    transport.push(
        serde_json::json!({ "type": "active_workflows", "data": { "workflows": listed } })
            .to_string(),
    );
    settle().await;

    assert_eq!(channel.state(), ChannelState::Connected);
    assert_eq!(h.controller.health().await.unwrap().status, "degraded");
    assert_eq!(h.controller.active_workflows().await.len(), 2);

    channel.disconnect();
}

/// Test: Reconnect after an unexpected close, at the fixed interval
#[tokio::test(start_paused = true)]
async fn test_reconnects_after_close() {
    let handler = Arc::new(RecordingHandler::default());
    let transport = ScriptedTransport::new();
    let channel = LiveChannel::new(transport.clone(), handler.clone());
    channel.connect(SessionId::from("s-1"));
    settle().await;
    assert_eq!(transport.opens(), 1);

    transport.close_all();
    settle().await;
    assert_eq!(channel.state(), ChannelState::Disconnected);
    assert_eq!(channel.reconnect_attempts(), 1);

    tokio::time::sleep(DEFAULT_RECONNECT_INTERVAL - Duration::from_millis(10)).await;
    assert_eq!(transport.opens(), 1);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.opens(), 2);
    assert_eq!(channel.state(), ChannelState::Connected);
    assert_eq!(channel.reconnect_attempts(), 0);

    transport.push(health_frame("healthy"));
    settle().await;
    assert!(matches!(
        handler.messages().as_slice(),
        [LiveMessage::SystemHealth(_)]
    ));

    channel.disconnect();
}

/// Test: Transport errors count as closes
#[tokio::test(start_paused = true)]
async fn test_transport_error_triggers_reconnect() {
    let handler = Arc::new(RecordingHandler::default());
    let transport = ScriptedTransport::scripted(&[Open::Accept, Open::Refuse, Open::Refuse]);
    let channel = LiveChannel::new(transport.clone(), handler)
        .with_reconnect_interval(Duration::from_secs(2));
    channel.connect(SessionId::from("s-1"));
    settle().await;

    transport.fail("connection reset by peer");
    settle().await;
    assert_eq!(channel.reconnect_attempts(), 1);

    // Two refusals at 2s and 4s, then a successful open at 6s.
    tokio::time::sleep(Duration::from_millis(4500)).await;
    assert_eq!(transport.opens(), 3);
    assert_eq!(channel.reconnect_attempts(), 3);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(transport.opens(), 4);
    assert_eq!(channel.state(), ChannelState::Connected);

    channel.disconnect();
}

/// Test: Disconnect stops reconnects
/// Given an open channel
/// When disconnect() is called and a stale close arrives afterwards
/// Then no further connection attempt is made
#[tokio::test(start_paused = true)]
async fn test_disconnect_ignores_stale_close() {
    let handler = Arc::new(RecordingHandler::default());
    let transport = ScriptedTransport::new();
    let channel = LiveChannel::new(transport.clone(), handler.clone());
    channel.connect(SessionId::from("s-1"));
    settle().await;

    channel.disconnect();
    transport.push(health_frame("healthy"));
    transport.close_all();
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(transport.opens(), 1);
    assert_eq!(channel.state(), ChannelState::Disconnected);
    assert!(handler.messages().is_empty());
}

/// Test: Disconnect during the reconnect wait cancels the timer
#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_reconnect() {
    let handler = Arc::new(RecordingHandler::default());
    let transport = ScriptedTransport::scripted(&[Open::Refuse]);
    let channel = LiveChannel::new(transport.clone(), handler);
    channel.connect(SessionId::from("s-1"));
    settle().await;
    assert_eq!(channel.reconnect_attempts(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    channel.disconnect();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.opens(), 1);
}

/// Test: Pushes after controller teardown change nothing
#[tokio::test(start_paused = true)]
async fn test_pushes_after_teardown_are_discarded() {
    let h = Harness::new();
    let transport = ScriptedTransport::new();
    let channel = LiveChannel::new(transport.clone(), h.controller.clone());
    channel.connect(SessionId::from("test-session"));
    settle().await;

    h.controller.teardown();
    let wf = Workflow::new("wf-1", WorkflowStatus::Running, vec![]);
    transport.push(workflow_update_frame(&wf));
    transport.push(health_frame("healthy"));
    settle().await;

    assert!(h.controller.active_workflows().await.is_empty());
    assert!(h.controller.health().await.is_none());
    channel.disconnect();
}
