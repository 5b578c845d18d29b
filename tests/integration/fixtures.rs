//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - A controller wired to the in-process backend
//! - A scripted push transport whose connections the test drives
//! - A handler that records every routed message
//! - Frame and graph builders

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use serde_json::json;

use flowdeck::client::InMemoryOrchestrationClient;
use flowdeck::core::{StepKind, WorkflowGraph, WorkflowNode};
use flowdeck::live::{ChannelTransport, FrameStream, LiveMessage, LiveUpdateHandler};
use flowdeck::orchestration::{ControllerEvent, LifecycleController};
use flowdeck::workflow::{SessionId, Workflow};
use flowdeck::{Error, Result};

/// A controller backed by the in-process backend.
pub struct Harness {
    pub client: Arc<InMemoryOrchestrationClient>,
    pub controller: Arc<LifecycleController>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_client(InMemoryOrchestrationClient::new())
    }

    /// Every backend request takes `latency` to answer.
    pub fn with_latency(latency: Duration) -> Self {
        Self::with_client(InMemoryOrchestrationClient::new().with_latency(latency))
    }

    pub fn with_client(client: InMemoryOrchestrationClient) -> Self {
        let client = Arc::new(client);
        let controller = Arc::new(LifecycleController::new(
            client.clone(),
            SessionId::from("test-session"),
            20,
        ));
        Self { client, controller }
    }

    /// Drain the events emitted so far.
    pub fn drain(events: &mut tokio::sync::broadcast::Receiver<ControllerEvent>) -> Vec<ControllerEvent> {
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        seen
    }
}

/// What the next `open` call does.
#[derive(Debug, Clone, Copy)]
pub enum Open {
    Accept,
    Refuse,
}

/// Transport whose connections are driven by the test.
///
/// Opens follow the queued script and default to `Accept` once it runs out.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Open>>,
    connections: Mutex<Vec<mpsc::UnboundedSender<Result<String>>>>,
    opens: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripted(opens: &[Open]) -> Arc<Self> {
        let transport = Self::default();
        transport.script.lock().unwrap().extend(opens.iter().copied());
        Arc::new(transport)
    }

    /// Number of connection attempts so far.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Deliver a frame on the newest connection.
    pub fn push(&self, frame: impl Into<String>) {
        if let Some(tx) = self.connections.lock().unwrap().last() {
            let _ = tx.unbounded_send(Ok(frame.into()));
        }
    }

    /// Break the newest connection with a transport error.
    pub fn fail(&self, message: &str) {
        if let Some(tx) = self.connections.lock().unwrap().last() {
            let _ = tx.unbounded_send(Err(Error::Channel(message.to_string())));
        }
    }

    /// Close every open connection from the server side.
    pub fn close_all(&self) {
        self.connections.lock().unwrap().clear();
    }
}

#[async_trait]
impl ChannelTransport for ScriptedTransport {
    async fn open(&self, _session: &SessionId) -> Result<FrameStream> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front().unwrap_or(Open::Accept);
        match next {
            Open::Refuse => Err(Error::Channel("connection refused".to_string())),
            Open::Accept => {
                let (tx, rx) = mpsc::unbounded();
                self.connections.lock().unwrap().push(tx);
                Ok(rx.boxed())
            }
        }
    }
}

/// Handler that keeps every message it is given.
#[derive(Default)]
pub struct RecordingHandler {
    messages: Mutex<Vec<LiveMessage>>,
}

impl RecordingHandler {
    pub fn messages(&self) -> Vec<LiveMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl LiveUpdateHandler for RecordingHandler {
    async fn handle(&self, message: LiveMessage) {
        self.messages.lock().unwrap().push(message);
    }
}

/// Let spawned tasks run without moving the clock meaningfully.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub fn workflow_update_frame(workflow: &Workflow) -> String {
    json!({ "type": "workflow_update", "data": workflow }).to_string()
}

pub fn health_frame(status: &str) -> String {
    json!({ "type": "system_health", "data": { "status": status, "cpu": 41.0 } }).to_string()
}

/// Graph with nodes A, B, C and edges A->B, B->C.
pub fn chain_graph() -> WorkflowGraph {
    let mut graph = WorkflowGraph::new();
    for (id, command) in [("A", "apt-get update"), ("B", "apt-get install -y nginx"), ("C", "systemctl restart nginx")] {
        graph
            .add_node(WorkflowNode::new(id, StepKind::Command, id).with_param("command", command))
            .unwrap();
    }
    graph.connect(&"A".into(), &"B".into()).unwrap();
    graph.connect(&"B".into(), &"C".into()).unwrap();
    graph
}
