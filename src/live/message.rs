//! Push-channel frames.
//!
//! Every frame is a JSON envelope `{"type": ..., "data": ...}`.

use serde::Deserialize;
use serde_json::Value;

use crate::client::SystemHealth;
use crate::workflow::Workflow;

/// Tracing target for frame parsing.
const TRACING_TARGET: &str = "flowdeck::live::message";

/// A typed push message.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveMessage {
    SystemHealth(SystemHealth),
    /// Full snapshot of a single workflow.
    WorkflowUpdate(Workflow),
    /// Full list of workflows the backend considers active.
    ActiveWorkflows(Vec<Workflow>),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WorkflowListPayload {
    Wrapped { workflows: Vec<Workflow> },
    Bare(Vec<Workflow>),
}

impl WorkflowListPayload {
    fn into_vec(self) -> Vec<Workflow> {
        match self {
            Self::Wrapped { workflows } | Self::Bare(workflows) => workflows,
        }
    }
}

impl LiveMessage {
    /// Parse a text frame.
    ///
    /// Returns `None` for malformed frames (logged at warn) and for message
    /// types we do not handle.
    pub fn parse(frame: &str) -> Option<Self> {
        let envelope: Envelope = match serde_json::from_str(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(target: TRACING_TARGET, error = %e, "dropping malformed frame");
                return None;
            }
        };

        let parsed = match envelope.kind.as_str() {
            "system_health" => serde_json::from_value(envelope.data).map(Self::SystemHealth),
            "workflow_update" => serde_json::from_value(envelope.data).map(Self::WorkflowUpdate),
            "workflow_removed" | "active_workflows" => {
                serde_json::from_value::<WorkflowListPayload>(envelope.data)
                    .map(|list| Self::ActiveWorkflows(list.into_vec()))
            }
            other => {
                tracing::trace!(target: TRACING_TARGET, kind = other, "ignoring message type");
                return None;
            }
        };

        match parsed {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    kind = %envelope.kind,
                    error = %e,
                    "dropping frame with malformed payload"
                );
                None
            }
        }
    }
}
