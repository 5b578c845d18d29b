//! Node data model for the workflow builder graph.
//!
//! A node is one step definition placed on the builder canvas. At
//! submission time every node becomes a [`StepDefinition`] and is handed
//! to the backend.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Identifier of a node in the builder graph.
///
/// Callers may pick their own ids (e.g. `"A"`), or generate one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh id of the form `node-xxxxxxxx`.
    pub fn generate() -> Self {
        Self(format!("node-{}", &Uuid::new_v4().simple().to_string()[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// What a step does when it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Run a shell command.
    #[default]
    Command,
    /// Hand the step to an agent.
    Agent,
    /// Wait for a human to approve before continuing.
    Approval,
    /// Branch on a condition evaluated by the backend.
    Condition,
    /// Reshape data between steps.
    Transform,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepKind::Command => write!(f, "command"),
            StepKind::Agent => write!(f, "agent"),
            StepKind::Approval => write!(f, "approval"),
            StepKind::Condition => write!(f, "condition"),
            StepKind::Transform => write!(f, "transform"),
        }
    }
}

/// Position of a node on the builder canvas.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A single step definition in the builder graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: NodeId,
    pub kind: StepKind,
    pub label: String,
    pub position: Position,
    /// Free-form parameters forwarded to the backend untouched.
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl WorkflowNode {
    pub fn new(id: impl Into<NodeId>, kind: StepKind, label: &str) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.to_string(),
            position: Position::default(),
            params: Map::new(),
        }
    }

    /// Create a node with a generated id.
    pub fn generated(kind: StepKind, label: &str) -> Self {
        Self::new(NodeId::generate(), kind, label)
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }
}

/// A directed dependency: `source` must complete before `target` starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub source: NodeId,
    pub target: NodeId,
}

/// Serialized form of a node, as submitted to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub id: String,
    pub kind: StepKind,
    pub label: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Ids of the steps that must finish first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}
