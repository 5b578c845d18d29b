//! Core workflow type definitions.
//!
//! These mirror what the backend reports for a submitted workflow. The
//! controller treats every snapshot received from the backend as a full
//! replacement of its local copy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a workflow, assigned by the backend on creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(pub String);

impl WorkflowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkflowId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of the user session that owns the live channel and workflows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Create a new random session identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Status of a workflow in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// A plan was generated and waits for a human decision.
    PendingApproval,
    /// Workflow is actively executing
    Running,
    /// Workflow execution paused
    Paused,
    /// Workflow completed successfully
    Completed,
    /// Workflow failed with error
    Failed,
    /// Workflow was cancelled or its plan rejected
    Cancelled,
}

impl WorkflowStatus {
    /// Terminal workflows leave the active set and move to history.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStatus::PendingApproval => write!(f, "pending_approval"),
            WorkflowStatus::Running => write!(f, "running"),
            WorkflowStatus::Paused => write!(f, "paused"),
            WorkflowStatus::Completed => write!(f, "completed"),
            WorkflowStatus::Failed => write!(f, "failed"),
            WorkflowStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Execution discipline for a workflow's steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    Sequential,
    Parallel,
    Pipeline,
    Collaborative,
    Adaptive,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Sequential => write!(f, "sequential"),
            Strategy::Parallel => write!(f, "parallel"),
            Strategy::Pipeline => write!(f, "pipeline"),
            Strategy::Collaborative => write!(f, "collaborative"),
            Strategy::Adaptive => write!(f, "adaptive"),
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(Strategy::Sequential),
            "parallel" => Ok(Strategy::Parallel),
            "pipeline" => Ok(Strategy::Pipeline),
            "collaborative" => Ok(Strategy::Collaborative),
            "adaptive" => Ok(Strategy::Adaptive),
            other => Err(format!("unknown strategy: {}", other)),
        }
    }
}

/// Risk level the backend assigns to a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

/// Status of an individual step within a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    /// The step is blocked on a human approval.
    AwaitingApproval,
    /// Approved by a human, waiting for the executor to pick it up.
    Approved,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    /// Whether a human may still approve or skip this step.
    pub fn is_actionable(&self) -> bool {
        matches!(self, StepStatus::Pending | StepStatus::AwaitingApproval)
    }
}

/// A step of a submitted workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub description: String,
    /// Command or action payload executed by the backend.
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub status: StepStatus,
}

impl WorkflowStep {
    pub fn new(id: &str, description: &str, command: &str) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            command: command.to_string(),
            risk_level: RiskLevel::Low,
            status: StepStatus::Pending,
        }
    }
}

/// A step as proposed in a plan, before it exists as a workflow step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedStep {
    pub description: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub risk_level: RiskLevel,
}

/// A generated plan awaiting the user's approve/reject decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub summary: String,
    pub total_steps: usize,
    #[serde(default, alias = "estimated_duration")]
    pub estimated_duration_secs: Option<u64>,
    #[serde(default)]
    pub steps: Vec<ProposedStep>,
}

impl PendingApproval {
    /// Build a plan that simply lists a workflow's steps.
    pub fn from_steps(summary: &str, steps: &[WorkflowStep]) -> Self {
        Self {
            summary: summary.to_string(),
            total_steps: steps.len(),
            estimated_duration_secs: None,
            steps: steps
                .iter()
                .map(|s| ProposedStep {
                    description: s.description.clone(),
                    command: s.command.clone(),
                    risk_level: s.risk_level,
                })
                .collect(),
        }
    }

    /// Highest risk among the proposed steps.
    pub fn max_risk(&self) -> RiskLevel {
        self.steps
            .iter()
            .map(|s| s.risk_level)
            .max()
            .unwrap_or_default()
    }
}

/// A submitted, backend-tracked workflow.
///
/// The plan is only reachable through [`Workflow::pending_approval`] and is
/// kept consistent with the status: present iff `PendingApproval`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub status: WorkflowStatus,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub strategy: Strategy,
    pub created_at: DateTime<Utc>,
    /// Natural-language goal, for workflows created from one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    /// Monotonic snapshot version, if the backend provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default, alias = "plan", skip_serializing_if = "Option::is_none")]
    pending_approval: Option<PendingApproval>,
}

impl Workflow {
    /// Create a workflow in the given status.
    ///
    /// A `PendingApproval` workflow gets a plan listing its steps.
    pub fn new(id: impl Into<String>, status: WorkflowStatus, steps: Vec<WorkflowStep>) -> Self {
        let mut workflow = Self {
            id: WorkflowId::new(id),
            status,
            steps,
            strategy: Strategy::default(),
            created_at: Utc::now(),
            goal: None,
            version: None,
            pending_approval: None,
        };
        workflow.normalize();
        workflow
    }

    /// Attach a specific plan and move the workflow to `PendingApproval`.
    pub fn with_pending_approval(mut self, plan: PendingApproval) -> Self {
        self.status = WorkflowStatus::PendingApproval;
        self.pending_approval = Some(plan);
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_goal(mut self, goal: &str) -> Self {
        self.goal = Some(goal.to_string());
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn pending_approval(&self) -> Option<&PendingApproval> {
        self.pending_approval.as_ref()
    }

    /// Change status, keeping the plan invariant.
    pub fn set_status(&mut self, status: WorkflowStatus) {
        self.status = status;
        self.normalize();
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn step(&self, step_id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn step_mut(&mut self, step_id: &str) -> Option<&mut WorkflowStep> {
        self.steps.iter_mut().find(|s| s.id == step_id)
    }

    /// Restore the plan invariant after deserialization or a status change.
    ///
    /// Drops the plan outside `PendingApproval`; synthesizes one from the
    /// steps when a `PendingApproval` snapshot arrives without it.
    pub fn normalize(&mut self) {
        match self.status {
            WorkflowStatus::PendingApproval => {
                if self.pending_approval.is_none() {
                    let summary = self.goal.clone().unwrap_or_default();
                    self.pending_approval = Some(PendingApproval::from_steps(&summary, &self.steps));
                }
            }
            _ => self.pending_approval = None,
        }
    }
}
