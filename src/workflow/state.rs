//! Workflow lifecycle transition rules.
//!
//! The state machine:
//!
//! ```text
//! pending_approval --approve_plan--> running
//! pending_approval --reject_plan---> cancelled
//! running  --pause--> paused --resume--> running
//! paused   --start--> running            (running --start--> running)
//! pending_approval | running | paused --cancel--> cancelled
//! running --approve_step / skip_step--> running
//! ```
//!
//! `completed` and `failed` are only ever reported by the backend.

use crate::error::{Error, Result};

use super::{Workflow, WorkflowStatus};

/// A user intent that changes a workflow's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleAction {
    ApprovePlan,
    RejectPlan,
    Start,
    Pause,
    Resume,
    Cancel,
    ApproveStep,
    SkipStep,
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::ApprovePlan => "approve plan of",
            LifecycleAction::RejectPlan => "reject plan of",
            LifecycleAction::Start => "start",
            LifecycleAction::Pause => "pause",
            LifecycleAction::Resume => "resume",
            LifecycleAction::Cancel => "cancel",
            LifecycleAction::ApproveStep => "approve a step of",
            LifecycleAction::SkipStep => "skip a step of",
        }
    }
}

impl std::fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl WorkflowStatus {
    /// Status reached by applying `action`, or `None` if the action is not
    /// allowed from this status.
    pub fn after(self, action: LifecycleAction) -> Option<WorkflowStatus> {
        use LifecycleAction as A;
        use WorkflowStatus as S;

        match (self, action) {
            (S::PendingApproval, A::ApprovePlan) => Some(S::Running),
            (S::PendingApproval, A::RejectPlan) => Some(S::Cancelled),
            (S::Running, A::Start) | (S::Paused, A::Start) => Some(S::Running),
            (S::Running, A::Pause) => Some(S::Paused),
            (S::Paused, A::Resume) => Some(S::Running),
            (S::PendingApproval, A::Cancel) | (S::Running, A::Cancel) | (S::Paused, A::Cancel) => {
                Some(S::Cancelled)
            }
            (S::Running, A::ApproveStep) | (S::Running, A::SkipStep) => Some(S::Running),
            _ => None,
        }
    }

    pub fn allows(self, action: LifecycleAction) -> bool {
        self.after(action).is_some()
    }
}

/// Validate `action` against the workflow's current status.
///
/// Returns the target status, or `InvalidTransition` without touching the
/// workflow.
pub fn check_transition(workflow: &Workflow, action: LifecycleAction) -> Result<WorkflowStatus> {
    workflow
        .status
        .after(action)
        .ok_or_else(|| Error::InvalidTransition {
            workflow: workflow.id.to_string(),
            from: workflow.status,
            action: action.as_str(),
        })
}

/// Actions the view layer should currently offer for a workflow.
pub fn available_actions(status: WorkflowStatus) -> Vec<LifecycleAction> {
    [
        LifecycleAction::ApprovePlan,
        LifecycleAction::RejectPlan,
        LifecycleAction::Start,
        LifecycleAction::Pause,
        LifecycleAction::Resume,
        LifecycleAction::Cancel,
        LifecycleAction::ApproveStep,
        LifecycleAction::SkipStep,
    ]
    .into_iter()
    .filter(|action| status.allows(*action))
    .collect()
}
