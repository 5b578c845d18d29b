//! Workflow types, lifecycle rules and the shared workflow state map.
//!
//! A workflow is a submitted, backend-tracked automation plan. This module
//! owns its data model, the status state machine, and the store the
//! lifecycle controller writes into.

mod state;
mod store;
mod types;

pub use state::{available_actions, check_transition, LifecycleAction};
pub use store::{MergeOutcome, OptimisticWrite, WorkflowStore, DEFAULT_HISTORY_LIMIT};
pub use types::{
    PendingApproval, ProposedStep, RiskLevel, SessionId, StepStatus, Strategy, Workflow,
    WorkflowId, WorkflowStatus, WorkflowStep,
};
