//! Orchestration backend client.
//!
//! The controller talks to the backend only through [`OrchestrationClient`].
//! Two implementations ship with the crate:
//! - [`HttpOrchestrationClient`] speaks the backend's REST API
//! - [`InMemoryOrchestrationClient`] simulates the backend in-process

mod http;
mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::StepDefinition;
use crate::error::Result;
use crate::workflow::{ProposedStep, SessionId, Strategy, Workflow, WorkflowId};

pub use http::HttpOrchestrationClient;
pub use memory::InMemoryOrchestrationClient;

/// Overall orchestration service status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationStatus {
    pub status: String,
    #[serde(default)]
    pub active_workflows: usize,
    #[serde(default)]
    pub available_agents: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_secs: Option<u64>,
}

/// An execution strategy the backend supports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyInfo {
    pub name: Strategy,
    #[serde(default)]
    pub description: String,
}

/// Agent name to the capabilities it advertises.
pub type AgentCapabilities = BTreeMap<String, Vec<String>>;

/// A canned workflow from the example catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub steps: Vec<ProposedStep>,
}

/// System health as pushed over the live channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    pub status: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// Read-only reference data shown next to the builder.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    pub status: OrchestrationStatus,
    pub strategies: Vec<StrategyInfo>,
    pub agents: AgentCapabilities,
    pub templates: Vec<WorkflowTemplate>,
}

/// Operations the backend exposes for workflow orchestration.
///
/// Creation returns the backend's snapshot of the new workflow (carrying
/// its assigned id). Lifecycle calls return an authoritative snapshot when
/// the backend includes one, `None` when it only acknowledges.
#[async_trait]
pub trait OrchestrationClient: Send + Sync {
    async fn fetch_status(&self) -> Result<OrchestrationStatus>;

    async fn fetch_strategies(&self) -> Result<Vec<StrategyInfo>>;

    async fn fetch_agent_capabilities(&self) -> Result<AgentCapabilities>;

    async fn fetch_templates(&self) -> Result<Vec<WorkflowTemplate>>;

    async fn fetch_active_workflows(&self) -> Result<Vec<Workflow>>;

    async fn fetch_workflow(&self, id: &WorkflowId) -> Result<Workflow>;

    async fn create_from_template(&self, template_id: &str, session: &SessionId) -> Result<Workflow>;

    async fn create_from_goal(
        &self,
        goal: &str,
        session: &SessionId,
        require_approval: bool,
    ) -> Result<Workflow>;

    async fn create_from_steps(
        &self,
        steps: &[StepDefinition],
        strategy: Strategy,
        session: &SessionId,
        require_approval: bool,
    ) -> Result<Workflow>;

    async fn start(&self, id: &WorkflowId) -> Result<Option<Workflow>>;

    async fn pause(&self, id: &WorkflowId) -> Result<Option<Workflow>>;

    async fn resume(&self, id: &WorkflowId) -> Result<Option<Workflow>>;

    async fn cancel(&self, id: &WorkflowId) -> Result<Option<Workflow>>;

    async fn approve_step(&self, id: &WorkflowId, step_id: &str) -> Result<Option<Workflow>>;

    async fn skip_step(&self, id: &WorkflowId, step_id: &str) -> Result<Option<Workflow>>;

    async fn approve_plan(&self, id: &WorkflowId) -> Result<Option<Workflow>>;

    async fn reject_plan(&self, id: &WorkflowId, reason: Option<&str>) -> Result<Option<Workflow>>;
}
