//! REST client for the orchestration backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{
    AgentCapabilities, OrchestrationClient, OrchestrationStatus, StrategyInfo, WorkflowTemplate,
};
use crate::core::StepDefinition;
use crate::error::{Error, Result};
use crate::workflow::{SessionId, Strategy, Workflow, WorkflowId};

/// Tracing target for backend requests.
const TRACING_TARGET: &str = "flowdeck::client::http";

/// Path prefix of the orchestration API.
const API_PREFIX: &str = "/api/orchestration";

/// Reply to a lifecycle request.
#[derive(Debug, Deserialize)]
struct ActionResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    workflow: Option<Workflow>,
}

/// Reply to a creation request: either the full workflow or just its id.
#[derive(Debug, Deserialize)]
struct CreateResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    workflow_id: Option<WorkflowId>,
    #[serde(default)]
    workflow: Option<Workflow>,
}

#[derive(Debug, Deserialize)]
struct WorkflowList {
    workflows: Vec<Workflow>,
}

fn default_success() -> bool {
    true
}

impl Default for ActionResponse {
    fn default() -> Self {
        Self {
            success: true,
            message: None,
            workflow: None,
        }
    }
}

/// Orchestration client over HTTP + JSON.
#[derive(Debug, Clone)]
pub struct HttpOrchestrationClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpOrchestrationClient {
    /// Create a client for the backend at `base_url` (e.g. `http://localhost:8000`).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        tracing::debug!(target: TRACING_TARGET, %url, "GET");
        let response = self.http.get(&url).send().await?;
        decode(response).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T> {
        parse(&self.post_text(path, body).await?)
    }

    async fn post_text(&self, path: &str, body: Value) -> Result<String> {
        let url = self.url(path);
        tracing::debug!(target: TRACING_TARGET, %url, "POST");
        let response = self.http.post(&url).json(&body).send().await?;
        read_body(response).await
    }

    async fn action(&self, path: &str, body: Value) -> Result<Option<Workflow>> {
        let reply = parse_action(&self.post_text(path, body).await?)?;
        action_outcome(reply)
    }

    async fn create(&self, path: &str, body: Value) -> Result<Workflow> {
        let reply: CreateResponse = self.post(path, body).await?;
        if !reply.success {
            return Err(Error::RequestFailed(
                reply.message.unwrap_or_else(|| "workflow creation rejected".to_string()),
            ));
        }
        match (reply.workflow, reply.workflow_id) {
            (Some(workflow), _) => Ok(workflow),
            (None, Some(id)) => self.fetch_workflow(&id).await,
            (None, None) => Err(Error::RequestFailed(
                "backend returned neither a workflow nor its id".to_string(),
            )),
        }
    }
}

/// Turn a response into `T`, or a `RequestFailed` carrying the backend's message.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    parse(&read_body(response).await?)
}

/// Body of a successful response.
async fn read_body(response: reqwest::Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = error_message(&body).unwrap_or_else(|| format!("HTTP {}", status));
        tracing::warn!(target: TRACING_TARGET, %status, %message, "request failed");
        return Err(Error::RequestFailed(message));
    }
    Ok(body)
}

fn parse<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body)
        .map_err(|e| Error::RequestFailed(format!("malformed response: {}", e)))
}

/// An empty 2xx body is a bare acknowledgement.
fn parse_action(body: &str) -> Result<ActionResponse> {
    if body.trim().is_empty() {
        return Ok(ActionResponse::default());
    }
    parse(body)
}

/// Pull a human-readable message out of an error body.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["detail", "message", "error"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .map(str::to_string)
}

fn action_outcome(reply: ActionResponse) -> Result<Option<Workflow>> {
    if reply.success {
        Ok(reply.workflow)
    } else {
        Err(Error::RequestFailed(
            reply.message.unwrap_or_else(|| "request rejected".to_string()),
        ))
    }
}

#[async_trait]
impl OrchestrationClient for HttpOrchestrationClient {
    async fn fetch_status(&self) -> Result<OrchestrationStatus> {
        self.get("/status").await
    }

    async fn fetch_strategies(&self) -> Result<Vec<StrategyInfo>> {
        self.get("/strategies").await
    }

    async fn fetch_agent_capabilities(&self) -> Result<AgentCapabilities> {
        self.get("/agents").await
    }

    async fn fetch_templates(&self) -> Result<Vec<WorkflowTemplate>> {
        self.get("/examples").await
    }

    async fn fetch_active_workflows(&self) -> Result<Vec<Workflow>> {
        let list: WorkflowList = self.get("/workflows/active").await?;
        Ok(list.workflows)
    }

    async fn fetch_workflow(&self, id: &WorkflowId) -> Result<Workflow> {
        self.get(&format!("/workflows/{}", id)).await
    }

    async fn create_from_template(&self, template_id: &str, session: &SessionId) -> Result<Workflow> {
        self.create(
            "/workflows/template",
            json!({ "template_id": template_id, "session_id": session }),
        )
        .await
    }

    async fn create_from_goal(
        &self,
        goal: &str,
        session: &SessionId,
        require_approval: bool,
    ) -> Result<Workflow> {
        self.create(
            "/workflows/goal",
            json!({
                "goal": goal,
                "session_id": session,
                "require_approval": require_approval,
            }),
        )
        .await
    }

    async fn create_from_steps(
        &self,
        steps: &[StepDefinition],
        strategy: Strategy,
        session: &SessionId,
        require_approval: bool,
    ) -> Result<Workflow> {
        self.create(
            "/workflows",
            json!({
                "steps": steps,
                "strategy": strategy,
                "session_id": session,
                "require_approval": require_approval,
            }),
        )
        .await
    }

    async fn start(&self, id: &WorkflowId) -> Result<Option<Workflow>> {
        self.action(&format!("/workflows/{}/start", id), json!({})).await
    }

    async fn pause(&self, id: &WorkflowId) -> Result<Option<Workflow>> {
        self.action(&format!("/workflows/{}/pause", id), json!({})).await
    }

    async fn resume(&self, id: &WorkflowId) -> Result<Option<Workflow>> {
        self.action(&format!("/workflows/{}/resume", id), json!({})).await
    }

    async fn cancel(&self, id: &WorkflowId) -> Result<Option<Workflow>> {
        self.action(&format!("/workflows/{}/cancel", id), json!({})).await
    }

    async fn approve_step(&self, id: &WorkflowId, step_id: &str) -> Result<Option<Workflow>> {
        self.action(&format!("/workflows/{}/steps/{}/approve", id, step_id), json!({}))
            .await
    }

    async fn skip_step(&self, id: &WorkflowId, step_id: &str) -> Result<Option<Workflow>> {
        self.action(&format!("/workflows/{}/steps/{}/skip", id, step_id), json!({}))
            .await
    }

    async fn approve_plan(&self, id: &WorkflowId) -> Result<Option<Workflow>> {
        self.action(&format!("/workflows/{}/approve", id), json!({})).await
    }

    async fn reject_plan(&self, id: &WorkflowId, reason: Option<&str>) -> Result<Option<Workflow>> {
        self.action(&format!("/workflows/{}/reject", id), json!({ "reason": reason }))
            .await
    }
}
