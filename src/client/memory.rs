//! In-process simulation of the orchestration backend.
//!
//! Useful for offline runs and for exercising the controller without a
//! network. The simulation assigns ids `wf-1`, `wf-2`, ..., turns goals into
//! plans, validates lifecycle requests the way the real backend does, and
//! supports failure injection.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{
    AgentCapabilities, OrchestrationClient, OrchestrationStatus, StrategyInfo, WorkflowTemplate,
};
use crate::core::StepDefinition;
use crate::error::{Error, Result};
use crate::workflow::{
    LifecycleAction, PendingApproval, ProposedStep, RiskLevel, SessionId, StepStatus, Strategy,
    Workflow, WorkflowId, WorkflowStatus, WorkflowStep,
};

/// Rough per-step duration used for plan estimates.
const SECS_PER_STEP: u64 = 60;

#[derive(Debug, Default)]
struct Backend {
    workflows: BTreeMap<WorkflowId, Workflow>,
    next_id: u64,
    templates: Vec<WorkflowTemplate>,
    failures: VecDeque<String>,
    requests: usize,
}

impl Backend {
    fn next_id(&mut self) -> WorkflowId {
        self.next_id += 1;
        WorkflowId::new(format!("wf-{}", self.next_id))
    }

    fn insert(&mut self, workflow: Workflow) -> Workflow {
        self.workflows.insert(workflow.id.clone(), workflow.clone());
        workflow
    }

    fn workflow_mut(&mut self, id: &WorkflowId) -> Result<&mut Workflow> {
        self.workflows
            .get_mut(id)
            .ok_or_else(|| Error::RequestFailed(format!("Workflow {} not found", id)))
    }
}

/// Backend simulation implementing [`OrchestrationClient`].
#[derive(Debug)]
pub struct InMemoryOrchestrationClient {
    backend: Mutex<Backend>,
    latency: Option<Duration>,
    echo_snapshots: bool,
}

impl InMemoryOrchestrationClient {
    /// Create a backend seeded with the default template catalogue.
    pub fn new() -> Self {
        Self {
            backend: Mutex::new(Backend {
                templates: default_templates(),
                ..Default::default()
            }),
            latency: None,
            echo_snapshots: true,
        }
    }

    /// Delay every response by `latency` (works with paused tokio time).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Acknowledge lifecycle requests without returning a snapshot.
    pub fn without_snapshots(mut self) -> Self {
        self.echo_snapshots = false;
        self
    }

    /// Make the next request fail with `message`.
    pub fn fail_next(&self, message: &str) {
        self.lock().failures.push_back(message.to_string());
    }

    /// Number of requests received so far, failed ones included.
    pub fn request_count(&self) -> usize {
        self.lock().requests
    }

    /// Current backend-side snapshot of a workflow.
    pub fn snapshot(&self, id: &WorkflowId) -> Option<Workflow> {
        self.lock().workflows.get(id).cloned()
    }

    /// Simulate the executor moving a workflow to `status`.
    ///
    /// Returns the new snapshot, as it would be pushed to clients.
    pub fn set_status(&self, id: &WorkflowId, status: WorkflowStatus) -> Option<Workflow> {
        let mut backend = self.lock();
        let workflow = backend.workflows.get_mut(id)?;
        workflow.set_status(status);
        if status == WorkflowStatus::Completed {
            for step in workflow.steps.iter_mut() {
                if step.status != StepStatus::Skipped {
                    step.status = StepStatus::Completed;
                }
            }
        }
        Some(workflow.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Backend> {
        self.backend.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count the request, wait out the latency, and apply an injected failure.
    async fn begin(&self) -> Result<()> {
        let failure = {
            let mut backend = self.lock();
            backend.requests += 1;
            backend.failures.pop_front()
        };
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(message) => Err(Error::RequestFailed(message)),
            None => Ok(()),
        }
    }

    async fn transition(
        &self,
        id: &WorkflowId,
        action: LifecycleAction,
    ) -> Result<Option<Workflow>> {
        self.begin().await?;
        let mut backend = self.lock();
        let workflow = backend.workflow_mut(id)?;
        let target = workflow.status.after(action).ok_or_else(|| {
            Error::RequestFailed(format!("Cannot {} workflow {} while {}", action, id, workflow.status))
        })?;
        workflow.set_status(target);
        if action == LifecycleAction::ApprovePlan {
            if let Some(step) = workflow.steps.first_mut() {
                step.status = StepStatus::Running;
            }
        }
        Ok(self.echo(workflow))
    }

    async fn step_action(
        &self,
        id: &WorkflowId,
        step_id: &str,
        action: LifecycleAction,
    ) -> Result<Option<Workflow>> {
        self.begin().await?;
        let mut backend = self.lock();
        let workflow = backend.workflow_mut(id)?;
        if !workflow.status.allows(action) {
            return Err(Error::RequestFailed(format!(
                "Workflow {} is {}",
                id, workflow.status
            )));
        }
        let step = workflow
            .step_mut(step_id)
            .ok_or_else(|| Error::RequestFailed(format!("Step {} not found", step_id)))?;
        if !step.status.is_actionable() {
            return Err(Error::RequestFailed(format!(
                "Step {} can no longer be changed",
                step_id
            )));
        }
        step.status = match action {
            LifecycleAction::SkipStep => StepStatus::Skipped,
            _ => StepStatus::Approved,
        };
        Ok(self.echo(workflow))
    }

    fn echo(&self, workflow: &mut Workflow) -> Option<Workflow> {
        workflow.version = Some(workflow.version.unwrap_or(0) + 1);
        self.echo_snapshots.then(|| workflow.clone())
    }
}

impl Default for InMemoryOrchestrationClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Break a goal into clauses, one proposed step each.
fn plan_for_goal(goal: &str) -> PendingApproval {
    let mut clauses = vec![goal.to_string()];
    for separator in [",", ";", " and ", " then "] {
        clauses = clauses
            .iter()
            .flat_map(|clause| clause.split(separator))
            .map(|clause| clause.trim().to_string())
            .filter(|clause| !clause.is_empty())
            .collect();
    }
    if clauses.is_empty() {
        clauses.push(goal.trim().to_string());
    }

    let steps: Vec<ProposedStep> = clauses
        .into_iter()
        .map(|clause| ProposedStep {
            risk_level: assess_risk(&clause),
            command: format!("# {}", clause),
            description: clause,
        })
        .collect();

    PendingApproval {
        summary: format!("Plan for: {}", goal.trim()),
        total_steps: steps.len(),
        estimated_duration_secs: Some(steps.len() as u64 * SECS_PER_STEP),
        steps,
    }
}

fn assess_risk(text: &str) -> RiskLevel {
    let text = text.to_lowercase();
    if ["delete", "drop", "rm ", "format", "wipe"].iter().any(|w| text.contains(w)) {
        RiskLevel::High
    } else if ["install", "update", "upgrade", "restart", "deploy"]
        .iter()
        .any(|w| text.contains(w))
    {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

fn steps_from_plan(plan: &PendingApproval) -> Vec<WorkflowStep> {
    plan.steps
        .iter()
        .enumerate()
        .map(|(i, proposed)| WorkflowStep {
            id: format!("step-{}", i + 1),
            description: proposed.description.clone(),
            command: proposed.command.clone(),
            risk_level: proposed.risk_level,
            status: StepStatus::Pending,
        })
        .collect()
}

fn default_templates() -> Vec<WorkflowTemplate> {
    let step = |description: &str, command: &str, risk_level| ProposedStep {
        description: description.to_string(),
        command: command.to_string(),
        risk_level,
    };
    vec![
        WorkflowTemplate {
            id: "system-update".to_string(),
            name: "System update".to_string(),
            description: "Refresh package lists and upgrade installed packages".to_string(),
            strategy: Strategy::Sequential,
            requires_approval: false,
            steps: vec![
                step("Refresh package lists", "apt-get update", RiskLevel::Low),
                step("Upgrade packages", "apt-get upgrade -y", RiskLevel::Medium),
            ],
        },
        WorkflowTemplate {
            id: "docker-setup".to_string(),
            name: "Docker setup".to_string(),
            description: "Install Docker and verify the daemon".to_string(),
            strategy: Strategy::Sequential,
            requires_approval: true,
            steps: vec![
                step("Install docker", "apt-get install -y docker.io", RiskLevel::Medium),
                step("Enable service", "systemctl enable --now docker", RiskLevel::Medium),
                step("Smoke test", "docker run --rm hello-world", RiskLevel::Low),
            ],
        },
        WorkflowTemplate {
            id: "health-check".to_string(),
            name: "Health check".to_string(),
            description: "Collect disk, memory and load figures in parallel".to_string(),
            strategy: Strategy::Parallel,
            requires_approval: false,
            steps: vec![
                step("Disk usage", "df -h", RiskLevel::Low),
                step("Memory usage", "free -m", RiskLevel::Low),
                step("Load average", "uptime", RiskLevel::Low),
            ],
        },
    ]
}

#[async_trait]
impl OrchestrationClient for InMemoryOrchestrationClient {
    async fn fetch_status(&self) -> Result<OrchestrationStatus> {
        self.begin().await?;
        let backend = self.lock();
        Ok(OrchestrationStatus {
            status: "healthy".to_string(),
            active_workflows: backend
                .workflows
                .values()
                .filter(|wf| !wf.is_terminal())
                .count(),
            available_agents: 3,
            uptime_secs: None,
        })
    }

    async fn fetch_strategies(&self) -> Result<Vec<StrategyInfo>> {
        self.begin().await?;
        let info = |name, description: &str| StrategyInfo {
            name,
            description: description.to_string(),
        };
        Ok(vec![
            info(Strategy::Sequential, "Run steps one after another"),
            info(Strategy::Parallel, "Run independent steps concurrently"),
            info(Strategy::Pipeline, "Stream each step's output into the next"),
            info(Strategy::Collaborative, "Agents share context while working"),
            info(Strategy::Adaptive, "Re-plan between steps based on results"),
        ])
    }

    async fn fetch_agent_capabilities(&self) -> Result<AgentCapabilities> {
        self.begin().await?;
        let mut agents = AgentCapabilities::new();
        agents.insert(
            "shell".to_string(),
            vec!["command".to_string(), "script".to_string()],
        );
        agents.insert(
            "browser".to_string(),
            vec!["navigate".to_string(), "extract".to_string()],
        );
        agents.insert("code".to_string(), vec!["analyze".to_string(), "edit".to_string()]);
        Ok(agents)
    }

    async fn fetch_templates(&self) -> Result<Vec<WorkflowTemplate>> {
        self.begin().await?;
        Ok(self.lock().templates.clone())
    }

    async fn fetch_active_workflows(&self) -> Result<Vec<Workflow>> {
        self.begin().await?;
        Ok(self
            .lock()
            .workflows
            .values()
            .filter(|wf| !wf.is_terminal())
            .cloned()
            .collect())
    }

    async fn fetch_workflow(&self, id: &WorkflowId) -> Result<Workflow> {
        self.begin().await?;
        let mut backend = self.lock();
        backend.workflow_mut(id).map(|wf| wf.clone())
    }

    async fn create_from_template(&self, template_id: &str, _session: &SessionId) -> Result<Workflow> {
        self.begin().await?;
        let mut backend = self.lock();
        let template = backend
            .templates
            .iter()
            .find(|t| t.id == template_id)
            .cloned()
            .ok_or_else(|| Error::RequestFailed(format!("Template {} not found", template_id)))?;

        let plan = PendingApproval {
            summary: template.description.clone(),
            total_steps: template.steps.len(),
            estimated_duration_secs: Some(template.steps.len() as u64 * SECS_PER_STEP),
            steps: template.steps.clone(),
        };
        let id = backend.next_id();
        let mut workflow = Workflow::new(id.0, WorkflowStatus::Running, steps_from_plan(&plan))
            .with_strategy(template.strategy)
            .with_version(1);
        if template.requires_approval {
            workflow = workflow.with_pending_approval(plan);
        }
        Ok(backend.insert(workflow))
    }

    async fn create_from_goal(
        &self,
        goal: &str,
        _session: &SessionId,
        require_approval: bool,
    ) -> Result<Workflow> {
        self.begin().await?;
        if goal.trim().is_empty() {
            return Err(Error::RequestFailed("Goal must not be empty".to_string()));
        }
        let plan = plan_for_goal(goal);
        let mut backend = self.lock();
        let id = backend.next_id();
        let mut workflow = Workflow::new(id.0, WorkflowStatus::Running, steps_from_plan(&plan))
            .with_strategy(Strategy::Adaptive)
            .with_goal(goal)
            .with_version(1);
        if require_approval {
            workflow = workflow.with_pending_approval(plan);
        }
        Ok(backend.insert(workflow))
    }

    async fn create_from_steps(
        &self,
        steps: &[StepDefinition],
        strategy: Strategy,
        _session: &SessionId,
        require_approval: bool,
    ) -> Result<Workflow> {
        self.begin().await?;
        if steps.is_empty() {
            return Err(Error::RequestFailed("Workflow has no steps".to_string()));
        }
        let steps: Vec<WorkflowStep> = steps
            .iter()
            .map(|def| {
                let command = def
                    .params
                    .get("command")
                    .and_then(|v| v.as_str())
                    .unwrap_or(def.label.as_str());
                let mut step = WorkflowStep::new(&def.id, &def.label, command);
                step.risk_level = assess_risk(command);
                step
            })
            .collect();

        let mut backend = self.lock();
        let id = backend.next_id();
        let status = if require_approval {
            WorkflowStatus::PendingApproval
        } else {
            WorkflowStatus::Running
        };
        let workflow = Workflow::new(id.0, status, steps)
            .with_strategy(strategy)
            .with_version(1);
        Ok(backend.insert(workflow))
    }

    async fn start(&self, id: &WorkflowId) -> Result<Option<Workflow>> {
        self.transition(id, LifecycleAction::Start).await
    }

    async fn pause(&self, id: &WorkflowId) -> Result<Option<Workflow>> {
        self.transition(id, LifecycleAction::Pause).await
    }

    async fn resume(&self, id: &WorkflowId) -> Result<Option<Workflow>> {
        self.transition(id, LifecycleAction::Resume).await
    }

    async fn cancel(&self, id: &WorkflowId) -> Result<Option<Workflow>> {
        self.transition(id, LifecycleAction::Cancel).await
    }

    async fn approve_step(&self, id: &WorkflowId, step_id: &str) -> Result<Option<Workflow>> {
        self.step_action(id, step_id, LifecycleAction::ApproveStep).await
    }

    async fn skip_step(&self, id: &WorkflowId, step_id: &str) -> Result<Option<Workflow>> {
        self.step_action(id, step_id, LifecycleAction::SkipStep).await
    }

    async fn approve_plan(&self, id: &WorkflowId) -> Result<Option<Workflow>> {
        self.transition(id, LifecycleAction::ApprovePlan).await
    }

    async fn reject_plan(&self, id: &WorkflowId, _reason: Option<&str>) -> Result<Option<Workflow>> {
        self.transition(id, LifecycleAction::RejectPlan).await
    }
}
