//! Workflow lifecycle controller.
//!
//! The controller is the only writer of the shared [`WorkflowStore`]. User
//! intents go through it as named operations; each operation validates the
//! transition, applies it optimistically, issues exactly one backend
//! request, and then either reconciles with the backend's answer or rolls
//! the optimistic change back.
//!
//! Three sources write into the store and may interleave freely: user
//! requests, the live channel, and the polling fallback. Every snapshot the
//! backend sends is merged as a full replacement, never as a delta.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use crate::client::{Catalog, OrchestrationClient, SystemHealth};
use crate::core::WorkflowGraph;
use crate::error::{Error, Result};
use crate::live::{LiveMessage, LiveUpdateHandler};
use crate::workflow::{
    check_transition, LifecycleAction, MergeOutcome, OptimisticWrite, PendingApproval, SessionId,
    StepStatus, Strategy, Workflow, WorkflowId, WorkflowStatus, WorkflowStore,
};

use super::events::{ControllerEvent, Notification};

/// Tracing target for lifecycle operations.
const TRACING_TARGET: &str = "flowdeck::orchestration::controller";

/// Capacity of the change-notification channel.
const EVENT_CAPACITY: usize = 256;

/// Owns workflow state and drives workflow lifecycles.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use flowdeck::client::InMemoryOrchestrationClient;
/// use flowdeck::orchestration::LifecycleController;
/// use flowdeck::workflow::SessionId;
///
/// let client = Arc::new(InMemoryOrchestrationClient::new());
/// let controller = LifecycleController::new(client, SessionId::generate(), 50);
///
/// let wf = controller.create_from_goal("install Docker", true).await?;
/// controller.approve_plan(&wf.id).await?;
/// ```
pub struct LifecycleController {
    client: Arc<dyn OrchestrationClient>,
    session: SessionId,
    store: RwLock<WorkflowStore>,
    events: broadcast::Sender<ControllerEvent>,
    mounted: AtomicBool,
}

impl LifecycleController {
    /// Create a controller for `session`, keeping up to `history_limit`
    /// finished workflows.
    pub fn new(
        client: Arc<dyn OrchestrationClient>,
        session: SessionId,
        history_limit: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            client,
            session,
            store: RwLock::new(WorkflowStore::new(history_limit)),
            events,
            mounted: AtomicBool::new(true),
        }
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Subscribe to state change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    /// Stop applying results. Requests still in flight complete, but what
    /// they return is discarded.
    pub fn teardown(&self) {
        tracing::debug!(target: TRACING_TARGET, session = %self.session, "controller torn down");
        self.mounted.store(false, Ordering::SeqCst);
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    // ========== Snapshots ==========

    /// Active workflows, oldest first.
    pub async fn active_workflows(&self) -> Vec<Workflow> {
        self.store.read().await.active()
    }

    /// Finished workflows, newest first.
    pub async fn history(&self) -> Vec<Workflow> {
        self.store.read().await.history()
    }

    pub async fn workflow(&self, id: &WorkflowId) -> Option<Workflow> {
        self.store.read().await.get(id).cloned()
    }

    /// The workflow shown in the detail view.
    pub async fn current_workflow(&self) -> Option<Workflow> {
        self.store.read().await.current().cloned()
    }

    /// Plan awaiting approval on the current workflow, if any.
    pub async fn pending_approval(&self) -> Option<PendingApproval> {
        self.store
            .read()
            .await
            .current()
            .and_then(|wf| wf.pending_approval().cloned())
    }

    pub async fn health(&self) -> Option<SystemHealth> {
        self.store.read().await.health().cloned()
    }

    pub async fn catalog(&self) -> Option<Catalog> {
        self.store.read().await.catalog().cloned()
    }

    /// Choose the workflow shown in the detail view.
    pub async fn select(&self, id: Option<WorkflowId>) {
        self.store.write().await.select(id.clone());
        self.emit(ControllerEvent::SelectionChanged { id });
    }

    // ========== Queries ==========

    /// Fetch status, strategies, agent capabilities and templates.
    pub async fn load_catalog(&self) -> Result<Catalog> {
        let client = &self.client;
        let fetched = futures::try_join!(
            client.fetch_status(),
            client.fetch_strategies(),
            client.fetch_agent_capabilities(),
            client.fetch_templates(),
        );
        let (status, strategies, agents, templates) = match fetched {
            Ok(parts) => parts,
            Err(e) => {
                self.notify_failure("load catalogue", &e);
                return Err(e);
            }
        };

        let catalog = Catalog {
            status,
            strategies,
            agents,
            templates,
        };
        if self.is_mounted() {
            self.store.write().await.set_catalog(catalog.clone());
            self.emit(ControllerEvent::CatalogLoaded);
        }
        Ok(catalog)
    }

    /// Re-fetch the active workflow list and merge it.
    ///
    /// Workflows we consider active but the backend no longer lists are
    /// fetched individually so their final status lands in history.
    ///
    /// Returns the number of snapshots merged.
    pub async fn refresh_active(&self) -> Result<usize> {
        let listed = self.client.fetch_active_workflows().await?;
        if !self.is_mounted() {
            return Ok(0);
        }

        let known = self.store.read().await.active_ids();
        let missing: Vec<WorkflowId> = known
            .into_iter()
            .filter(|id| !listed.iter().any(|wf| &wf.id == id))
            .collect();

        let mut merged = 0;
        for workflow in listed {
            if self.apply_server_snapshot(workflow).await.is_some() {
                merged += 1;
            }
        }

        for id in missing {
            match self.client.fetch_workflow(&id).await {
                Ok(workflow) => {
                    if self.apply_server_snapshot(workflow).await.is_some() {
                        merged += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(target: TRACING_TARGET, workflow = %id, error = %e, "refresh of unlisted workflow failed");
                }
            }
        }

        tracing::trace!(target: TRACING_TARGET, merged, "active workflows refreshed");
        Ok(merged)
    }

    /// Fetch one workflow from the backend and merge it.
    pub async fn fetch_workflow(&self, id: &WorkflowId) -> Result<Workflow> {
        let workflow = self.client.fetch_workflow(id).await?;
        self.apply_server_snapshot(workflow.clone()).await;
        Ok(self.workflow(id).await.unwrap_or(workflow))
    }

    // ========== Creation ==========

    /// Create a workflow from a catalogue template.
    pub async fn create_from_template(&self, template_id: &str) -> Result<Workflow> {
        let result = self
            .client
            .create_from_template(template_id, &self.session)
            .await;
        self.register_created(result, "create workflow from template").await
    }

    /// Submit a natural-language goal for the backend to plan.
    ///
    /// With `require_approval`, the workflow comes back in `PendingApproval`
    /// carrying the proposed plan.
    pub async fn create_from_goal(&self, goal: &str, require_approval: bool) -> Result<Workflow> {
        let result = self
            .client
            .create_from_goal(goal, &self.session, require_approval)
            .await;
        self.register_created(result, "create workflow from goal").await
    }

    /// Submit the builder graph as a workflow.
    ///
    /// Graph errors (e.g. a cycle) are reported before any request is made.
    pub async fn create_from_graph(
        &self,
        graph: &WorkflowGraph,
        strategy: Strategy,
        require_approval: bool,
    ) -> Result<Workflow> {
        let steps = graph.to_step_list()?;
        if steps.is_empty() {
            return Err(Error::Validation("workflow graph has no nodes".to_string()));
        }
        let result = self
            .client
            .create_from_steps(&steps, strategy, &self.session, require_approval)
            .await;
        self.register_created(result, "create workflow from graph").await
    }

    async fn register_created(&self, result: Result<Workflow>, what: &str) -> Result<Workflow> {
        let workflow = match result {
            Ok(workflow) => workflow,
            Err(e) => {
                self.notify_failure(what, &e);
                return Err(e);
            }
        };

        if !self.is_mounted() {
            return Ok(workflow);
        }

        tracing::info!(
            target: TRACING_TARGET,
            workflow = %workflow.id,
            status = %workflow.status,
            "workflow created"
        );
        let id = workflow.id.clone();
        self.apply_server_snapshot(workflow).await;
        self.select(Some(id.clone())).await;

        self.workflow(&id)
            .await
            .ok_or_else(|| Error::WorkflowNotFound(id.to_string()))
    }

    // ========== Lifecycle ==========

    /// Approve the plan of a `PendingApproval` workflow; it starts running.
    pub async fn approve_plan(&self, id: &WorkflowId) -> Result<()> {
        self.run_action(id, LifecycleAction::ApprovePlan, None, None)
            .await?;
        if self.is_mounted() {
            self.emit(ControllerEvent::Notification(Notification::info(format!(
                "Plan approved for workflow {}",
                id
            ))));
        }
        Ok(())
    }

    /// Reject the plan of a `PendingApproval` workflow; it is cancelled.
    pub async fn reject_plan(&self, id: &WorkflowId, reason: &str) -> Result<()> {
        self.run_action(id, LifecycleAction::RejectPlan, None, Some(reason))
            .await
    }

    pub async fn start(&self, id: &WorkflowId) -> Result<()> {
        self.run_action(id, LifecycleAction::Start, None, None).await
    }

    pub async fn pause(&self, id: &WorkflowId) -> Result<()> {
        self.run_action(id, LifecycleAction::Pause, None, None).await
    }

    pub async fn resume(&self, id: &WorkflowId) -> Result<()> {
        self.run_action(id, LifecycleAction::Resume, None, None).await
    }

    pub async fn cancel(&self, id: &WorkflowId) -> Result<()> {
        self.run_action(id, LifecycleAction::Cancel, None, None).await
    }

    pub async fn approve_step(&self, id: &WorkflowId, step_id: &str) -> Result<()> {
        self.run_action(id, LifecycleAction::ApproveStep, Some(step_id), None)
            .await
    }

    pub async fn skip_step(&self, id: &WorkflowId, step_id: &str) -> Result<()> {
        self.run_action(id, LifecycleAction::SkipStep, Some(step_id), None)
            .await
    }

    async fn run_action(
        &self,
        id: &WorkflowId,
        action: LifecycleAction,
        step_id: Option<&str>,
        reason: Option<&str>,
    ) -> Result<()> {
        let optimistic = self.apply_optimistic(id, action, step_id).await?;

        tracing::debug!(target: TRACING_TARGET, workflow = %id, %action, "request sent");
        let response = match action {
            LifecycleAction::ApprovePlan => self.client.approve_plan(id).await,
            LifecycleAction::RejectPlan => self.client.reject_plan(id, reason).await,
            LifecycleAction::Start => self.client.start(id).await,
            LifecycleAction::Pause => self.client.pause(id).await,
            LifecycleAction::Resume => self.client.resume(id).await,
            LifecycleAction::Cancel => self.client.cancel(id).await,
            LifecycleAction::ApproveStep => {
                self.client.approve_step(id, step_id.unwrap_or_default()).await
            }
            LifecycleAction::SkipStep => {
                self.client.skip_step(id, step_id.unwrap_or_default()).await
            }
        };

        self.settle(optimistic, action, response).await
    }

    /// Validate and apply the transition locally.
    ///
    /// Nothing is written when validation fails.
    async fn apply_optimistic(
        &self,
        id: &WorkflowId,
        action: LifecycleAction,
        step_id: Option<&str>,
    ) -> Result<OptimisticWrite> {
        let mut store = self.store.write().await;
        let previous = store
            .get(id)
            .cloned()
            .ok_or_else(|| Error::WorkflowNotFound(id.to_string()))?;

        let target = check_transition(&previous, action)?;

        let mut updated = previous;
        if let Some(step_id) = step_id {
            let step = updated.step_mut(step_id).ok_or_else(|| Error::StepNotFound {
                workflow: id.to_string(),
                step: step_id.to_string(),
            })?;
            if !step.status.is_actionable() {
                return Err(Error::Validation(format!(
                    "step {} of workflow {} can no longer be changed",
                    step_id, id
                )));
            }
            step.status = match action {
                LifecycleAction::SkipStep => StepStatus::Skipped,
                _ => StepStatus::Approved,
            };
        }
        updated.set_status(target);

        let (outcome, write) = store.apply_optimistic(updated);
        drop(store);

        self.emit_merge(id, target, outcome);
        Ok(write)
    }

    /// Reconcile with the backend's answer, or roll back on failure.
    async fn settle(
        &self,
        write: OptimisticWrite,
        action: LifecycleAction,
        response: Result<Option<Workflow>>,
    ) -> Result<()> {
        let id = write.id().clone();

        if !self.is_mounted() {
            tracing::debug!(target: TRACING_TARGET, workflow = %id, %action, "late response discarded");
            return response.map(|_| ());
        }

        match response {
            Ok(Some(snapshot)) => {
                self.apply_server_snapshot(snapshot).await;
                self.store.write().await.accept_optimistic(write);
                Ok(())
            }
            Ok(None) => {
                self.store.write().await.accept_optimistic(write);
                Ok(())
            }
            Err(e) => {
                let restored = self.store.write().await.reject_optimistic(write);
                if let Some(workflow) = restored {
                    tracing::debug!(target: TRACING_TARGET, workflow = %id, %action, "optimistic update rolled back");
                    let outcome = if workflow.is_terminal() {
                        MergeOutcome::Archived
                    } else {
                        MergeOutcome::Active
                    };
                    self.emit_merge(&id, workflow.status, outcome);
                }
                self.notify_failure(&format!("{} workflow {}", action, id), &e);
                Err(e)
            }
        }
    }

    // ========== Authoritative updates ==========

    /// Merge a workflow snapshot from the backend. The server always wins.
    ///
    /// Returns `None` when the controller is torn down or the snapshot was
    /// stale.
    pub async fn apply_server_snapshot(&self, workflow: Workflow) -> Option<MergeOutcome> {
        if !self.is_mounted() {
            return None;
        }
        let id = workflow.id.clone();
        let status = workflow.status;
        let outcome = self.store.write().await.merge_server(workflow);
        if outcome == MergeOutcome::Stale {
            tracing::debug!(target: TRACING_TARGET, workflow = %id, "stale snapshot dropped");
            return None;
        }
        self.emit_merge(&id, status, outcome);
        Some(outcome)
    }

    /// Replace the known system health.
    pub async fn set_health(&self, health: SystemHealth) {
        if !self.is_mounted() {
            return;
        }
        self.store.write().await.set_health(health);
        self.emit(ControllerEvent::HealthUpdated);
    }

    fn emit_merge(&self, id: &WorkflowId, status: WorkflowStatus, outcome: MergeOutcome) {
        let event = match outcome {
            MergeOutcome::Archived => ControllerEvent::WorkflowArchived {
                id: id.clone(),
                status,
            },
            MergeOutcome::Active => ControllerEvent::WorkflowUpdated {
                id: id.clone(),
                status,
            },
            MergeOutcome::Stale => return,
        };
        self.emit(event);
    }

    fn notify_failure(&self, what: &str, err: &Error) {
        tracing::warn!(target: TRACING_TARGET, error = %err, "failed to {}", what);
        self.emit(ControllerEvent::Notification(Notification::error(format!(
            "Failed to {}: {}",
            what, err
        ))));
    }

    fn emit(&self, event: ControllerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl LiveUpdateHandler for LifecycleController {
    async fn handle(&self, message: LiveMessage) {
        match message {
            LiveMessage::SystemHealth(health) => self.set_health(health).await,
            LiveMessage::WorkflowUpdate(workflow) => {
                self.apply_server_snapshot(workflow).await;
            }
            LiveMessage::ActiveWorkflows(workflows) => {
                for workflow in workflows {
                    self.apply_server_snapshot(workflow).await;
                }
            }
        }
    }
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("session", &self.session)
            .field("mounted", &self.is_mounted())
            .finish()
    }
}
