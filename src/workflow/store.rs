//! The workflow state map shared by the controller and its readers.
//!
//! Only `LifecycleController` holds a mutable handle; everything else reads
//! cloned snapshots. Optimistic writes are tracked per workflow against the
//! last state the backend confirmed, so failed requests can be undone even
//! when several of them overlap.

use std::collections::{HashMap, VecDeque};

use crate::client::{Catalog, SystemHealth};

use super::{Workflow, WorkflowId};

/// Default number of finished workflows kept in history.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// What a write did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The workflow is (still) in the active set.
    Active,
    /// The workflow reached a terminal status and sits in history.
    Archived,
    /// The snapshot was older than what we have and was dropped.
    Stale,
}

/// Handle for one optimistic write, returned by [`WorkflowStore::apply_optimistic`].
#[derive(Debug, Clone)]
pub struct OptimisticWrite {
    written: Workflow,
    epoch: u64,
}

impl OptimisticWrite {
    pub fn id(&self) -> &WorkflowId {
        &self.written.id
    }
}

/// Bookkeeping for a workflow with requests outstanding.
#[derive(Debug)]
struct Pending {
    /// Last state the backend sent or accepted.
    confirmed: Workflow,
    outstanding: usize,
    /// The stored copy is a local write the backend has not answered for.
    unconfirmed: bool,
    /// Bumped on every server merge.
    epoch: u64,
}

#[derive(Debug)]
pub struct WorkflowStore {
    active: HashMap<WorkflowId, Workflow>,
    /// Finished workflows, newest first.
    history: VecDeque<Workflow>,
    pending: HashMap<WorkflowId, Pending>,
    history_limit: usize,
    current: Option<WorkflowId>,
    health: Option<SystemHealth>,
    catalog: Option<Catalog>,
}

impl WorkflowStore {
    pub fn new(history_limit: usize) -> Self {
        Self {
            active: HashMap::new(),
            history: VecDeque::new(),
            pending: HashMap::new(),
            history_limit,
            current: None,
            health: None,
            catalog: None,
        }
    }

    /// Look a workflow up in the active set, then in history.
    pub fn get(&self, id: &WorkflowId) -> Option<&Workflow> {
        self.active
            .get(id)
            .or_else(|| self.history.iter().find(|wf| &wf.id == id))
    }

    pub fn is_active(&self, id: &WorkflowId) -> bool {
        self.active.contains_key(id)
    }

    /// Active workflows, oldest first.
    pub fn active(&self) -> Vec<Workflow> {
        let mut list: Vec<Workflow> = self.active.values().cloned().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        list
    }

    pub fn active_ids(&self) -> Vec<WorkflowId> {
        self.active.keys().cloned().collect()
    }

    /// Finished workflows, newest first.
    pub fn history(&self) -> Vec<Workflow> {
        self.history.iter().cloned().collect()
    }

    /// Whether a request on the workflow is still waiting for its answer.
    pub fn has_pending(&self, id: &WorkflowId) -> bool {
        self.pending.contains_key(id)
    }

    /// Merge an authoritative snapshot from the backend.
    ///
    /// The snapshot replaces whatever we had. The one exception: when both
    /// sides carry a version and the incoming one is older, it is dropped.
    pub fn merge_server(&mut self, mut workflow: Workflow) -> MergeOutcome {
        if let (Some(incoming), Some(known)) = (
            workflow.version,
            self.get(&workflow.id).and_then(|wf| wf.version),
        ) {
            if incoming < known {
                return MergeOutcome::Stale;
            }
        }
        workflow.normalize();
        if let Some(pending) = self.pending.get_mut(&workflow.id) {
            pending.confirmed = workflow.clone();
            pending.unconfirmed = false;
            pending.epoch += 1;
        }
        let outcome = self.insert(workflow);
        self.trim_history();
        outcome
    }

    /// Write a local change ahead of the backend's answer.
    ///
    /// The state before the first outstanding write is remembered as the
    /// confirmed state. Terminal writes do not count against the history
    /// limit until the request settles.
    pub fn apply_optimistic(&mut self, mut workflow: Workflow) -> (MergeOutcome, OptimisticWrite) {
        workflow.normalize();
        let base = self.get(&workflow.id).cloned();
        let pending = self
            .pending
            .entry(workflow.id.clone())
            .or_insert_with(|| Pending {
                confirmed: base.unwrap_or_else(|| workflow.clone()),
                outstanding: 0,
                unconfirmed: false,
                epoch: 0,
            });
        pending.outstanding += 1;
        pending.unconfirmed = true;
        let write = OptimisticWrite {
            written: workflow.clone(),
            epoch: pending.epoch,
        };
        (self.insert(workflow), write)
    }

    /// The backend accepted the request behind `write`.
    ///
    /// Unless a server snapshot arrived since, the written state becomes the
    /// confirmed one.
    pub fn accept_optimistic(&mut self, write: OptimisticWrite) {
        let id = write.written.id.clone();
        if let Some(pending) = self.pending.get_mut(&id) {
            if pending.epoch == write.epoch {
                pending.confirmed = write.written;
            }
            pending.outstanding = pending.outstanding.saturating_sub(1);
            if pending.outstanding == 0 {
                self.pending.remove(&id);
            }
        }
        self.trim_history();
    }

    /// The request behind `write` failed.
    ///
    /// Once no request on the workflow is outstanding, a stored copy that is
    /// still a local write is replaced by the confirmed state, which is
    /// returned. A server snapshot that landed in between is kept.
    pub fn reject_optimistic(&mut self, write: OptimisticWrite) -> Option<Workflow> {
        let id = write.written.id;
        let pending = self.pending.get_mut(&id)?;
        pending.outstanding = pending.outstanding.saturating_sub(1);
        if pending.outstanding > 0 {
            return None;
        }
        let pending = self.pending.remove(&id)?;
        let restored = if pending.unconfirmed {
            self.insert(pending.confirmed.clone());
            Some(pending.confirmed)
        } else {
            None
        };
        self.trim_history();
        restored
    }

    pub fn select(&mut self, id: Option<WorkflowId>) {
        self.current = id;
    }

    pub fn current(&self) -> Option<&Workflow> {
        self.current.as_ref().and_then(|id| self.get(id))
    }

    pub fn health(&self) -> Option<&SystemHealth> {
        self.health.as_ref()
    }

    pub fn set_health(&mut self, health: SystemHealth) {
        self.health = Some(health);
    }

    pub fn catalog(&self) -> Option<&Catalog> {
        self.catalog.as_ref()
    }

    pub fn set_catalog(&mut self, catalog: Catalog) {
        self.catalog = Some(catalog);
    }

    /// Store a workflow, routing it by status.
    ///
    /// Terminal workflows leave the active set and are pushed to the front
    /// of history; a non-terminal snapshot of an archived workflow brings it
    /// back to the active set.
    fn insert(&mut self, workflow: Workflow) -> MergeOutcome {
        let id = workflow.id.clone();
        self.active.remove(&id);
        self.history.retain(|wf| wf.id != id);

        if workflow.is_terminal() {
            self.history.push_front(workflow);
            MergeOutcome::Archived
        } else {
            self.active.insert(id, workflow);
            MergeOutcome::Active
        }
    }

    /// Drop the oldest settled entries beyond the history limit.
    fn trim_history(&mut self) {
        let pending = &self.pending;
        let mut settled = self
            .history
            .iter()
            .filter(|wf| !pending.contains_key(&wf.id))
            .count();
        while settled > self.history_limit {
            match self
                .history
                .iter()
                .rposition(|wf| !pending.contains_key(&wf.id))
            {
                Some(pos) => {
                    self.history.remove(pos);
                    settled -= 1;
                }
                None => break,
            }
        }
    }
}

impl Default for WorkflowStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}
