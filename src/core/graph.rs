//! Workflow builder graph.
//!
//! This module provides the `WorkflowGraph` that the builder view edits:
//! nodes are step definitions, edges are execution-order dependencies.
//! The graph may temporarily contain cycles while the user is editing;
//! they are only rejected when the graph is serialized for submission.

use crate::core::node::{NodeId, Position, StepDefinition, WorkflowEdge, WorkflowNode};
use crate::error::{Error, Result};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;
use std::collections::{BTreeMap, HashMap};

/// Tracing target for graph operations.
const TRACING_TARGET: &str = "flowdeck::core::graph";

/// A node plus the order it was inserted in, used to break ties.
#[derive(Debug, Clone)]
struct Slot {
    seq: u64,
    node: WorkflowNode,
}

/// The builder's node/edge set.
///
/// Uses a `StableDiGraph` so that node indices stay valid across removals,
/// plus an id index for O(1) lookups by `NodeId`.
pub struct WorkflowGraph {
    graph: StableDiGraph<Slot, ()>,
    index: HashMap<NodeId, NodeIndex>,
    next_seq: u64,
}

impl WorkflowGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            graph: StableDiGraph::new(),
            index: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Insert a node.
    ///
    /// # Errors
    /// Returns `DuplicateNode` if a node with the same id is already present.
    pub fn add_node(&mut self, node: WorkflowNode) -> Result<()> {
        if self.index.contains_key(&node.id) {
            return Err(Error::DuplicateNode(node.id.to_string()));
        }

        let id = node.id.clone();
        let seq = self.next_seq;
        self.next_seq += 1;

        let ix = self.graph.add_node(Slot { seq, node });
        self.index.insert(id, ix);
        Ok(())
    }

    /// Remove a node and every edge touching it.
    ///
    /// Returns the removed node, or `None` if the id was not present.
    pub fn remove_node(&mut self, id: &NodeId) -> Option<WorkflowNode> {
        let ix = self.index.remove(id)?;
        // StableGraph::remove_node drops incident edges as well.
        let slot = self.graph.remove_node(ix)?;
        tracing::trace!(target: TRACING_TARGET, node = %id, "node removed");
        Some(slot.node)
    }

    /// Update a node's canvas position.
    pub fn move_node(&mut self, id: &NodeId, position: Position) -> Result<()> {
        let ix = self.lookup(id)?;
        if let Some(slot) = self.graph.node_weight_mut(ix) {
            slot.node.position = position;
        }
        Ok(())
    }

    /// Record that `source` must complete before `target` starts.
    ///
    /// Re-adding an existing edge is a no-op.
    ///
    /// # Errors
    /// - `NodeNotFound` if either endpoint is absent
    /// - `SelfLoop` if `source == target`
    pub fn connect(&mut self, source: &NodeId, target: &NodeId) -> Result<()> {
        let from = self.lookup(source)?;
        let to = self.lookup(target)?;

        if from == to {
            return Err(Error::SelfLoop(source.to_string()));
        }

        if !self.graph.contains_edge(from, to) {
            self.graph.add_edge(from, to, ());
        }
        Ok(())
    }

    /// Remove the edge `source -> target` if present.
    ///
    /// Returns whether an edge was removed.
    pub fn disconnect(&mut self, source: &NodeId, target: &NodeId) -> bool {
        let (Some(&from), Some(&to)) = (self.index.get(source), self.index.get(target)) else {
            return false;
        };
        match self.graph.find_edge(from, to) {
            Some(edge) => self.graph.remove_edge(edge).is_some(),
            None => false,
        }
    }

    /// Get a node by id.
    pub fn node(&self, id: &NodeId) -> Option<&WorkflowNode> {
        self.index
            .get(id)
            .and_then(|&ix| self.graph.node_weight(ix))
            .map(|slot| &slot.node)
    }

    /// Check if the graph contains a node.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.index.contains_key(id)
    }

    /// Check if the edge `source -> target` exists.
    pub fn has_edge(&self, source: &NodeId, target: &NodeId) -> bool {
        match (self.index.get(source), self.index.get(target)) {
            (Some(&from), Some(&to)) => self.graph.contains_edge(from, to),
            _ => false,
        }
    }

    /// All nodes, in insertion order.
    pub fn nodes(&self) -> Vec<&WorkflowNode> {
        let mut slots: Vec<&Slot> = self.graph.node_indices().map(|ix| &self.graph[ix]).collect();
        slots.sort_by_key(|slot| slot.seq);
        slots.into_iter().map(|slot| &slot.node).collect()
    }

    /// All edges, ordered by the insertion order of their endpoints.
    pub fn edges(&self) -> Vec<WorkflowEdge> {
        let mut edges: Vec<(u64, u64, WorkflowEdge)> = self
            .graph
            .edge_indices()
            .filter_map(|edge| {
                let (from, to) = self.graph.edge_endpoints(edge)?;
                let source = self.graph.node_weight(from)?;
                let target = self.graph.node_weight(to)?;
                Some((
                    source.seq,
                    target.seq,
                    WorkflowEdge {
                        source: source.node.id.clone(),
                        target: target.node.id.clone(),
                    },
                ))
            })
            .collect();
        edges.sort_by_key(|(s, t, _)| (*s, *t));
        edges.into_iter().map(|(_, _, edge)| edge).collect()
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Remove every node and edge.
    pub fn clear(&mut self) {
        self.graph.clear();
        self.index.clear();
    }

    /// Serialize the graph into an ordered step list.
    ///
    /// Nodes are emitted in topological order (Kahn's algorithm). Among
    /// nodes whose dependencies are all satisfied, the one inserted first
    /// goes first, so the output is deterministic. The graph is not
    /// modified.
    ///
    /// # Errors
    /// Returns `CycleDetected` naming the earliest-inserted node that could
    /// not be ordered if the graph is not a DAG.
    pub fn to_step_list(&self) -> Result<Vec<StepDefinition>> {
        let mut in_degree: HashMap<NodeIndex, usize> = HashMap::new();
        let mut ready: BTreeMap<u64, NodeIndex> = BTreeMap::new();

        for ix in self.graph.node_indices() {
            let degree = self
                .graph
                .neighbors_directed(ix, Direction::Incoming)
                .count();
            in_degree.insert(ix, degree);
            if degree == 0 {
                ready.insert(self.graph[ix].seq, ix);
            }
        }

        let mut steps = Vec::with_capacity(self.graph.node_count());
        while let Some((_, ix)) = ready.pop_first() {
            steps.push(self.step_definition(ix));

            for next in self.graph.neighbors_directed(ix, Direction::Outgoing) {
                if let Some(degree) = in_degree.get_mut(&next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(self.graph[next].seq, next);
                    }
                }
            }
        }

        if steps.len() < self.graph.node_count() {
            let culprit = in_degree
                .iter()
                .filter(|(_, degree)| **degree > 0)
                .map(|(ix, _)| &self.graph[*ix])
                .min_by_key(|slot| slot.seq)
                .map(|slot| slot.node.id.to_string())
                .unwrap_or_default();
            tracing::debug!(target: TRACING_TARGET, node = %culprit, "cycle detected");
            return Err(Error::CycleDetected(culprit));
        }

        Ok(steps)
    }

    fn step_definition(&self, ix: NodeIndex) -> StepDefinition {
        let slot = &self.graph[ix];
        let mut deps: Vec<&Slot> = self
            .graph
            .neighbors_directed(ix, Direction::Incoming)
            .map(|dep| &self.graph[dep])
            .collect();
        deps.sort_by_key(|dep| dep.seq);

        StepDefinition {
            id: slot.node.id.to_string(),
            kind: slot.node.kind,
            label: slot.node.label.clone(),
            params: slot.node.params.clone(),
            depends_on: deps.into_iter().map(|dep| dep.node.id.to_string()).collect(),
        }
    }

    fn lookup(&self, id: &NodeId) -> Result<NodeIndex> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| Error::NodeNotFound(id.to_string()))
    }
}

impl Default for WorkflowGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WorkflowGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowGraph")
            .field("nodes", &self.node_count())
            .field("edges", &self.edge_count())
            .finish()
    }
}
