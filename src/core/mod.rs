//! Workflow builder model.
//!
//! The graph is owned by whoever has the builder open; it is never shared
//! and has no persisted state of its own.

pub mod graph;
pub mod node;

pub use graph::WorkflowGraph;
pub use node::{NodeId, Position, StepDefinition, StepKind, WorkflowEdge, WorkflowNode};
