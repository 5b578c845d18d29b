//! Integration test suite for flowdeck.
//!
//! These tests drive the controller, the live channel and the poller
//! together against the in-process backend. They verify that the three
//! writers of workflow state interleave without corrupting it.
//!
//! # Test Categories
//!
//! - `graph_builder`: Builder graph edits and step-list serialization
//! - `lifecycle`: Workflow creation, approval and lifecycle transitions
//! - `live_updates`: Push channel routing and reconnect policy
//! - `polling`: Polling fallback and its interplay with pushes
//!
//! # CI Compatibility
//!
//! No test opens a socket or talks to a real backend; timers run on
//! paused tokio time.

mod fixtures;

mod lifecycle;
mod live_updates;
mod polling;
