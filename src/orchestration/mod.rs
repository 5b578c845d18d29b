//! Workflow orchestration control.
//!
//! The [`LifecycleController`] owns all workflow state; views read snapshots
//! from it and subscribe to [`ControllerEvent`]s for changes.

mod controller;
mod events;

pub use controller::LifecycleController;
pub use events::{ControllerEvent, Notification, NotificationLevel};
