//! Change notifications emitted by the lifecycle controller.
//!
//! The rendering layer subscribes to these instead of observing state
//! directly; on each event it re-reads whatever snapshot it displays.

use crate::workflow::{WorkflowId, WorkflowStatus};

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    /// A request failed; transient and retryable.
    Error,
    /// Informational notification
    Info,
}

/// A notification message to display to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }
}

/// Something in the controller's state changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// A workflow in the active set was created or changed.
    WorkflowUpdated {
        id: WorkflowId,
        status: WorkflowStatus,
    },
    /// A workflow reached a terminal status and moved to history.
    WorkflowArchived {
        id: WorkflowId,
        status: WorkflowStatus,
    },
    /// The workflow shown in the detail view changed.
    SelectionChanged { id: Option<WorkflowId> },
    HealthUpdated,
    CatalogLoaded,
    Notification(Notification),
}
