use thiserror::Error;

use crate::workflow::WorkflowStatus;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Node already exists: {0}")]
    DuplicateNode(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Self-loop on node {0}")]
    SelfLoop(String),

    #[error("Cycle detected at node: {0}")]
    CycleDetected(String),

    #[error("Cannot {action} workflow {workflow} while {from}")]
    InvalidTransition {
        workflow: String,
        from: WorkflowStatus,
        action: &'static str,
    },

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Step {step} not found in workflow {workflow}")]
    StepNotFound { workflow: String, step: String },

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Channel error: {0}")]
    Channel(String),
}

impl Error {
    /// Whether the failure is transient and the same operation may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RequestFailed(_) | Error::Channel(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::RequestFailed(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Channel(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
