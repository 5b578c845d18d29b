//! Background tasks.
//!
//! Each actor is an independent tokio task that writes into shared state
//! through the lifecycle controller:
//! - Polling fallback (PollingFallback)
//!
//! The live channel's connection loop uses the same handle type.

pub mod poller;

use tokio_util::sync::CancellationToken;

pub use poller::PollingFallback;

/// Handle to a running actor, used for shutdown.
#[derive(Debug)]
pub struct ActorHandle {
    cancel: CancellationToken,
}

impl ActorHandle {
    /// Create a new actor handle with a cancellation token.
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Signal the actor to stop. Pending timers are dropped at once.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Check if shutdown has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
