//! Polling fallback for the live channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::orchestration::LifecycleController;

use super::ActorHandle;

/// Tracing target for the poller.
const TRACING_TARGET: &str = "flowdeck::actors::poller";

const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Actor that periodically re-fetches the active workflow list.
///
/// Runs independently of the push channel; both write through the same
/// controller. The first poll happens immediately.
pub struct PollingFallback {
    controller: Arc<LifecycleController>,
    interval: Duration,
}

impl PollingFallback {
    pub fn new(controller: Arc<LifecycleController>) -> Self {
        Self {
            controller,
            interval: POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn spawn(self) -> ActorHandle {
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();

        tracing::debug!(target: TRACING_TARGET, interval = ?self.interval, "PollingFallback::spawn");

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel_clone.cancelled() => {
                        tracing::debug!(target: TRACING_TARGET, "PollingFallback cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        if !self.controller.is_mounted() {
                            tracing::debug!(target: TRACING_TARGET, "PollingFallback: controller torn down");
                            break;
                        }

                        // A poll in flight when we are disabled is abandoned.
                        tokio::select! {
                            biased;
                            _ = cancel_clone.cancelled() => break,
                            result = self.controller.refresh_active() => {
                                if let Err(e) = result {
                                    tracing::warn!(target: TRACING_TARGET, error = %e, "poll failed");
                                }
                            }
                        }
                    }
                }
            }
        });

        ActorHandle::new(cancel)
    }
}
