//! Live update channel manager.
//!
//! Keeps a push channel open for one session and routes every parsed
//! message to a [`LiveUpdateHandler`]. The reconnect policy is an explicit
//! state machine driven by one background task:
//!
//! ```text
//! Disconnected --connect()--> Connecting --open ok--> Connected
//!      ^                          |                       |
//!      |                       open err                 closed
//!      |                          v                       |
//!      +------ disconnect() -- waiting (fixed interval) <-+
//! ```
//!
//! Retries continue until [`LiveChannel::disconnect`] is called.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::actors::ActorHandle;
use crate::workflow::SessionId;

use super::message::LiveMessage;
use super::transport::ChannelTransport;

/// Tracing target for channel lifecycle events.
const TRACING_TARGET: &str = "flowdeck::live::manager";

/// Delay between a close and the next connection attempt.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Connection state of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

/// Receives parsed push messages.
#[async_trait]
pub trait LiveUpdateHandler: Send + Sync {
    async fn handle(&self, message: LiveMessage);
}

/// Manages the push channel for a session.
pub struct LiveChannel {
    transport: Arc<dyn ChannelTransport>,
    handler: Arc<dyn LiveUpdateHandler>,
    reconnect_interval: Duration,
    state: Arc<watch::Sender<ChannelState>>,
    attempts: Arc<AtomicU32>,
    actor: Mutex<Option<ActorHandle>>,
}

impl LiveChannel {
    pub fn new(transport: Arc<dyn ChannelTransport>, handler: Arc<dyn LiveUpdateHandler>) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        Self {
            transport,
            handler,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            state: Arc::new(state),
            attempts: Arc::new(AtomicU32::new(0)),
            actor: Mutex::new(None),
        }
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    /// Reconnects scheduled since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Open the channel for `session`.
    ///
    /// Returns immediately; the connection is made in the background and
    /// messages are delivered to the handler as they arrive. A previous
    /// connection is dropped first.
    pub fn connect(&self, session: SessionId) {
        let cancel = CancellationToken::new();
        tracing::debug!(target: TRACING_TARGET, %session, "LiveChannel::connect");
        self.attempts.store(0, Ordering::SeqCst);
        self.state.send_modify(|state| {
            let previous = self.lock_actor().replace(ActorHandle::new(cancel.clone()));
            if let Some(previous) = previous {
                previous.shutdown();
            }
            *state = ChannelState::Connecting;
        });

        let connection = Connection {
            transport: self.transport.clone(),
            handler: self.handler.clone(),
            reconnect_interval: self.reconnect_interval,
            state: self.state.clone(),
            attempts: self.attempts.clone(),
            session,
            cancel,
        };
        tokio::spawn(connection.run());
    }

    /// Close the channel and cancel any pending reconnect.
    ///
    /// Close events that arrive afterwards schedule nothing.
    pub fn disconnect(&self) {
        // Cancel under the state lock so the old task cannot publish after us.
        self.state.send_modify(|state| {
            if let Some(actor) = self.lock_actor().take() {
                tracing::debug!(target: TRACING_TARGET, "LiveChannel::disconnect");
                actor.shutdown();
            }
            *state = ChannelState::Disconnected;
        });
    }

    fn lock_actor(&self) -> std::sync::MutexGuard<'_, Option<ActorHandle>> {
        self.actor.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        if let Some(actor) = self.lock_actor().take() {
            actor.shutdown();
        }
    }
}

/// The background side of one `connect()` call.
struct Connection {
    transport: Arc<dyn ChannelTransport>,
    handler: Arc<dyn LiveUpdateHandler>,
    reconnect_interval: Duration,
    state: Arc<watch::Sender<ChannelState>>,
    attempts: Arc<AtomicU32>,
    session: SessionId,
    cancel: CancellationToken,
}

impl Connection {
    async fn run(self) {
        loop {
            self.set_state(ChannelState::Connecting);

            let opened = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                opened = self.transport.open(&self.session) => opened,
            };

            match opened {
                Ok(mut frames) => {
                    self.attempts.store(0, Ordering::SeqCst);
                    self.set_state(ChannelState::Connected);
                    tracing::info!(target: TRACING_TARGET, session = %self.session, "live channel connected");

                    loop {
                        let frame = tokio::select! {
                            biased;
                            _ = self.cancel.cancelled() => return,
                            frame = frames.next() => frame,
                        };
                        match frame {
                            Some(Ok(text)) => {
                                if let Some(message) = LiveMessage::parse(&text) {
                                    self.handler.handle(message).await;
                                }
                            }
                            Some(Err(e)) => {
                                tracing::warn!(target: TRACING_TARGET, error = %e, "live channel broke");
                                break;
                            }
                            None => {
                                tracing::info!(target: TRACING_TARGET, "live channel closed");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(target: TRACING_TARGET, error = %e, "live channel open failed");
                }
            }

            if self.cancel.is_cancelled() {
                break;
            }
            self.set_state(ChannelState::Disconnected);
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::debug!(
                target: TRACING_TARGET,
                attempt,
                delay = ?self.reconnect_interval,
                "reconnect scheduled"
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_interval) => {}
            }
        }
        tracing::debug!(target: TRACING_TARGET, session = %self.session, "connection task stopped");
    }

    /// Publish `state` unless this connection has been superseded.
    fn set_state(&self, state: ChannelState) {
        self.state.send_if_modified(|current| {
            if self.cancel.is_cancelled() {
                return false;
            }
            *current = state;
            true
        });
    }
}
