//! Push-channel transports.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Error, Result};
use crate::workflow::SessionId;

/// Tracing target for transport events.
const TRACING_TARGET: &str = "flowdeck::live::transport";

/// Stream of text frames from an open channel.
///
/// The stream ends when the channel closes; an `Err` item means it broke.
pub type FrameStream = BoxStream<'static, Result<String>>;

/// Opens a session-scoped stream of text frames.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn open(&self, session: &SessionId) -> Result<FrameStream>;
}

/// WebSocket transport. The session id is appended to the endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    endpoint: String,
}

impl WebSocketTransport {
    /// `endpoint` is the URL without the session segment,
    /// e.g. `ws://localhost:8000/ws`.
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, session: &SessionId) -> String {
        format!("{}/{}", self.endpoint, session)
    }
}

#[async_trait]
impl ChannelTransport for WebSocketTransport {
    async fn open(&self, session: &SessionId) -> Result<FrameStream> {
        let url = self.url_for(session);
        tracing::debug!(target: TRACING_TARGET, %url, "opening websocket");
        let (socket, _) = connect_async(url.as_str()).await?;

        // Keep text frames; binary, ping and pong frames carry nothing for us.
        let frames = socket
            .take_while(|msg| futures::future::ready(!matches!(msg, Ok(Message::Close(_)))))
            .filter_map(|msg| async move {
                match msg {
                    Ok(Message::Text(text)) => Some(Ok(text)),
                    Ok(_) => None,
                    Err(e) => Some(Err(Error::from(e))),
                }
            });
        Ok(frames.boxed())
    }
}
