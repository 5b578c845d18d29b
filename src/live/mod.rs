//! Live update channel: push frames from the backend, scoped to a session.

mod manager;
mod message;
mod transport;

pub use manager::{ChannelState, LiveChannel, LiveUpdateHandler, DEFAULT_RECONNECT_INTERVAL};
pub use message::LiveMessage;
pub use transport::{ChannelTransport, FrameStream, WebSocketTransport};
