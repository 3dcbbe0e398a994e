//! Push-channel boundary.

use std::sync::Arc;

use async_trait::async_trait;
use chatsync_shared::{ChannelError, Message};

/// Callback invoked for every message pushed by the server.
///
/// It runs to completion synchronously; it must not need to await.
pub type PushHandler = Arc<dyn Fn(Message) + Send + Sync>;

/// Callback invoked when an established connection drops without
/// `disconnect` having been called.
pub type CloseHandler = Arc<dyn Fn() + Send + Sync>;

/// Connection state of the realtime channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// A persistent push connection keyed by an auth credential, scoped into
/// per-conversation groups.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    async fn connect(&self, credential: &str) -> Result<(), ChannelError>;

    async fn disconnect(&self);

    async fn join_group(&self, chat_id: &str) -> Result<(), ChannelError>;

    async fn leave_group(&self, chat_id: &str) -> Result<(), ChannelError>;

    /// Register the inbound message handler, replacing any earlier one.
    fn on_message(&self, handler: PushHandler);

    /// Register the handler for connections closed by the remote side or by a
    /// transport error, replacing any earlier one.
    fn on_close(&self, handler: CloseHandler);
}
