//! Change notifications for observers of the synchronization core.
//!
//! Components keep plain state structs and announce every mutation here, so a
//! UI layer can re-read the relevant snapshot without depending on any
//! particular reactivity runtime.

use tokio::sync::broadcast;

use crate::channel::ConnectionState;

/// What changed. Observers re-read the matching component snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The conversation list was replaced, reordered or extended.
    ConversationsChanged,
    /// The loaded message list of `chat_id` changed.
    MessagesChanged { chat_id: String },
    /// The active conversation switched (or was cleared).
    ActiveConversationChanged { chat_id: Option<String> },
    /// The user directory was refreshed or cleared.
    UsersChanged,
    /// The realtime channel changed state.
    ConnectionChanged(ConnectionState),
}

/// Fan-out of [`SyncEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is fine.
    pub fn emit(&self, event: SyncEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_EVENT_CAPACITY)
    }
}
