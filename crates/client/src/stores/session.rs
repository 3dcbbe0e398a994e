//! The currently open conversation and its loaded messages.

use std::sync::Arc;

use chatsync_shared::{Conversation, FetchError, Message};
use parking_lot::Mutex;

use crate::events::{EventBus, SyncEvent};
use crate::gateway::RequestGateway;
use crate::stores::ConversationRegistry;
use crate::ws::ConnectionLifecycleManager;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionPhase {
    /// No conversation selected.
    #[default]
    Idle,
    /// Group switch and history fetch in flight.
    Switching,
    /// History loaded (or its fetch failed) for a fixed conversation.
    Active,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub active_id: Option<String>,
    /// Unique by id, in arrival order.
    pub messages: Vec<Message>,
    /// Summary of the active conversation captured when its history loaded.
    pub details: Option<Conversation>,
    pub is_loading: bool,
    pub error: Option<String>,
}

/// Outcome of offering a message to the active list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Append {
    Appended,
    Duplicate,
    NotActive,
}

#[derive(Default)]
struct Inner {
    view: SessionState,
    /// Bumped on every selection change; responses carry the value they were
    /// requested under.
    generation: u64,
}

pub struct ActiveChatSession {
    gateway: Arc<dyn RequestGateway>,
    registry: Arc<ConversationRegistry>,
    connection: Arc<ConnectionLifecycleManager>,
    events: EventBus,
    inner: Mutex<Inner>,
}

impl ActiveChatSession {
    pub fn new(
        gateway: Arc<dyn RequestGateway>,
        registry: Arc<ConversationRegistry>,
        connection: Arc<ConnectionLifecycleManager>,
        events: EventBus,
    ) -> Self {
        Self {
            gateway,
            registry,
            connection,
            events,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.inner.lock().view.clone()
    }

    pub fn active_id(&self) -> Option<String> {
        self.inner.lock().view.active_id.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.inner.lock().view.messages.clone()
    }

    pub fn has_messages(&self) -> bool {
        !self.inner.lock().view.messages.is_empty()
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.inner
            .lock()
            .view
            .messages
            .iter()
            .any(|m| m.id == message_id)
    }

    /// The active conversation's summary: the live registry entry, or the
    /// details captured at load time if the registry no longer has it.
    pub fn current_chat(&self) -> Option<Conversation> {
        let (active_id, details) = {
            let inner = self.inner.lock();
            (inner.view.active_id.clone()?, inner.view.details.clone())
        };
        self.registry.find_by_id(&active_id).or(details)
    }

    /// Open `chat_id`. Selecting the already active conversation does nothing.
    pub async fn select(&self, chat_id: &str) -> Result<(), FetchError> {
        let generation = {
            let mut inner = self.inner.lock();
            if inner.view.active_id.as_deref() == Some(chat_id) {
                return Ok(());
            }
            inner.generation += 1;
            inner.view = SessionState {
                phase: SessionPhase::Switching,
                active_id: Some(chat_id.to_string()),
                ..SessionState::default()
            };
            inner.generation
        };
        crate::log_info!("Switching to conversation {}", chat_id);
        self.events.emit(SyncEvent::ActiveConversationChanged {
            chat_id: Some(chat_id.to_string()),
        });

        self.resync_group().await;
        self.fetch_history(chat_id, generation).await.map(|_| ())
    }

    /// Fetch `chat_id`'s history and install it if `chat_id` is still the
    /// active conversation when the response arrives.
    ///
    /// Returns `Ok(false)` when the response was discarded as stale.
    pub async fn load_history(&self, chat_id: &str) -> Result<bool, FetchError> {
        let generation = self.inner.lock().generation;
        self.fetch_history(chat_id, generation).await
    }

    fn is_current(inner: &Inner, chat_id: &str, generation: u64) -> bool {
        inner.generation == generation && inner.view.active_id.as_deref() == Some(chat_id)
    }

    async fn fetch_history(&self, chat_id: &str, generation: u64) -> Result<bool, FetchError> {
        {
            let mut inner = self.inner.lock();
            if !Self::is_current(&inner, chat_id, generation) {
                return Ok(false);
            }
            inner.view.is_loading = true;
            inner.view.error = None;
        }

        let result = self.gateway.list_messages(chat_id).await;
        let details = self.registry.find_by_id(chat_id);

        {
            let mut inner = self.inner.lock();
            if !Self::is_current(&inner, chat_id, generation) {
                crate::log_debug!("Discarding stale history for {}", chat_id);
                return Ok(false);
            }

            let view = &mut inner.view;
            view.is_loading = false;
            view.phase = SessionPhase::Active;
            match &result {
                Ok(messages) => {
                    crate::log_info!("Chat messages fetched for {}: {}", chat_id, messages.len());
                    // Pushes that landed while the fetch was in flight stay,
                    // after the history, unless the history already has them.
                    let pushed = std::mem::take(&mut view.messages);
                    for message in messages.iter().chain(pushed.iter()) {
                        if !view.messages.iter().any(|m| m.id == message.id) {
                            view.messages.push(message.clone());
                        }
                    }
                    if details.is_some() {
                        view.details = details;
                    }
                }
                Err(e) => {
                    crate::log_error!("Error fetching chat messages for {}: {}", chat_id, e);
                    view.error = Some(e.to_string());
                }
            }
        }
        self.events.emit(SyncEvent::MessagesChanged {
            chat_id: chat_id.to_string(),
        });

        result.map(|_| true)
    }

    /// Close the active conversation.
    pub async fn clear(&self) {
        let was_active = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            std::mem::take(&mut inner.view).active_id.is_some()
        };
        if was_active {
            self.events
                .emit(SyncEvent::ActiveConversationChanged { chat_id: None });
        }
        self.resync_group().await;
    }

    /// Bring the joined realtime group in line with the active conversation.
    pub async fn resync_group(&self) {
        self.connection.align(|| self.active_id()).await;
    }

    /// Append `message` if it belongs to the active conversation and is not
    /// already listed.
    ///
    /// Ids are only unique within a conversation, so the duplicate check runs
    /// against the active list only after the conversation matches.
    pub fn append(&self, message: &Message) -> Append {
        let outcome = {
            let mut inner = self.inner.lock();
            let view = &mut inner.view;
            if view.active_id.as_deref() != Some(message.chat_id.as_str()) {
                Append::NotActive
            } else if view.messages.iter().any(|m| m.id == message.id) {
                Append::Duplicate
            } else {
                view.messages.push(message.clone());
                Append::Appended
            }
        };
        if outcome == Append::Appended {
            self.events.emit(SyncEvent::MessagesChanged {
                chat_id: message.chat_id.clone(),
            });
        }
        outcome
    }

    pub fn record_error(&self, error: &FetchError) {
        self.inner.lock().view.error = Some(error.to_string());
    }

    pub fn clear_error(&self) {
        self.inner.lock().view.error = None;
    }
}
