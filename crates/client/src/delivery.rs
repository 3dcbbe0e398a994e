//! Reconciles sent and pushed messages into the active chat and the
//! conversation list.

use std::sync::Arc;

use chatsync_shared::{FetchError, Message};

use crate::gateway::RequestGateway;
use crate::stores::{ActiveChatSession, Append, ConversationRegistry};

pub struct MessageDeliveryCoordinator {
    gateway: Arc<dyn RequestGateway>,
    registry: Arc<ConversationRegistry>,
    session: Arc<ActiveChatSession>,
}

impl MessageDeliveryCoordinator {
    pub fn new(
        gateway: Arc<dyn RequestGateway>,
        registry: Arc<ConversationRegistry>,
        session: Arc<ActiveChatSession>,
    ) -> Self {
        Self {
            gateway,
            registry,
            session,
        }
    }

    /// Send `text` to the active conversation.
    ///
    /// Nothing is shown locally until the server confirms; a failure leaves
    /// local state untouched apart from the session error. Returns `Ok(None)`
    /// without contacting the server when no conversation is active or the
    /// text is blank.
    pub async fn send(&self, text: &str) -> Result<Option<Message>, FetchError> {
        let Some(chat_id) = self.session.active_id() else {
            return Ok(None);
        };
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        match self.gateway.post_message(&chat_id, text).await {
            Ok(message) => {
                crate::log_info!("Message sent: {} in {}", message.id, message.chat_id);
                // The push echo may have beaten the response; append dedups.
                self.session.append(&message);
                self.registry.record_new_message(&message);
                Ok(Some(message))
            }
            Err(e) => {
                crate::log_error!("Error sending message to {}: {}", chat_id, e);
                self.session.record_error(&e);
                Err(e)
            }
        }
    }

    /// Handle a message delivered by the push channel.
    pub fn on_push(&self, message: Message) {
        match self.session.append(&message) {
            Append::Duplicate => {
                crate::log_debug!("Dropping duplicate push {}", message.id);
            }
            Append::Appended | Append::NotActive => {
                self.registry.record_new_message(&message);
            }
        }
    }
}
