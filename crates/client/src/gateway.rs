//! Request/response boundary to the chat backend.

use async_trait::async_trait;
use chatsync_shared::{Conversation, FetchError, Message, NewConversation, User};

/// Authenticated request/response calls consumed by the synchronization core.
///
/// [`crate::ApiClient`] is the HTTP implementation; anything else that can
/// answer these calls (a test double, a cached proxy) can stand in for it.
#[async_trait]
pub trait RequestGateway: Send + Sync {
    async fn list_conversations(&self) -> Result<Vec<Conversation>, FetchError>;

    async fn list_messages(&self, chat_id: &str) -> Result<Vec<Message>, FetchError>;

    /// The server assigns the message id and timestamp.
    async fn post_message(&self, chat_id: &str, text: &str) -> Result<Message, FetchError>;

    async fn create_direct_conversation(
        &self,
        request: &NewConversation,
    ) -> Result<Conversation, FetchError>;

    async fn list_other_users(&self) -> Result<Vec<User>, FetchError>;
}
