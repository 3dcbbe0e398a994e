//! Per-user session wiring.
//!
//! One [`SessionContext`] is built after sign-in and handed to whatever needs
//! the conversation list, the active chat or the realtime connection. Dropping
//! it (after [`SessionContext::logout`]) discards all client state.

use std::sync::{Arc, Weak};

use chatsync_shared::{Conversation, FetchError, Message};
use tokio::sync::broadcast;

use crate::api_client::ApiClient;
use crate::channel::{ConnectionState, PushHandler, RealtimeChannel};
use crate::config::ClientConfig;
use crate::delivery::MessageDeliveryCoordinator;
use crate::events::{EventBus, SyncEvent};
use crate::gateway::RequestGateway;
use crate::stores::{ActiveChatSession, ConversationRegistry, UserDirectory};
use crate::ws::{ConnectionLifecycleManager, WsChannel};

pub struct SessionContext {
    events: EventBus,
    registry: Arc<ConversationRegistry>,
    session: Arc<ActiveChatSession>,
    coordinator: Arc<MessageDeliveryCoordinator>,
    connection: Arc<ConnectionLifecycleManager>,
    users: Arc<UserDirectory>,
}

impl SessionContext {
    pub fn new(
        gateway: Arc<dyn RequestGateway>,
        channel: Arc<dyn RealtimeChannel>,
        events: EventBus,
    ) -> Self {
        let registry = Arc::new(ConversationRegistry::new(gateway.clone(), events.clone()));
        let connection = Arc::new(ConnectionLifecycleManager::new(channel, events.clone()));
        let session = Arc::new(ActiveChatSession::new(
            gateway.clone(),
            registry.clone(),
            connection.clone(),
            events.clone(),
        ));
        let coordinator = Arc::new(MessageDeliveryCoordinator::new(
            gateway.clone(),
            registry.clone(),
            session.clone(),
        ));
        let users = Arc::new(UserDirectory::new(gateway, events.clone()));

        Self {
            events,
            registry,
            session,
            coordinator,
            connection,
            users,
        }
    }

    /// Wire the HTTP gateway and WebSocket channel from `config`, both
    /// authenticated with `credential`.
    pub fn from_config(config: &ClientConfig, credential: &str) -> Self {
        let api = ApiClient::new()
            .with_base_url(config.api_base_url.clone())
            .with_credential(Some(credential.to_string()));
        let channel = WsChannel::new(config.realtime_url.clone());
        Self::new(
            Arc::new(api),
            Arc::new(channel),
            EventBus::new(config.event_capacity),
        )
    }

    pub fn registry(&self) -> &Arc<ConversationRegistry> {
        &self.registry
    }

    pub fn session(&self) -> &Arc<ActiveChatSession> {
        &self.session
    }

    pub fn coordinator(&self) -> &Arc<MessageDeliveryCoordinator> {
        &self.coordinator
    }

    pub fn connection(&self) -> &Arc<ConnectionLifecycleManager> {
        &self.connection
    }

    pub fn users(&self) -> &Arc<UserDirectory> {
        &self.users
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Open the realtime channel and route its messages to the coordinator.
    ///
    /// If a conversation is already open its group is joined once connected.
    /// Failure only shows up in [`Self::connection_state`].
    pub async fn connect(&self, credential: &str) {
        let coordinator: Weak<MessageDeliveryCoordinator> = Arc::downgrade(&self.coordinator);
        let handler: PushHandler = Arc::new(move |message: Message| {
            if let Some(coordinator) = coordinator.upgrade() {
                coordinator.on_push(message);
            }
        });

        self.connection.connect(credential, handler).await;
        if self.connection.is_connected() {
            self.session.resync_group().await;
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Open a direct chat with a user from the directory, creating it on the
    /// server if needed. `Ok(None)` if the user is not in the directory.
    pub async fn start_direct_chat(
        &self,
        user_id: &str,
    ) -> Result<Option<Conversation>, FetchError> {
        let Some(user) = self.users.find_by_id(user_id) else {
            crate::log_warn!("start_direct_chat: unknown user {}", user_id);
            return Ok(None);
        };
        self.registry.create_direct_chat(&user).await.map(Some)
    }

    /// Close the active chat, drop the realtime channel and forget cached data.
    pub async fn logout(&self) {
        self.session.clear().await;
        self.connection.disconnect().await;
        self.registry.reset();
        self.users.clear();
        crate::log_info!("User logged out");
    }
}
