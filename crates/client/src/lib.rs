//! chatsync client - synchronization core for a chat application.
//!
//! Keeps a local view of the user's conversations and of the open
//! conversation's messages consistent across two sources: request/response
//! calls to the backend ([`RequestGateway`]) and messages pushed over the
//! realtime channel ([`RealtimeChannel`]).

pub mod api_client;
pub mod channel;
pub mod config;
pub mod delivery;
pub mod events;
pub mod gateway;
pub mod logging;
pub mod session_context;
pub mod stores;
pub mod ws;

#[cfg(test)]
mod testing;

pub use api_client::ApiClient;
pub use channel::{CloseHandler, ConnectionState, PushHandler, RealtimeChannel};
pub use config::ClientConfig;
pub use delivery::MessageDeliveryCoordinator;
pub use events::{EventBus, SyncEvent};
pub use gateway::RequestGateway;
pub use session_context::SessionContext;
pub use stores::{ActiveChatSession, ConversationRegistry, UserDirectory};
pub use ws::{ConnectionLifecycleManager, WsChannel};
