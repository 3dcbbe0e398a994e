//! Realtime push channel.
//!
//! ```text
//!   SessionContext ──connect/logout──▶ ConnectionLifecycleManager
//!   ActiveChatSession ──select/clear──▶        │ join/leave (one group)
//!                                              ▼
//!                                         WsChannel ◀──── server frames
//!                                              │
//!                                  message.new │ PushHandler
//!                                              ▼
//!                               MessageDeliveryCoordinator::on_push
//! ```

mod connection;
mod manager;

pub use connection::WsChannel;
pub use manager::ConnectionLifecycleManager;
