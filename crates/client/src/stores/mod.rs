//! Client-side state: conversation list, active chat, user directory.

pub mod conversations;
pub mod session;
pub mod users;

pub use conversations::{ConversationRegistry, RegistryState};
pub use session::{ActiveChatSession, Append, SessionPhase, SessionState};
pub use users::{UserDirectory, UsersState};
