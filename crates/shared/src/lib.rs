//! Shared types for the chatsync client: API models, realtime protocol and errors.

pub mod error;
pub mod models;
pub mod protocol;

pub use error::*;
pub use models::*;
pub use protocol::*;
