//! Realtime channel wire protocol.
//!
//! Every frame is a JSON [`WsEnvelope`] whose payload is flattened next to
//! the envelope fields and tagged as `{"type": ..., "data": ...}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Message;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsEnvelope<T> {
    pub id: String,
    #[serde(flatten)]
    pub payload: T,
    pub ts: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl<T> WsEnvelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            ts: Utc::now(),
            correlation_id: None,
        }
    }
}

/// Commands the client sends over the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientCommand {
    #[serde(rename = "group.join", rename_all = "camelCase")]
    JoinGroup { chat_id: String },
    #[serde(rename = "group.leave", rename_all = "camelCase")]
    LeaveGroup { chat_id: String },
}

/// Events pushed by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    #[serde(rename = "message.new")]
    MessageNew { message: Message },
    Error { code: String, message: String },
}
