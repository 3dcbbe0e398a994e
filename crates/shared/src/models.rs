//! Shared data models for the chat API and the realtime channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Deserialize an identifier that the backend may encode either as a JSON
/// string or as a JSON number. Both normalize to `String`.
pub fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Int(i64),
        Uint(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Int(n) => n.to_string(),
        RawId::Uint(n) => n.to_string(),
    })
}

fn deserialize_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapped(#[serde(deserialize_with = "deserialize_id")] String);

    let ids = Vec::<Wrapped>::deserialize(deserializer)?;
    Ok(ids.into_iter().map(|w| w.0).collect())
}

// --- Identity ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

impl User {
    /// "First Last", trimmed so a missing half doesn't leave stray spaces.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

// --- Messaging ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(deserialize_with = "deserialize_id")]
    pub chat_id: String,
    #[serde(deserialize_with = "deserialize_id")]
    pub sender_id: String,
    pub text: String,
    #[serde(alias = "timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_direct_chat: bool,
    #[serde(default)]
    pub participants: Vec<User>,
    #[serde(default)]
    pub last_message: Option<Message>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p.id == user_id)
    }
}

// --- Requests ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewConversation {
    pub title: String,
    pub description: String,
    pub is_direct_chat: bool,
    #[serde(deserialize_with = "deserialize_ids")]
    pub user_ids: Vec<String>,
}

impl NewConversation {
    /// Request body for a one-to-one chat with `user`.
    pub fn direct_with(user: &User) -> Self {
        Self {
            title: format!("Chat with {}", user.full_name()).trim().to_string(),
            description: "Direct chat".to_string(),
            is_direct_chat: true,
            user_ids: vec![user.id.clone()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendMessageRequest {
    pub text: String,
}
